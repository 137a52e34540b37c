use std::time::Duration;

/// Where building rows live and how query execution is observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryConfig {
    pub schema: String,
    pub table: String,
    /// Queries slower than this are logged under `footprint::slow_query`.
    pub slow_query_threshold: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            schema: "public".into(),
            table: "buildings".into(),
            slow_query_threshold: Duration::from_millis(500),
        }
    }
}

impl QueryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    /// Schema-qualified, quoted table name ready to splice into SQL.
    pub fn qualified_table(&self) -> String {
        qualified_name(self.schema.trim(), self.table.trim())
    }
}

pub fn qualified_name(schema: &str, ident: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(ident))
}

pub fn quote_ident(value: &str) -> String {
    let escaped = value.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}
