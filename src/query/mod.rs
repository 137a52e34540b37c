use std::fmt;

use sqlx::{Postgres, QueryBuilder};

use crate::{
    config::QueryConfig,
    page::PageWindow,
    polygon::{Polygon, SRID},
};

const RECORD_COLUMNS: &str = "id::text as id, cadastral_code, municipality_code, building_type, \
     name, address, ST_AsGeoJSON(geom)::jsonb as geometry, attributes, visible, \
     created_at, updated_at, updated_by";

// Newest first; id breaks ties so equal timestamps still page deterministically.
const PAGE_ORDER: &str = " order by created_at desc, id desc";

/// Text columns a request may filter on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextColumn {
    CadastralCode,
    MunicipalityCode,
    BuildingType,
    Name,
    Address,
}

impl TextColumn {
    pub fn as_str(self) -> &'static str {
        match self {
            TextColumn::CadastralCode => "cadastral_code",
            TextColumn::MunicipalityCode => "municipality_code",
            TextColumn::BuildingType => "building_type",
            TextColumn::Name => "name",
            TextColumn::Address => "address",
        }
    }
}

impl fmt::Display for TextColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `where` fragment with at most one bound parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Visible,
    Equals { column: TextColumn, value: String },
    ContainsIgnoreCase { column: TextColumn, needle: String },
    Intersects(Polygon),
}

impl Predicate {
    pub fn equals(column: TextColumn, value: impl Into<String>) -> Self {
        Self::Equals {
            column,
            value: value.into(),
        }
    }

    pub fn contains_ignore_case(column: TextColumn, needle: impl Into<String>) -> Self {
        Self::ContainsIgnoreCase {
            column,
            needle: needle.into(),
        }
    }

    pub fn intersects(polygon: Polygon) -> Self {
        Self::Intersects(polygon)
    }

    /// The value bound for this fragment, exactly as sent to the store.
    pub fn param(&self) -> Option<String> {
        match self {
            Predicate::Visible => None,
            Predicate::Equals { value, .. } => Some(value.clone()),
            Predicate::ContainsIgnoreCase { needle, .. } => Some(like_pattern(needle)),
            Predicate::Intersects(polygon) => Some(polygon.to_wkt()),
        }
    }

    fn push_sql(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        match self {
            Predicate::Visible => {
                builder.push("visible = true");
            }
            Predicate::Equals { column, value } => {
                builder.push(column.as_str());
                builder.push(" = ");
                builder.push_bind(value.clone());
            }
            Predicate::ContainsIgnoreCase { column, needle } => {
                builder.push(column.as_str());
                builder.push(" ilike ");
                builder.push_bind(like_pattern(needle));
            }
            Predicate::Intersects(polygon) => {
                builder.push("ST_Intersects(geom, ST_GeomFromText(");
                builder.push_bind(polygon.to_wkt());
                builder.push(", ");
                builder.push(SRID);
                builder.push("))");
            }
        }
    }
}

/// Wraps `needle` in `%` after escaping LIKE metacharacters so it matches literally.
pub fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

/// Ordered predicate list shared by the count and page queries.
///
/// The visibility predicate is always first and cannot be removed or supplied
/// by callers; only [`crate::filter::compile`] constructs this type.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledFilter {
    predicates: Vec<Predicate>,
}

impl CompiledFilter {
    pub(crate) fn new(optional: impl IntoIterator<Item = Predicate>) -> Self {
        let mut predicates = vec![Predicate::Visible];
        predicates.extend(
            optional
                .into_iter()
                .filter(|predicate| !matches!(predicate, Predicate::Visible)),
        );
        Self { predicates }
    }

    pub fn visibility(&self) -> &Predicate {
        &self.predicates[0]
    }

    pub fn optional(&self) -> &[Predicate] {
        &self.predicates[1..]
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Bound values in placeholder order.
    pub fn params(&self) -> Vec<String> {
        self.predicates.iter().filter_map(Predicate::param).collect()
    }

    pub fn polygon(&self) -> Option<&Polygon> {
        self.predicates.iter().find_map(|predicate| match predicate {
            Predicate::Intersects(polygon) => Some(polygon),
            _ => None,
        })
    }

    /// `select count(*)` over the filtered rows; no ordering, no window.
    pub fn count_query(&self, config: &QueryConfig) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new("select count(*) from ");
        builder.push(config.qualified_table());
        self.push_where(&mut builder);
        builder
    }

    /// Row query over the same predicates with the fixed order and the page window.
    pub fn page_query(
        &self,
        config: &QueryConfig,
        window: PageWindow,
    ) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new("select ");
        builder.push(RECORD_COLUMNS);
        builder.push(" from ");
        builder.push(config.qualified_table());
        self.push_where(&mut builder);
        builder.push(PAGE_ORDER);
        builder.push(" limit ");
        builder.push_bind(window.limit());
        builder.push(" offset ");
        builder.push_bind(window.offset());
        builder
    }

    fn push_where(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push(" where ");
        let mut iter = self.predicates.iter();
        if let Some(first) = iter.next() {
            first.push_sql(builder);
        }
        for predicate in iter {
            builder.push(" and ");
            predicate.push_sql(builder);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Polygon {
        Polygon::parse("POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))").unwrap()
    }

    #[test]
    fn visibility_only() {
        let filter = CompiledFilter::new(Vec::<Predicate>::new());
        let builder = filter.count_query(&QueryConfig::default());
        assert_eq!(
            builder.sql(),
            "select count(*) from \"public\".\"buildings\" where visible = true"
        );
        assert!(filter.params().is_empty());
    }

    #[test]
    fn caller_cannot_inject_visibility() {
        let filter = CompiledFilter::new([Predicate::Visible, Predicate::Visible]);
        assert_eq!(filter.predicates(), &[Predicate::Visible]);
    }

    #[test]
    fn placeholders_follow_predicate_order() {
        let filter = CompiledFilter::new([
            Predicate::equals(TextColumn::CadastralCode, "12/3"),
            Predicate::contains_ignore_case(TextColumn::Name, "school"),
            Predicate::intersects(square()),
        ]);
        let builder = filter.count_query(&QueryConfig::default());
        assert_eq!(
            builder.sql(),
            "select count(*) from \"public\".\"buildings\" where visible = true \
             and cadastral_code = $1 and name ilike $2 \
             and ST_Intersects(geom, ST_GeomFromText($3, 4326))"
        );
        assert_eq!(
            filter.params(),
            vec![
                "12/3".to_string(),
                "%school%".to_string(),
                "POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))".to_string(),
            ]
        );
    }

    #[test]
    fn page_query_shares_predicates_then_windows() {
        let filter = CompiledFilter::new([Predicate::equals(TextColumn::BuildingType, "residential")]);
        let window = PageWindow::new(Some(10), Some(30)).unwrap();
        let builder = filter.page_query(&QueryConfig::default(), window);
        let sql = builder.sql();
        assert!(sql.starts_with("select id::text as id, cadastral_code"));
        assert!(sql.ends_with(
            " from \"public\".\"buildings\" where visible = true and building_type = $1 \
             order by created_at desc, id desc limit $2 offset $3"
        ));
    }

    #[test]
    fn count_and_page_render_identical_where_clause() {
        let filter = CompiledFilter::new([
            Predicate::equals(TextColumn::MunicipalityCode, "0301"),
            Predicate::contains_ignore_case(TextColumn::Address, "gate"),
        ]);
        let config = QueryConfig::default();
        let count = filter.count_query(&config);
        let page = filter.page_query(&config, PageWindow::default());
        let count_where = &count.sql()[count.sql().find(" where ").unwrap()..];
        let page_sql = page.sql();
        let page_where =
            &page_sql[page_sql.find(" where ").unwrap()..page_sql.find(" order by ").unwrap()];
        assert_eq!(count_where, page_where);
    }

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("school"), "%school%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
        assert_eq!(like_pattern(""), "%%");
    }

    #[test]
    fn polygon_accessor() {
        let filter = CompiledFilter::new([Predicate::intersects(square())]);
        assert_eq!(filter.polygon(), Some(&square()));
        assert_eq!(filter.optional().len(), 1);
        assert_eq!(filter.visibility(), &Predicate::Visible);
    }
}
