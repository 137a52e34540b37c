//! Building filter requests and their compilation into shared predicates.
//!
//! Absent fields add no predicate. A present field always adds one, even when
//! its value is the empty string: exact fields then match `''` and partial
//! fields match every non-null value.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::ValidationError,
    page::PageWindow,
    polygon::Polygon,
    query::{CompiledFilter, Predicate, TextColumn},
};

const REDACTED_POLYGON: &str = "<polygon>";

/// Filters plus the requested page window, as received from an adapter.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FilterRequest {
    #[serde(alias = "cadastral_code", skip_serializing_if = "Option::is_none")]
    pub cadastral_code: Option<String>,
    #[serde(alias = "municipality_code", skip_serializing_if = "Option::is_none")]
    pub municipality_code: Option<String>,
    #[serde(alias = "building_type", skip_serializing_if = "Option::is_none")]
    pub building_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Polygon geometry text in WGS84 longitude/latitude.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polygon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

impl FilterRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Converts untyped tool arguments into a request.
    ///
    /// `null` means "no arguments". Anything other than an object, any unknown
    /// key and any mistyped value is rejected here rather than inside the engine.
    pub fn from_arguments(arguments: Value) -> Result<Self, ValidationError> {
        match arguments {
            Value::Null => Ok(Self::default()),
            Value::Object(_) => serde_json::from_value(arguments).map_err(|e| {
                ValidationError::InvalidArgument {
                    reason: e.to_string(),
                }
            }),
            other => Err(ValidationError::InvalidArgument {
                reason: format!(
                    "expected an object of filter arguments, got {}",
                    json_kind(&other)
                ),
            }),
        }
    }

    pub fn cadastral_code(mut self, value: impl Into<String>) -> Self {
        self.cadastral_code = Some(value.into());
        self
    }

    pub fn municipality_code(mut self, value: impl Into<String>) -> Self {
        self.municipality_code = Some(value.into());
        self
    }

    pub fn building_type(mut self, value: impl Into<String>) -> Self {
        self.building_type = Some(value.into());
        self
    }

    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = Some(value.into());
        self
    }

    pub fn address(mut self, value: impl Into<String>) -> Self {
        self.address = Some(value.into());
        self
    }

    pub fn polygon(mut self, wkt: impl Into<String>) -> Self {
        self.polygon = Some(wkt.into());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn compile(&self) -> Result<CompiledRequest, ValidationError> {
        compile(self)
    }

    /// Which filters are set and how they match, safe to log.
    pub fn shape(&self) -> FilterShape<'_> {
        FilterShape(self)
    }
}

impl fmt::Debug for FilterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRequest")
            .field("cadastral_code", &self.cadastral_code)
            .field("municipality_code", &self.municipality_code)
            .field("building_type", &self.building_type)
            .field("name", &self.name)
            .field("address", &self.address)
            .field("polygon", &self.polygon.as_ref().map(|_| REDACTED_POLYGON))
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish()
    }
}

/// Display adapter listing filter fields with their match kind; values are omitted.
pub struct FilterShape<'a>(&'a FilterRequest);

impl fmt::Display for FilterShape<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let request = self.0;
        let fields = [
            ("cadastral_code", request.cadastral_code.is_some(), "eq"),
            ("municipality_code", request.municipality_code.is_some(), "eq"),
            ("building_type", request.building_type.is_some(), "eq"),
            ("name", request.name.is_some(), "ilike"),
            ("address", request.address.is_some(), "ilike"),
            ("polygon", request.polygon.is_some(), REDACTED_POLYGON),
        ];
        let mut first = true;
        for (field, present, kind) in fields {
            if !present {
                continue;
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            write!(f, "{field}={kind}")?;
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// Output of the filter compiler: shared predicates plus the normalized window.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledRequest {
    pub filter: CompiledFilter,
    pub window: PageWindow,
}

/// Validates `request` and turns it into the predicate list both queries reuse.
pub fn compile(request: &FilterRequest) -> Result<CompiledRequest, ValidationError> {
    let window = PageWindow::new(request.limit, request.offset)?;

    let mut predicates = Vec::new();
    let exact = [
        (TextColumn::CadastralCode, &request.cadastral_code),
        (TextColumn::MunicipalityCode, &request.municipality_code),
        (TextColumn::BuildingType, &request.building_type),
    ];
    for (column, value) in exact {
        if let Some(value) = value {
            predicates.push(Predicate::equals(column, value.as_str()));
        }
    }

    let partial = [
        (TextColumn::Name, &request.name),
        (TextColumn::Address, &request.address),
    ];
    for (column, value) in partial {
        if let Some(value) = value {
            predicates.push(Predicate::contains_ignore_case(column, value.as_str()));
        }
    }

    if let Some(text) = &request.polygon {
        predicates.push(Predicate::intersects(Polygon::parse(text)?));
    }

    Ok(CompiledRequest {
        filter: CompiledFilter::new(predicates),
        window,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
