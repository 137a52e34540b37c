use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("{phase} query failed: {source}")]
    Query {
        phase: QueryPhase,
        #[source]
        source: sqlx::Error,
    },
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Phase tag for store failures raised while executing a page request.
    pub fn phase(&self) -> Option<QueryPhase> {
        match self {
            Error::Query { phase, .. } => Some(*phase),
            Error::Context { source, .. } => source.phase(),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        match self {
            Error::Validation(_) => true,
            Error::Context { source, .. } => source.is_validation(),
            _ => false,
        }
    }
}

/// Which of the two engine queries a store failure came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryPhase {
    Count,
    Data,
}

impl QueryPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryPhase::Count => "count",
            QueryPhase::Data => "data",
        }
    }
}

impl fmt::Display for QueryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input rejected before any query runs.
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("invalid polygon: {0}")]
    Polygon(#[from] PolygonError),
    #[error("limit must be between {min} and {max}, got {value}")]
    LimitOutOfRange { value: i64, min: i64, max: i64 },
    #[error("offset must be zero or greater, got {value}")]
    OffsetOutOfRange { value: i64 },
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

impl ValidationError {
    /// Display form that leaves out caller-supplied text, for log events.
    pub fn redacted(&self) -> RedactedValidation<'_> {
        RedactedValidation(self)
    }
}

pub struct RedactedValidation<'a>(&'a ValidationError);

impl fmt::Display for RedactedValidation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            ValidationError::Polygon(PolygonError::NotAPolygon { .. }) => {
                f.write_str("invalid polygon: expected POLYGON geometry text")
            }
            ValidationError::Polygon(PolygonError::NonNumericCoordinate { ring, pair, .. }) => {
                write!(
                    f,
                    "invalid polygon: non-numeric coordinate at pair {pair} in ring {ring}"
                )
            }
            ValidationError::InvalidArgument { .. } => f.write_str("invalid argument"),
            other => write!(f, "{other}"),
        }
    }
}

/// Defects in caller-supplied polygon text. Ring and pair numbers are 1-based.
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum PolygonError {
    #[error("expected POLYGON geometry text, found `{found}`")]
    NotAPolygon { found: String },
    #[error("unbalanced parentheses at position {position}")]
    UnbalancedParentheses { position: usize },
    #[error("expected {expected} at position {position}")]
    Syntax {
        expected: &'static str,
        position: usize,
    },
    #[error("insufficient coordinate pairs in ring {ring}: found {found}, need at least 4")]
    InsufficientCoordinatePairs { ring: usize, found: usize },
    #[error("pair {pair} in ring {ring} must have exactly 2 coordinates, found {found}")]
    CoordinateArity {
        ring: usize,
        pair: usize,
        found: usize,
    },
    #[error("non-numeric coordinate at pair {pair} in ring {ring}: `{token}`")]
    NonNumericCoordinate {
        ring: usize,
        pair: usize,
        token: String,
    },
    #[error("non-finite coordinate at pair {pair} in ring {ring}")]
    NonFiniteCoordinate { ring: usize, pair: usize },
    #[error("unclosed polygon: first and last coordinate pairs of ring {ring} differ")]
    Unclosed { ring: usize },
    #[error("unexpected input after polygon at position {position}")]
    TrailingInput { position: usize },
}

impl From<PolygonError> for Error {
    fn from(value: PolygonError) -> Self {
        Error::Validation(ValidationError::Polygon(value))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub trait WithContext<T> {
    fn context(self, msg: impl Into<String>) -> Result<T>;
}

impl<T> WithContext<T> for Result<T> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Context {
            context: msg.into(),
            source: Box::new(e),
        })
    }
}
