//! Filtered, paginated building queries over PostGIS.

pub mod buildings;
pub mod config;
pub mod context;
mod error;
pub mod filter;
pub mod metrics;
pub mod page;
pub mod polygon;
pub mod query;
pub mod store;
pub mod testing;
pub mod tracing;

pub use buildings::{BuildingRecord, BuildingSource, Buildings, PointGeometry};
pub use config::QueryConfig;
pub use context::RequestContext;
pub use error::{Error, PolygonError, QueryPhase, Result, ValidationError, WithContext};
pub use filter::FilterRequest;
pub use page::{PaginationMeta, ResultPage};
pub use polygon::Polygon;
pub use store::Store;

pub mod prelude {
    pub use crate::{
        Buildings, Error, FilterRequest, RequestContext, Result, ResultPage, Store,
    };
}
