use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{PgPool, types::Json};
use tracing::{Span, instrument};

use crate::{
    Error, Result,
    config::QueryConfig,
    context::RequestContext,
    error::QueryPhase,
    filter::{CompiledRequest, FilterRequest, compile},
    metrics,
    page::{PageWindow, PaginationMeta, ResultPage},
    query::CompiledFilter,
};

/// One visible building row, decoded fresh for every query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingRecord {
    pub id: String,
    pub cadastral_code: String,
    pub municipality_code: String,
    pub building_type: String,
    pub name: Option<String>,
    pub address: String,
    pub geometry: Option<PointGeometry>,
    pub attributes: Value,
    pub visible: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

/// GeoJSON point, `[longitude, latitude]` in WGS84.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<f64>,
}

impl PointGeometry {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self {
            kind: "Point".into(),
            coordinates: vec![lon, lat],
        }
    }

    pub fn lon(&self) -> Option<f64> {
        self.coordinates.first().copied()
    }

    pub fn lat(&self) -> Option<f64> {
        self.coordinates.get(1).copied()
    }
}

#[derive(sqlx::FromRow)]
struct BuildingRow {
    id: String,
    cadastral_code: String,
    municipality_code: String,
    building_type: String,
    name: Option<String>,
    address: String,
    geometry: Option<Json<PointGeometry>>,
    attributes: Option<Value>,
    visible: bool,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    updated_by: Option<String>,
}

impl From<BuildingRow> for BuildingRecord {
    fn from(row: BuildingRow) -> Self {
        Self {
            id: row.id,
            cadastral_code: row.cadastral_code,
            municipality_code: row.municipality_code,
            building_type: row.building_type,
            name: row.name,
            address: row.address,
            geometry: row.geometry.map(|Json(point)| point),
            attributes: row
                .attributes
                .unwrap_or_else(|| Value::Object(Default::default())),
            visible: row.visible,
            created_at: row.created_at,
            updated_at: row.updated_at,
            updated_by: row.updated_by,
        }
    }
}

/// The store the executor reads from.
///
/// Both calls receive the same compiled filter; implementations must apply
/// every predicate in it and nothing else.
#[async_trait]
pub trait BuildingSource: Send + Sync {
    async fn count(&self, filter: &CompiledFilter) -> std::result::Result<i64, sqlx::Error>;

    /// Rows ordered newest first (ties by id, descending), windowed by `window`.
    async fn fetch_page(
        &self,
        filter: &CompiledFilter,
        window: PageWindow,
    ) -> std::result::Result<Vec<BuildingRecord>, sqlx::Error>;
}

/// [`BuildingSource`] backed by a PostGIS table.
#[derive(Clone, Debug)]
pub struct PgBuildingSource {
    pool: PgPool,
    config: QueryConfig,
}

impl PgBuildingSource {
    pub fn new(pool: PgPool, config: QueryConfig) -> Self {
        Self { pool, config }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    fn observe(&self, phase: QueryPhase, sql: &str, elapsed: Duration) {
        if elapsed > self.config.slow_query_threshold {
            tracing::warn!(
                target: "footprint::slow_query",
                phase = %phase,
                elapsed_ms = elapsed.as_millis() as u64,
                sql = %sql,
                "slow building query"
            );
        }
    }
}

#[async_trait]
impl BuildingSource for PgBuildingSource {
    async fn count(&self, filter: &CompiledFilter) -> std::result::Result<i64, sqlx::Error> {
        let mut builder = filter.count_query(&self.config);
        let start = Instant::now();
        let total: i64 = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        self.observe(QueryPhase::Count, builder.sql(), start.elapsed());
        Ok(total)
    }

    async fn fetch_page(
        &self,
        filter: &CompiledFilter,
        window: PageWindow,
    ) -> std::result::Result<Vec<BuildingRecord>, sqlx::Error> {
        let mut builder = filter.page_query(&self.config, window);
        let start = Instant::now();
        let rows: Vec<BuildingRow> = builder
            .build_query_as::<BuildingRow>()
            .fetch_all(&self.pool)
            .await?;
        self.observe(QueryPhase::Data, builder.sql(), start.elapsed());
        Ok(rows.into_iter().map(BuildingRecord::from).collect())
    }
}

/// Paginated building queries: one count, one page, metadata from the count.
#[derive(Clone, Debug)]
pub struct Buildings<S = PgBuildingSource> {
    source: S,
}

impl<S> Buildings<S>
where
    S: BuildingSource,
{
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Runs `request` against the source.
    ///
    /// Validation happens before either query. The count and the page are read
    /// independently, so under concurrent writes they may reflect slightly
    /// different moments. An offset past the last match yields an empty page,
    /// not an error. Nothing is retried.
    #[instrument(
        name = "buildings.execute",
        skip_all,
        fields(
            correlation_id = %ctx.correlation_id,
            caller = ctx.caller_label(),
            filter = %request.shape(),
            limit = tracing::field::Empty,
            offset = tracing::field::Empty,
        )
    )]
    pub async fn execute(&self, ctx: &RequestContext, request: &FilterRequest) -> Result<ResultPage> {
        metrics::record_request();
        let CompiledRequest { filter, window } = match compile(request) {
            Ok(compiled) => compiled,
            Err(err) => {
                metrics::record_validation_error();
                tracing::warn!(error = %err.redacted(), "rejected building query");
                return Err(err.into());
            }
        };
        let span = Span::current();
        span.record("limit", window.limit());
        span.record("offset", window.offset());

        let start = Instant::now();
        let total = self
            .source
            .count(&filter)
            .await
            .map_err(|source| failed(QueryPhase::Count, source))?;
        let elapsed = start.elapsed();
        metrics::record_phase_duration(QueryPhase::Count, elapsed);
        tracing::debug!(total, elapsed_ms = elapsed.as_millis() as u64, "count query finished");

        let start = Instant::now();
        let mut records = self
            .source
            .fetch_page(&filter, window)
            .await
            .map_err(|source| failed(QueryPhase::Data, source))?;
        let elapsed = start.elapsed();
        metrics::record_phase_duration(QueryPhase::Data, elapsed);
        records.truncate(usize::try_from(window.limit()).unwrap_or(usize::MAX));

        let meta = PaginationMeta::new(total, window);
        metrics::record_page(records.len());
        tracing::debug!(
            returned = records.len(),
            expected = window.expected_len(total),
            total = meta.total,
            has_next = meta.has_next,
            has_previous = meta.has_previous,
            elapsed_ms = elapsed.as_millis() as u64,
            "page query finished"
        );

        Ok(ResultPage { records, meta })
    }
}

fn failed(phase: QueryPhase, source: sqlx::Error) -> Error {
    metrics::record_query_error(phase);
    tracing::warn!(phase = %phase, error = %source, "building query failed");
    Error::Query { phase, source }
}
