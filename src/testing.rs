//! Helpers for tests: PostGIS table setup and an in-memory building source.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indoc::formatdoc;
use serde_json::{Value, json};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    Result,
    buildings::{BuildingRecord, BuildingSource, PointGeometry},
    config::{QueryConfig, quote_ident},
    error::QueryPhase,
    page::PageWindow,
    polygon::SRID,
    query::{CompiledFilter, Predicate, TextColumn},
};

/// Create the PostGIS extension, the buildings table and its spatial index.
pub async fn create_buildings_table(pool: &PgPool, config: &QueryConfig) -> Result<()> {
    let table = config.qualified_table();
    let index = quote_ident(&format!("{}_geom_idx", config.table.trim()));
    let stmts = [
        "create extension if not exists postgis".to_string(),
        format!("create schema if not exists {}", quote_ident(config.schema.trim())),
        formatdoc! {"
            create table if not exists {table} (
                id uuid primary key default gen_random_uuid(),
                cadastral_code text not null,
                municipality_code text not null,
                building_type text not null,
                name text,
                address text not null,
                geom geometry(Point, {SRID}),
                attributes jsonb not null default '{{}}'::jsonb,
                visible boolean not null default true,
                created_at timestamptz not null default now(),
                updated_at timestamptz,
                updated_by text
            )"
        },
        format!("create index if not exists {index} on {table} using gist (geom)"),
    ];
    for stmt in stmts {
        sqlx::query(&stmt).execute(pool).await?;
    }
    Ok(())
}

/// A row to seed, usable for both Postgres and [`MemoryBuildingSource`].
#[derive(Clone, Debug)]
pub struct NewBuilding {
    pub cadastral_code: String,
    pub municipality_code: String,
    pub building_type: String,
    pub name: Option<String>,
    pub address: String,
    pub location: Option<(f64, f64)>,
    pub attributes: Value,
    pub visible: bool,
    pub created_at: DateTime<Utc>,
}

impl NewBuilding {
    pub fn new(
        cadastral_code: impl Into<String>,
        municipality_code: impl Into<String>,
        building_type: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            cadastral_code: cadastral_code.into(),
            municipality_code: municipality_code.into(),
            building_type: building_type.into(),
            name: None,
            address: address.into(),
            location: None,
            attributes: json!({}),
            visible: true,
            created_at: Utc::now(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn at(mut self, lon: f64, lat: f64) -> Self {
        self.location = Some((lon, lat));
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn created_at(mut self, ts: DateTime<Utc>) -> Self {
        self.created_at = ts;
        self
    }

    pub fn attributes(mut self, attributes: Value) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn into_record(self, id: impl Into<String>) -> BuildingRecord {
        BuildingRecord {
            id: id.into(),
            cadastral_code: self.cadastral_code,
            municipality_code: self.municipality_code,
            building_type: self.building_type,
            name: self.name,
            address: self.address,
            geometry: self.location.map(|(lon, lat)| PointGeometry::new(lon, lat)),
            attributes: self.attributes,
            visible: self.visible,
            created_at: self.created_at,
            updated_at: None,
            updated_by: None,
        }
    }
}

pub async fn insert_building(
    pool: &PgPool,
    config: &QueryConfig,
    building: &NewBuilding,
) -> Result<Uuid> {
    let stmt = formatdoc! {"
        insert into {table}
            (cadastral_code, municipality_code, building_type, name, address,
             geom, attributes, visible, created_at)
        values ($1, $2, $3, $4, $5, ST_GeomFromText($6, {SRID}), $7, $8, $9)
        returning id",
        table = config.qualified_table(),
    };
    let point = building
        .location
        .map(|(lon, lat)| format!("POINT({lon} {lat})"));
    let id: Uuid = sqlx::query_scalar(&stmt)
        .bind(&building.cadastral_code)
        .bind(&building.municipality_code)
        .bind(&building.building_type)
        .bind(&building.name)
        .bind(&building.address)
        .bind(point)
        .bind(&building.attributes)
        .bind(building.visible)
        .bind(building.created_at)
        .fetch_one(pool)
        .await?;
    Ok(id)
}

/// In-memory [`BuildingSource`] that evaluates compiled predicates the way the
/// SQL does. Can be told to fail one phase, and counts the calls it receives.
#[derive(Clone, Debug, Default)]
pub struct MemoryBuildingSource {
    records: Vec<BuildingRecord>,
    fail_on: Option<QueryPhase>,
    count_calls: Arc<AtomicUsize>,
    page_calls: Arc<AtomicUsize>,
}

impl MemoryBuildingSource {
    pub fn new(records: Vec<BuildingRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn failing_on(mut self, phase: QueryPhase) -> Self {
        self.fail_on = Some(phase);
        self
    }

    pub fn records(&self) -> &[BuildingRecord] {
        &self.records
    }

    /// `(count calls, page calls)` received so far.
    pub fn calls(&self) -> (usize, usize) {
        (
            self.count_calls.load(Ordering::SeqCst),
            self.page_calls.load(Ordering::SeqCst),
        )
    }

    /// Every record matching `filter`, in page order.
    pub fn matching(&self, filter: &CompiledFilter) -> Vec<&BuildingRecord> {
        let mut matches: Vec<&BuildingRecord> = self
            .records
            .iter()
            .filter(|record| filter.predicates().iter().all(|p| evaluate(p, record)))
            .collect();
        matches.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        matches
    }

    fn check(&self, phase: QueryPhase) -> std::result::Result<(), sqlx::Error> {
        if self.fail_on == Some(phase) {
            Err(sqlx::Error::PoolTimedOut)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BuildingSource for MemoryBuildingSource {
    async fn count(&self, filter: &CompiledFilter) -> std::result::Result<i64, sqlx::Error> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        self.check(QueryPhase::Count)?;
        Ok(self.matching(filter).len() as i64)
    }

    async fn fetch_page(
        &self,
        filter: &CompiledFilter,
        window: PageWindow,
    ) -> std::result::Result<Vec<BuildingRecord>, sqlx::Error> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        self.check(QueryPhase::Data)?;
        let offset = usize::try_from(window.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(window.limit()).unwrap_or(usize::MAX);
        Ok(self
            .matching(filter)
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

fn evaluate(predicate: &Predicate, record: &BuildingRecord) -> bool {
    match predicate {
        Predicate::Visible => record.visible,
        Predicate::Equals { column, value } => column_value(record, *column) == Some(value.as_str()),
        Predicate::ContainsIgnoreCase { column, needle } => column_value(record, *column)
            .map(|text| text.to_lowercase().contains(&needle.to_lowercase()))
            .unwrap_or(false),
        Predicate::Intersects(polygon) => record
            .geometry
            .as_ref()
            .and_then(|point| Some((point.lon()?, point.lat()?)))
            .map(|(lon, lat)| polygon.intersects_point(lon, lat))
            .unwrap_or(false),
    }
}

fn column_value(record: &BuildingRecord, column: TextColumn) -> Option<&str> {
    match column {
        TextColumn::CadastralCode => Some(record.cadastral_code.as_str()),
        TextColumn::MunicipalityCode => Some(record.municipality_code.as_str()),
        TextColumn::BuildingType => Some(record.building_type.as_str()),
        TextColumn::Name => record.name.as_deref(),
        TextColumn::Address => Some(record.address.as_str()),
    }
}
