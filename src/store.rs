use std::str::FromStr;
use std::time::Duration;

use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};

use crate::{
    Result,
    buildings::{Buildings, PgBuildingSource},
    config::QueryConfig,
};

/// Connection pool plus the table configuration every query runs against.
#[derive(Clone, Debug)]
pub struct Store {
    pool: PgPool,
    config: QueryConfig,
}

impl Store {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;
        Ok(Self::from_pool(pool, QueryConfig::default()))
    }

    pub fn builder(url: impl Into<String>) -> StoreBuilder {
        StoreBuilder::new(url)
    }

    pub fn from_pool(pool: PgPool, config: QueryConfig) -> Self {
        Self { pool, config }
    }

    /// Paginated building queries over this store's pool.
    pub fn buildings(&self) -> Buildings<PgBuildingSource> {
        Buildings::new(PgBuildingSource::new(
            self.pool.clone(),
            self.config.clone(),
        ))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Lightweight liveness check for the connection pool.
    pub async fn pool_health(&self) -> Result<PoolHealth> {
        let one: i32 = sqlx::query_scalar("select 1").fetch_one(&self.pool).await?;
        let postgis: Option<String> =
            sqlx::query_scalar("select extversion from pg_extension where extname = 'postgis'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(PoolHealth {
            ok: one == 1,
            postgis_version: postgis,
            size: self.pool.size(),
            idle: self.pool.num_idle(),
        })
    }
}

pub struct StoreBuilder {
    url: String,
    max_connections: Option<u32>,
    connect_timeout: Option<Duration>,
    statement_cache_capacity: Option<usize>,
    config: QueryConfig,
}

impl StoreBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: None,
            connect_timeout: None,
            statement_cache_capacity: None,
            config: QueryConfig::default(),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max.max(1));
        self
    }

    /// How long a query waits for a pooled connection.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Hint for prepared statement cache size. Actual behavior depends on driver.
    pub fn statement_cache_capacity(mut self, size: usize) -> Self {
        self.statement_cache_capacity = Some(size.max(1));
        self
    }

    pub fn query_config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn build(self) -> Result<Store> {
        let mut opts = PgPoolOptions::new();
        if let Some(max) = self.max_connections {
            opts = opts.max_connections(max);
        }
        if let Some(t) = self.connect_timeout {
            opts = opts.acquire_timeout(t);
        }
        let pool = if let Some(cap) = self.statement_cache_capacity {
            let connect_opts = PgConnectOptions::from_str(&self.url)?.statement_cache_capacity(cap);
            opts.connect_with(connect_opts).await?
        } else {
            opts.connect(&self.url).await?
        };
        Ok(Store::from_pool(pool, self.config))
    }
}

#[derive(Clone, Debug)]
pub struct PoolHealth {
    pub ok: bool,
    pub postgis_version: Option<String>,
    pub size: u32,
    pub idle: usize,
}
