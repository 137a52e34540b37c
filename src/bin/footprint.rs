use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use footprint::{
    FilterRequest, Polygon, QueryConfig, RequestContext, Store, WithContext, tracing::LogFormat,
};

#[derive(Parser, Debug)]
#[command(name = "footprint", version, about = "Query buildings stored in PostGIS")]
struct Cli {
    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Schema holding the buildings table
    #[arg(long, env = "FOOTPRINT_SCHEMA", default_value = "public")]
    schema: String,

    /// Buildings table name
    #[arg(long, env = "FOOTPRINT_TABLE", default_value = "buildings")]
    table: String,

    /// Queries slower than this many milliseconds are logged as slow
    #[arg(long, default_value_t = 500)]
    slow_query_ms: u64,

    /// Upper bound on pooled connections
    #[arg(long, env = "FOOTPRINT_MAX_CONNECTIONS")]
    max_connections: Option<u32>,

    /// How long a query waits for a free pooled connection
    #[arg(long)]
    connect_timeout_ms: Option<u64>,

    /// Prepared statements cached per connection
    #[arg(long)]
    statement_cache_capacity: Option<usize>,

    /// Log output format: text or json
    #[arg(long, env = "FOOTPRINT_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch one page of buildings and print it as JSON
    Query(QueryArgs),

    /// Check polygon geometry text without touching the database
    ValidatePolygon {
        /// e.g. "POLYGON((10.7 59.9, 10.8 59.9, 10.8 60.0, 10.7 59.9))"
        wkt: String,
    },

    /// Ping the database and report pool status
    Health,
}

#[derive(Args, Debug)]
struct QueryArgs {
    #[arg(long)]
    cadastral_code: Option<String>,
    #[arg(long)]
    municipality_code: Option<String>,
    #[arg(long)]
    building_type: Option<String>,
    /// Case-insensitive substring of the building name
    #[arg(long)]
    name: Option<String>,
    /// Case-insensitive substring of the address
    #[arg(long)]
    address: Option<String>,
    /// Polygon geometry text in WGS84 longitude/latitude
    #[arg(long)]
    polygon: Option<String>,
    #[arg(long)]
    limit: Option<i64>,
    #[arg(long)]
    offset: Option<i64>,
}

impl From<QueryArgs> for FilterRequest {
    fn from(args: QueryArgs) -> Self {
        FilterRequest {
            cadastral_code: args.cadastral_code,
            municipality_code: args.municipality_code,
            building_type: args.building_type,
            name: args.name,
            address: args.address,
            polygon: args.polygon,
            limit: args.limit,
            offset: args.offset,
        }
    }
}

#[tokio::main]
async fn main() -> footprint::Result<()> {
    let cli = Cli::parse();
    footprint::tracing::init(cli.log_format);

    if let Commands::ValidatePolygon { wkt } = &cli.command {
        match Polygon::parse(wkt) {
            Ok(polygon) => {
                println!("{polygon}");
                return Ok(());
            }
            Err(err) => {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
    }

    let Some(url) = cli.database_url else {
        eprintln!("error: --database-url or env DATABASE_URL is required");
        std::process::exit(2);
    };

    let config = QueryConfig::new()
        .schema(cli.schema)
        .table(cli.table)
        .slow_query_threshold(Duration::from_millis(cli.slow_query_ms));
    let mut builder = Store::builder(url).query_config(config);
    if let Some(max) = cli.max_connections {
        builder = builder.max_connections(max);
    }
    if let Some(ms) = cli.connect_timeout_ms {
        builder = builder.connect_timeout(Duration::from_millis(ms));
    }
    if let Some(capacity) = cli.statement_cache_capacity {
        builder = builder.statement_cache_capacity(capacity);
    }
    let store = builder.build().await.context("connecting to database")?;

    match cli.command {
        Commands::Query(args) => {
            let ctx = RequestContext::builder().caller("cli").build();
            let request = FilterRequest::from(args);
            let page = store.buildings().execute(&ctx, &request).await?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        Commands::Health => {
            let health = store.pool_health().await?;
            println!(
                "ok={} postgis={} pool_size={} idle={}",
                health.ok,
                health.postgis_version.as_deref().unwrap_or("missing"),
                health.size,
                health.idle
            );
        }
        Commands::ValidatePolygon { .. } => {}
    }

    Ok(())
}
