use std::time::Duration;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use footprint::{
    Error, FilterRequest, QueryConfig, QueryPhase, RequestContext, Store,
    testing::{NewBuilding, create_buildings_table, insert_building},
};
use serde_json::json;
use sqlx::PgPool;
use testcontainers::{
    ContainerAsync, GenericImage, ImageExt,
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
};

const OSLO_CENTRE: &str = "POLYGON((10.70 59.90, 10.80 59.90, 10.80 59.95, 10.70 59.95, 10.70 59.90))";

async fn postgis() -> Result<(ContainerAsync<GenericImage>, PgPool, String)> {
    let image = GenericImage::new("postgis/postgis", "16-3.4-alpine")
        .with_exposed_port(5432.tcp())
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_USER", "postgres")
        .with_env_var("POSTGRES_PASSWORD", "postgres");

    let container = image.start().await?;
    let host = container.get_host().await?;
    let port = container.get_host_port_ipv4(5432).await?;
    let url = format!("postgres://postgres:postgres@{host}:{port}/postgres?sslmode=disable");

    // the image restarts once after running its init scripts
    let mut attempt = 0;
    let pool = loop {
        match PgPool::connect(&url).await {
            Ok(pool) => match sqlx::query("select postgis_version()").execute(&pool).await {
                Ok(_) => break pool,
                Err(err) if attempt >= 20 => return Err(err.into()),
                Err(_) => {}
            },
            Err(err) if attempt >= 20 => return Err(err.into()),
            Err(_) => {}
        }
        attempt += 1;
        tokio::time::sleep(Duration::from_millis(500)).await;
    };
    Ok((container, pool, url))
}

async fn seeded_store(pool: PgPool, rows: &[NewBuilding]) -> Result<Store> {
    let config = QueryConfig::default();
    create_buildings_table(&pool, &config).await?;
    for row in rows {
        insert_building(&pool, &config, row).await?;
    }
    Ok(Store::from_pool(pool, config))
}

fn at_minute(b: NewBuilding, minute: i64) -> NewBuilding {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
    b.created_at(start + chrono::Duration::minutes(minute))
}

#[tokio::test]
async fn filters_polygon_and_pagination_end_to_end() -> Result<()> {
    let (_container, pool, url) = postgis().await?;

    let rows = vec![
        at_minute(
            NewBuilding::new("207/52", "0301", "residential", "Thorvald Meyers gate 10")
                .name("Birkelunden Gård")
                .at(10.76, 59.92)
                .attributes(json!({ "floors": 5 })),
            1,
        ),
        at_minute(
            NewBuilding::new("207/53", "0301", "residential", "Thorvald Meyers gate 12")
                .at(10.90, 59.92),
            2,
        ),
        at_minute(
            NewBuilding::new("208/1", "0301", "commercial", "Markveien 1").at(10.75, 59.92),
            3,
        ),
        at_minute(
            NewBuilding::new("209/9", "0301", "residential", "Sannergata 2")
                .at(10.757, 59.928)
                .hidden(),
            4,
        ),
        at_minute(NewBuilding::new("1/1", "4601", "residential", "Bryggen 1"), 5),
    ];
    let store = seeded_store(pool, &rows).await?;
    let buildings = store.buildings();
    let ctx = RequestContext::builder().caller("integration").build();

    let page = buildings
        .execute(
            &ctx,
            &FilterRequest::new()
                .building_type("residential")
                .polygon(OSLO_CENTRE),
        )
        .await?;
    assert_eq!(page.meta.total, 1);
    let record = &page.records[0];
    assert_eq!(record.cadastral_code, "207/52");
    assert_eq!(record.name.as_deref(), Some("Birkelunden Gård"));
    assert_eq!(record.attributes, json!({ "floors": 5 }));
    let geometry = record.geometry.as_ref().expect("point geometry");
    assert_eq!(geometry.kind, "Point");
    assert_eq!(geometry.lon(), Some(10.76));
    assert_eq!(geometry.lat(), Some(59.92));

    let page = buildings
        .execute(&ctx, &FilterRequest::new().address("THORVALD meyers"))
        .await?;
    let codes: Vec<&str> = page.records.iter().map(|r| r.cadastral_code.as_str()).collect();
    assert_eq!(codes, vec!["207/53", "207/52"]);

    let page = buildings
        .execute(&ctx, &FilterRequest::new().municipality_code("4601"))
        .await?;
    assert_eq!(page.meta.total, 1);
    assert!(page.records[0].geometry.is_none());

    let page = buildings
        .execute(&ctx, &FilterRequest::new().name("%"))
        .await?;
    assert_eq!(page.meta.total, 0, "percent sign is matched literally");

    let page = buildings.execute(&ctx, &FilterRequest::new()).await?;
    assert_eq!(page.meta.total, 4, "hidden building excluded");

    // default configuration targets the same public.buildings table
    let direct = Store::connect(&url).await?;
    let again = direct.buildings().execute(&ctx, &FilterRequest::new()).await?;
    assert_eq!(again.meta, page.meta);
    Ok(())
}

#[tokio::test]
async fn pages_through_a_larger_table() -> Result<()> {
    let (_container, pool, url) = postgis().await?;
    let rows: Vec<NewBuilding> = (0..25)
        .map(|i| {
            at_minute(
                NewBuilding::new(format!("300/{i}"), "0301", "residential", format!("Ringveien {i}")),
                i,
            )
        })
        .collect();
    seeded_store(pool, &rows).await?;
    let store = Store::builder(url)
        .max_connections(2)
        .connect_timeout(Duration::from_secs(5))
        .statement_cache_capacity(16)
        .build()
        .await?;
    let health = store.pool_health().await?;
    assert!(health.ok);
    assert!(health.size <= 2);
    let buildings = store.buildings();
    let ctx = RequestContext::new();

    let first = buildings.execute(&ctx, &FilterRequest::new()).await?;
    assert_eq!(first.records.len(), 20);
    assert_eq!(first.meta.total, 25);
    assert!(first.meta.has_next);
    assert!(!first.meta.has_previous);
    assert_eq!(first.records[0].cadastral_code, "300/24");

    let second = buildings
        .execute(&ctx, &FilterRequest::new().offset(20))
        .await?;
    assert_eq!(second.records.len(), 5);
    assert!(!second.meta.has_next);
    assert!(second.meta.has_previous);
    assert_eq!(second.records[4].cadastral_code, "300/0");

    let beyond = buildings
        .execute(&ctx, &FilterRequest::new().offset(100))
        .await?;
    assert!(beyond.is_empty());
    assert_eq!(beyond.meta.total, 25);
    assert!(!beyond.meta.has_next);
    assert!(beyond.meta.has_previous);
    Ok(())
}

#[tokio::test]
async fn missing_table_fails_in_count_phase() -> Result<()> {
    let (_container, pool, _url) = postgis().await?;
    let store = Store::from_pool(pool, QueryConfig::new().table("no_such_buildings"));

    let err = store
        .buildings()
        .execute(&RequestContext::new(), &FilterRequest::new())
        .await
        .expect_err("query against a missing table");
    assert!(matches!(err, Error::Query { phase: QueryPhase::Count, .. }));

    let health = store.pool_health().await?;
    assert!(health.ok);
    assert!(health.postgis_version.is_some());
    Ok(())
}
