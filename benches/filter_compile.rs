use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use footprint::{FilterRequest, Polygon, QueryConfig, filter::compile};

fn circle_wkt(vertices: usize) -> String {
    let mut pairs: Vec<String> = (0..vertices)
        .map(|i| {
            let angle = i as f64 / vertices as f64 * std::f64::consts::TAU;
            format!("{:.6} {:.6}", 10.75 + 0.05 * angle.cos(), 59.92 + 0.03 * angle.sin())
        })
        .collect();
    pairs.push(pairs[0].clone());
    format!("POLYGON(({}))", pairs.join(", "))
}

fn bench_polygon_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("polygon_parse");
    for vertices in [4usize, 64, 1024] {
        let wkt = circle_wkt(vertices);
        group.throughput(Throughput::Bytes(wkt.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(vertices), &wkt, |b, wkt| {
            b.iter(|| Polygon::parse(wkt).unwrap())
        });
    }
    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let config = QueryConfig::default();
    let request = FilterRequest::new()
        .cadastral_code("207/52")
        .municipality_code("0301")
        .building_type("residential")
        .name("skole")
        .address("gate")
        .polygon(circle_wkt(64))
        .limit(50)
        .offset(100);

    let mut group = c.benchmark_group("filter_compile");
    group.throughput(Throughput::Elements(1));
    group.bench_function("all_filters", |b| b.iter(|| compile(&request).unwrap()));
    group.bench_function("all_filters_with_sql", |b| {
        b.iter(|| {
            let compiled = compile(&request).unwrap();
            let count = compiled.filter.count_query(&config);
            let page = compiled.filter.page_query(&config, compiled.window);
            (count.sql().len(), page.sql().len())
        })
    });
    group.finish();
}

criterion_group!(benches, bench_polygon_parse, bench_compile);
criterion_main!(benches);
