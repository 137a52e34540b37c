use std::fmt::Write as _;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::QueryPhase;

pub struct Metrics {
    // Requests
    pub queries_total: AtomicU64,
    pub validation_errors_total: AtomicU64,

    // Store failures by phase
    pub count_errors_total: AtomicU64,
    pub data_errors_total: AtomicU64,

    // Results
    pub rows_returned_total: AtomicU64,
    pub empty_pages_total: AtomicU64,

    // Cumulative phase latency
    pub count_query_micros_total: AtomicU64,
    pub data_query_micros_total: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            queries_total: AtomicU64::new(0),
            validation_errors_total: AtomicU64::new(0),
            count_errors_total: AtomicU64::new(0),
            data_errors_total: AtomicU64::new(0),
            rows_returned_total: AtomicU64::new(0),
            empty_pages_total: AtomicU64::new(0),
            count_query_micros_total: AtomicU64::new(0),
            data_query_micros_total: AtomicU64::new(0),
        }
    }
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::default)
}

pub fn record_request() {
    metrics().queries_total.fetch_add(1, Ordering::Relaxed);
}

pub fn record_validation_error() {
    metrics()
        .validation_errors_total
        .fetch_add(1, Ordering::Relaxed);
}

pub fn record_query_error(phase: QueryPhase) {
    let m = metrics();
    let counter = match phase {
        QueryPhase::Count => &m.count_errors_total,
        QueryPhase::Data => &m.data_errors_total,
    };
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn record_phase_duration(phase: QueryPhase, elapsed: Duration) {
    let m = metrics();
    let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
    let counter = match phase {
        QueryPhase::Count => &m.count_query_micros_total,
        QueryPhase::Data => &m.data_query_micros_total,
    };
    counter.fetch_add(micros, Ordering::Relaxed);
}

pub fn record_page(returned: usize) {
    let m = metrics();
    m.rows_returned_total
        .fetch_add(returned as u64, Ordering::Relaxed);
    if returned == 0 {
        m.empty_pages_total.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn render_prometheus() -> String {
    let m = metrics();
    let mut s = String::new();
    // requests
    let _ = writeln!(
        s,
        "# TYPE building_queries_total counter\nbuilding_queries_total {}",
        m.queries_total.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        s,
        "# TYPE building_validation_errors_total counter\nbuilding_validation_errors_total {}",
        m.validation_errors_total.load(Ordering::Relaxed)
    );
    // store failures
    let _ = writeln!(
        s,
        "# TYPE building_query_errors_total counter\nbuilding_query_errors_total{{phase=\"count\"}} {}\nbuilding_query_errors_total{{phase=\"data\"}} {}",
        m.count_errors_total.load(Ordering::Relaxed),
        m.data_errors_total.load(Ordering::Relaxed)
    );
    // results
    let _ = writeln!(
        s,
        "# TYPE building_rows_returned_total counter\nbuilding_rows_returned_total {}",
        m.rows_returned_total.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        s,
        "# TYPE building_empty_pages_total counter\nbuilding_empty_pages_total {}",
        m.empty_pages_total.load(Ordering::Relaxed)
    );
    // latency
    let _ = writeln!(
        s,
        "# TYPE building_query_micros_total counter\nbuilding_query_micros_total{{phase=\"count\"}} {}\nbuilding_query_micros_total{{phase=\"data\"}} {}",
        m.count_query_micros_total.load(Ordering::Relaxed),
        m.data_query_micros_total.load(Ordering::Relaxed)
    );
    s
}
