use std::fmt::Write as _;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub struct Metrics {
    // Definitions
    pub finders_defined_total: AtomicU64,

    // Calls
    pub finder_calls_total: AtomicU64,
    pub finder_failures_total: AtomicU64,
    pub finder_rows_total: AtomicU64,
    pub finder_query_micros_total: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            finders_defined_total: AtomicU64::new(0),
            finder_calls_total: AtomicU64::new(0),
            finder_failures_total: AtomicU64::new(0),
            finder_rows_total: AtomicU64::new(0),
            finder_query_micros_total: AtomicU64::new(0),
        }
    }
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::default)
}

pub(crate) fn record_finder_defined() {
    metrics().finders_defined_total.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_finder_call(rows: usize, elapsed: Duration) {
    let m = metrics();
    m.finder_calls_total.fetch_add(1, Ordering::Relaxed);
    m.finder_rows_total.fetch_add(rows as u64, Ordering::Relaxed);
    m.finder_query_micros_total
        .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
}

pub(crate) fn record_finder_failure() {
    metrics().finder_failures_total.fetch_add(1, Ordering::Relaxed);
}

pub fn render_prometheus() -> String {
    let m = metrics();
    let mut s = String::new();
    let _ = writeln!(
        s,
        "# TYPE finders_defined_total counter\nfinders_defined_total {}",
        m.finders_defined_total.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        s,
        "# TYPE finder_calls_total counter\nfinder_calls_total {}",
        m.finder_calls_total.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        s,
        "# TYPE finder_failures_total counter\nfinder_failures_total {}",
        m.finder_failures_total.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        s,
        "# TYPE finder_rows_total counter\nfinder_rows_total {}",
        m.finder_rows_total.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        s,
        "# TYPE finder_query_seconds_total counter\nfinder_query_seconds_total {:.6}",
        m.finder_query_micros_total.load(Ordering::Relaxed) as f64 / 1_000_000.0
    );
    s
}
