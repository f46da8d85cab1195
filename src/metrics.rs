use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    Histogram, HistogramVec, IntCounterVec, IntGauge,
};

lazy_static::lazy_static! {
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ant_http_requests_total", "Total HTTP requests", &["method", "path", "status"]
    ).unwrap();
    pub static ref AOF_APPENDS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ant_aof_appends_total", "AOF records appended", &["target"]
    ).unwrap();
    pub static ref REPLAYED_RECORDS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ant_replayed_records_total", "AOF records replayed", &["target"]
    ).unwrap();
    pub static ref SEARCH_DURATION: HistogramVec = register_histogram_vec!(
        "ant_search_duration_seconds", "Search duration", &["instance"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    ).unwrap();
    pub static ref BACKUPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ant_backups_total", "Backups", &["status"]
    ).unwrap();
    pub static ref SNAPSHOT_DURATION: Histogram = register_histogram!(
        "ant_snapshot_duration_seconds", "Snapshot write duration",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();
    pub static ref ACTIVE_SEARCHES: IntGauge = register_int_gauge!(
        "ant_active_searches", "Number of in-flight searches"
    ).unwrap();
}

/// RAII guard that decrements an IntGauge on drop.
pub struct GaugeGuard<'a>(pub &'a IntGauge);

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.0.dec();
    }
}

pub fn init() {
    lazy_static::initialize(&HTTP_REQUESTS_TOTAL);
    lazy_static::initialize(&AOF_APPENDS_TOTAL);
    lazy_static::initialize(&REPLAYED_RECORDS_TOTAL);
    lazy_static::initialize(&SEARCH_DURATION);
    lazy_static::initialize(&BACKUPS_TOTAL);
    lazy_static::initialize(&SNAPSHOT_DURATION);
    lazy_static::initialize(&ACTIVE_SEARCHES);
}
