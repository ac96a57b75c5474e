use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Histogram, IntCounter, IntGauge, IntGaugeVec, register_counter_vec,
    register_histogram, register_int_counter, register_int_gauge, register_int_gauge_vec,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: CounterVec = register_counter_vec!(
        "captcha_requests_total",
        "Total number of requests by endpoint",
        &["endpoint"]
    )
    .unwrap();
    pub static ref CACHE_HITS: CounterVec = register_counter_vec!(
        "captcha_cache_hits_total",
        "Total cache hits",
        &["partition"]
    )
    .unwrap();
    pub static ref CACHE_MISSES: CounterVec = register_counter_vec!(
        "captcha_cache_misses_total",
        "Total cache misses",
        &["partition"]
    )
    .unwrap();
    pub static ref CACHE_SIZE: IntGaugeVec = register_int_gauge_vec!(
        "captcha_cache_size",
        "Current number of items in cache",
        &["partition"]
    )
    .unwrap();
    pub static ref CLASSIFIER_IN_FLIGHT: IntGauge = register_int_gauge!(
        "captcha_classifier_in_flight",
        "Classifier calls currently executing"
    )
    .unwrap();
    pub static ref CLASSIFIER_ERRORS: IntCounter = register_int_counter!(
        "captcha_classifier_errors_total",
        "Failed classifier calls"
    )
    .unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "captcha_request_latency_seconds",
        "Request latency in seconds"
    )
    .unwrap();
}
