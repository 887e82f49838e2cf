use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Once;

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Alarm metrics
    pub static ref ALARM_COMPUTATIONS_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("alarm_computations_total", "Total number of next-alarm computations")
    ).unwrap();

    pub static ref ALARMS_FIRED_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("alarms_fired_total", "Total number of alarms that reached their deadline")
    ).unwrap();

    pub static ref CLOCK_SKEW_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("clock_skew_total", "Computations where a start time was ahead of the clock")
    ).unwrap();

    pub static ref ACTIVE_SESSIONS: IntGauge = IntGauge::with_opts(
        Opts::new("active_sessions", "Number of tracked sessions")
    ).unwrap();

    pub static ref NEXT_ALARM_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("next_alarm_seconds", "Delay until the next alarm in seconds")
            .buckets(vec![0.0, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 3600.0])
    ).unwrap();
}

static REGISTER: Once = Once::new();

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY.register(Box::new(ALARM_COMPUTATIONS_TOTAL.clone())).unwrap();
        REGISTRY.register(Box::new(ALARMS_FIRED_TOTAL.clone())).unwrap();
        REGISTRY.register(Box::new(CLOCK_SKEW_TOTAL.clone())).unwrap();
        REGISTRY.register(Box::new(ACTIVE_SESSIONS.clone())).unwrap();
        REGISTRY.register(Box::new(NEXT_ALARM_SECONDS.clone())).unwrap();
    });
}

/// Gather metrics in Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
