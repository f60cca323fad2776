
use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use tracing::warn;

lazy_static! {
    pub static ref SUBMITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("converge_submits_total", "Requests accepted by submit"),
        &["engine"]
    )
    .expect("metric can not be created");

    pub static ref ROUNDS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("converge_rounds_total", "Coalescing rounds that invoked the resolver"),
        &["engine"]
    )
    .expect("metric can not be created");

    pub static ref RESOLUTION_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("converge_resolution_errors_total", "Rounds whose resolution call failed"),
        &["engine"]
    )
    .expect("metric can not be created");

    pub static ref DEDUPLICATED_KEYS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "converge_deduplicated_keys_total",
            "Key lookups saved by deduplicating across callers"
        ),
        &["engine"]
    )
    .expect("metric can not be created");

    pub static ref ROUND_SIZE: HistogramVec = HistogramVec::new(
        HistogramOpts::new("converge_round_size", "Number of requests drained per round")
            .buckets(exponential_buckets(1.0, 2.0, 12).expect("valid buckets")),
        &["engine"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        if let Err(e) = register_custom_metrics(&registry) {
            warn!("could not register converge metrics: {}", e);
        }
        registry
    };
}

/// Registers every converge collector into `registry`.
///
/// Fails with `AlreadyReg` if `registry` already holds them.
pub fn register_custom_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(SUBMITS_TOTAL.clone()))?;
    registry.register(Box::new(ROUNDS_TOTAL.clone()))?;
    registry.register(Box::new(RESOLUTION_ERRORS_TOTAL.clone()))?;
    registry.register(Box::new(DEDUPLICATED_KEYS_TOTAL.clone()))?;
    registry.register(Box::new(ROUND_SIZE.clone()))?;
    Ok(())
}

/// Renders every converge metric in the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!("could not encode converge metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        warn!("converge metrics could not be from_utf8'd: {}", e);
        String::default()
    })
}
