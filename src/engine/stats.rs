use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use prometheus::Histogram;
use prometheus::IntCounter;

use crate::metrics::DEDUPLICATED_KEYS_TOTAL;
use crate::metrics::RESOLUTION_ERRORS_TOTAL;
use crate::metrics::ROUNDS_TOTAL;
use crate::metrics::ROUND_SIZE;
use crate::metrics::SUBMITS_TOTAL;

/// Point-in-time counters of one engine instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvergeStats {
    /// Requests accepted by `submit`.
    pub submits: u64,
    /// Rounds that invoked the resolver.
    pub rounds: u64,
    /// Unique keys handed to the resolver, summed over rounds.
    pub resolved_keys: u64,
    /// Key lookups avoided by deduplication, summed over rounds.
    pub deduplicated_keys: u64,
    /// Rounds whose resolution call failed.
    pub resolution_errors: u64,
}

impl ConvergeStats {
    /// Share of requested keys that never reached the resolver.
    pub fn coalescing_ratio(&self) -> f64 {
        let requested = self.resolved_keys + self.deduplicated_keys;
        if requested == 0 {
            0.0
        } else {
            self.deduplicated_keys as f64 / requested as f64
        }
    }
}

/// Per-instance counters, mirrored into the process-wide Prometheus
/// collectors under the engine's name.
pub(crate) struct StatsRecorder {
    submits: AtomicU64,
    rounds: AtomicU64,
    resolved_keys: AtomicU64,
    deduplicated_keys: AtomicU64,
    resolution_errors: AtomicU64,

    submits_metric: IntCounter,
    rounds_metric: IntCounter,
    deduplicated_metric: IntCounter,
    errors_metric: IntCounter,
    round_size_metric: Histogram,
}

impl StatsRecorder {
    pub(crate) fn new(engine: &str) -> Self {
        Self {
            submits: AtomicU64::new(0),
            rounds: AtomicU64::new(0),
            resolved_keys: AtomicU64::new(0),
            deduplicated_keys: AtomicU64::new(0),
            resolution_errors: AtomicU64::new(0),
            submits_metric: SUBMITS_TOTAL.with_label_values(&[engine]),
            rounds_metric: ROUNDS_TOTAL.with_label_values(&[engine]),
            deduplicated_metric: DEDUPLICATED_KEYS_TOTAL.with_label_values(&[engine]),
            errors_metric: RESOLUTION_ERRORS_TOTAL.with_label_values(&[engine]),
            round_size_metric: ROUND_SIZE.with_label_values(&[engine]),
        }
    }

    pub(crate) fn on_submit(&self) {
        self.submits.fetch_add(1, Ordering::Relaxed);
        self.submits_metric.inc();
    }

    pub(crate) fn on_round(
        &self,
        requests: usize,
        unique_keys: usize,
        saved_keys: usize,
    ) {
        self.rounds.fetch_add(1, Ordering::Relaxed);
        self.resolved_keys.fetch_add(unique_keys as u64, Ordering::Relaxed);
        self.deduplicated_keys.fetch_add(saved_keys as u64, Ordering::Relaxed);

        self.rounds_metric.inc();
        self.deduplicated_metric.inc_by(saved_keys as u64);
        self.round_size_metric.observe(requests as f64);
    }

    pub(crate) fn on_resolution_error(&self) {
        self.resolution_errors.fetch_add(1, Ordering::Relaxed);
        self.errors_metric.inc();
    }

    pub(crate) fn snapshot(&self) -> ConvergeStats {
        ConvergeStats {
            submits: self.submits.load(Ordering::Relaxed),
            rounds: self.rounds.load(Ordering::Relaxed),
            resolved_keys: self.resolved_keys.load(Ordering::Relaxed),
            deduplicated_keys: self.deduplicated_keys.load(Ordering::Relaxed),
            resolution_errors: self.resolution_errors.load(Ordering::Relaxed),
        }
    }
}
