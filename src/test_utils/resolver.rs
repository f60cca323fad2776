use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use super::doubled;
use crate::BatchResolver;
use crate::ResolutionError;

/// Doubling resolver that records every call it receives.
///
/// - `gated()`: each call waits for a permit released through `open`
/// - `omitting(keys)`: those keys are left out of every answer
/// - `failing(err)`: every call fails with clones of `err`
/// - `with_delay(d)`: each call sleeps `d` before answering
#[derive(Default)]
pub struct RecordingResolver {
    calls: Mutex<Vec<Vec<u64>>>,
    gate: Option<Semaphore>,
    omit: HashSet<u64>,
    failure: Option<ResolutionError>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingResolver {
    pub fn doubling() -> Self {
        Self::default()
    }

    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn omitting(
        mut self,
        keys: impl IntoIterator<Item = u64>,
    ) -> Self {
        self.omit.extend(keys);
        self
    }

    pub fn failing(
        mut self,
        failure: ResolutionError,
    ) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn with_delay(
        mut self,
        delay: Duration,
    ) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Lets `n` more gated calls through.
    pub fn open(
        &self,
        n: usize,
    ) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn calls(&self) -> Vec<Vec<u64>> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchResolver<u64, u64> for RecordingResolver {
    async fn resolve(
        &self,
        keys: Vec<u64>,
    ) -> Result<HashMap<u64, u64>, ResolutionError> {
        self.calls.lock().push(keys.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }

        let mut resolved = doubled(&keys);
        resolved.retain(|k, _| !self.omit.contains(k));
        Ok(resolved)
    }
}
