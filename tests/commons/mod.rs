use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use converge::BatchResolver;
use converge::ResolutionError;

/// Stand-in for a slow backing store: doubles every key after `latency` and
/// counts how often it was hit.
pub fn slow_doubler(
    latency: Duration,
    calls: Arc<AtomicUsize>,
) -> impl BatchResolver<u64, u64> {
    move |keys: Vec<u64>| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(latency).await;
            Ok::<_, ResolutionError>(keys.iter().map(|k| (*k, k * 2)).collect::<HashMap<_, _>>())
        }
    }
}
