use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use converge::Converge;
use converge::ConvergeConfig;
use futures::future::join_all;

use crate::commons::slow_doubler;
use crate::enable_logger;

const CALLERS: u64 = 2000;
const BACKEND_LATENCY: Duration = Duration::from_millis(100);

// Case: heavy fan-in against a slow backend
//
// ## Setup:
// - 2000 concurrent callers, each asking for 4 overlapping keys
// - 10 workers, 5ms coalescing window, 100ms backend latency
//
// ## Criterias:
// - every caller gets its four doubled values
// - the backend sees far fewer calls than there are callers
// - keys shared by neighbouring callers are flagged as shared
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_heavy_fan_in_collapses_backend_calls() {
    enable_logger();
    let calls = Arc::new(AtomicUsize::new(0));
    let config = ConvergeConfig::with_workers(10, Duration::from_millis(5)).with_name("load_fan_in");
    let engine = Arc::new(Converge::new(slow_doubler(BACKEND_LATENCY, calls.clone()), config).unwrap());

    let total_ms = Arc::new(AtomicU64::new(0));
    let fast_callers = Arc::new(AtomicU64::new(0));

    let handles: Vec<_> = (0..CALLERS)
        .map(|n| {
            let engine = engine.clone();
            let total_ms = total_ms.clone();
            let fast_callers = fast_callers.clone();
            tokio::spawn(async move {
                let begin = Instant::now();
                let keys = vec![n, n + 1, n + 2, n + 3];
                let result = engine.submit(keys.clone()).await.expect("round should succeed");

                let cost = begin.elapsed();
                total_ms.fetch_add(cost.as_millis() as u64, Ordering::Relaxed);
                if cost < BACKEND_LATENCY * 2 {
                    fast_callers.fetch_add(1, Ordering::Relaxed);
                }

                for k in keys {
                    assert_eq!(result[&k].value, Some(k * 2));
                    assert!(result[&k].exists);
                }
                result
            })
        })
        .collect();

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("caller task should succeed"))
        .collect();

    let backend_calls = calls.load(Ordering::SeqCst);
    assert!(
        backend_calls < CALLERS as usize / 4,
        "expected coalescing, got {} backend calls for {} callers",
        backend_calls,
        CALLERS
    );
    assert!(results.iter().any(|r| r.values().any(|e| e.shared)));

    let stats = engine.stats();
    assert_eq!(stats.submits, CALLERS);
    assert_eq!(stats.rounds as usize, backend_calls);
    assert!(stats.deduplicated_keys > 0);

    println!("backend calls: {}", backend_calls);
    println!("< 2x backend latency: {}", fast_callers.load(Ordering::Relaxed));
    println!("average time per request: {}ms", total_ms.load(Ordering::Relaxed) / CALLERS);

    engine.shutdown().await;
}
