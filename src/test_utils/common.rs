use std::future::Future;
use std::time::Duration;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    env_logger::init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

/// Polls `condition` until it holds, panicking after `timeout`.
pub async fn wait_until<F, Fut>(
    timeout: Duration,
    mut condition: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let wait = async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    };
    if tokio::time::timeout(timeout, wait).await.is_err() {
        panic!("condition not reached within {:?}", timeout);
    }
}

pub fn doubled(keys: &[u64]) -> std::collections::HashMap<u64, u64> {
    keys.iter().map(|k| (*k, k * 2)).collect()
}
