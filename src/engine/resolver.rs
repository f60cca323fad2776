use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::ResolutionError;

/// The expensive batch lookup a converge engine coalesces calls into.
///
/// `keys` is the deduplicated key set of one round, in first-seen order.
/// Keys absent from the returned map are reported to callers as not found;
/// that is not an error.
///
/// Implementations are called concurrently from different drain workers.
/// They must never call back into the engine that invokes them: a re-entrant
/// `submit` waits on a round that cannot start and may deadlock the worker.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BatchResolver<K: Send + Sync + 'static, V: Send + Sync + 'static>: Send + Sync {
    async fn resolve(
        &self,
        keys: Vec<K>,
    ) -> Result<HashMap<K, V>, ResolutionError>;
}

#[async_trait]
impl<K, V, F, Fut> BatchResolver<K, V> for F
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HashMap<K, V>, ResolutionError>> + Send + 'static,
{
    async fn resolve(
        &self,
        keys: Vec<K>,
    ) -> Result<HashMap<K, V>, ResolutionError> {
        (self)(keys).await
    }
}
