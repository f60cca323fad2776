//! Converge Error Hierarchy
//!
//! The engine performs no I/O of its own, so the taxonomy stays small. See
//! [`Error`] for the variants.

use std::sync::Arc;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `submit` was called after the engine was stopped, or the engine
    /// stopped before the caller's round could be drained.
    #[error("Converge engine has been stopped")]
    Cancelled,

    /// The batch resolution call failed for the caller's round.
    /// Every caller in that round observes the same error.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Engine configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure reported by a [`BatchResolver`](crate::BatchResolver) for one round.
///
/// Cloning is cheap: every clone points at the same underlying error, which is
/// how one failure is broadcast to all callers of a round.
///
/// The underlying error is part of the message and is not reported again as
/// `source()`; use [`inner`](Self::inner) to reach it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Batch resolution failed: {inner}")]
pub struct ResolutionError {
    inner: Arc<dyn std::error::Error + Send + Sync>,
}

impl ResolutionError {
    pub fn new<E>(error: E) -> Self
    where E: std::error::Error + Send + Sync + 'static {
        Self {
            inner: Arc::new(error),
        }
    }

    /// Builds an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Returns true if both values were cloned from the same failure.
    pub fn ptr_eq(
        &self,
        other: &ResolutionError,
    ) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.inner.as_ref()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Message(String);

impl Error {
    /// Returns the round failure, if this error carries one.
    pub fn as_resolution(&self) -> Option<&ResolutionError> {
        match self {
            Error::Resolution(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
