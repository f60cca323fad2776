//! Request-coalescing batch engine.
//!
//! Concurrent callers [`submit`](Converge::submit) key sets. Keys are
//! deduplicated across every request queued since the previous round, a
//! single [`BatchResolver`] call resolves them, and each caller gets back its
//! own keys tagged with whether another caller of the round asked for them too.
//!
//! ```ignore
//! let engine = Converge::new(
//!     |ids: Vec<u64>| async move { store.get_many(&ids).await },
//!     ConvergeConfig::new()?.validate()?,
//! )?;
//! let users = engine.submit(vec![1, 2, 3]).await?;
//! ```

mod config;
mod engine;
mod errors;
pub mod metrics;
mod sync;
pub(crate) mod utils;

pub use config::*;
pub use engine::*;
pub use errors::*;
pub use sync::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
