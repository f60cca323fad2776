//! Coalescing engine: pending queue, dispatch signal and the pool of drain
//! workers that turn many concurrent submits into one resolver call per round.

mod converge;
mod resolver;
mod round;
mod stats;

pub use converge::*;
pub use resolver::*;
pub use round::*;
pub use stats::*;
