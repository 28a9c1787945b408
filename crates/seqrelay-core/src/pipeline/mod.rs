//! Stage worker pools and the relay that chains them.
//!
//! - [`traits`]: the [`Stage`] and [`StageOutput`] contracts.
//! - [`pool`]: bounded-concurrency [`StageWorkerPool`].
//! - [`relay`]: the [`Relay`] facade (ingress, stats, shutdown).

pub mod pool;
pub mod relay;
pub mod traits;

pub use pool::{PoolStats, StageWorkerPool};
pub use relay::{PoolProbe, Relay, RelayStats};
pub use traits::{Stage, StageOutput};
