//! Async Update Queue Subsystem
//!
//! Buffers encoded change notifications generated on the active replica,
//! in strict generation order, until acknowledged or replayed:
//! - [`AsyncUpdateQueue`]: bounded FIFO of unacknowledged updates
//! - [`AsyncUpdateCounts`]: per-kind counters, the warm-sync digest
//! - [`SavedMessageLog`]: replay quarantine for gap recovery

mod counts;
mod errors;
mod queue;
mod record;
mod saved;

pub use counts::AsyncUpdateCounts;
pub use errors::{QueueError, QueueErrorKind, QueueResult};
pub use queue::AsyncUpdateQueue;
pub use record::{AsyncUpdateRecord, UpdateOperation};
pub use saved::{SavedMessage, SavedMessageLog};
