//! Checkpoint Session Subsystem
//!
//! The sync protocol between the active and standby replicas:
//! - [`SyncState`]: legality matrix for channel state transitions
//! - [`CheckpointMessage`]: versioned wire frames
//! - [`ActiveSession`]: snapshot streaming, digest answers, gap replay
//! - [`StandbySession`]: snapshot adoption, ordered update application

mod active;
mod errors;
mod message;
mod standby;
mod state;

pub use active::ActiveSession;
pub use errors::{SessionError, SessionResult};
pub use message::CheckpointMessage;
pub use standby::{StandbyOutcome, StandbySession};
pub use state::SyncState;
