//! Checkpoint Session Error Types
//!
//! Per SYNC_STATE_MACHINE.md §7:
//! - Codec failures degrade to retransmission or resync, never crash
//! - Transport failures tear the session down to Disconnected
//! - Only invariant violations (sequence moved backward, illegal
//!   transition driven by our own logic) are unrecoverable

use thiserror::Error;

use super::state::SyncState;
use crate::codec::CodecError;
use crate::transport::TransportError;

/// Errors from driving a checkpoint session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Encode/decode failure on a frame or record.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The underlying channel failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A state transition outside the legality matrix was requested.
    #[error("illegal sync state transition: {from:?} -> {to:?}")]
    IllegalTransition { from: SyncState, to: SyncState },

    /// A message arrived that the current state cannot accept. The
    /// message is dropped and logged; the session stays up.
    #[error("unexpected {message} in state {state:?}")]
    UnexpectedMessage {
        state: SyncState,
        message: &'static str,
    },

    /// An internal ordering invariant broke. Unrecoverable: the daemon
    /// should restart rather than continue with suspect state.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

impl SessionError {
    /// Whether this error warrants a process restart.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::InternalInvariant(_))
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
