//! Codec Error Types
//!
//! Codec failures are never fatal to the daemon: the session drops the
//! offending message, logs it, and asks for retransmission or a full
//! resync (see SYNC_STATE_MACHINE.md §7).

use thiserror::Error;

/// Errors from encoding or decoding replicated records and wire frames.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Byte stream shorter than the fixed header of the tagged version.
    #[error("payload shorter than the fixed header for sub-part version {version}")]
    MalformedPayload { version: u16 },

    /// Tagged version outside the supported [min, max] range, or a kind
    /// that does not exist at the session version.
    #[error("sub-part version {version} outside supported range [{min}, {max}]")]
    UnsupportedVersion { version: u16, min: u16, max: u16 },

    /// Unknown entity kind tag.
    #[error("unknown entity kind tag {0}")]
    UnknownEntityKind(u8),

    /// Unknown update operation tag.
    #[error("unknown update operation tag {0}")]
    UnknownOperation(u8),

    /// Unknown checkpoint message type tag.
    #[error("unknown checkpoint message type tag {0}")]
    UnknownMessageType(u8),

    /// Frame checksum mismatch.
    #[error("frame checksum mismatch: computed {computed:08x}, stored {stored:08x}")]
    ChecksumMismatch { computed: u32, stored: u32 },

    /// A string field was not valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidString,
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
