//! Async Update Records
//!
//! One record per local state mutation on the active replica. Records are
//! owned by the queue until the standby acknowledges them or a cold-sync
//! snapshot subsumes them.

use crate::codec::EntityKind;

/// The mutation an update carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UpdateOperation {
    /// Record created
    Create = 0,
    /// Record modified (full record, not a delta)
    Modify = 1,
    /// Record deleted
    Delete = 2,
}

impl UpdateOperation {
    /// Convert from the wire tag, None for unknown values.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(UpdateOperation::Create),
            1 => Some(UpdateOperation::Modify),
            2 => Some(UpdateOperation::Delete),
            _ => None,
        }
    }

    /// Convert to the wire tag.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// One change notification, codec-encoded, in channel sequence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncUpdateRecord {
    /// Kind of the replicated record the payload decodes to.
    pub kind: EntityKind,
    /// Create, modify or delete.
    pub operation: UpdateOperation,
    /// Codec-encoded record at the session sub-part version.
    pub payload: Vec<u8>,
    /// Channel sequence number. Monotonic, gap-free per role epoch.
    pub sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_tag_roundtrip() {
        for op in [
            UpdateOperation::Create,
            UpdateOperation::Modify,
            UpdateOperation::Delete,
        ] {
            assert_eq!(UpdateOperation::from_u8(op.as_u8()), Some(op));
        }
    }

    #[test]
    fn test_unknown_operation_tag() {
        assert!(UpdateOperation::from_u8(3).is_none());
    }
}
