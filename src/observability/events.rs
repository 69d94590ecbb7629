//! Observability events
//!
//! Per OBSERVABILITY.md, every observable protocol transition has an
//! explicit, typed event. Event names are stable; dashboards and log
//! scrapers key on them.

use std::fmt;

/// Observable replication events
///
/// Per OBSERVABILITY.md §3-4, these cover:
/// - Role lifecycle
/// - Cold / warm sync
/// - Async update flow and gap recovery
/// - Transport lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Role lifecycle
    /// Role assignment accepted
    RoleAssigned,
    /// Role assignment rejected by the legality matrix
    RoleRejected,
    /// Quiescing drain finished, replica is quiesced
    QuiesceComplete,

    // Cold sync
    /// Standby requested a full state transfer
    ColdSyncStart,
    /// Snapshot committed, counters adopted
    ColdSyncComplete,
    /// Snapshot stream abandoned and restarted
    ColdSyncRestart,

    // Warm sync
    /// Digest check round-trip started
    WarmSyncStart,
    /// Digests matched
    WarmSyncMatch,
    /// Digests diverged, full resync forced
    WarmSyncMismatch,

    // Async update flow
    /// Update applied in order
    UpdateApplied,
    /// Duplicate delivery discarded
    UpdateDuplicate,
    /// Sequence gap detected, data request issued
    GapDetected,
    /// Gap filled from the replay log
    GapRecovered,
    /// Update queue hit capacity, escalating to resync
    QueueOverflow,

    // Transport
    /// Channel to the peer established
    PeerConnected,
    /// Channel to the peer lost
    PeerDisconnected,
    /// Sub-part version negotiated with the peer
    VersionNegotiated,
    /// Peer offered no overlapping version (FATAL)
    VersionIncompatible,

    // Invariants
    /// Internal ordering invariant violated (FATAL)
    InvariantViolated,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::RoleAssigned => "ROLE_ASSIGNED",
            Event::RoleRejected => "ROLE_REJECTED",
            Event::QuiesceComplete => "QUIESCE_COMPLETE",

            Event::ColdSyncStart => "COLD_SYNC_BEGIN",
            Event::ColdSyncComplete => "COLD_SYNC_COMPLETE",
            Event::ColdSyncRestart => "COLD_SYNC_RESTART",

            Event::WarmSyncStart => "WARM_SYNC_BEGIN",
            Event::WarmSyncMatch => "WARM_SYNC_MATCH",
            Event::WarmSyncMismatch => "WARM_SYNC_MISMATCH",

            Event::UpdateApplied => "UPDATE_APPLIED",
            Event::UpdateDuplicate => "UPDATE_DUPLICATE",
            Event::GapDetected => "GAP_DETECTED",
            Event::GapRecovered => "GAP_RECOVERED",
            Event::QueueOverflow => "QUEUE_OVERFLOW",

            Event::PeerConnected => "PEER_CONNECTED",
            Event::PeerDisconnected => "PEER_DISCONNECTED",
            Event::VersionNegotiated => "VERSION_NEGOTIATED",
            Event::VersionIncompatible => "VERSION_INCOMPATIBLE",

            Event::InvariantViolated => "INVARIANT_VIOLATED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::VersionIncompatible | Event::InvariantViolated)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_have_string_representation() {
        let events = [
            Event::RoleAssigned,
            Event::RoleRejected,
            Event::QuiesceComplete,
            Event::ColdSyncStart,
            Event::ColdSyncComplete,
            Event::ColdSyncRestart,
            Event::WarmSyncStart,
            Event::WarmSyncMatch,
            Event::WarmSyncMismatch,
            Event::UpdateApplied,
            Event::UpdateDuplicate,
            Event::GapDetected,
            Event::GapRecovered,
            Event::QueueOverflow,
            Event::PeerConnected,
            Event::PeerDisconnected,
            Event::VersionNegotiated,
            Event::VersionIncompatible,
            Event::InvariantViolated,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_fatal_events() {
        assert!(Event::VersionIncompatible.is_fatal());
        assert!(Event::InvariantViolated.is_fatal());
        assert!(!Event::WarmSyncMismatch.is_fatal());
        assert!(!Event::QueueOverflow.is_fatal());
    }

    #[test]
    fn test_event_display() {
        assert_eq!(format!("{}", Event::ColdSyncStart), "COLD_SYNC_BEGIN");
        assert_eq!(format!("{}", Event::GapDetected), "GAP_DETECTED");
    }
}
