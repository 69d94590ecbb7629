//! Checkpoint Sync State Machine
//!
//! Per SYNC_STATE_MACHINE.md §2, the single replication channel between
//! active and standby moves through:
//!
//! ```text
//! Uninitialized -> ColdSyncRequested -> ColdSyncInProgress
//!     -> (InSync | WarmSyncInProgress) -> ...
//! ```
//!
//! Warm sync runs periodically, not once: InSync -> WarmSyncInProgress
//! -> InSync on digest match, or back to ColdSyncRequested on mismatch
//! (full resync, never partial repair). Any state may drop to
//! Disconnected on transport failure or be suspended to RoleChanging;
//! a suspended session resumes where it left off once the role settles.

use super::errors::{SessionError, SessionResult};

/// Sync progress of the replication channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No peer, or torn down after disconnect.
    Uninitialized,

    /// Standby has asked for (or been scheduled for) a full state
    /// transfer that has not started streaming yet.
    ColdSyncRequested,

    /// Snapshot chunks are being streamed, one per record kind.
    ColdSyncInProgress,

    /// Digest verification round-trip outstanding.
    WarmSyncInProgress,

    /// Replicas agree; async updates flow incrementally.
    InSync,

    /// Transport failed; session must be torn down and re-entered at
    /// Uninitialized on reconnect.
    Disconnected,

    /// Suspended by the role controller. Not destroyed: the session
    /// resumes after the role stabilizes.
    RoleChanging,
}

impl SyncState {
    /// Apply a transition, enforcing the legality matrix.
    pub fn transition(self, to: SyncState) -> SessionResult<SyncState> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(SessionError::IllegalTransition { from: self, to })
        }
    }

    fn can_transition(self, to: SyncState) -> bool {
        use SyncState::*;
        match (self, to) {
            // Transport failure is legal from every live state.
            (_, Disconnected) => true,
            // Role change suspends every live state except a dead channel.
            (Disconnected, RoleChanging) => false,
            (_, RoleChanging) => true,
            // A suspended session resumes anywhere the role controller
            // left it, or restarts from scratch.
            (RoleChanging, _) => true,
            // Reconnect re-enters at Uninitialized.
            (Disconnected, Uninitialized) => true,
            (Disconnected, _) => false,

            (Uninitialized, ColdSyncRequested) => true,
            (ColdSyncRequested, ColdSyncInProgress) => true,
            // Cold sync restart (timeout before any chunk arrived).
            (ColdSyncRequested, ColdSyncRequested) => true,
            (ColdSyncInProgress, InSync) => true,
            (ColdSyncInProgress, WarmSyncInProgress) => true,
            // Chunk decode failure or timeout forces a restart.
            (ColdSyncInProgress, ColdSyncRequested) => true,
            (WarmSyncInProgress, InSync) => true,
            // Digest mismatch: full resync, never partial repair.
            (WarmSyncInProgress, ColdSyncRequested) => true,
            (InSync, WarmSyncInProgress) => true,
            // Forced resync (queue overflow escalation, data loss).
            (InSync, ColdSyncRequested) => true,
            // Async updates applied incrementally.
            (InSync, InSync) => true,

            _ => false,
        }
    }

    /// Whether a cold sync is requested or streaming.
    pub fn is_cold_syncing(self) -> bool {
        matches!(
            self,
            SyncState::ColdSyncRequested | SyncState::ColdSyncInProgress
        )
    }

    /// Whether the replicas currently agree.
    pub fn is_in_sync(self) -> bool {
        matches!(self, SyncState::InSync)
    }

    /// Stable name for logging.
    pub fn state_name(self) -> &'static str {
        match self {
            SyncState::Uninitialized => "uninitialized",
            SyncState::ColdSyncRequested => "cold_sync_requested",
            SyncState::ColdSyncInProgress => "cold_sync_in_progress",
            SyncState::WarmSyncInProgress => "warm_sync_in_progress",
            SyncState::InSync => "in_sync",
            SyncState::Disconnected => "disconnected",
            SyncState::RoleChanging => "role_changing",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = SyncState::Uninitialized
            .transition(SyncState::ColdSyncRequested)
            .unwrap()
            .transition(SyncState::ColdSyncInProgress)
            .unwrap()
            .transition(SyncState::InSync)
            .unwrap()
            .transition(SyncState::WarmSyncInProgress)
            .unwrap()
            .transition(SyncState::InSync)
            .unwrap();

        assert!(state.is_in_sync());
    }

    #[test]
    fn test_warm_sync_mismatch_forces_full_resync() {
        let state = SyncState::WarmSyncInProgress
            .transition(SyncState::ColdSyncRequested)
            .unwrap();
        assert!(state.is_cold_syncing());
    }

    #[test]
    fn test_in_sync_self_loop() {
        assert!(SyncState::InSync.transition(SyncState::InSync).is_ok());
    }

    #[test]
    fn test_cannot_skip_cold_sync() {
        assert!(SyncState::Uninitialized
            .transition(SyncState::InSync)
            .is_err());
        assert!(SyncState::ColdSyncRequested
            .transition(SyncState::InSync)
            .is_err());
    }

    #[test]
    fn test_any_live_state_can_disconnect() {
        for state in [
            SyncState::Uninitialized,
            SyncState::ColdSyncRequested,
            SyncState::ColdSyncInProgress,
            SyncState::WarmSyncInProgress,
            SyncState::InSync,
        ] {
            assert!(state.transition(SyncState::Disconnected).is_ok());
        }
    }

    #[test]
    fn test_disconnected_only_reenters_uninitialized() {
        assert!(SyncState::Disconnected
            .transition(SyncState::Uninitialized)
            .is_ok());
        assert!(SyncState::Disconnected
            .transition(SyncState::InSync)
            .is_err());
        assert!(SyncState::Disconnected
            .transition(SyncState::ColdSyncRequested)
            .is_err());
    }

    #[test]
    fn test_role_change_suspends_and_resumes() {
        let suspended = SyncState::ColdSyncInProgress
            .transition(SyncState::RoleChanging)
            .unwrap();
        // Resume where it left off, or restart from scratch.
        assert!(suspended.transition(SyncState::ColdSyncInProgress).is_ok());
        assert!(suspended.transition(SyncState::Uninitialized).is_ok());
    }
}
