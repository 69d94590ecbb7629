//! Protocol Timers
//!
//! Logical timer wheel over a caller-supplied millisecond clock. No
//! background threads: the engine polls [`TimerWheel::expire`] from its
//! event loop, and expiry surfaces as a typed event, never a callback.

use std::collections::BTreeMap;

/// The protocol timeouts. At most one instance of each is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimerKind {
    /// Standby: cold-sync request sent, no chunk seen yet.
    ColdSyncRequest,
    /// Standby: chunks flowing, stream not yet complete.
    ColdSyncComplete,
    /// Standby: periodic warm-sync schedule.
    WarmSyncSend,
    /// Standby: warm-sync request sent, digest not yet received.
    WarmSyncComplete,
    /// Standby: data request sent, response not yet complete.
    DataResponse,
}

impl TimerKind {
    /// Stable name for logging.
    pub fn timer_name(self) -> &'static str {
        match self {
            TimerKind::ColdSyncRequest => "cold_sync_request",
            TimerKind::ColdSyncComplete => "cold_sync_complete",
            TimerKind::WarmSyncSend => "warm_sync_send",
            TimerKind::WarmSyncComplete => "warm_sync_complete",
            TimerKind::DataResponse => "data_response",
        }
    }
}

/// Deadline table keyed by timer kind.
#[derive(Debug, Default)]
pub struct TimerWheel {
    deadlines: BTreeMap<TimerKind, u64>,
}

impl TimerWheel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) a timer to fire at `now_ms + after_ms`.
    pub fn start(&mut self, kind: TimerKind, now_ms: u64, after_ms: u64) {
        self.deadlines.insert(kind, now_ms.saturating_add(after_ms));
    }

    /// Disarm a timer; harmless when not armed.
    pub fn stop(&mut self, kind: TimerKind) {
        self.deadlines.remove(&kind);
    }

    /// Disarm everything, at disconnect or role change.
    pub fn stop_all(&mut self) {
        self.deadlines.clear();
    }

    /// Whether a timer is currently armed.
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadlines.contains_key(&kind)
    }

    /// Pop every timer whose deadline has passed.
    pub fn expire(&mut self, now_ms: u64) -> Vec<TimerKind> {
        let expired: Vec<TimerKind> = self
            .deadlines
            .iter()
            .filter(|(_, &deadline)| deadline <= now_ms)
            .map(|(&kind, _)| kind)
            .collect();
        for kind in &expired {
            self.deadlines.remove(kind);
        }
        expired
    }
}
