//! Per-Kind Async Update Counters
//!
//! The warm-sync digest. Every applied update increments the counter for
//! its record kind; two replicas are in sync iff every counter matches
//! exactly. Counters are monotonic within a role epoch and reset only at
//! cold-sync completion, when the standby adopts the active's values.
//!
//! u32 on purpose: both sides wrap identically, so digest equality
//! survives wrap-around.

use crate::codec::EntityKind;

/// One update counter per replicated record kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AsyncUpdateCounts {
    pub node_updates: u32,
    pub app_updates: u32,
    pub sg_updates: u32,
    pub su_updates: u32,
    pub si_updates: u32,
    pub comp_updates: u32,
    pub csi_assignment_updates: u32,
    pub si_transfer_updates: u32,
    pub admin_owner_updates: u32,
    pub ccb_updates: u32,
}

impl AsyncUpdateCounts {
    /// All-zero counters (state at cold-sync start of a fresh standby).
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one applied update of the given kind.
    pub fn record(&mut self, kind: EntityKind) {
        let counter = self.counter_mut(kind);
        *counter = counter.wrapping_add(1);
    }

    /// Digest comparison: exact equality of every counter.
    pub fn matches(&self, other: &AsyncUpdateCounts) -> bool {
        self == other
    }

    /// Reset all counters, at cold-sync restart.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Counters in wire order, one slot per [`EntityKind::ALL`] entry.
    pub fn as_array(&self) -> [u32; 10] {
        [
            self.node_updates,
            self.app_updates,
            self.sg_updates,
            self.su_updates,
            self.si_updates,
            self.comp_updates,
            self.csi_assignment_updates,
            self.si_transfer_updates,
            self.admin_owner_updates,
            self.ccb_updates,
        ]
    }

    /// Rebuild from wire order.
    pub fn from_array(values: [u32; 10]) -> Self {
        Self {
            node_updates: values[0],
            app_updates: values[1],
            sg_updates: values[2],
            su_updates: values[3],
            si_updates: values[4],
            comp_updates: values[5],
            csi_assignment_updates: values[6],
            si_transfer_updates: values[7],
            admin_owner_updates: values[8],
            ccb_updates: values[9],
        }
    }

    fn counter_mut(&mut self, kind: EntityKind) -> &mut u32 {
        match kind {
            EntityKind::Node => &mut self.node_updates,
            EntityKind::Application => &mut self.app_updates,
            EntityKind::ServiceGroup => &mut self.sg_updates,
            EntityKind::ServiceUnit => &mut self.su_updates,
            EntityKind::ServiceInstance => &mut self.si_updates,
            EntityKind::Component => &mut self.comp_updates,
            EntityKind::CsiAssignment => &mut self.csi_assignment_updates,
            EntityKind::SiTransfer => &mut self.si_transfer_updates,
            EntityKind::AdminOwner => &mut self.admin_owner_updates,
            EntityKind::Ccb => &mut self.ccb_updates,
        }
    }
}
