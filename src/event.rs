//! Engine Event Mailbox
//!
//! Everything that can happen to the engine arrives as a typed event in
//! a single-consumer mailbox: peer frames, timer expiries, role
//! assignments, transport failures, and local mutations. The engine
//! drains the mailbox from one thread, so no protocol state needs locks.

use std::collections::VecDeque;

use crate::codec::ReplicatedEntity;
use crate::queue::UpdateOperation;
use crate::role::HaRole;
use crate::timer::TimerKind;

/// One unit of work for the engine loop.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A raw frame arrived from the peer.
    PeerFrame(Vec<u8>),

    /// A protocol timer fired.
    TimerExpired(TimerKind),

    /// The cluster controller assigned a role.
    RoleAssigned(HaRole),

    /// The transport reported the channel dead.
    TransportDown,

    /// The hosting service mutated local state (active side only).
    LocalMutation {
        operation: UpdateOperation,
        entity: ReplicatedEntity,
    },
}

impl EngineEvent {
    /// Stable name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            EngineEvent::PeerFrame(_) => "peer_frame",
            EngineEvent::TimerExpired(_) => "timer_expired",
            EngineEvent::RoleAssigned(_) => "role_assigned",
            EngineEvent::TransportDown => "transport_down",
            EngineEvent::LocalMutation { .. } => "local_mutation",
        }
    }
}

/// FIFO mailbox feeding the engine loop.
#[derive(Debug, Default)]
pub struct Mailbox {
    events: VecDeque<EngineEvent>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event at the tail.
    pub fn post(&mut self, event: EngineEvent) {
        self.events.push_back(event);
    }

    /// Take the oldest queued event.
    pub fn take(&mut self) -> Option<EngineEvent> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailbox_is_fifo() {
        let mut mailbox = Mailbox::new();
        mailbox.post(EngineEvent::TransportDown);
        mailbox.post(EngineEvent::RoleAssigned(HaRole::Active));

        assert_eq!(mailbox.len(), 2);
        assert_eq!(mailbox.take(), Some(EngineEvent::TransportDown));
        assert_eq!(
            mailbox.take(),
            Some(EngineEvent::RoleAssigned(HaRole::Active))
        );
        assert_eq!(mailbox.take(), None);
    }
}
