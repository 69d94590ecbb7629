//! Transport Adapter Boundary
//!
//! The sync protocol never talks to a socket directly. It hands opaque
//! frames to a [`Transport`] and receives opaque frames back; delivery
//! order is the transport's problem, delivery *gaps* are the protocol's
//! (sequence numbers catch them, see CHECKPOINT_PROTOCOL.md §6).
//!
//! [`LoopbackPair`] is the in-process adapter used by the engine tests.
//! It can be told to silently drop specific frames, which is how the
//! gap-recovery paths get exercised without a flaky network.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use thiserror::Error;

/// Errors surfaced by a transport adapter.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer endpoint is gone. The session drops to Disconnected.
    #[error("transport channel closed")]
    ChannelClosed,

    /// The adapter could not deliver for an adapter-specific reason.
    #[error("peer unreachable: {0}")]
    Unreachable(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Frame-oriented channel to the peer replica.
///
/// Implementations must preserve the order of frames they deliver but
/// are allowed to lose frames; the protocol recovers from loss, not
/// from reordering.
pub trait Transport {
    /// Queue one frame for the peer. Returns the frame length.
    fn send(&mut self, frame: &[u8]) -> TransportResult<usize>;

    /// Next frame from the peer, or None when nothing is pending.
    fn recv(&mut self) -> TransportResult<Option<Vec<u8>>>;

    /// Whether the channel is currently usable.
    fn is_connected(&self) -> bool;
}

#[derive(Debug, Default)]
struct Channel {
    frames: VecDeque<Vec<u8>>,
    sent: u64,
    drop_indices: HashSet<u64>,
    closed: bool,
}

/// One end of an in-process loopback link.
#[derive(Debug, Clone)]
pub struct LoopbackEndpoint {
    outgoing: Rc<RefCell<Channel>>,
    incoming: Rc<RefCell<Channel>>,
}

/// In-process pair of connected endpoints.
pub struct LoopbackPair;

impl LoopbackPair {
    /// Build two connected endpoints. Frames sent on one arrive on the
    /// other, in order, unless marked for dropping.
    pub fn new() -> (LoopbackEndpoint, LoopbackEndpoint) {
        let a_to_b = Rc::new(RefCell::new(Channel::default()));
        let b_to_a = Rc::new(RefCell::new(Channel::default()));

        let a = LoopbackEndpoint {
            outgoing: Rc::clone(&a_to_b),
            incoming: Rc::clone(&b_to_a),
        };
        let b = LoopbackEndpoint {
            outgoing: b_to_a,
            incoming: a_to_b,
        };
        (a, b)
    }
}

impl LoopbackEndpoint {
    /// Silently discard the `index`-th frame sent from this endpoint
    /// (zero-based, counted over the endpoint's lifetime).
    pub fn drop_outgoing(&self, index: u64) {
        self.outgoing.borrow_mut().drop_indices.insert(index);
    }

    /// Silently discard the next not-yet-marked frame sent from this
    /// endpoint. Calling twice marks two consecutive frames.
    pub fn drop_next(&self) {
        let mut channel = self.outgoing.borrow_mut();
        let mut next = channel.sent;
        while channel.drop_indices.contains(&next) {
            next += 1;
        }
        channel.drop_indices.insert(next);
    }

    /// Tear the link down in both directions.
    pub fn disconnect(&self) {
        self.outgoing.borrow_mut().closed = true;
        self.incoming.borrow_mut().closed = true;
    }

    /// Frames queued toward the peer, for test assertions.
    pub fn pending_outgoing(&self) -> usize {
        self.outgoing.borrow().frames.len()
    }
}

impl Transport for LoopbackEndpoint {
    fn send(&mut self, frame: &[u8]) -> TransportResult<usize> {
        let mut channel = self.outgoing.borrow_mut();
        if channel.closed {
            return Err(TransportError::ChannelClosed);
        }
        let index = channel.sent;
        channel.sent += 1;
        if !channel.drop_indices.remove(&index) {
            channel.frames.push_back(frame.to_vec());
        }
        Ok(frame.len())
    }

    fn recv(&mut self) -> TransportResult<Option<Vec<u8>>> {
        let mut channel = self.incoming.borrow_mut();
        if let Some(frame) = channel.frames.pop_front() {
            return Ok(Some(frame));
        }
        if channel.closed {
            return Err(TransportError::ChannelClosed);
        }
        Ok(None)
    }

    fn is_connected(&self) -> bool {
        !self.outgoing.borrow().closed && !self.incoming.borrow().closed
    }
}
