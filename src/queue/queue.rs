//! Async Update Queue
//!
//! Per CHECKPOINT_PROTOCOL.md §5:
//! - Sequence numbers are assigned at enqueue, monotonic and gap-free
//! - Dequeue never reorders and is restartable: records stay queued
//!   until the standby acknowledges them
//! - The queue is bounded; overflow is a policy signal, not a drop
//!
//! Owned ordered container, indexed by sequence number. The active role
//! is the single writer, so enqueue needs no locking (the role is the
//! lock, see ROLE_MODEL.md §5).

use std::collections::VecDeque;

use super::errors::{QueueError, QueueResult};
use super::record::{AsyncUpdateRecord, UpdateOperation};
use crate::codec::EntityKind;

/// FIFO of unacknowledged change notifications on the active replica.
#[derive(Debug)]
pub struct AsyncUpdateQueue {
    records: VecDeque<AsyncUpdateRecord>,
    next_sequence: u64,
    capacity: usize,
}

impl AsyncUpdateQueue {
    /// Create a queue with a bounded-memory ceiling.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            next_sequence: 1,
            capacity,
        }
    }

    /// Sequence number the next enqueue will be assigned.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Number of unacknowledged records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether every record has been acknowledged.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a change notification and assign its sequence number.
    ///
    /// Fails with `QueueError::full` at the capacity ceiling. The caller
    /// decides the escalation (forced full resync); the queue itself
    /// never drops records to make room.
    pub fn enqueue(
        &mut self,
        kind: EntityKind,
        operation: UpdateOperation,
        payload: Vec<u8>,
    ) -> QueueResult<u64> {
        if self.records.len() >= self.capacity {
            return Err(QueueError::full(format!(
                "async update queue at capacity {}",
                self.capacity
            )));
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.records.push_back(AsyncUpdateRecord {
            kind,
            operation,
            payload,
            sequence,
        });
        Ok(sequence)
    }

    /// Oldest `max` records, in sequence order, without consuming them.
    ///
    /// Restartable: a consumer that disconnects may re-request the same
    /// unacknowledged range. Records leave the queue only through
    /// [`purge_acknowledged`](Self::purge_acknowledged).
    pub fn dequeue_batch(&self, max: usize) -> Vec<AsyncUpdateRecord> {
        self.records.iter().take(max).cloned().collect()
    }

    /// Free every record with sequence <= `up_to_seq`.
    pub fn purge_acknowledged(&mut self, up_to_seq: u64) {
        while let Some(front) = self.records.front() {
            if front.sequence > up_to_seq {
                break;
            }
            self.records.pop_front();
        }
    }

    /// Drop all queued records, e.g. when a cold-sync snapshot subsumes
    /// them. Sequence numbering continues, it never restarts mid-epoch.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Sequence of the oldest unacknowledged record, if any.
    pub fn first_sequence(&self) -> Option<u64> {
        self.records.front().map(|r| r.sequence)
    }
}
