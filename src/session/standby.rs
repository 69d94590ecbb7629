//! Standby-Side Checkpoint Session
//!
//! The standby drives the sync protocol: it requests the cold-sync
//! snapshot, schedules warm-sync digest checks, applies async updates in
//! strict sequence order, and issues data requests when it detects a
//! gap. Out-of-order updates are parked until the gap fills; anything
//! the replay log cannot serve escalates to a full resync.
//!
//! Per SYNC_STATE_MACHINE.md §5, a digest mismatch never triggers
//! partial repair. The standby throws its replica away and cold-syncs
//! from scratch.

use std::collections::BTreeMap;

use super::errors::{SessionError, SessionResult};
use super::message::CheckpointMessage;
use super::state::SyncState;
use crate::codec::{self, SubPartVersion};
use crate::queue::{AsyncUpdateCounts, AsyncUpdateRecord, UpdateOperation};
use crate::store::{MemoryStore, ObjectStore};

/// What one inbound message did to the standby.
#[derive(Debug, Default)]
pub struct StandbyOutcome {
    /// Frames to send back to the active.
    pub replies: Vec<CheckpointMessage>,
    /// A cold sync just completed and the replica is current.
    pub synced: bool,
    /// A full resync was forced (digest mismatch, unservable gap, or a
    /// corrupt record).
    pub resync_forced: bool,
    /// Highest contiguously applied sequence worth acknowledging.
    pub ack_up_to: Option<u64>,
    /// An already-applied sequence was delivered again and discarded.
    pub duplicate: bool,
}

impl StandbyOutcome {
    fn reply(message: CheckpointMessage) -> Self {
        Self {
            replies: vec![message],
            ..Self::default()
        }
    }
}

/// Protocol driver for the standby side of one replication channel.
#[derive(Debug)]
pub struct StandbySession {
    version: SubPartVersion,
    state: SyncState,
    /// Sequence the next in-order async update must carry.
    expected_sequence: u64,
    /// Out-of-order updates parked until the gap before them fills.
    pending: BTreeMap<u64, AsyncUpdateRecord>,
    /// Snapshot under construction; committed atomically at completion.
    staging: Option<MemoryStore>,
    counts: AsyncUpdateCounts,
    outstanding_data_req: Option<(u64, u64)>,
    suspended_from: Option<SyncState>,
}

impl StandbySession {
    /// New channel at the negotiated sub-part version.
    pub fn new(version: SubPartVersion) -> Self {
        Self {
            version,
            state: SyncState::Uninitialized,
            expected_sequence: 1,
            pending: BTreeMap::new(),
            staging: None,
            counts: AsyncUpdateCounts::new(),
            outstanding_data_req: None,
            suspended_from: None,
        }
    }

    pub fn version(&self) -> SubPartVersion {
        self.version
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Counter digest of everything applied so far.
    pub fn counts(&self) -> &AsyncUpdateCounts {
        &self.counts
    }

    /// Sequence the next in-order update must carry.
    pub fn expected_sequence(&self) -> u64 {
        self.expected_sequence
    }

    /// Kick off the initial cold sync. Returns the request to send.
    pub fn start_cold_sync(&mut self) -> SessionResult<CheckpointMessage> {
        self.state = self.state.transition(SyncState::ColdSyncRequested)?;
        self.staging = None;
        self.pending.clear();
        self.outstanding_data_req = None;
        Ok(CheckpointMessage::ColdSyncReq)
    }

    /// Kick off a periodic warm-sync digest check.
    pub fn start_warm_sync(&mut self) -> SessionResult<CheckpointMessage> {
        self.state = self.state.transition(SyncState::WarmSyncInProgress)?;
        Ok(CheckpointMessage::WarmSyncReq)
    }

    /// Throw the replica's sync progress away and cold-sync again.
    pub fn force_resync(&mut self) -> SessionResult<CheckpointMessage> {
        self.state = self.state.transition(SyncState::ColdSyncRequested)?;
        self.staging = None;
        self.pending.clear();
        self.outstanding_data_req = None;
        Ok(CheckpointMessage::ColdSyncReq)
    }

    /// React to one peer message, mutating the local replica.
    pub fn handle_message(
        &mut self,
        message: CheckpointMessage,
        store: &mut MemoryStore,
    ) -> SessionResult<StandbyOutcome> {
        match message {
            CheckpointMessage::ColdSyncResp { records, .. } => {
                self.on_snapshot_chunk(records)
            }
            CheckpointMessage::ColdSyncComplete {
                counts,
                next_sequence,
            } => self.on_snapshot_complete(counts, next_sequence, store),
            CheckpointMessage::WarmSyncResp { counts } => self.on_digest(counts),
            CheckpointMessage::AsyncUpdate { record } => self.on_update(record, store),
            CheckpointMessage::DataResp { records } => {
                let mut outcome = StandbyOutcome::default();
                for record in records {
                    let one = self.on_update(record, store)?;
                    outcome.replies.extend(one.replies);
                    outcome.resync_forced |= one.resync_forced;
                    outcome.duplicate |= one.duplicate;
                    if one.ack_up_to.is_some() {
                        outcome.ack_up_to = one.ack_up_to;
                    }
                }
                Ok(outcome)
            }
            CheckpointMessage::DataRespComplete { up_to } => self.on_data_complete(up_to),
            other => Err(SessionError::UnexpectedMessage {
                state: self.state,
                message: other.name(),
            }),
        }
    }

    fn on_snapshot_chunk(&mut self, records: Vec<Vec<u8>>) -> SessionResult<StandbyOutcome> {
        // A snapshot can also arrive unsolicited, when the active could
        // not serve a data request and restreams everything.
        if !self.state.is_cold_syncing() {
            self.state = self.state.transition(SyncState::ColdSyncRequested)?;
        }
        if self.state == SyncState::ColdSyncRequested {
            self.state = self.state.transition(SyncState::ColdSyncInProgress)?;
            self.staging = Some(MemoryStore::new());
            self.pending.clear();
            self.outstanding_data_req = None;
        }

        if self.staging.is_none() {
            self.staging = Some(MemoryStore::new());
        }
        for payload in &records {
            let entity = match codec::decode(payload, self.version) {
                Ok(entity) => entity,
                // A corrupt chunk poisons the whole snapshot.
                Err(_) => {
                    self.staging = None;
                    self.state = self.state.transition(SyncState::ColdSyncRequested)?;
                    let mut outcome = StandbyOutcome::reply(CheckpointMessage::ColdSyncReq);
                    outcome.resync_forced = true;
                    return Ok(outcome);
                }
            };
            if let Some(staging) = self.staging.as_mut() {
                staging.apply(entity);
            }
        }
        Ok(StandbyOutcome::default())
    }

    fn on_snapshot_complete(
        &mut self,
        counts: AsyncUpdateCounts,
        next_sequence: u64,
        store: &mut MemoryStore,
    ) -> SessionResult<StandbyOutcome> {
        if !self.state.is_cold_syncing() {
            return Err(SessionError::UnexpectedMessage {
                state: self.state,
                message: "cold_sync_complete",
            });
        }
        // An empty snapshot sends no chunks at all.
        if self.state == SyncState::ColdSyncRequested {
            self.state = self.state.transition(SyncState::ColdSyncInProgress)?;
        }

        *store = self.staging.take().unwrap_or_default();
        self.counts = counts;
        self.expected_sequence = next_sequence;
        self.pending.clear();
        self.outstanding_data_req = None;
        self.state = self.state.transition(SyncState::InSync)?;

        let mut outcome = StandbyOutcome::default();
        outcome.synced = true;
        // The snapshot subsumes everything before it; let the active
        // purge its queue.
        outcome.ack_up_to = next_sequence.checked_sub(1).filter(|&s| s > 0);
        Ok(outcome)
    }

    fn on_digest(&mut self, counts: AsyncUpdateCounts) -> SessionResult<StandbyOutcome> {
        if self.state != SyncState::WarmSyncInProgress {
            return Err(SessionError::UnexpectedMessage {
                state: self.state,
                message: "warm_sync_resp",
            });
        }
        if counts.matches(&self.counts) {
            self.state = self.state.transition(SyncState::InSync)?;
            Ok(StandbyOutcome::default())
        } else {
            let request = self.force_resync()?;
            let mut outcome = StandbyOutcome::reply(request);
            outcome.resync_forced = true;
            Ok(outcome)
        }
    }

    fn on_update(
        &mut self,
        record: AsyncUpdateRecord,
        store: &mut MemoryStore,
    ) -> SessionResult<StandbyOutcome> {
        // Updates racing a cold sync are covered by the snapshot.
        if self.state.is_cold_syncing() || self.state == SyncState::Uninitialized {
            return Ok(StandbyOutcome::default());
        }

        // Duplicate delivery (retransmit overlap): already applied.
        if record.sequence < self.expected_sequence {
            let mut outcome = StandbyOutcome::default();
            outcome.duplicate = true;
            return Ok(outcome);
        }

        if record.sequence > self.expected_sequence {
            let gap = (self.expected_sequence, record.sequence - 1);
            self.pending.insert(record.sequence, record);
            // One outstanding data request at a time.
            if self.outstanding_data_req.is_none() {
                self.outstanding_data_req = Some(gap);
                return Ok(StandbyOutcome::reply(CheckpointMessage::DataReq {
                    from: gap.0,
                    to: gap.1,
                }));
            }
            return Ok(StandbyOutcome::default());
        }

        if self.apply_record(&record, store).is_err() {
            let request = self.force_resync()?;
            let mut outcome = StandbyOutcome::reply(request);
            outcome.resync_forced = true;
            return Ok(outcome);
        }
        self.expected_sequence += 1;

        // Drain parked updates that are now contiguous.
        while let Some(next) = self.pending.remove(&self.expected_sequence) {
            if self.apply_record(&next, store).is_err() {
                let request = self.force_resync()?;
                let mut outcome = StandbyOutcome::reply(request);
                outcome.resync_forced = true;
                return Ok(outcome);
            }
            self.expected_sequence += 1;
        }

        let mut outcome = StandbyOutcome::default();
        outcome.ack_up_to = Some(self.expected_sequence - 1);
        Ok(outcome)
    }

    fn on_data_complete(&mut self, up_to: u64) -> SessionResult<StandbyOutcome> {
        self.outstanding_data_req = None;

        // Still behind after the retransmission: either the active could
        // not serve the full range or more loss happened meanwhile.
        if let Some((&first_parked, _)) = self.pending.iter().next() {
            if self.expected_sequence < first_parked {
                if up_to >= self.expected_sequence {
                    // The active claims it sent them; treat as unservable.
                    let request = self.force_resync()?;
                    let mut outcome = StandbyOutcome::reply(request);
                    outcome.resync_forced = true;
                    return Ok(outcome);
                }
                let gap = (self.expected_sequence, first_parked - 1);
                self.outstanding_data_req = Some(gap);
                return Ok(StandbyOutcome::reply(CheckpointMessage::DataReq {
                    from: gap.0,
                    to: gap.1,
                }));
            }
        }
        Ok(StandbyOutcome::default())
    }

    fn apply_record(
        &mut self,
        record: &AsyncUpdateRecord,
        store: &mut MemoryStore,
    ) -> SessionResult<()> {
        let entity = codec::decode(&record.payload, self.version)?;
        match record.operation {
            UpdateOperation::Create | UpdateOperation::Modify => store.apply(entity),
            UpdateOperation::Delete => {
                // Deleting an already-absent record is not an error; the
                // snapshot may have never contained it.
                store.remove(entity.kind(), &entity.key());
            }
        }
        self.counts.record(record.kind);
        Ok(())
    }

    /// Suspend for a role change; the channel resumes where it was.
    pub fn suspend(&mut self) -> SessionResult<()> {
        self.suspended_from = Some(self.state);
        self.state = self.state.transition(SyncState::RoleChanging)?;
        Ok(())
    }

    /// Resume a suspended channel.
    pub fn resume(&mut self) -> SessionResult<()> {
        match self.suspended_from.take() {
            Some(previous) => {
                self.state = self.state.transition(previous)?;
                Ok(())
            }
            None => Err(SessionError::InternalInvariant(
                "resume without a prior suspend".to_string(),
            )),
        }
    }

    /// Transport failure observed; the channel is dead until reconnect.
    pub fn on_disconnect(&mut self) {
        self.state = SyncState::Disconnected;
        self.suspended_from = None;
        self.staging = None;
        self.pending.clear();
        self.outstanding_data_req = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{EntityKind, NodeRecord, ReplicatedEntity, SUB_PART_VERSION_CURRENT};

    fn node(name: &str) -> ReplicatedEntity {
        ReplicatedEntity::Node(NodeRecord {
            name: name.to_string(),
            node_id: 1,
            oper_state: 1,
        })
    }

    fn update(sequence: u64, entity: &ReplicatedEntity) -> CheckpointMessage {
        CheckpointMessage::AsyncUpdate {
            record: AsyncUpdateRecord {
                kind: entity.kind(),
                operation: UpdateOperation::Modify,
                payload: codec::encode(entity, SUB_PART_VERSION_CURRENT).unwrap(),
                sequence,
            },
        }
    }

    fn synced_session(store: &mut MemoryStore) -> StandbySession {
        let mut session = StandbySession::new(SUB_PART_VERSION_CURRENT);
        session.start_cold_sync().unwrap();
        let outcome = session
            .handle_message(
                CheckpointMessage::ColdSyncComplete {
                    counts: AsyncUpdateCounts::new(),
                    next_sequence: 1,
                },
                store,
            )
            .unwrap();
        assert!(outcome.synced);
        session
    }

    #[test]
    fn test_cold_sync_commits_snapshot_atomically() {
        let mut store = MemoryStore::new();
        store.apply(node("stale"));

        let mut session = StandbySession::new(SUB_PART_VERSION_CURRENT);
        session.start_cold_sync().unwrap();

        let chunk = vec![
            codec::encode(&node("PL-3"), SUB_PART_VERSION_CURRENT).unwrap(),
            codec::encode(&node("PL-4"), SUB_PART_VERSION_CURRENT).unwrap(),
        ];
        session
            .handle_message(
                CheckpointMessage::ColdSyncResp {
                    kind: EntityKind::Node,
                    records: chunk,
                },
                &mut store,
            )
            .unwrap();
        // Nothing committed until the completion marker.
        assert!(store.get(EntityKind::Node, "stale").is_some());

        let mut counts = AsyncUpdateCounts::new();
        counts.record(EntityKind::Node);
        let outcome = session
            .handle_message(
                CheckpointMessage::ColdSyncComplete {
                    counts,
                    next_sequence: 7,
                },
                &mut store,
            )
            .unwrap();

        assert!(outcome.synced);
        assert_eq!(outcome.ack_up_to, Some(6));
        assert!(session.state().is_in_sync());
        assert_eq!(session.expected_sequence(), 7);
        assert!(session.counts().matches(&counts));
        // The stale record did not survive the snapshot.
        assert!(store.get(EntityKind::Node, "stale").is_none());
        assert_eq!(store.enumerate(EntityKind::Node).len(), 2);
    }

    #[test]
    fn test_in_order_updates_apply_and_ack() {
        let mut store = MemoryStore::new();
        let mut session = synced_session(&mut store);

        let outcome = session
            .handle_message(update(1, &node("PL-3")), &mut store)
            .unwrap();
        assert_eq!(outcome.ack_up_to, Some(1));
        assert_eq!(session.expected_sequence(), 2);
        assert!(store.get(EntityKind::Node, "PL-3").is_some());
        assert_eq!(session.counts().node_updates, 1);
    }

    #[test]
    fn test_gap_triggers_single_data_req() {
        let mut store = MemoryStore::new();
        let mut session = synced_session(&mut store);

        session
            .handle_message(update(1, &node("a")), &mut store)
            .unwrap();
        session
            .handle_message(update(2, &node("b")), &mut store)
            .unwrap();

        // 3 lost; 4 arrives out of order.
        let outcome = session
            .handle_message(update(4, &node("d")), &mut store)
            .unwrap();
        assert_eq!(
            outcome.replies,
            vec![CheckpointMessage::DataReq { from: 3, to: 3 }]
        );

        // Further out-of-order arrivals do not duplicate the request.
        let outcome = session
            .handle_message(update(5, &node("e")), &mut store)
            .unwrap();
        assert!(outcome.replies.is_empty());
        assert_eq!(session.expected_sequence(), 3);
    }

    #[test]
    fn test_data_resp_fills_gap_and_drains_pending() {
        let mut store = MemoryStore::new();
        let mut session = synced_session(&mut store);

        session
            .handle_message(update(1, &node("a")), &mut store)
            .unwrap();
        session
            .handle_message(update(3, &node("c")), &mut store)
            .unwrap();

        let filler = match update(2, &node("b")) {
            CheckpointMessage::AsyncUpdate { record } => record,
            _ => unreachable!(),
        };
        let outcome = session
            .handle_message(
                CheckpointMessage::DataResp {
                    records: vec![filler],
                },
                &mut store,
            )
            .unwrap();
        assert_eq!(outcome.ack_up_to, Some(3));
        assert_eq!(session.expected_sequence(), 4);
        assert!(store.get(EntityKind::Node, "b").is_some());
        assert!(store.get(EntityKind::Node, "c").is_some());

        let outcome = session
            .handle_message(CheckpointMessage::DataRespComplete { up_to: 2 }, &mut store)
            .unwrap();
        assert!(outcome.replies.is_empty());
        assert!(!outcome.resync_forced);
    }

    #[test]
    fn test_unservable_gap_forces_resync() {
        let mut store = MemoryStore::new();
        let mut session = synced_session(&mut store);

        session
            .handle_message(update(4, &node("d")), &mut store)
            .unwrap();
        // Active answered the 1..=3 request but the standby saw nothing.
        let outcome = session
            .handle_message(CheckpointMessage::DataRespComplete { up_to: 3 }, &mut store)
            .unwrap();

        assert!(outcome.resync_forced);
        assert_eq!(outcome.replies, vec![CheckpointMessage::ColdSyncReq]);
        assert!(session.state().is_cold_syncing());
    }

    #[test]
    fn test_duplicate_update_is_ignored() {
        let mut store = MemoryStore::new();
        let mut session = synced_session(&mut store);

        session
            .handle_message(update(1, &node("a")), &mut store)
            .unwrap();
        let outcome = session
            .handle_message(update(1, &node("a")), &mut store)
            .unwrap();

        assert!(outcome.duplicate);
        assert!(outcome.replies.is_empty());
        assert_eq!(session.expected_sequence(), 2);
        assert_eq!(session.counts().node_updates, 1);
    }

    #[test]
    fn test_delete_update_removes_record() {
        let mut store = MemoryStore::new();
        let mut session = synced_session(&mut store);
        session
            .handle_message(update(1, &node("a")), &mut store)
            .unwrap();

        let delete = CheckpointMessage::AsyncUpdate {
            record: AsyncUpdateRecord {
                kind: EntityKind::Node,
                operation: UpdateOperation::Delete,
                payload: codec::encode(&node("a"), SUB_PART_VERSION_CURRENT).unwrap(),
                sequence: 2,
            },
        };
        session.handle_message(delete, &mut store).unwrap();

        assert!(store.get(EntityKind::Node, "a").is_none());
        assert_eq!(session.counts().node_updates, 2);
    }

    #[test]
    fn test_warm_sync_match_returns_in_sync() {
        let mut store = MemoryStore::new();
        let mut session = synced_session(&mut store);

        let request = session.start_warm_sync().unwrap();
        assert_eq!(request, CheckpointMessage::WarmSyncReq);

        let digest = *session.counts();
        let outcome = session
            .handle_message(CheckpointMessage::WarmSyncResp { counts: digest }, &mut store)
            .unwrap();
        assert!(outcome.replies.is_empty());
        assert!(session.state().is_in_sync());
    }

    #[test]
    fn test_warm_sync_mismatch_forces_full_resync() {
        let mut store = MemoryStore::new();
        let mut session = synced_session(&mut store);

        session.start_warm_sync().unwrap();
        let mut drifted = *session.counts();
        drifted.record(EntityKind::Ccb);
        let outcome = session
            .handle_message(
                CheckpointMessage::WarmSyncResp { counts: drifted },
                &mut store,
            )
            .unwrap();

        assert!(outcome.resync_forced);
        assert_eq!(outcome.replies, vec![CheckpointMessage::ColdSyncReq]);
        assert!(session.state().is_cold_syncing());
    }

    #[test]
    fn test_corrupt_update_forces_resync() {
        let mut store = MemoryStore::new();
        let mut session = synced_session(&mut store);

        let corrupt = CheckpointMessage::AsyncUpdate {
            record: AsyncUpdateRecord {
                kind: EntityKind::Node,
                operation: UpdateOperation::Modify,
                payload: vec![0xFF, 1, 2],
                sequence: 1,
            },
        };
        let outcome = session.handle_message(corrupt, &mut store).unwrap();

        assert!(outcome.resync_forced);
        assert!(session.state().is_cold_syncing());
    }

    #[test]
    fn test_updates_during_cold_sync_are_dropped() {
        let mut store = MemoryStore::new();
        let mut session = StandbySession::new(SUB_PART_VERSION_CURRENT);
        session.start_cold_sync().unwrap();

        let outcome = session
            .handle_message(update(5, &node("x")), &mut store)
            .unwrap();
        assert!(outcome.replies.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_active_only_messages_are_unexpected() {
        let mut store = MemoryStore::new();
        let mut session = synced_session(&mut store);

        let err = session
            .handle_message(CheckpointMessage::ColdSyncReq, &mut store)
            .unwrap_err();
        assert!(matches!(err, SessionError::UnexpectedMessage { .. }));
    }
}
