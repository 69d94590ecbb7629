//! Replication Engine
//!
//! Single-threaded owner of everything: the role controller, the object
//! store, the sync session for whichever side this replica is on, the
//! async update queue and replay log, the timers and the transport.
//! All input arrives as typed events in a mailbox and is handled from
//! one thread, so no protocol state needs locks.
//!
//! The hosting service drives the engine with three calls:
//! [`negotiate`](ReplicationEngine::negotiate) when the peer appears,
//! [`local_mutation`](ReplicationEngine::local_mutation) when it changes
//! state, and [`step`](ReplicationEngine::step) from its poll loop.

use thiserror::Error;

use crate::codec::{self, ReplicatedEntity, SubPartVersion, VersionError, VersionRange};
use crate::config::EngineConfig;
use crate::event::{EngineEvent, Mailbox};
use crate::observability::{log_event_with_fields, Event, Logger};
use crate::queue::{
    AsyncUpdateCounts, AsyncUpdateQueue, AsyncUpdateRecord, QueueErrorKind, SavedMessageLog,
    UpdateOperation,
};
use crate::role::{HaRole, RoleController, RoleError};
use crate::session::{ActiveSession, CheckpointMessage, SessionError, StandbySession, SyncState};
use crate::store::{MemoryStore, ObjectStore};
use crate::timer::{TimerKind, TimerWheel};
use crate::transport::{Transport, TransportError};

/// Errors surfaced by the engine API.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Role(#[from] RoleError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("no sub-part version negotiated with the peer yet")]
    NotNegotiated,
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Active-side protocol state, built fresh each time this replica
/// assumes the active role.
#[derive(Debug)]
struct ActiveState {
    session: ActiveSession,
    queue: AsyncUpdateQueue,
    saved: SavedMessageLog,
    counts: AsyncUpdateCounts,
}

#[derive(Debug)]
enum Side {
    Idle,
    Active(ActiveState),
    Standby(StandbySession),
}

/// One replica's replication engine.
pub struct ReplicationEngine<T: Transport> {
    config: EngineConfig,
    transport: T,
    roles: RoleController,
    store: MemoryStore,
    version: Option<SubPartVersion>,
    side: Side,
    mailbox: Mailbox,
    timers: TimerWheel,
    connected: bool,
}

impl<T: Transport> ReplicationEngine<T> {
    pub fn new(config: EngineConfig, transport: T) -> Self {
        let roles = RoleController::new(config.initial_role);
        Self {
            config,
            transport,
            roles,
            store: MemoryStore::new(),
            version: None,
            side: Side::Idle,
            mailbox: Mailbox::new(),
            timers: TimerWheel::new(),
            connected: false,
        }
    }

    pub fn role(&self) -> HaRole {
        self.roles.role()
    }

    pub fn epoch(&self) -> u64 {
        self.roles.epoch()
    }

    pub fn version(&self) -> Option<SubPartVersion> {
        self.version
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Sync state of the current session, if one exists.
    pub fn sync_state(&self) -> Option<SyncState> {
        match &self.side {
            Side::Idle => None,
            Side::Active(state) => Some(state.session.state()),
            Side::Standby(session) => Some(session.state()),
        }
    }

    /// Counter digest of the current session.
    pub fn counts(&self) -> Option<AsyncUpdateCounts> {
        match &self.side {
            Side::Idle => None,
            Side::Active(state) => Some(state.counts),
            Side::Standby(session) => Some(*session.counts()),
        }
    }

    /// Unacknowledged updates held on the active side.
    pub fn unacknowledged(&self) -> usize {
        match &self.side {
            Side::Active(state) => state.queue.len(),
            _ => 0,
        }
    }

    /// Queue an event for the next [`step`](Self::step).
    pub fn post(&mut self, event: EngineEvent) {
        self.mailbox.post(event);
    }

    /// Negotiate the session version with a newly appeared peer and
    /// build the session for the current role.
    pub fn negotiate(&mut self, peer: VersionRange, now_ms: u64) -> EngineResult<SubPartVersion> {
        let local = VersionRange {
            min: SubPartVersion::new(self.config.version_min),
            max: SubPartVersion::new(self.config.version_max),
        };
        let version = match codec::negotiate(local, peer) {
            Ok(version) => version,
            Err(err) => {
                log_event_with_fields(
                    Event::VersionIncompatible,
                    &[("peer_max", &peer.max.get().to_string())],
                );
                return Err(err.into());
            }
        };

        self.version = Some(version);
        self.connected = true;
        log_event_with_fields(
            Event::PeerConnected,
            &[("node_id", &self.config.node_id.to_string())],
        );
        log_event_with_fields(
            Event::VersionNegotiated,
            &[("version", &version.get().to_string())],
        );
        self.build_side(now_ms)?;
        Ok(version)
    }

    /// Apply a local state change and replicate it.
    ///
    /// Only the active (or quiescing) role admits this; the sequence
    /// number assigned to the update is returned.
    pub fn local_mutation(
        &mut self,
        operation: UpdateOperation,
        entity: ReplicatedEntity,
    ) -> EngineResult<u64> {
        self.roles.check_write_admission()?;
        let version = self.version.ok_or(EngineError::NotNegotiated)?;
        let state = match &mut self.side {
            Side::Active(state) => state,
            _ => return Err(EngineError::NotNegotiated),
        };

        let kind = entity.kind();
        let payload = codec::encode(&entity, version).map_err(SessionError::Codec)?;
        match operation {
            UpdateOperation::Create | UpdateOperation::Modify => self.store.apply(entity),
            UpdateOperation::Delete => {
                self.store.remove(kind, &entity.key());
            }
        }
        state.counts.record(kind);

        let sequence = match state.queue.enqueue(kind, operation, payload.clone()) {
            Ok(sequence) => sequence,
            Err(err) if err.kind == QueueErrorKind::Full => {
                // Overflow costs replay history, not correctness: the
                // standby's next gap escalates to a full cold sync.
                log_event_with_fields(
                    Event::QueueOverflow,
                    &[("capacity", &self.config.queue_capacity.to_string())],
                );
                state.queue.clear();
                state.saved.clear();
                state
                    .queue
                    .enqueue(kind, operation, payload.clone())
                    .map_err(|e| SessionError::InternalInvariant(e.message))?
            }
            Err(err) => return Err(SessionError::InternalInvariant(err.message).into()),
        };

        let record = AsyncUpdateRecord {
            kind,
            operation,
            payload,
            sequence,
        };
        state.saved.push(record.clone());
        let frame = CheckpointMessage::AsyncUpdate { record }.encode(version);
        self.send_frame(&frame);
        Ok(sequence)
    }

    /// One turn of the engine loop: pump the transport, drain the
    /// mailbox, fire expired timers.
    pub fn step(&mut self, now_ms: u64) -> EngineResult<()> {
        self.pump_transport();
        while let Some(event) = self.mailbox.take() {
            self.handle_event(event, now_ms)?;
        }
        for kind in self.timers.expire(now_ms) {
            self.handle_timer(kind, now_ms)?;
        }
        Ok(())
    }

    /// Assign a role from the cluster controller.
    pub fn assign_role(&mut self, target: HaRole, now_ms: u64) -> EngineResult<()> {
        let change = match self.roles.assign(target) {
            Ok(change) => change,
            Err(err) => {
                log_event_with_fields(
                    Event::RoleRejected,
                    &[
                        ("requested", target.role_name()),
                        ("role", self.roles.role().role_name()),
                    ],
                );
                return Err(err.into());
            }
        };
        log_event_with_fields(
            Event::RoleAssigned,
            &[
                ("epoch", &change.epoch.to_string()),
                ("from", change.from.role_name()),
                ("to", change.to.role_name()),
            ],
        );

        if change.from == change.to {
            return Ok(());
        }

        // Quiescing keeps the active-side machinery to drain the queue;
        // the session is suspended until the switchover settles.
        if change.to == HaRole::Quiescing {
            if let Side::Active(state) = &mut self.side {
                state.session.suspend()?;
            }
            self.check_quiesce_drained();
            return Ok(());
        }
        if change.from == HaRole::Quiescing && change.to == HaRole::Quiesced {
            return Ok(());
        }
        // Switchover abort resumes the suspended drain session, so the
        // update stream continues and the standby never has to resync.
        // Every other flip destroys and rebuilds the side.
        if change.from == HaRole::Quiescing && change.to == HaRole::Active {
            if let Side::Active(state) = &mut self.side {
                state.session.resume()?;
                return Ok(());
            }
        }

        self.build_side(now_ms)?;
        Ok(())
    }

    /// Tear down the session for whichever side the current role needs.
    fn build_side(&mut self, now_ms: u64) -> EngineResult<()> {
        let version = match self.version {
            Some(version) => version,
            // Peer not seen yet; sessions are built at negotiation.
            None => return Ok(()),
        };
        self.timers.stop_all();

        match self.roles.role() {
            HaRole::Active | HaRole::Quiescing => {
                self.side = Side::Active(ActiveState {
                    session: ActiveSession::new(version),
                    queue: AsyncUpdateQueue::new(self.config.queue_capacity),
                    saved: SavedMessageLog::new(self.config.replay_depth),
                    counts: AsyncUpdateCounts::new(),
                });
            }
            HaRole::Standby => {
                let mut session = StandbySession::new(version);
                let request = session.start_cold_sync()?;
                log_event_with_fields(Event::ColdSyncStart, &[("role", "standby")]);
                self.side = Side::Standby(session);
                let frame = request.encode(version);
                self.send_frame(&frame);
                self.timers.start(
                    TimerKind::ColdSyncRequest,
                    now_ms,
                    self.config.chunk_timeout_ms,
                );
            }
            HaRole::Quiesced => {
                self.side = Side::Idle;
            }
        }
        Ok(())
    }

    fn handle_event(&mut self, event: EngineEvent, now_ms: u64) -> EngineResult<()> {
        match event {
            EngineEvent::PeerFrame(frame) => self.handle_frame(&frame, now_ms),
            EngineEvent::TimerExpired(kind) => self.handle_timer(kind, now_ms),
            EngineEvent::RoleAssigned(role) => self.assign_role(role, now_ms),
            EngineEvent::TransportDown => {
                self.on_disconnect();
                Ok(())
            }
            EngineEvent::LocalMutation { operation, entity } => {
                self.local_mutation(operation, entity).map(|_| ())
            }
        }
    }

    fn pump_transport(&mut self) {
        loop {
            match self.transport.recv() {
                Ok(Some(frame)) => self.mailbox.post(EngineEvent::PeerFrame(frame)),
                Ok(None) => break,
                Err(_) => {
                    self.mailbox.post(EngineEvent::TransportDown);
                    break;
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: &[u8], now_ms: u64) -> EngineResult<()> {
        // Frames drained from the transport before the disconnect was
        // observed are stale; the session is already torn down.
        if !self.connected {
            return Ok(());
        }
        let version = self.version.ok_or(EngineError::NotNegotiated)?;
        let (_, message) = match CheckpointMessage::decode(frame) {
            Ok(decoded) => decoded,
            Err(err) => {
                // A frame that fails its checksum is dropped; sequence
                // numbering turns the loss into a recoverable gap.
                Logger::warn("FRAME_REJECTED", &[("error", &err.to_string())]);
                return Ok(());
            }
        };

        match &mut self.side {
            Side::Idle => Ok(()),
            Side::Active(state) => {
                if let CheckpointMessage::UpdateAck { up_to } = message {
                    state.queue.purge_acknowledged(up_to);
                    state.saved.prune(up_to);
                    self.check_quiesce_drained();
                    return Ok(());
                }
                let serving_gap = matches!(message, CheckpointMessage::DataReq { .. });
                match state.session.handle_message(
                    message,
                    &self.store,
                    &mut state.saved,
                    &state.counts,
                    state.queue.next_sequence(),
                ) {
                    Ok(replies) => {
                        if serving_gap {
                            log_event_with_fields(Event::GapRecovered, &[("role", "active")]);
                        }
                        let frames: Vec<Vec<u8>> =
                            replies.iter().map(|m| m.encode(version)).collect();
                        for frame in frames {
                            self.send_frame(&frame);
                        }
                        Ok(())
                    }
                    Err(err) => Self::swallow_unexpected(err),
                }
            }
            Side::Standby(session) => {
                let was_digest = matches!(message, CheckpointMessage::WarmSyncResp { .. });
                let was_update = matches!(
                    message,
                    CheckpointMessage::AsyncUpdate { .. } | CheckpointMessage::DataResp { .. }
                );
                let outcome = match session.handle_message(message, &mut self.store) {
                    Ok(outcome) => outcome,
                    Err(err) => return Self::swallow_unexpected(err),
                };

                if outcome.synced {
                    log_event_with_fields(
                        Event::ColdSyncComplete,
                        &[("records", &self.store.len().to_string())],
                    );
                }
                if was_digest {
                    if outcome.resync_forced {
                        log_event_with_fields(Event::WarmSyncMismatch, &[("role", "standby")]);
                    } else {
                        log_event_with_fields(Event::WarmSyncMatch, &[("role", "standby")]);
                    }
                } else if outcome.resync_forced {
                    log_event_with_fields(Event::ColdSyncRestart, &[("role", "standby")]);
                }
                if outcome.duplicate {
                    Logger::trace(Event::UpdateDuplicate.as_str(), &[]);
                } else if was_update {
                    if let Some(up_to) = outcome.ack_up_to {
                        Logger::trace(
                            Event::UpdateApplied.as_str(),
                            &[("up_to", &up_to.to_string())],
                        );
                    }
                }
                let sent_data_req = outcome
                    .replies
                    .iter()
                    .any(|m| matches!(m, CheckpointMessage::DataReq { .. }));
                if sent_data_req {
                    log_event_with_fields(
                        Event::GapDetected,
                        &[("expected", &session.expected_sequence().to_string())],
                    );
                }

                let frames: Vec<Vec<u8>> = outcome
                    .replies
                    .iter()
                    .map(|m| m.encode(version))
                    .collect();
                for frame in frames {
                    self.send_frame(&frame);
                }
                if let Some(up_to) = outcome.ack_up_to {
                    let ack = CheckpointMessage::UpdateAck { up_to }.encode(version);
                    self.send_frame(&ack);
                    self.timers.stop(TimerKind::DataResponse);
                }
                if sent_data_req {
                    self.timers.start(
                        TimerKind::DataResponse,
                        now_ms,
                        self.config.chunk_timeout_ms,
                    );
                }
                self.reconcile_standby_timers(now_ms);
                Ok(())
            }
        }
    }

    /// Unexpected messages are dropped with a warning; everything else
    /// propagates.
    fn swallow_unexpected(err: SessionError) -> EngineResult<()> {
        if let SessionError::UnexpectedMessage { .. } = err {
            Logger::warn("MESSAGE_DROPPED", &[("error", &err.to_string())]);
            Ok(())
        } else {
            if err.is_fatal() {
                log_event_with_fields(Event::InvariantViolated, &[("error", &err.to_string())]);
            }
            Err(err.into())
        }
    }

    fn handle_timer(&mut self, kind: TimerKind, now_ms: u64) -> EngineResult<()> {
        let version = self.version.ok_or(EngineError::NotNegotiated)?;
        let session = match &mut self.side {
            Side::Standby(session) => session,
            // Active-side pacing has no timers; it is purely reactive.
            _ => return Ok(()),
        };

        match kind {
            TimerKind::WarmSyncSend => {
                if !self.config.warm_sync_enabled || !session.state().is_in_sync() {
                    return Ok(());
                }
                let request = session.start_warm_sync()?;
                log_event_with_fields(Event::WarmSyncStart, &[("role", "standby")]);
                let frame = request.encode(version);
                self.send_frame(&frame);
                self.timers.start(
                    TimerKind::WarmSyncComplete,
                    now_ms,
                    self.config.chunk_timeout_ms,
                );
            }
            TimerKind::ColdSyncRequest
            | TimerKind::ColdSyncComplete
            | TimerKind::WarmSyncComplete
            | TimerKind::DataResponse => {
                // The exchange stalled; start over from a clean request.
                log_event_with_fields(
                    Event::ColdSyncRestart,
                    &[("timer", kind.timer_name())],
                );
                let request = session.force_resync()?;
                let frame = request.encode(version);
                self.send_frame(&frame);
                self.timers.stop_all();
                self.timers.start(
                    TimerKind::ColdSyncRequest,
                    now_ms,
                    self.config.chunk_timeout_ms,
                );
            }
        }
        Ok(())
    }

    /// Keep the standby timer set consistent with the session state.
    fn reconcile_standby_timers(&mut self, now_ms: u64) {
        let state = match &self.side {
            Side::Standby(session) => session.state(),
            _ => return,
        };
        match state {
            SyncState::ColdSyncRequested => {
                self.timers.stop(TimerKind::ColdSyncComplete);
                self.timers.stop(TimerKind::WarmSyncSend);
                self.timers.stop(TimerKind::WarmSyncComplete);
                if !self.timers.is_armed(TimerKind::ColdSyncRequest) {
                    self.timers.start(
                        TimerKind::ColdSyncRequest,
                        now_ms,
                        self.config.chunk_timeout_ms,
                    );
                }
            }
            SyncState::ColdSyncInProgress => {
                self.timers.stop(TimerKind::ColdSyncRequest);
                // Each chunk restarts the completion deadline.
                self.timers.start(
                    TimerKind::ColdSyncComplete,
                    now_ms,
                    self.config.chunk_timeout_ms,
                );
            }
            SyncState::InSync => {
                self.timers.stop(TimerKind::ColdSyncRequest);
                self.timers.stop(TimerKind::ColdSyncComplete);
                self.timers.stop(TimerKind::WarmSyncComplete);
                if self.config.warm_sync_enabled
                    && !self.timers.is_armed(TimerKind::WarmSyncSend)
                {
                    self.timers.start(
                        TimerKind::WarmSyncSend,
                        now_ms,
                        self.config.warm_sync_interval_ms,
                    );
                }
            }
            SyncState::WarmSyncInProgress
            | SyncState::Uninitialized
            | SyncState::Disconnected
            | SyncState::RoleChanging => {}
        }
    }

    /// Quiescing completes once every queued update is acknowledged.
    fn check_quiesce_drained(&mut self) {
        if self.roles.role() != HaRole::Quiescing {
            return;
        }
        let drained = matches!(&self.side, Side::Active(state) if state.queue.is_empty());
        if drained {
            if self.roles.assign(HaRole::Quiesced).is_ok() {
                log_event_with_fields(Event::QuiesceComplete, &[("role", "quiesced")]);
            }
        }
    }

    fn send_frame(&mut self, frame: &[u8]) {
        if !self.connected {
            return;
        }
        if self.transport.send(frame).is_err() {
            self.on_disconnect();
        }
    }

    fn on_disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        self.timers.stop_all();
        match &mut self.side {
            Side::Idle => {}
            Side::Active(state) => state.session.on_disconnect(),
            Side::Standby(session) => session.on_disconnect(),
        }
        log_event_with_fields(
            Event::PeerDisconnected,
            &[("role", self.roles.role().role_name())],
        );
    }
}
