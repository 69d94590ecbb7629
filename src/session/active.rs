//! Active-Side Checkpoint Session
//!
//! The active replica is reactive: it answers cold-sync requests with a
//! per-kind snapshot stream, answers warm-sync requests with its counter
//! digest, and serves gap-recovery data requests out of the sent-message
//! log. Async updates themselves are pushed by the engine as mutations
//! happen; this type only tracks the protocol state of the channel.

use super::errors::{SessionError, SessionResult};
use super::message::CheckpointMessage;
use super::state::SyncState;
use crate::codec::{self, EntityKind, SubPartVersion};
use crate::queue::{AsyncUpdateCounts, SavedMessageLog};
use crate::store::ObjectStore;

/// Protocol driver for the active side of one replication channel.
#[derive(Debug)]
pub struct ActiveSession {
    version: SubPartVersion,
    state: SyncState,
    suspended_from: Option<SyncState>,
}

impl ActiveSession {
    /// New channel at the negotiated sub-part version.
    pub fn new(version: SubPartVersion) -> Self {
        Self {
            version,
            state: SyncState::Uninitialized,
            suspended_from: None,
        }
    }

    pub fn version(&self) -> SubPartVersion {
        self.version
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// React to one peer message, producing the frames to send back.
    ///
    /// `next_sequence` is the sequence the next locally generated update
    /// will carry; it terminates the cold-sync stream so the standby
    /// knows where incremental updates resume.
    pub fn handle_message(
        &mut self,
        message: CheckpointMessage,
        store: &dyn ObjectStore,
        saved: &mut SavedMessageLog,
        counts: &AsyncUpdateCounts,
        next_sequence: u64,
    ) -> SessionResult<Vec<CheckpointMessage>> {
        match message {
            CheckpointMessage::ColdSyncReq => {
                self.state = self.state.transition(SyncState::ColdSyncRequested)?;
                self.state = self.state.transition(SyncState::ColdSyncInProgress)?;
                let stream = self.snapshot_stream(store, counts, next_sequence)?;
                self.state = self.state.transition(SyncState::InSync)?;
                Ok(stream)
            }
            CheckpointMessage::WarmSyncReq => {
                Ok(vec![CheckpointMessage::WarmSyncResp { counts: *counts }])
            }
            CheckpointMessage::DataReq { from, to } => {
                match saved.range(from, to) {
                    Some(records) => Ok(vec![
                        CheckpointMessage::DataResp { records },
                        CheckpointMessage::DataRespComplete { up_to: to },
                    ]),
                    // Range already pruned: the snapshot subsumes it.
                    None => {
                        self.state = self.state.transition(SyncState::ColdSyncRequested)?;
                        self.state = self.state.transition(SyncState::ColdSyncInProgress)?;
                        let stream = self.snapshot_stream(store, counts, next_sequence)?;
                        self.state = self.state.transition(SyncState::InSync)?;
                        Ok(stream)
                    }
                }
            }
            // Acks mutate the queue and the sent-message log, which the
            // engine owns; the channel state does not change.
            CheckpointMessage::UpdateAck { .. } => Ok(Vec::new()),
            other => Err(SessionError::UnexpectedMessage {
                state: self.state,
                message: other.name(),
            }),
        }
    }

    /// Per-kind snapshot chunks plus the completion marker.
    fn snapshot_stream(
        &self,
        store: &dyn ObjectStore,
        counts: &AsyncUpdateCounts,
        next_sequence: u64,
    ) -> SessionResult<Vec<CheckpointMessage>> {
        let mut stream = Vec::new();
        for kind in EntityKind::ALL {
            // Kinds newer than the negotiated version never hit the wire.
            if self.version < kind.min_version() {
                continue;
            }
            let entities = store.enumerate(kind);
            if entities.is_empty() {
                continue;
            }
            let mut records = Vec::with_capacity(entities.len());
            for entity in &entities {
                records.push(codec::encode(entity, self.version)?);
            }
            stream.push(CheckpointMessage::ColdSyncResp { kind, records });
        }
        stream.push(CheckpointMessage::ColdSyncComplete {
            counts: *counts,
            next_sequence,
        });
        Ok(stream)
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
    }
}
