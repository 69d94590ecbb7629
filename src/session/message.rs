//! Checkpoint Wire Messages
//!
//! Per WIRE_FORMAT.md §4, every frame is:
//!
//! ```text
//! [frame length u32 LE] [sub-part version u16 LE] [message type u8]
//! [body ...] [crc32 u32 LE]
//! ```
//!
//! The checksum covers everything before it, including the length field.
//! The message set mirrors the sync protocol round-trips: cold sync
//! request/response/complete, warm sync request/response, incremental
//! async updates with acks, and the data request/response pair used for
//! gap recovery.

use crate::codec::{
    put_bytes, CodecError, CodecResult, EntityKind, FieldReader, SubPartVersion, VersionRange,
    SUB_PART_VERSION_CURRENT, SUB_PART_VERSION_MIN,
};
use crate::queue::{AsyncUpdateCounts, AsyncUpdateRecord, UpdateOperation};

/// Wire tag of each checkpoint message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum MessageType {
    ColdSyncReq = 1,
    ColdSyncResp = 2,
    ColdSyncComplete = 3,
    WarmSyncReq = 4,
    WarmSyncResp = 5,
    AsyncUpdate = 6,
    DataReq = 7,
    DataResp = 8,
    DataRespComplete = 9,
    UpdateAck = 10,
}

impl MessageType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MessageType::ColdSyncReq),
            2 => Some(MessageType::ColdSyncResp),
            3 => Some(MessageType::ColdSyncComplete),
            4 => Some(MessageType::WarmSyncReq),
            5 => Some(MessageType::WarmSyncResp),
            6 => Some(MessageType::AsyncUpdate),
            7 => Some(MessageType::DataReq),
            8 => Some(MessageType::DataResp),
            9 => Some(MessageType::DataRespComplete),
            10 => Some(MessageType::UpdateAck),
            _ => None,
        }
    }
}

/// One checkpoint protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointMessage {
    /// Standby asks the active for a full state transfer.
    ColdSyncReq,

    /// One snapshot chunk: every record of one kind, codec-encoded at
    /// the session version.
    ColdSyncResp {
        kind: EntityKind,
        records: Vec<Vec<u8>>,
    },

    /// Terminates the cold-sync stream. Carries the active's counters
    /// (adopted by the standby) and the sequence number the first
    /// post-snapshot async update will carry.
    ColdSyncComplete {
        counts: AsyncUpdateCounts,
        next_sequence: u64,
    },

    /// Standby asks the active for its digest.
    WarmSyncReq,

    /// Active's counter digest.
    WarmSyncResp { counts: AsyncUpdateCounts },

    /// One incremental change notification.
    AsyncUpdate { record: AsyncUpdateRecord },

    /// Standby asks for retransmission of an exact sequence range.
    DataReq { from: u64, to: u64 },

    /// Retransmitted updates, in sequence order.
    DataResp { records: Vec<AsyncUpdateRecord> },

    /// Terminates a data response; `up_to` is the last sequence the
    /// active could serve.
    DataRespComplete { up_to: u64 },

    /// Standby acknowledges application of everything up to `up_to`.
    UpdateAck { up_to: u64 },
}

impl CheckpointMessage {
    /// Stable name for logging and unexpected-message errors.
    pub fn name(&self) -> &'static str {
        match self {
            CheckpointMessage::ColdSyncReq => "cold_sync_req",
            CheckpointMessage::ColdSyncResp { .. } => "cold_sync_resp",
            CheckpointMessage::ColdSyncComplete { .. } => "cold_sync_complete",
            CheckpointMessage::WarmSyncReq => "warm_sync_req",
            CheckpointMessage::WarmSyncResp { .. } => "warm_sync_resp",
            CheckpointMessage::AsyncUpdate { .. } => "async_update",
            CheckpointMessage::DataReq { .. } => "data_req",
            CheckpointMessage::DataResp { .. } => "data_resp",
            CheckpointMessage::DataRespComplete { .. } => "data_resp_complete",
            CheckpointMessage::UpdateAck { .. } => "update_ack",
        }
    }

    fn message_type(&self) -> MessageType {
        match self {
            CheckpointMessage::ColdSyncReq => MessageType::ColdSyncReq,
            CheckpointMessage::ColdSyncResp { .. } => MessageType::ColdSyncResp,
            CheckpointMessage::ColdSyncComplete { .. } => MessageType::ColdSyncComplete,
            CheckpointMessage::WarmSyncReq => MessageType::WarmSyncReq,
            CheckpointMessage::WarmSyncResp { .. } => MessageType::WarmSyncResp,
            CheckpointMessage::AsyncUpdate { .. } => MessageType::AsyncUpdate,
            CheckpointMessage::DataReq { .. } => MessageType::DataReq,
            CheckpointMessage::DataResp { .. } => MessageType::DataResp,
            CheckpointMessage::DataRespComplete { .. } => MessageType::DataRespComplete,
            CheckpointMessage::UpdateAck { .. } => MessageType::UpdateAck,
        }
    }

    fn encode_body(&self, buf: &mut Vec<u8>) {
        match self {
            CheckpointMessage::ColdSyncReq | CheckpointMessage::WarmSyncReq => {}
            CheckpointMessage::ColdSyncResp { kind, records } => {
                buf.push(kind.as_u8());
                buf.extend_from_slice(&(records.len() as u32).to_le_bytes());
                for record in records {
                    put_bytes(buf, record);
                }
            }
            CheckpointMessage::ColdSyncComplete {
                counts,
                next_sequence,
            } => {
                encode_counts(buf, counts);
                buf.extend_from_slice(&next_sequence.to_le_bytes());
            }
            CheckpointMessage::WarmSyncResp { counts } => {
                encode_counts(buf, counts);
            }
            CheckpointMessage::AsyncUpdate { record } => {
                encode_record(buf, record);
            }
            CheckpointMessage::DataReq { from, to } => {
                buf.extend_from_slice(&from.to_le_bytes());
                buf.extend_from_slice(&to.to_le_bytes());
            }
            CheckpointMessage::DataResp { records } => {
                buf.extend_from_slice(&(records.len() as u32).to_le_bytes());
                for record in records {
                    encode_record(buf, record);
                }
            }
            CheckpointMessage::DataRespComplete { up_to }
            | CheckpointMessage::UpdateAck { up_to } => {
                buf.extend_from_slice(&up_to.to_le_bytes());
            }
        }
    }

    /// Encode a complete frame at the session version.
    pub fn encode(&self, version: SubPartVersion) -> Vec<u8> {
        let mut body = Vec::with_capacity(64);
        self.encode_body(&mut body);

        // length + version + type + body + checksum
        let frame_len = (4 + 2 + 1 + body.len() + 4) as u32;

        let mut frame = Vec::with_capacity(frame_len as usize);
        frame.extend_from_slice(&frame_len.to_le_bytes());
        frame.extend_from_slice(&version.get().to_le_bytes());
        frame.push(self.message_type() as u8);
        frame.extend_from_slice(&body);

        let checksum = crc32fast::hash(&frame);
        frame.extend_from_slice(&checksum.to_le_bytes());
        frame
    }

    /// Decode a frame, verifying length, checksum and version range.
    pub fn decode(data: &[u8]) -> CodecResult<(SubPartVersion, CheckpointMessage)> {
        const HEADER_LEN: usize = 4 + 2 + 1;
        const MIN_FRAME: usize = HEADER_LEN + 4;

        let short = || CodecError::MalformedPayload {
            version: SUB_PART_VERSION_CURRENT.get(),
        };

        if data.len() < MIN_FRAME {
            return Err(short());
        }

        let frame_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if frame_len < MIN_FRAME || data.len() < frame_len {
            return Err(short());
        }

        let checksum_offset = frame_len - 4;
        let stored = u32::from_le_bytes([
            data[checksum_offset],
            data[checksum_offset + 1],
            data[checksum_offset + 2],
            data[checksum_offset + 3],
        ]);
        let computed = crc32fast::hash(&data[..checksum_offset]);
        if computed != stored {
            return Err(CodecError::ChecksumMismatch { computed, stored });
        }

        let version = SubPartVersion::new(u16::from_le_bytes([data[4], data[5]]));
        if !VersionRange::SUPPORTED.contains(version) {
            return Err(CodecError::UnsupportedVersion {
                version: version.get(),
                min: SUB_PART_VERSION_MIN.get(),
                max: SUB_PART_VERSION_CURRENT.get(),
            });
        }

        let type_tag = data[6];
        let message_type =
            MessageType::from_u8(type_tag).ok_or(CodecError::UnknownMessageType(type_tag))?;

        let mut reader = FieldReader::new(&data[HEADER_LEN..checksum_offset], version);
        let message = match message_type {
            MessageType::ColdSyncReq => CheckpointMessage::ColdSyncReq,
            MessageType::WarmSyncReq => CheckpointMessage::WarmSyncReq,
            MessageType::ColdSyncResp => {
                let kind_tag = reader.read_u8()?;
                let kind = EntityKind::from_u8(kind_tag)
                    .ok_or(CodecError::UnknownEntityKind(kind_tag))?;
                let count = reader.read_u32()? as usize;
                let mut records = Vec::with_capacity(count);
                for _ in 0..count {
                    records.push(reader.read_bytes()?);
                }
                CheckpointMessage::ColdSyncResp { kind, records }
            }
            MessageType::ColdSyncComplete => CheckpointMessage::ColdSyncComplete {
                counts: decode_counts(&mut reader)?,
                next_sequence: reader.read_u64()?,
            },
            MessageType::WarmSyncResp => CheckpointMessage::WarmSyncResp {
                counts: decode_counts(&mut reader)?,
            },
            MessageType::AsyncUpdate => CheckpointMessage::AsyncUpdate {
                record: decode_record(&mut reader)?,
            },
            MessageType::DataReq => CheckpointMessage::DataReq {
                from: reader.read_u64()?,
                to: reader.read_u64()?,
            },
            MessageType::DataResp => {
                let count = reader.read_u32()? as usize;
                let mut records = Vec::with_capacity(count);
                for _ in 0..count {
                    records.push(decode_record(&mut reader)?);
                }
                CheckpointMessage::DataResp { records }
            }
            MessageType::DataRespComplete => CheckpointMessage::DataRespComplete {
                up_to: reader.read_u64()?,
            },
            MessageType::UpdateAck => CheckpointMessage::UpdateAck {
                up_to: reader.read_u64()?,
            },
        };

        Ok((version, message))
    }
}

fn encode_counts(buf: &mut Vec<u8>, counts: &AsyncUpdateCounts) {
    for value in counts.as_array() {
        buf.extend_from_slice(&value.to_le_bytes());
    }
}

fn decode_counts(reader: &mut FieldReader<'_>) -> CodecResult<AsyncUpdateCounts> {
    let mut values = [0u32; 10];
    for slot in values.iter_mut() {
        *slot = reader.read_u32()?;
    }
    Ok(AsyncUpdateCounts::from_array(values))
}

fn encode_record(buf: &mut Vec<u8>, record: &AsyncUpdateRecord) {
    buf.extend_from_slice(&record.sequence.to_le_bytes());
    buf.push(record.kind.as_u8());
    buf.push(record.operation.as_u8());
    put_bytes(buf, &record.payload);
}

fn decode_record(reader: &mut FieldReader<'_>) -> CodecResult<AsyncUpdateRecord> {
    let sequence = reader.read_u64()?;
    let kind_tag = reader.read_u8()?;
    let kind = EntityKind::from_u8(kind_tag).ok_or(CodecError::UnknownEntityKind(kind_tag))?;
    let op_tag = reader.read_u8()?;
    let operation = UpdateOperation::from_u8(op_tag).ok_or(CodecError::UnknownOperation(op_tag))?;
    let payload = reader.read_bytes()?;
    Ok(AsyncUpdateRecord {
        kind,
        operation,
        payload,
        sequence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v() -> SubPartVersion {
        SUB_PART_VERSION_CURRENT
    }

    fn sample_record(sequence: u64) -> AsyncUpdateRecord {
        AsyncUpdateRecord {
            kind: EntityKind::ServiceUnit,
            operation: UpdateOperation::Modify,
            payload: vec![1, 2, 3, 4],
            sequence,
        }
    }

    fn roundtrip(message: CheckpointMessage) {
        let frame = message.encode(v());
        let (version, decoded) = CheckpointMessage::decode(&frame).unwrap();
        assert_eq!(version, v());
        assert_eq!(message, decoded);
    }

    #[test]
    fn test_frame_roundtrip_every_message() {
        let mut counts = AsyncUpdateCounts::new();
        counts.record(EntityKind::Node);
        counts.record(EntityKind::Ccb);

        roundtrip(CheckpointMessage::ColdSyncReq);
        roundtrip(CheckpointMessage::ColdSyncResp {
            kind: EntityKind::Component,
            records: vec![vec![9, 9], vec![]],
        });
        roundtrip(CheckpointMessage::ColdSyncComplete {
            counts,
            next_sequence: 17,
        });
        roundtrip(CheckpointMessage::WarmSyncReq);
        roundtrip(CheckpointMessage::WarmSyncResp { counts });
        roundtrip(CheckpointMessage::AsyncUpdate {
            record: sample_record(5),
        });
        roundtrip(CheckpointMessage::DataReq { from: 3, to: 3 });
        roundtrip(CheckpointMessage::DataResp {
            records: vec![sample_record(3), sample_record(4)],
        });
        roundtrip(CheckpointMessage::DataRespComplete { up_to: 4 });
        roundtrip(CheckpointMessage::UpdateAck { up_to: 4 });
    }

    #[test]
    fn test_corrupted_frame_rejected() {
        let mut frame = CheckpointMessage::DataReq { from: 1, to: 2 }.encode(v());
        let mid = frame.len() / 2;
        frame[mid] ^= 0xFF;

        assert!(matches!(
            CheckpointMessage::decode(&frame),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let frame = CheckpointMessage::WarmSyncReq.encode(v());
        assert!(CheckpointMessage::decode(&frame[..frame.len() - 2]).is_err());
    }

    #[test]
    fn test_out_of_range_version_rejected() {
        let mut frame = CheckpointMessage::ColdSyncReq.encode(v());
        // Rewrite the version field and fix up the checksum.
        frame[4] = 0xFF;
        frame[5] = 0x00;
        let body_end = frame.len() - 4;
        let checksum = crc32fast::hash(&frame[..body_end]);
        frame[body_end..].copy_from_slice(&checksum.to_le_bytes());

        assert!(matches!(
            CheckpointMessage::decode(&frame),
            Err(CodecError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_frame_carries_negotiated_version() {
        let frame = CheckpointMessage::ColdSyncReq.encode(SubPartVersion::new(3));
        let (version, _) = CheckpointMessage::decode(&frame).unwrap();
        assert_eq!(version, SubPartVersion::new(3));
    }
}
