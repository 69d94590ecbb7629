//! Versioned Checkpoint Codec
//!
//! Per WIRE_FORMAT.md §3:
//! - Records are encoded little-endian with length-prefixed strings
//! - The session sub-part version gates which fields appear on the wire
//! - Decode ignores unknown trailing bytes (fields added by newer
//!   versions), it never errors on them
//! - Decode fails with MalformedPayload when the stream is shorter than
//!   the version's fixed field set
//!
//! Dispatch is a single match over the closed [`EntityKind`] set. There is
//! one encoder and one decoder per kind, not a table of function pointers.

mod entity;
mod errors;
mod version;

pub use entity::{
    AdminOwnerRecord, ApplicationRecord, CcbRecord, ComponentRecord, CsiAssignmentRecord,
    EntityKind, NodeRecord, ReplicatedEntity, ServiceGroupRecord, ServiceInstanceRecord,
    ServiceUnitRecord, SiTransferRecord,
};
pub use errors::{CodecError, CodecResult};
pub use version::{
    negotiate, SubPartVersion, VersionError, VersionRange, SUB_PART_VERSION_CURRENT,
    SUB_PART_VERSION_MIN,
};

/// Append a length-prefixed string field.
pub(crate) fn put_str(buf: &mut Vec<u8>, value: &str) {
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(value.as_bytes());
}

/// Append length-prefixed raw bytes.
pub(crate) fn put_bytes(buf: &mut Vec<u8>, value: &[u8]) {
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(value);
}

/// Sequential field reader over a record payload.
///
/// Short reads map to `MalformedPayload` tagged with the version being
/// decoded, so the session can log which wire format was in play.
pub(crate) struct FieldReader<'a> {
    data: &'a [u8],
    pos: usize,
    version: u16,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(data: &'a [u8], version: SubPartVersion) -> Self {
        Self {
            data,
            pos: 0,
            version: version.get(),
        }
    }

    fn short(&self) -> CodecError {
        CodecError::MalformedPayload {
            version: self.version,
        }
    }

    fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or_else(|| self.short())?;
        if end > self.data.len() {
            return Err(self.short());
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_bool(&mut self) -> CodecResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub(crate) fn read_u32(&mut self) -> CodecResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn read_u64(&mut self) -> CodecResult<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub(crate) fn read_string(&mut self) -> CodecResult<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidString)
    }

    pub(crate) fn read_bytes(&mut self) -> CodecResult<Vec<u8>> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

fn check_version(kind: EntityKind, version: SubPartVersion) -> CodecResult<()> {
    if !VersionRange::SUPPORTED.contains(version) {
        return Err(CodecError::UnsupportedVersion {
            version: version.get(),
            min: SUB_PART_VERSION_MIN.get(),
            max: SUB_PART_VERSION_CURRENT.get(),
        });
    }
    if version < kind.min_version() {
        return Err(CodecError::UnsupportedVersion {
            version: version.get(),
            min: kind.min_version().get(),
            max: SUB_PART_VERSION_CURRENT.get(),
        });
    }
    Ok(())
}

/// Encode a replicated record at the session sub-part version.
///
/// The payload is self-describing: the kind tag leads, fields follow.
/// Fields introduced after `version` are omitted, which is what lets an
/// upgraded active feed a not-yet-upgraded standby.
pub fn encode(entity: &ReplicatedEntity, version: SubPartVersion) -> CodecResult<Vec<u8>> {
    check_version(entity.kind(), version)?;

    let mut buf = Vec::with_capacity(64);
    buf.push(entity.kind().as_u8());

    match entity {
        ReplicatedEntity::Node(r) => {
            put_str(&mut buf, &r.name);
            buf.extend_from_slice(&r.node_id.to_le_bytes());
            buf.push(r.oper_state);
        }
        ReplicatedEntity::Application(r) => {
            put_str(&mut buf, &r.name);
            buf.push(r.admin_state);
        }
        ReplicatedEntity::ServiceGroup(r) => {
            put_str(&mut buf, &r.name);
            buf.push(r.redundancy_model);
            buf.push(r.admin_state);
        }
        ReplicatedEntity::ServiceUnit(r) => {
            put_str(&mut buf, &r.name);
            buf.extend_from_slice(&r.rank.to_le_bytes());
            buf.push(r.oper_state);
        }
        ReplicatedEntity::ServiceInstance(r) => {
            put_str(&mut buf, &r.name);
            buf.extend_from_slice(&r.rank.to_le_bytes());
            buf.push(r.admin_state);
        }
        ReplicatedEntity::Component(r) => {
            put_str(&mut buf, &r.name);
            buf.push(r.capability);
            buf.extend_from_slice(&r.restart_count.to_le_bytes());
        }
        ReplicatedEntity::CsiAssignment(r) => {
            put_str(&mut buf, &r.su_name);
            put_str(&mut buf, &r.si_name);
            buf.push(r.ha_state);
            buf.extend_from_slice(&r.fsm_state.to_le_bytes());
            // CSI add/remove detail exists on the wire from v3 on
            if version.get() >= 3 {
                buf.push(u8::from(r.csi_add_rem));
                put_str(&mut buf, &r.comp_name);
                put_str(&mut buf, &r.csi_name);
            }
        }
        ReplicatedEntity::SiTransfer(r) => {
            put_str(&mut buf, &r.sg_name);
            put_str(&mut buf, &r.si_name);
            put_str(&mut buf, &r.min_su_name);
            put_str(&mut buf, &r.max_su_name);
        }
        ReplicatedEntity::AdminOwner(r) => {
            put_str(&mut buf, &r.name);
            buf.extend_from_slice(&r.owner_id.to_le_bytes());
            buf.push(u8::from(r.release_on_finalize));
        }
        ReplicatedEntity::Ccb(r) => {
            buf.extend_from_slice(&r.ccb_id.to_le_bytes());
            buf.extend_from_slice(&r.admin_owner_id.to_le_bytes());
            buf.push(r.state);
        }
    }

    Ok(buf)
}

/// Decode a replicated record at the session sub-part version.
///
/// Fields the tagged version does not carry decode to their defaults.
/// Trailing bytes beyond the known field set are dropped, not errored.
pub fn decode(payload: &[u8], version: SubPartVersion) -> CodecResult<ReplicatedEntity> {
    let mut reader = FieldReader::new(payload, version);
    let tag = reader.read_u8()?;
    let kind = EntityKind::from_u8(tag).ok_or(CodecError::UnknownEntityKind(tag))?;
    check_version(kind, version)?;

    let entity = match kind {
        EntityKind::Node => ReplicatedEntity::Node(NodeRecord {
            name: reader.read_string()?,
            node_id: reader.read_u32()?,
            oper_state: reader.read_u8()?,
        }),
        EntityKind::Application => ReplicatedEntity::Application(ApplicationRecord {
            name: reader.read_string()?,
            admin_state: reader.read_u8()?,
        }),
        EntityKind::ServiceGroup => ReplicatedEntity::ServiceGroup(ServiceGroupRecord {
            name: reader.read_string()?,
            redundancy_model: reader.read_u8()?,
            admin_state: reader.read_u8()?,
        }),
        EntityKind::ServiceUnit => ReplicatedEntity::ServiceUnit(ServiceUnitRecord {
            name: reader.read_string()?,
            rank: reader.read_u32()?,
            oper_state: reader.read_u8()?,
        }),
        EntityKind::ServiceInstance => ReplicatedEntity::ServiceInstance(ServiceInstanceRecord {
            name: reader.read_string()?,
            rank: reader.read_u32()?,
            admin_state: reader.read_u8()?,
        }),
        EntityKind::Component => ReplicatedEntity::Component(ComponentRecord {
            name: reader.read_string()?,
            capability: reader.read_u8()?,
            restart_count: reader.read_u32()?,
        }),
        EntityKind::CsiAssignment => {
            let su_name = reader.read_string()?;
            let si_name = reader.read_string()?;
            let ha_state = reader.read_u8()?;
            let fsm_state = reader.read_u32()?;
            let (csi_add_rem, comp_name, csi_name) = if version.get() >= 3 {
                (
                    reader.read_bool()?,
                    reader.read_string()?,
                    reader.read_string()?,
                )
            } else {
                (false, String::new(), String::new())
            };
            ReplicatedEntity::CsiAssignment(CsiAssignmentRecord {
                su_name,
                si_name,
                ha_state,
                fsm_state,
                csi_add_rem,
                comp_name,
                csi_name,
            })
        }
        EntityKind::SiTransfer => ReplicatedEntity::SiTransfer(SiTransferRecord {
            sg_name: reader.read_string()?,
            si_name: reader.read_string()?,
            min_su_name: reader.read_string()?,
            max_su_name: reader.read_string()?,
        }),
        EntityKind::AdminOwner => ReplicatedEntity::AdminOwner(AdminOwnerRecord {
            name: reader.read_string()?,
            owner_id: reader.read_u32()?,
            release_on_finalize: reader.read_bool()?,
        }),
        EntityKind::Ccb => ReplicatedEntity::Ccb(CcbRecord {
            ccb_id: reader.read_u32()?,
            admin_owner_id: reader.read_u32()?,
            state: reader.read_u8()?,
        }),
    };

    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entities() -> Vec<ReplicatedEntity> {
        vec![
            ReplicatedEntity::Node(NodeRecord {
                name: "PL-3".to_string(),
                node_id: 0x2030f,
                oper_state: 1,
            }),
            ReplicatedEntity::Application(ApplicationRecord {
                name: "app1".to_string(),
                admin_state: 1,
            }),
            ReplicatedEntity::ServiceGroup(ServiceGroupRecord {
                name: "sg-2n".to_string(),
                redundancy_model: 2,
                admin_state: 1,
            }),
            ReplicatedEntity::ServiceUnit(ServiceUnitRecord {
                name: "su1".to_string(),
                rank: 1,
                oper_state: 1,
            }),
            ReplicatedEntity::ServiceInstance(ServiceInstanceRecord {
                name: "si1".to_string(),
                rank: 2,
                admin_state: 1,
            }),
            ReplicatedEntity::Component(ComponentRecord {
                name: "comp1".to_string(),
                capability: 3,
                restart_count: 0,
            }),
            ReplicatedEntity::AdminOwner(AdminOwnerRecord {
                name: "owner1".to_string(),
                owner_id: 7,
                release_on_finalize: true,
            }),
            ReplicatedEntity::Ccb(CcbRecord {
                ccb_id: 42,
                admin_owner_id: 7,
                state: 1,
            }),
        ]
    }

    #[test]
    fn test_roundtrip_all_kinds_at_current_version() {
        for entity in sample_entities() {
            let bytes = encode(&entity, SUB_PART_VERSION_CURRENT).unwrap();
            let decoded = decode(&bytes, SUB_PART_VERSION_CURRENT).unwrap();
            assert_eq!(entity, decoded);
        }
    }

    #[test]
    fn test_roundtrip_all_supported_versions() {
        for v in 1..=SUB_PART_VERSION_CURRENT.get() {
            let version = SubPartVersion::new(v);
            for entity in sample_entities() {
                let bytes = encode(&entity, version).unwrap();
                let decoded = decode(&bytes, version).unwrap();
                assert_eq!(entity, decoded, "kind {:?} at {}", entity.kind(), version);
            }
        }
    }

    #[test]
    fn test_assignment_detail_dropped_below_v3() {
        let full = ReplicatedEntity::CsiAssignment(CsiAssignmentRecord {
            su_name: "su1".to_string(),
            si_name: "si1".to_string(),
            ha_state: 1,
            fsm_state: 2,
            csi_add_rem: true,
            comp_name: "comp1".to_string(),
            csi_name: "csi1".to_string(),
        });

        let bytes = encode(&full, SubPartVersion::new(2)).unwrap();
        let decoded = decode(&bytes, SubPartVersion::new(2)).unwrap();

        match decoded {
            ReplicatedEntity::CsiAssignment(r) => {
                assert_eq!(r.su_name, "su1");
                assert_eq!(r.fsm_state, 2);
                // detail fields do not exist before v3
                assert!(!r.csi_add_rem);
                assert!(r.comp_name.is_empty());
                assert!(r.csi_name.is_empty());
            }
            other => panic!("wrong kind: {:?}", other),
        }
    }

    #[test]
    fn test_trailing_bytes_are_dropped() {
        // A v3 encoding carries the CSI detail; a v2 decoder must ignore it.
        let full = ReplicatedEntity::CsiAssignment(CsiAssignmentRecord {
            su_name: "su1".to_string(),
            si_name: "si1".to_string(),
            ha_state: 1,
            fsm_state: 2,
            csi_add_rem: true,
            comp_name: "comp1".to_string(),
            csi_name: "csi1".to_string(),
        });

        let v3_bytes = encode(&full, SubPartVersion::new(3)).unwrap();
        let decoded = decode(&v3_bytes, SubPartVersion::new(2)).unwrap();

        match decoded {
            ReplicatedEntity::CsiAssignment(r) => {
                assert_eq!(r.su_name, "su1");
                assert!(!r.csi_add_rem);
            }
            other => panic!("wrong kind: {:?}", other),
        }
    }

    #[test]
    fn test_si_transfer_rejected_below_v4() {
        let record = ReplicatedEntity::SiTransfer(SiTransferRecord {
            sg_name: "sg1".to_string(),
            si_name: "si1".to_string(),
            min_su_name: "su1".to_string(),
            max_su_name: "su2".to_string(),
        });

        assert!(matches!(
            encode(&record, SubPartVersion::new(3)),
            Err(CodecError::UnsupportedVersion { .. })
        ));
        let bytes = encode(&record, SubPartVersion::new(4)).unwrap();
        assert_eq!(decode(&bytes, SubPartVersion::new(4)).unwrap(), record);
    }

    #[test]
    fn test_version_outside_range_rejected() {
        let entity = &sample_entities()[0];
        assert!(matches!(
            encode(entity, SubPartVersion::new(0)),
            Err(CodecError::UnsupportedVersion { .. })
        ));
        assert!(matches!(
            encode(entity, SubPartVersion::new(6)),
            Err(CodecError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_truncated_payload_is_malformed() {
        let entity = &sample_entities()[0];
        let bytes = encode(entity, SUB_PART_VERSION_CURRENT).unwrap();

        let truncated = &bytes[..bytes.len() - 3];
        assert_eq!(
            decode(truncated, SUB_PART_VERSION_CURRENT),
            Err(CodecError::MalformedPayload {
                version: SUB_PART_VERSION_CURRENT.get()
            })
        );
    }

    #[test]
    fn test_unknown_kind_tag_rejected() {
        let bytes = vec![99u8, 0, 0, 0, 0];
        assert_eq!(
            decode(&bytes, SUB_PART_VERSION_CURRENT),
            Err(CodecError::UnknownEntityKind(99))
        );
    }
}
