//! Replicated Entity Records
//!
//! Per CHECKPOINT_PROTOCOL.md §3, the replication core treats the
//! director's tables as a closed set of record kinds. Each kind has a
//! stable wire tag and a minimum sub-part version; fields introduced in
//! later versions are gated at encode and decode time by the session
//! version (see `codec::encode` / `codec::decode`).
//!
//! The record shapes follow the director object model: cluster nodes,
//! applications, service groups/units/instances, components, the SU-SI
//! assignment relation, SI transfer markers, and the information-model
//! bookkeeping records (admin owners, configuration change bundles).

use super::version::{SubPartVersion, SUB_PART_VERSION_MIN};

/// Wire tag for a replicated record kind.
///
/// Tags are part of the wire format and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EntityKind {
    /// Cluster node record
    Node = 0,
    /// Application record
    Application = 1,
    /// Service group record
    ServiceGroup = 2,
    /// Service unit record
    ServiceUnit = 3,
    /// Service instance record
    ServiceInstance = 4,
    /// Component record
    Component = 5,
    /// SU-SI assignment relation record
    CsiAssignment = 6,
    /// SI transfer marker (introduced in sub-part version 4)
    SiTransfer = 7,
    /// Admin owner record
    AdminOwner = 8,
    /// Configuration change bundle record
    Ccb = 9,
}

impl EntityKind {
    /// Every kind, in cold-sync streaming order.
    pub const ALL: [EntityKind; 10] = [
        EntityKind::Node,
        EntityKind::Application,
        EntityKind::ServiceGroup,
        EntityKind::ServiceUnit,
        EntityKind::ServiceInstance,
        EntityKind::Component,
        EntityKind::CsiAssignment,
        EntityKind::SiTransfer,
        EntityKind::AdminOwner,
        EntityKind::Ccb,
    ];

    /// Convert from a wire tag, None for unknown values.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(EntityKind::Node),
            1 => Some(EntityKind::Application),
            2 => Some(EntityKind::ServiceGroup),
            3 => Some(EntityKind::ServiceUnit),
            4 => Some(EntityKind::ServiceInstance),
            5 => Some(EntityKind::Component),
            6 => Some(EntityKind::CsiAssignment),
            7 => Some(EntityKind::SiTransfer),
            8 => Some(EntityKind::AdminOwner),
            9 => Some(EntityKind::Ccb),
            _ => None,
        }
    }

    /// Convert to the wire tag.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Oldest sub-part version that carries this kind at all.
    pub fn min_version(self) -> SubPartVersion {
        match self {
            EntityKind::SiTransfer => SubPartVersion::new(4),
            _ => SUB_PART_VERSION_MIN,
        }
    }

    /// Stable name for logging.
    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Node => "node",
            EntityKind::Application => "application",
            EntityKind::ServiceGroup => "service_group",
            EntityKind::ServiceUnit => "service_unit",
            EntityKind::ServiceInstance => "service_instance",
            EntityKind::Component => "component",
            EntityKind::CsiAssignment => "csi_assignment",
            EntityKind::SiTransfer => "si_transfer",
            EntityKind::AdminOwner => "admin_owner",
            EntityKind::Ccb => "ccb",
        }
    }
}

/// Cluster node record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub name: String,
    pub node_id: u32,
    pub oper_state: u8,
}

/// Application record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationRecord {
    pub name: String,
    pub admin_state: u8,
}

/// Service group record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceGroupRecord {
    pub name: String,
    pub redundancy_model: u8,
    pub admin_state: u8,
}

/// Service unit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUnitRecord {
    pub name: String,
    pub rank: u32,
    pub oper_state: u8,
}

/// Service instance record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstanceRecord {
    pub name: String,
    pub rank: u32,
    pub admin_state: u8,
}

/// Component record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRecord {
    pub name: String,
    pub capability: u8,
    pub restart_count: u32,
}

/// SU-SI assignment relation record.
///
/// The component/CSI detail fields were added in sub-part version 3 to
/// checkpoint single-CSI add/remove operations; older sessions carry only
/// the relation and its FSM state, and decode the detail fields to their
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsiAssignmentRecord {
    pub su_name: String,
    pub si_name: String,
    pub ha_state: u8,
    pub fsm_state: u32,
    /// v3+: this update is a single CSI add/remove, not a whole-SI change
    pub csi_add_rem: bool,
    /// v3+: component the CSI is assigned to (empty when csi_add_rem is false)
    pub comp_name: String,
    /// v3+: the CSI being added or removed (empty when csi_add_rem is false)
    pub csi_name: String,
}

/// SI transfer marker. Only exists on the wire at sub-part version 4+.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiTransferRecord {
    pub sg_name: String,
    pub si_name: String,
    pub min_su_name: String,
    pub max_su_name: String,
}

/// Admin owner record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminOwnerRecord {
    pub name: String,
    pub owner_id: u32,
    pub release_on_finalize: bool,
}

/// Configuration change bundle record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CcbRecord {
    pub ccb_id: u32,
    pub admin_owner_id: u32,
    pub state: u8,
}

/// A replicated record, tagged by kind.
///
/// The closed variant set replaces per-kind function-pointer dispatch:
/// encode and decode are a single match over this enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicatedEntity {
    Node(NodeRecord),
    Application(ApplicationRecord),
    ServiceGroup(ServiceGroupRecord),
    ServiceUnit(ServiceUnitRecord),
    ServiceInstance(ServiceInstanceRecord),
    Component(ComponentRecord),
    CsiAssignment(CsiAssignmentRecord),
    SiTransfer(SiTransferRecord),
    AdminOwner(AdminOwnerRecord),
    Ccb(CcbRecord),
}

impl ReplicatedEntity {
    /// Wire kind of this record.
    pub fn kind(&self) -> EntityKind {
        match self {
            ReplicatedEntity::Node(_) => EntityKind::Node,
            ReplicatedEntity::Application(_) => EntityKind::Application,
            ReplicatedEntity::ServiceGroup(_) => EntityKind::ServiceGroup,
            ReplicatedEntity::ServiceUnit(_) => EntityKind::ServiceUnit,
            ReplicatedEntity::ServiceInstance(_) => EntityKind::ServiceInstance,
            ReplicatedEntity::Component(_) => EntityKind::Component,
            ReplicatedEntity::CsiAssignment(_) => EntityKind::CsiAssignment,
            ReplicatedEntity::SiTransfer(_) => EntityKind::SiTransfer,
            ReplicatedEntity::AdminOwner(_) => EntityKind::AdminOwner,
            ReplicatedEntity::Ccb(_) => EntityKind::Ccb,
        }
    }

    /// Store key of this record, unique within its kind.
    pub fn key(&self) -> String {
        match self {
            ReplicatedEntity::Node(r) => r.name.clone(),
            ReplicatedEntity::Application(r) => r.name.clone(),
            ReplicatedEntity::ServiceGroup(r) => r.name.clone(),
            ReplicatedEntity::ServiceUnit(r) => r.name.clone(),
            ReplicatedEntity::ServiceInstance(r) => r.name.clone(),
            ReplicatedEntity::Component(r) => r.name.clone(),
            ReplicatedEntity::CsiAssignment(r) => format!("{}:{}", r.su_name, r.si_name),
            ReplicatedEntity::SiTransfer(r) => format!("{}:{}", r.sg_name, r.si_name),
            ReplicatedEntity::AdminOwner(r) => r.name.clone(),
            ReplicatedEntity::Ccb(r) => r.ccb_id.to_string(),
        }
    }
}
