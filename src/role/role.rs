//! HA Role Definitions
//!
//! Per ROLE_MODEL.md §2, a replica is always in exactly one role. The
//! quiescing pair models graceful switchover: a Quiescing replica still
//! admits writes while draining, a Quiesced one is read-only and waits
//! to be told what it is next.

use serde::{Deserialize, Serialize};

/// High-availability role of this replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HaRole {
    /// Owns the state; the only generator of async updates.
    Active,
    /// Mirrors the active and stands ready to take over.
    Standby,
    /// Was active, now draining in-flight work before stepping down.
    Quiescing,
    /// Drained; read-only until reassigned.
    Quiesced,
}

impl HaRole {
    /// Whether local state mutations are admitted in this role.
    ///
    /// Quiescing still admits: in-flight work finishes on the old
    /// active, it is not torn off mid-operation.
    pub fn admits_writes(self) -> bool {
        matches!(self, HaRole::Active | HaRole::Quiescing)
    }

    /// Stable name for logging and config files.
    pub fn role_name(self) -> &'static str {
        match self {
            HaRole::Active => "active",
            HaRole::Standby => "standby",
            HaRole::Quiescing => "quiescing",
            HaRole::Quiesced => "quiesced",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_admission_by_role() {
        assert!(HaRole::Active.admits_writes());
        assert!(HaRole::Quiescing.admits_writes());
        assert!(!HaRole::Standby.admits_writes());
        assert!(!HaRole::Quiesced.admits_writes());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&HaRole::Quiescing).unwrap();
        assert_eq!(json, "\"quiescing\"");
        let back: HaRole = serde_json::from_str("\"standby\"").unwrap();
        assert_eq!(back, HaRole::Standby);
    }
}
