//! Role Transition Controller
//!
//! Per ROLE_MODEL.md §3, the legality matrix:
//!
//! ```text
//! Standby   -> Active                 (failover or planned takeover)
//! Active    -> Quiescing -> Quiesced  (graceful switchover)
//! Quiescing -> Active                 (switchover aborted)
//! Quiesced  -> Standby | Active
//! Active    -> Standby                NEVER (demotion without draining
//!                                     silently discards unreplicated
//!                                     state; it must go via Quiescing)
//! ```
//!
//! Every promotion to Active opens a new role epoch. Sequence numbers
//! and update counters are scoped to an epoch; the standby resets its
//! view when the epoch changes.

use super::errors::{RoleError, RoleResult};
use super::role::HaRole;

/// A completed role change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleChange {
    pub from: HaRole,
    pub to: HaRole,
    /// Epoch in force after the change.
    pub epoch: u64,
}

/// Owns the replica's role and enforces the transition matrix.
#[derive(Debug)]
pub struct RoleController {
    role: HaRole,
    epoch: u64,
}

impl RoleController {
    pub fn new(initial: HaRole) -> Self {
        Self {
            role: initial,
            epoch: 1,
        }
    }

    pub fn role(&self) -> HaRole {
        self.role
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Apply a role assignment from the cluster controller.
    ///
    /// Reassigning the current role is idempotent and does not open a
    /// new epoch.
    pub fn assign(&mut self, target: HaRole) -> RoleResult<RoleChange> {
        let from = self.role;
        if target == from {
            return Ok(RoleChange {
                from,
                to: target,
                epoch: self.epoch,
            });
        }
        if !Self::permitted(from, target) {
            return Err(RoleError::illegal_transition(from, target));
        }

        if target == HaRole::Active {
            self.epoch += 1;
        }
        self.role = target;
        Ok(RoleChange {
            from,
            to: target,
            epoch: self.epoch,
        })
    }

    fn permitted(from: HaRole, to: HaRole) -> bool {
        use HaRole::*;
        matches!(
            (from, to),
            (Standby, Active)
                | (Active, Quiescing)
                | (Quiescing, Quiesced)
                | (Quiescing, Active)
                | (Quiesced, Standby)
                | (Quiesced, Active)
        )
    }

    /// Gate for local state mutations.
    pub fn check_write_admission(&self) -> RoleResult<()> {
        if self.role.admits_writes() {
            Ok(())
        } else {
            Err(RoleError::write_rejected(self.role))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::errors::RoleErrorKind;
    use super::*;

    #[test]
    fn test_failover_promotion_opens_new_epoch() {
        let mut controller = RoleController::new(HaRole::Standby);
        let change = controller.assign(HaRole::Active).unwrap();

        assert_eq!(change.from, HaRole::Standby);
        assert_eq!(change.epoch, 2);
        assert_eq!(controller.role(), HaRole::Active);
    }

    #[test]
    fn test_direct_demotion_is_rejected() {
        let mut controller = RoleController::new(HaRole::Active);
        let err = controller.assign(HaRole::Standby).unwrap_err();

        assert_eq!(err.kind, RoleErrorKind::IllegalTransition);
        assert_eq!(controller.role(), HaRole::Active);
    }

    #[test]
    fn test_graceful_switchover_path() {
        let mut controller = RoleController::new(HaRole::Active);
        controller.assign(HaRole::Quiescing).unwrap();
        controller.assign(HaRole::Quiesced).unwrap();
        let change = controller.assign(HaRole::Standby).unwrap();

        assert_eq!(controller.role(), HaRole::Standby);
        // Never promoted, so the epoch never moved.
        assert_eq!(change.epoch, 1);
    }

    #[test]
    fn test_quiesce_abort_repromotes() {
        let mut controller = RoleController::new(HaRole::Active);
        controller.assign(HaRole::Quiescing).unwrap();
        let change = controller.assign(HaRole::Active).unwrap();

        assert_eq!(controller.role(), HaRole::Active);
        assert_eq!(change.epoch, 2);
    }

    #[test]
    fn test_reassignment_is_idempotent() {
        let mut controller = RoleController::new(HaRole::Standby);
        let change = controller.assign(HaRole::Standby).unwrap();
        assert_eq!(change.epoch, 1);
        assert_eq!(controller.role(), HaRole::Standby);
    }

    #[test]
    fn test_write_admission_follows_role() {
        let mut controller = RoleController::new(HaRole::Active);
        assert!(controller.check_write_admission().is_ok());

        controller.assign(HaRole::Quiescing).unwrap();
        assert!(controller.check_write_admission().is_ok());

        controller.assign(HaRole::Quiesced).unwrap();
        let err = controller.check_write_admission().unwrap_err();
        assert_eq!(err.kind, RoleErrorKind::WriteRejected);
    }

    #[test]
    fn test_standby_cannot_quiesce() {
        let mut controller = RoleController::new(HaRole::Standby);
        assert!(controller.assign(HaRole::Quiescing).is_err());
        assert!(controller.assign(HaRole::Quiesced).is_err());
    }
}
