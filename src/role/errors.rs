//! Role Controller Error Types

use std::fmt;

use super::role::HaRole;

/// Categories of role controller failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleErrorKind {
    /// The requested role change is outside the legality matrix.
    IllegalTransition,
    /// A state mutation was attempted in a role that must not write.
    WriteRejected,
}

/// Error raised by role assignment and write admission.
#[derive(Debug, Clone)]
pub struct RoleError {
    pub kind: RoleErrorKind,
    pub message: String,
}

impl RoleError {
    pub fn illegal_transition(from: HaRole, to: HaRole) -> Self {
        Self {
            kind: RoleErrorKind::IllegalTransition,
            message: format!(
                "role change {} -> {} is not permitted",
                from.role_name(),
                to.role_name()
            ),
        }
    }

    pub fn write_rejected(role: HaRole) -> Self {
        Self {
            kind: RoleErrorKind::WriteRejected,
            message: format!("writes are not admitted in role {}", role.role_name()),
        }
    }
}

impl fmt::Display for RoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RoleError {}

/// Result type for role operations.
pub type RoleResult<T> = Result<T, RoleError>;
