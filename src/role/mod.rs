//! HA Role Subsystem
//!
//! Role definitions and the transition controller. The role decides who
//! generates updates and who applies them; the sync sessions in
//! `crate::session` are created and torn down as the role moves.

mod controller;
mod errors;
mod role;

pub use controller::{RoleChange, RoleController};
pub use errors::{RoleError, RoleErrorKind, RoleResult};
pub use role::HaRole;
