//! Domain model for userhub.
//!
//! Pure logic, no I/O: the role hierarchy, resource-scoped permission
//! resolution with caching, and the domain event vocabulary consumed by
//! the webhook and notification subsystems.

pub mod event;
pub mod permission;
pub mod role;

pub use event::{DomainEvent, EventKind};
pub use permission::{
    nearest_grant, Action, PermissionCache, PermissionError, ResourceGraph, RoleSet,
};
pub use role::TeamRole;
