//! Access enforcement for tenant modules
//!
//! Combines a tenant's active modules with the user's role and permissions.

pub mod permissions;

pub use permissions::{AccessGate, AccessSnapshot, PermissionSet, Role, UNIVERSAL_PERMISSION};
