//! # Custom Resource Definitions
//!
//! CRD types for the Platform Operator.
//!
//! Each target kind carries its own desired-state structure and implements the
//! [`Reconcilable`](crate::controller::Reconcilable) capability.
//!
//! ## Module Structure
//!
//! - `user.rs` - `DatabaseUser`: a managed row in a relational credential store
//! - `platform.rs` - `Platform`: rotating keyring and deployment notifications
//! - `status.rs` - Shared status values and notification dedup state

mod platform;
mod status;
mod user;

pub use platform::{NotificationsSpec, Platform, PlatformSpec, PlatformStatus};
pub use status::{NotificationState, Status};
pub use user::{DatabaseSpec, DatabaseUser, DatabaseUserSpec, DatabaseUserStatus, SecretKeyRef};

pub(crate) fn default_true() -> bool {
    true
}
