//! # Controller
//!
//! Reconciliation components and the pieces they share.
//!
//! - `component`: the `Component` / `Reconcilable` contract and the ordered runner
//! - `credentials`: user rows in the credential store (`DatabaseUser`)
//! - `keyring`: rotating keyrings (`Platform`)
//! - `notification`: deduplicated deployment notifications (`Platform`)
//! - `error`: requeueable vs terminal error taxonomy
//! - `duration`: Kubernetes duration strings
//! - `server`: HTTP server for metrics and health checks

pub mod component;
pub mod credentials;
pub mod duration;
pub mod error;
pub mod keyring;
pub mod notification;
pub mod server;

pub use component::{Component, ComponentRunner, Outcome, Reconcilable};
pub use error::ReconcileError;
