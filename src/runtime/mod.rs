//! # Runtime
//!
//! Wires the components into `kube_runtime` controllers.
//!
//! - `context`: shared per-kind reconciler context and backoff bookkeeping
//! - `reconcile`: one pass over a target, persisting its status
//! - `error_policy`: requeue decisions for failed passes
//! - `watch_loop`: the controller loop for one target kind

pub mod context;
pub mod error_policy;
pub mod reconcile;
pub mod watch_loop;

pub use context::{BackoffState, Context};
pub use error_policy::handle_reconciliation_error;
pub use reconcile::reconcile;
pub use watch_loop::run_watch_loop;
