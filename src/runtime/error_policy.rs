//! # Error Policy
//!
//! Requeue decisions for failed passes.
//!
//! Requeueable errors retry on a per-resource Fibonacci backoff so that one
//! failing resource never delays the others. Terminal errors wait for the slow
//! terminal interval; a human is expected to fix the configuration first.

use super::context::{resource_key, BackoffState, Context};
use crate::controller::{ReconcileError, Reconcilable};
use crate::observability::metrics;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub fn handle_reconciliation_error<T: Reconcilable>(
    obj: Arc<T>,
    error: &ReconcileError,
    ctx: Arc<Context<T>>,
) -> Action {
    let resource = resource_key(obj.as_ref());
    metrics::increment_reconciliation_errors(T::KIND, error.class());

    if !error.is_requeueable() {
        error!(
            "Terminal error for {} {}: {} (next check in {}s)",
            T::KIND,
            resource,
            error,
            ctx.config.terminal_requeue_secs
        );
        return Action::requeue(ctx.config.terminal_requeue_duration());
    }

    let backoff = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states.entry(resource.clone()).or_insert_with(|| {
                BackoffState::new(ctx.config.backoff_min_minutes, ctx.config.backoff_max_minutes)
            });
            let delay = state.next_delay();
            Some((delay, state.error_count))
        }
        Err(e) => {
            warn!("Failed to lock backoff_states: {}, using default backoff", e);
            None
        }
    };

    let (delay, error_count): (Duration, u32) =
        backoff.unwrap_or((ctx.config.error_requeue_duration(), 0));

    warn!("Reconciliation error for {} {}: {}", T::KIND, resource, error);
    info!(
        "Retrying {} {} in {}s (error count: {})",
        T::KIND,
        resource,
        delay.as_secs(),
        error_count
    );
    Action::requeue(delay)
}
