//! # Reconciler Context
//!
//! State shared by every pass of one target kind.

use crate::config::OperatorConfig;
use crate::controller::{ComponentRunner, Reconcilable};
use kube::Client;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Per-resource error backoff
///
/// Delays follow the Fibonacci sequence in minutes, starting at `min_minutes`
/// twice and capped at `max_minutes` (1, 1, 2, 3, 5, 8, 10 with the defaults).
/// A successful pass drops the state, so the next failure starts over.
#[derive(Debug, Clone)]
pub struct BackoffState {
    prev_minutes: u64,
    current_minutes: u64,
    max_minutes: u64,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            prev_minutes: 0,
            current_minutes: min_minutes.min(max_minutes),
            max_minutes,
            error_count: 0,
        }
    }

    /// Record one more failure and return the delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        self.error_count = self.error_count.saturating_add(1);
        let delay = Duration::from_secs(self.current_minutes.saturating_mul(60));

        let next = self.prev_minutes.saturating_add(self.current_minutes);
        self.prev_minutes = self.current_minutes;
        self.current_minutes = next.min(self.max_minutes);
        delay
    }
}

/// Context handed to `reconcile` and `handle_reconciliation_error`
pub struct Context<T: Reconcilable> {
    pub client: Client,
    pub runner: ComponentRunner<T>,
    pub config: OperatorConfig,
    /// Keyed by `<namespace>/<name>`
    pub backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl<T: Reconcilable> std::fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("kind", &T::KIND)
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}

impl<T: Reconcilable> Context<T> {
    pub fn new(client: Client, runner: ComponentRunner<T>, config: OperatorConfig) -> Self {
        Self {
            client,
            runner,
            config,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Forget the backoff of a resource after a successful pass
    pub fn reset_backoff(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(resource_key);
        }
    }
}

#[must_use]
pub fn resource_key<T: Reconcilable>(target: &T) -> String {
    format!("{}/{}", target.target_namespace(), target.target_name())
}
