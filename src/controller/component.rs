//! # Components
//!
//! A target kind is reconciled by an ordered list of [`Component`]s.
//!
//! [`ComponentRunner::run`] drives one pass:
//!
//! 1. Components that opt out via [`Component::is_reconcilable`] are skipped.
//! 2. The first component error stops the pass. The target is marked
//!    [`Status::Error`] with the error text and every component's
//!    [`Component::reconcile_error`] hook is offered the error.
//! 3. Requeue requests from all components are OR-ed together.
//!
//! Status changes are made on the in-memory target; the caller persists them.

use super::error::ReconcileError;
use crate::crd::{DatabaseUser, Platform, Status};
use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::json;
use tracing::{debug, warn};

/// Result of a successful component pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Ask for another pass even though nothing failed
    pub requeue: bool,
}

impl Outcome {
    #[must_use]
    pub fn done() -> Self {
        Self { requeue: false }
    }

    #[must_use]
    pub fn requeue() -> Self {
        Self { requeue: true }
    }
}

/// A target kind that can be reconciled and can report status
pub trait Reconcilable: Send + Sync {
    /// Kind name used in logs and metric labels
    const KIND: &'static str;

    fn target_name(&self) -> String;

    fn target_namespace(&self) -> String;

    fn current_status(&self) -> Option<Status>;

    fn set_status(&mut self, status: Status, message: String);

    /// Body of the merge patch that persists the status subresource
    fn status_patch(&self) -> serde_json::Value;
}

impl Reconcilable for DatabaseUser {
    const KIND: &'static str = "DatabaseUser";

    fn target_name(&self) -> String {
        self.name_any()
    }

    fn target_namespace(&self) -> String {
        self.namespace().unwrap_or_else(|| "default".to_string())
    }

    fn current_status(&self) -> Option<Status> {
        self.status.as_ref().and_then(|s| s.status)
    }

    fn set_status(&mut self, status: Status, message: String) {
        let current = self.status.get_or_insert_with(Default::default);
        current.status = Some(status);
        current.message = Some(message);
    }

    fn status_patch(&self) -> serde_json::Value {
        json!({ "status": self.status })
    }
}

impl Reconcilable for Platform {
    const KIND: &'static str = "Platform";

    fn target_name(&self) -> String {
        self.name_any()
    }

    fn target_namespace(&self) -> String {
        self.namespace().unwrap_or_else(|| "default".to_string())
    }

    fn current_status(&self) -> Option<Status> {
        self.status.as_ref().and_then(|s| s.status)
    }

    fn set_status(&mut self, status: Status, message: String) {
        let current = self.status.get_or_insert_with(Default::default);
        current.status = Some(status);
        current.message = Some(message);
    }

    fn status_patch(&self) -> serde_json::Value {
        json!({ "status": self.status })
    }
}

/// One independently testable piece of reconciliation for target kind `T`
#[async_trait]
pub trait Component<T: Reconcilable>: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_reconcilable(&self, _target: &T) -> bool {
        true
    }

    async fn reconcile(&self, target: &mut T) -> Result<Outcome, ReconcileError>;

    /// Called with the error that stopped the pass, after the target was marked `Error`
    async fn reconcile_error(
        &self,
        _target: &mut T,
        _error: &ReconcileError,
    ) -> Result<(), ReconcileError> {
        Ok(())
    }
}

/// Runs components in order against one target
pub struct ComponentRunner<T: Reconcilable> {
    components: Vec<Box<dyn Component<T>>>,
}

impl<T: Reconcilable> std::fmt::Debug for ComponentRunner<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.components.iter().map(|c| c.name()))
            .finish()
    }
}

impl<T: Reconcilable> Default for ComponentRunner<T> {
    fn default() -> Self {
        Self {
            components: Vec::new(),
        }
    }
}

impl<T: Reconcilable> ComponentRunner<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, component: impl Component<T> + 'static) -> Self {
        self.components.push(Box::new(component));
        self
    }

    pub async fn run(&self, target: &mut T) -> Result<Outcome, ReconcileError> {
        let mut requeue = false;

        for component in &self.components {
            if !component.is_reconcilable(target) {
                debug!(
                    component = component.name(),
                    "{} {} skipped",
                    T::KIND,
                    target.target_name()
                );
                continue;
            }

            match component.reconcile(target).await {
                Ok(outcome) => requeue |= outcome.requeue,
                Err(error) => {
                    target.set_status(Status::Error, error.to_string());
                    for handler in &self.components {
                        if let Err(e) = handler.reconcile_error(target, &error).await {
                            warn!(
                                component = handler.name(),
                                "Error hook failed for {} {}: {}",
                                T::KIND,
                                target.target_name(),
                                e
                            );
                        }
                    }
                    return Err(error);
                }
            }
        }

        Ok(Outcome { requeue })
    }
}
