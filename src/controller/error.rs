//! # Reconcile Errors
//!
//! One taxonomy for every component. Each variant is either requeueable
//! (transient, retried with backoff) or terminal (needs a human).

use crate::database::StoreError;
use crate::dbpool::PoolError;
use crate::secrets::SecretError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("secret {namespace}/{name} not found")]
    SecretNotFound { name: String, namespace: String },

    #[error("secret {namespace}/{name} has no {key:?} key")]
    MissingSecretKey {
        name: String,
        namespace: String,
        key: String,
    },

    #[error("secret {namespace}/{name} key {key:?} is not valid UTF-8")]
    InvalidSecretValue {
        name: String,
        namespace: String,
        key: String,
    },

    #[error("secret store error: {0}")]
    SecretStore(SecretError),

    #[error("database connection failed: {0}")]
    Connection(#[from] PoolError),

    #[error("upsert of user {username:?} failed: {source}")]
    Query {
        username: String,
        #[source]
        source: StoreError,
    },

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("keyring secret {secret} has malformed label {label:?}: {message}")]
    MalformedLabel {
        secret: String,
        label: String,
        message: String,
    },

    #[error("invalid key lifetime {value:?}: {message}")]
    InvalidLifetime { value: String, message: String },

    #[error("notification failed: {}", failures.join("; "))]
    Notification { failures: Vec<String> },

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

impl From<SecretError> for ReconcileError {
    fn from(e: SecretError) -> Self {
        match e {
            SecretError::NotFound { name, namespace } => {
                ReconcileError::SecretNotFound { name, namespace }
            }
            other @ SecretError::Backend { .. } => ReconcileError::SecretStore(other),
        }
    }
}

impl ReconcileError {
    /// Whether another pass may succeed without a configuration change
    #[must_use]
    pub fn is_requeueable(&self) -> bool {
        match self {
            ReconcileError::SecretNotFound { .. }
            | ReconcileError::MissingSecretKey { .. }
            | ReconcileError::SecretStore(_)
            | ReconcileError::Connection(_)
            | ReconcileError::Notification { .. }
            | ReconcileError::Kube(_) => true,
            ReconcileError::Query { .. }
            | ReconcileError::Hash(_)
            | ReconcileError::InvalidSecretValue { .. }
            | ReconcileError::MalformedLabel { .. }
            | ReconcileError::InvalidLifetime { .. } => false,
        }
    }

    /// Metric label for the error class
    #[must_use]
    pub fn class(&self) -> &'static str {
        if self.is_requeueable() {
            "requeueable"
        } else {
            "terminal"
        }
    }
}
