//! # DatabaseUser
//!
//! A user row managed in an external relational credential store.

use super::{default_true, Status};
use crate::constants::{DEFAULT_DATABASE_PORT, PASSWORD_SECRET_KEY};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// DatabaseUser Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: ops.platform-operator.io/v1
/// kind: DatabaseUser
/// metadata:
///   name: alice
///   namespace: default
/// spec:
///   username: alice
///   passwordSecret: alice-password
///   email: alice@example.com
///   active: true
///   database:
///     host: db.example.com
///     database: platform
///     username: platform
///     passwordSecretRef:
///       name: platform.postgres-user-password
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "DatabaseUser",
    group = "ops.platform-operator.io",
    version = "v1",
    namespaced,
    status = "DatabaseUserStatus",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.status"}"#,
    printcolumn = r#"{"name":"Message", "type":"string", "jsonPath":".status.message"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseUserSpec {
    /// Login name; unique key of the user row
    pub username: String,
    /// Name of the secret (same namespace) whose `password` key holds the user's password
    pub password_secret: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub staff: bool,
    #[serde(default)]
    pub superuser: bool,
    /// Database holding the user table
    pub database: DatabaseSpec,
}

/// Connection parameters for the credential store
#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    pub host: String,
    #[serde(default = "default_database_port")]
    pub port: u16,
    pub database: String,
    pub username: String,
    /// The database's own credential, distinct from the managed user's password
    pub password_secret_ref: SecretKeyRef,
}

/// Reference to a single key of a secret in the target's namespace
#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    pub name: String,
    #[serde(default = "default_password_key")]
    pub key: String,
}

fn default_database_port() -> u16 {
    DEFAULT_DATABASE_PORT
}

fn default_password_key() -> String {
    PASSWORD_SECRET_KEY.to_string()
}

/// Status of the DatabaseUser resource
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseUserStatus {
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub message: Option<String>,
    /// Identifier of the upserted row
    #[serde(default)]
    pub user_id: Option<i64>,
}
