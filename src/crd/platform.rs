//! # Platform
//!
//! A deployed platform instance: owns a rotating keyring and announces
//! deployments and errors to chat channels.

use super::{NotificationState, Status};
use crate::constants::{DEFAULT_KEY_LIFETIME, KEYRING_SECRET_SUFFIX};
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};

/// Platform Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: ops.platform-operator.io/v1
/// kind: Platform
/// metadata:
///   name: foo
///   namespace: default
/// spec:
///   hostname: foo.example.com
///   version: 1234-eb6b515-main
///   environment: dev
///   keyLifetime: 8760h
///   notifications:
///     slackChannel: "#deploys"
///     slackChannels: ["#team-foo"]
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Platform",
    group = "ops.platform-operator.io",
    version = "v1",
    namespaced,
    status = "PlatformStatus",
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSpec {
    /// Public hostname, used in notification titles
    pub hostname: String,
    /// Deployed version, conventionally `<build>-<revision>-<branch>`
    #[serde(default)]
    pub version: String,
    /// Deployment environment reported to the status collaborator (e.g. "dev", "prod")
    #[serde(default)]
    pub environment: String,
    /// Lifetime of a keyring entry before a successor is generated
    /// Format: <number><unit> with unit s, m, h or d
    #[serde(default = "default_key_lifetime")]
    pub key_lifetime: String,
    #[serde(default)]
    pub notifications: NotificationsSpec,
}

/// Chat channels receiving deployment notifications
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsSpec {
    /// Primary channel
    #[serde(default)]
    pub slack_channel: String,
    /// Additional channels, each receiving an identical message
    #[serde(default)]
    pub slack_channels: Vec<String>,
}

impl NotificationsSpec {
    /// Primary channel followed by the additional channels, skipping blanks
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        std::iter::once(&self.slack_channel)
            .chain(self.slack_channels.iter())
            .filter(|c| !c.trim().is_empty())
            .cloned()
            .collect()
    }
}

fn default_key_lifetime() -> String {
    DEFAULT_KEY_LIFETIME.to_string()
}

/// Status of the Platform resource
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStatus {
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub notification: NotificationState,
}

impl Platform {
    /// Name of the secret holding this platform's keyring
    #[must_use]
    pub fn keyring_secret_name(&self) -> String {
        format!("{}.{}", self.name_any(), KEYRING_SECRET_SUFFIX)
    }
}
