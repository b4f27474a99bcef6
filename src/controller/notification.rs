//! # Notification Deduplicator
//!
//! Announces deployments and errors to chat channels without repeating itself.
//!
//! Dedup state ([`NotificationState`]) lives in the target's status:
//!
//! - `Ready` notifies when the version differs from `lastNotifiedVersion`, and
//!   reports the deployment once to the status collaborator. Any `Ready`
//!   observation ends the current error episode and clears the error markers,
//!   even when nothing is sent, so an error that recurs after a recovery is
//!   announced again.
//! - `Error` notifies when the message or the version differs from the last
//!   announced error, so the same error under a new version is announced again.
//! - Transient statuses never notify.
//!
//! Every channel is attempted even when one fails. Any failure leaves the dedup
//! state untouched and returns one error naming each failure, so the next pass
//! re-sends to all channels.

use super::component::{Component, Outcome};
use super::error::ReconcileError;
use crate::crd::{NotificationState, Platform, Status};
use crate::messaging::{Attachment, AttachmentField, MessagingClient, StatusReporter};
use crate::observability::metrics;
use async_trait::async_trait;
use futures::future::join_all;
use kube::ResourceExt;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

static VERSION_REGEX: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(?P<build>\d+)-(?P<revision>[0-9a-fA-F]+)-(?P<branch>.+)$").ok()
});

/// Components of a `<build>-<revision>-<branch>` version string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub build: String,
    pub revision: String,
    pub branch: String,
}

/// Parse a structured version; anything else yields `None`
#[must_use]
pub fn parse_version(version: &str) -> Option<VersionInfo> {
    let captures = VERSION_REGEX.as_ref()?.captures(version)?;
    Some(VersionInfo {
        build: captures.name("build")?.as_str().to_string(),
        revision: captures.name("revision")?.as_str().to_string(),
        branch: captures.name("branch")?.as_str().to_string(),
    })
}

fn clear_error_markers(state: &mut NotificationState) {
    state.last_notified_error_message.clear();
    state.last_notified_error_version.clear();
}

/// What the deduplicator needs to know about the announcing target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationTarget {
    pub name: String,
    pub hostname: String,
    pub environment: String,
    pub version: String,
    pub channels: Vec<String>,
}

impl From<&Platform> for NotificationTarget {
    fn from(platform: &Platform) -> Self {
        Self {
            name: platform.name_any(),
            hostname: platform.spec.hostname.clone(),
            environment: platform.spec.environment.clone(),
            version: platform.spec.version.clone(),
            channels: platform.spec.notifications.channels(),
        }
    }
}

/// Sends status-change notifications at most once per distinct event
pub struct NotificationDeduplicator {
    messaging: Arc<dyn MessagingClient>,
    reporter: Arc<dyn StatusReporter>,
    source_repository_url: String,
}

impl std::fmt::Debug for NotificationDeduplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDeduplicator")
            .field("source_repository_url", &self.source_repository_url)
            .finish_non_exhaustive()
    }
}

impl NotificationDeduplicator {
    pub fn new(
        messaging: Arc<dyn MessagingClient>,
        reporter: Arc<dyn StatusReporter>,
        source_repository_url: impl Into<String>,
    ) -> Self {
        Self {
            messaging,
            reporter,
            source_repository_url: source_repository_url.into(),
        }
    }

    /// Notify about `status` if it is a new event; returns whether anything was sent
    pub async fn reconcile_status_change(
        &self,
        state: &mut NotificationState,
        target: &NotificationTarget,
        status: Status,
        error_message: &str,
    ) -> Result<bool, ReconcileError> {
        match status {
            Status::Initializing | Status::Migrating | Status::Deploying => Ok(false),
            Status::Ready => {
                if state.last_notified_version == target.version {
                    if !state.last_notified_error_message.is_empty() {
                        debug!("{} recovered, clearing error markers", target.name);
                        clear_error_markers(state);
                    }
                    return Ok(self.suppressed(target, "version already announced"));
                }

                let attachment = self.success_attachment(target);
                let mut failures = self.fan_out(&target.channels, &attachment).await;
                if let Err(e) = self
                    .reporter
                    .post_status(&target.name, &target.environment, &target.version)
                    .await
                {
                    failures.push(format!("status report: {e}"));
                }
                if !failures.is_empty() {
                    return Err(ReconcileError::Notification { failures });
                }

                info!(
                    "Announced {} version {} to {} channels",
                    target.name,
                    target.version,
                    target.channels.len()
                );
                state.last_notified_version.clone_from(&target.version);
                clear_error_markers(state);
                Ok(true)
            }
            Status::Error => {
                if state.last_notified_error_message == error_message
                    && state.last_notified_error_version == target.version
                {
                    return Ok(self.suppressed(target, "error already announced"));
                }

                let attachment = self.error_attachment(target, error_message);
                let failures = self.fan_out(&target.channels, &attachment).await;
                if !failures.is_empty() {
                    return Err(ReconcileError::Notification { failures });
                }

                info!(
                    "Announced error for {} to {} channels",
                    target.name,
                    target.channels.len()
                );
                state.last_notified_error_message = error_message.to_string();
                state.last_notified_error_version.clone_from(&target.version);
                Ok(true)
            }
        }
    }

    /// Notify about a failed pass if its error is new
    pub async fn reconcile_failure(
        &self,
        state: &mut NotificationState,
        target: &NotificationTarget,
        error: &ReconcileError,
    ) -> Result<bool, ReconcileError> {
        self.reconcile_status_change(state, target, Status::Error, &error.to_string())
            .await
    }

    fn suppressed(&self, target: &NotificationTarget, reason: &str) -> bool {
        debug!("Notification for {} suppressed: {}", target.name, reason);
        metrics::increment_notifications_suppressed();
        false
    }

    /// Send `attachment` to every channel; returns one entry per failed channel
    async fn fan_out(&self, channels: &[String], attachment: &Attachment) -> Vec<String> {
        let sends = channels.iter().map(|channel| async move {
            self.messaging
                .post_message(channel, attachment)
                .await
                .map_err(|e| format!("{channel}: {e}"))
        });

        join_all(sends)
            .await
            .into_iter()
            .filter_map(|result| match result {
                Ok(_) => {
                    metrics::increment_notifications_sent("success");
                    None
                }
                Err(failure) => {
                    warn!("Notification failed: {}", failure);
                    metrics::increment_notifications_sent("failure");
                    Some(failure)
                }
            })
            .collect()
    }

    #[must_use]
    pub fn success_attachment(&self, target: &NotificationTarget) -> Attachment {
        Attachment {
            title: format!("{} Deployment", target.hostname),
            fallback: format!(
                "{} deployed version {} successfully",
                target.hostname, target.version
            ),
            color: Some("good".to_string()),
            fields: self.version_fields(&target.version),
        }
    }

    #[must_use]
    pub fn error_attachment(&self, target: &NotificationTarget, message: &str) -> Attachment {
        Attachment {
            title: format!("{} Deployment", target.hostname),
            fallback: format!("{} has error: {}", target.hostname, message),
            color: Some("danger".to_string()),
            fields: self.version_fields(&target.version),
        }
    }

    fn version_fields(&self, version: &str) -> Vec<AttachmentField> {
        parse_version(version)
            .map(|info| {
                vec![AttachmentField {
                    title: "Version".to_string(),
                    value: format!(
                        "<{}/tree/{}|{}>",
                        self.source_repository_url.trim_end_matches('/'),
                        info.revision,
                        info.revision
                    ),
                    short: true,
                }]
            })
            .unwrap_or_default()
    }
}

/// Runs after the keyring component, which leaves the `Platform` `Ready` on every
/// successful pass. The `Error` path is therefore reached through
/// [`Component::reconcile_error`] when an earlier component fails the pass.
#[async_trait]
impl Component<Platform> for NotificationDeduplicator {
    fn name(&self) -> &'static str {
        "notifications"
    }

    fn is_reconcilable(&self, target: &Platform) -> bool {
        !target.spec.notifications.channels().is_empty()
    }

    async fn reconcile(&self, target: &mut Platform) -> Result<Outcome, ReconcileError> {
        let announced = NotificationTarget::from(&*target);
        let status = target.status.get_or_insert_with(Default::default);
        let current = status.status.unwrap_or(Status::Initializing);
        let message = status.message.clone().unwrap_or_default();

        self.reconcile_status_change(&mut status.notification, &announced, current, &message)
            .await?;
        Ok(Outcome::done())
    }

    async fn reconcile_error(
        &self,
        target: &mut Platform,
        error: &ReconcileError,
    ) -> Result<(), ReconcileError> {
        // A failed send would only fail again
        if matches!(error, ReconcileError::Notification { .. }) || !self.is_reconcilable(target) {
            return Ok(());
        }

        let announced = NotificationTarget::from(&*target);
        let status = target.status.get_or_insert_with(Default::default);
        self.reconcile_failure(&mut status.notification, &announced, error)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::Disabled;

    fn deduplicator() -> NotificationDeduplicator {
        NotificationDeduplicator::new(
            Arc::new(Disabled),
            Arc::new(Disabled),
            "https://github.com/microscaler/platform/",
        )
    }

    fn target(version: &str) -> NotificationTarget {
        NotificationTarget {
            name: "foo".to_string(),
            hostname: "foo.example.com".to_string(),
            environment: "dev".to_string(),
            version: version.to_string(),
            channels: vec!["#a".to_string()],
        }
    }

    #[test]
    fn test_parse_version() {
        let info = parse_version("1234-eb6b515-feature/login").unwrap();
        assert_eq!(info.build, "1234");
        assert_eq!(info.revision, "eb6b515");
        assert_eq!(info.branch, "feature/login");

        assert!(parse_version("v1.2.3").is_none());
        assert!(parse_version("1234-xyz-main").is_none());
        assert!(parse_version("").is_none());
    }

    #[test]
    fn test_success_attachment_links_revision() {
        let attachment = deduplicator().success_attachment(&target("1234-eb6b515-main"));
        assert_eq!(attachment.title, "foo.example.com Deployment");
        assert_eq!(
            attachment.fallback,
            "foo.example.com deployed version 1234-eb6b515-main successfully"
        );
        assert_eq!(attachment.fields.len(), 1);
        assert_eq!(
            attachment.fields[0].value,
            "<https://github.com/microscaler/platform/tree/eb6b515|eb6b515>"
        );
    }

    #[test]
    fn test_error_attachment_without_structured_version() {
        let attachment = deduplicator().error_attachment(&target("latest"), "boom");
        assert_eq!(attachment.fallback, "foo.example.com has error: boom");
        assert_eq!(attachment.color.as_deref(), Some("danger"));
        assert!(attachment.fields.is_empty());
    }

    #[tokio::test]
    async fn test_success_clears_error_markers() {
        let mut state = NotificationState {
            last_notified_error_message: "boom".to_string(),
            last_notified_error_version: "1".to_string(),
            ..NotificationState::default()
        };
        let sent = deduplicator()
            .reconcile_status_change(&mut state, &target("2"), Status::Ready, "")
            .await
            .unwrap();
        assert!(sent);
        assert_eq!(state.last_notified_version, "2");
        assert!(state.last_notified_error_message.is_empty());
    }
}
