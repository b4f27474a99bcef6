//! # Status Types
//!
//! Status values shared by all target kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum Status {
    Initializing,
    Migrating,
    Deploying,
    Ready,
    Error,
}

impl Status {
    /// Transient statuses never trigger notifications
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Status::Initializing | Status::Migrating | Status::Deploying
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Initializing => "Initializing",
            Status::Migrating => "Migrating",
            Status::Deploying => "Deploying",
            Status::Ready => "Ready",
            Status::Error => "Error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last-notified markers used to suppress redundant notifications
///
/// Mutated only by the notification deduplicator; persisted by the caller as part
/// of the target's status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationState {
    /// Version of the last successful deployment that was announced
    #[serde(default)]
    pub last_notified_version: String,
    /// Text of the last error that was announced
    #[serde(default)]
    pub last_notified_error_message: String,
    /// Version the last announced error was raised under
    #[serde(default)]
    pub last_notified_error_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        assert!(Status::Initializing.is_transient());
        assert!(Status::Migrating.is_transient());
        assert!(Status::Deploying.is_transient());
        assert!(!Status::Ready.is_transient());
        assert!(!Status::Error.is_transient());
    }

    #[test]
    fn test_notification_state_serializes_camel_case() {
        let state = NotificationState {
            last_notified_version: "1234-eb6b515-main".to_string(),
            ..NotificationState::default()
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["lastNotifiedVersion"], "1234-eb6b515-main");
        assert_eq!(value["lastNotifiedErrorMessage"], "");
    }
}
