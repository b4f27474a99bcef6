//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! These values represent reasonable defaults and can be overridden via
//! environment variables where applicable (see [`crate::config::OperatorConfig`]).

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Field manager name used for server-side apply and status patches
pub const FIELD_MANAGER: &str = "platform-operator";

/// Interval between passes over a healthy target (seconds)
/// Keeps key rotation on schedule without any watch event
pub const DEFAULT_RESYNC_SECS: u64 = 600;

/// Default requeue interval for requeueable errors when backoff state is unavailable (seconds)
pub const DEFAULT_ERROR_REQUEUE_SECS: u64 = 60;

/// Requeue interval for terminal errors (seconds)
/// Terminal errors need a human; we only look again occasionally
pub const DEFAULT_TERMINAL_REQUEUE_SECS: u64 = 3600;

/// Fibonacci backoff bounds for requeueable errors (minutes)
pub const DEFAULT_BACKOFF_MIN_MINUTES: u64 = 1;
pub const DEFAULT_BACKOFF_MAX_MINUTES: u64 = 10;

/// bcrypt work factor used for managed user passwords
pub const DEFAULT_PASSWORD_HASH_COST: u32 = 12;

/// Default PostgreSQL port
pub const DEFAULT_DATABASE_PORT: u16 = 5432;

/// Driver name accepted by the PostgreSQL connector
pub const POSTGRES_DRIVER: &str = "postgres";

/// Key in the managed user's secret holding the password
pub const PASSWORD_SECRET_KEY: &str = "password";

/// Default lifetime of a keyring entry before a successor is generated
pub const DEFAULT_KEY_LIFETIME: &str = "8760h";

/// Suffix of the keyring secret name (`<platform>.keyring`)
pub const KEYRING_SECRET_SUFFIX: &str = "keyring";

/// Timestamp layout for keyring labels
/// Valid as a Kubernetes secret key and sortable both lexically and chronologically
pub const KEYRING_LABEL_FORMAT: &str = "%Y-%m-%dT%H-%M-%SZ";

/// Number of random bytes in a generated key (86 characters once encoded)
pub const KEY_MATERIAL_BYTES: usize = 64;

/// Default Slack Web API endpoint
pub const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api/chat.postMessage";

/// Default repository linked from deployment notifications
pub const DEFAULT_SOURCE_REPOSITORY_URL: &str = "https://github.com/microscaler/platform";
