//! # Key Rotation
//!
//! Maintains a time-windowed set of symmetric keys in a secret.
//!
//! The keyring secret maps a creation-time label to key material. One pass:
//!
//! - **Bootstrap**: an absent or empty keyring gets one new key.
//! - **Growth**: when the newest key is older than the lifetime, one new key is added.
//!   Older keys stay.
//! - **Expiry**: keys older than twice the lifetime are removed, except the newest
//!   key present before the pass. The keyring therefore never becomes empty, and a
//!   key is only retired once a successor exists.
//!
//! The secret is written back in full, and only when the pass changed it.

use super::component::{Component, Outcome, Reconcilable};
use super::duration::parse_kubernetes_duration;
use super::error::ReconcileError;
use crate::clock::Clock;
use crate::constants::{KEYRING_LABEL_FORMAT, KEY_MATERIAL_BYTES};
use crate::crd::{Platform, Status};
use crate::observability::metrics;
use crate::secrets::{SecretData, SecretStore};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// What a rotation pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationReport {
    pub added: usize,
    pub removed: usize,
    /// Number of keys after the pass
    pub size: usize,
}

impl RotationReport {
    #[must_use]
    pub fn changed(&self) -> bool {
        self.added > 0 || self.removed > 0
    }
}

/// Label for a key created at `at`
#[must_use]
pub fn format_label(at: DateTime<Utc>) -> String {
    at.format(KEYRING_LABEL_FORMAT).to_string()
}

/// Creation time encoded in a keyring label
pub fn parse_label(label: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(label, KEYRING_LABEL_FORMAT).map(|t| t.and_utc())
}

/// Fresh key material: 64 bytes from the OS CSPRNG, base64 without padding
#[must_use]
pub fn generate_key() -> Vec<u8> {
    let mut raw = Zeroizing::new([0u8; KEY_MATERIAL_BYTES]);
    OsRng.fill_bytes(&mut *raw);
    STANDARD_NO_PAD.encode(&*raw).into_bytes()
}

/// Rotates keyrings stored in a [`SecretStore`]
pub struct KeyRotator {
    store: Arc<dyn SecretStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for KeyRotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRotator").finish_non_exhaustive()
    }
}

impl KeyRotator {
    pub fn new(store: Arc<dyn SecretStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Run one rotation pass over the keyring `secret_name` in `namespace`
    pub async fn rotate(
        &self,
        secret_name: &str,
        namespace: &str,
        lifetime: Duration,
    ) -> Result<RotationReport, ReconcileError> {
        let invalid_lifetime = |message: String| ReconcileError::InvalidLifetime {
            value: format!("{lifetime:?}"),
            message,
        };
        // Labels have one-second resolution; a shorter lifetime could reuse the newest label.
        if lifetime < Duration::from_secs(1) {
            return Err(invalid_lifetime("lifetime must be at least 1s".to_string()));
        }
        let lifetime = TimeDelta::from_std(lifetime).map_err(|e| invalid_lifetime(e.to_string()))?;
        let grace = lifetime
            .checked_mul(2)
            .ok_or_else(|| invalid_lifetime("lifetime is too large".to_string()))?;

        let mut keyring = match self.store.get(secret_name, namespace).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => SecretData::new(),
            Err(e) => return Err(e.into()),
        };

        let mut entries = keyring
            .keys()
            .map(|label| {
                parse_label(label)
                    .map(|created| (created, label.clone()))
                    .map_err(|e| ReconcileError::MalformedLabel {
                        secret: format!("{namespace}/{secret_name}"),
                        label: label.clone(),
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort();

        let now = self.clock.now();
        let mut report = RotationReport::default();

        // The newest key from before this pass is kept even when a successor is
        // added now, so it stays valid until the successor has aged.
        let newest = entries.last().map(|(created, label)| (*created, label.clone()));

        let due = newest.as_ref().map_or(true, |(created, _)| {
            now.signed_duration_since(*created) > lifetime
        });
        if due {
            let label = format_label(now);
            debug!("Adding key {} to keyring {}/{}", label, namespace, secret_name);
            keyring.insert(label, generate_key());
            report.added = 1;
        }

        if let Some((_, newest_label)) = &newest {
            for (created, label) in &entries {
                if label != newest_label && now.signed_duration_since(*created) > grace {
                    debug!(
                        "Removing expired key {} from keyring {}/{}",
                        label, namespace, secret_name
                    );
                    keyring.remove(label);
                    report.removed += 1;
                }
            }
        }

        report.size = keyring.len();

        if report.changed() {
            self.store.put(secret_name, namespace, keyring).await?;
            metrics::increment_keys_added(report.added);
            metrics::increment_keys_removed(report.removed);
            info!(
                "Keyring {}/{} rotated: {} added, {} removed, {} keys",
                namespace, secret_name, report.added, report.removed, report.size
            );
        }

        Ok(report)
    }
}

/// Marks the `Platform` `Ready` after every successful rotation pass. Components
/// running later in the same pass observe `Ready` unless this pass failed.
#[async_trait]
impl Component<Platform> for KeyRotator {
    fn name(&self) -> &'static str {
        "keyring"
    }

    async fn reconcile(&self, target: &mut Platform) -> Result<Outcome, ReconcileError> {
        let lifetime = parse_kubernetes_duration(&target.spec.key_lifetime).map_err(|message| {
            ReconcileError::InvalidLifetime {
                value: target.spec.key_lifetime.clone(),
                message,
            }
        })?;

        let secret_name = target.keyring_secret_name();
        let report = self
            .rotate(&secret_name, &target.target_namespace(), lifetime)
            .await?;

        target.set_status(
            Status::Ready,
            format!("Keyring {secret_name} holds {} keys", report.size),
        );
        Ok(Outcome::done())
    }
}
