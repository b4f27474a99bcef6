//! # Credential Reconciler
//!
//! Converges one user row in the credential store onto a `DatabaseUser` spec.
//!
//! 1. Read the user's password from its secret (`password` key)
//! 2. Hash it as `bcrypt_sha256$<bcrypt(hex(sha256(password)))>`
//! 3. Acquire a pooled connection using the database's own credential
//! 4. Upsert the row keyed by username and record the returned id
//!
//! bcrypt salts every hash, so each pass writes a fresh hash for an unchanged
//! password. The upsert is still safe to replay: the id and `date_joined` never
//! change.

use super::component::{Component, Outcome, Reconcilable};
use super::error::ReconcileError;
use crate::constants::{PASSWORD_SECRET_KEY, POSTGRES_DRIVER};
use crate::crd::{DatabaseUser, DatabaseUserSpec, Status};
use crate::database::{DataSource, UserRecord, UserStore};
use crate::dbpool::{ConnectionPool, Connector};
use crate::observability::metrics;
use crate::secrets::SecretReader;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Hash-scheme prefix recognised by Django's `BCryptSHA256PasswordHasher`
pub const HASH_PREFIX: &str = "bcrypt_sha256$";

/// Hash a raw password for the credential store
///
/// The SHA-256 digest is hex-encoded before bcrypt so that passwords longer than
/// bcrypt's 72-byte input limit keep their full entropy.
pub fn hash_password(password: &[u8], cost: u32) -> Result<String, ReconcileError> {
    let digest = Zeroizing::new(format!("{:x}", Sha256::digest(password)));
    let hashed =
        bcrypt::hash(digest.as_bytes(), cost).map_err(|e| ReconcileError::Hash(e.to_string()))?;
    Ok(format!("{HASH_PREFIX}{hashed}"))
}

/// Move secret bytes into a string without leaving an unzeroized copy behind
fn utf8_secret(mut bytes: Zeroizing<Vec<u8>>) -> Option<Zeroizing<String>> {
    match String::from_utf8(std::mem::take(&mut *bytes)) {
        Ok(text) => Some(Zeroizing::new(text)),
        Err(e) => {
            drop(Zeroizing::new(e.into_bytes()));
            None
        }
    }
}

/// Reconciles `DatabaseUser` targets into the credential store
pub struct CredentialReconciler<C: Connector> {
    secrets: Arc<dyn SecretReader>,
    pool: Arc<ConnectionPool<C>>,
    hash_cost: u32,
}

impl<C: Connector> std::fmt::Debug for CredentialReconciler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialReconciler")
            .field("pool", &self.pool)
            .field("hash_cost", &self.hash_cost)
            .finish_non_exhaustive()
    }
}

impl<C> CredentialReconciler<C>
where
    C: Connector,
    C::Connection: UserStore,
{
    pub fn new(secrets: Arc<dyn SecretReader>, pool: Arc<ConnectionPool<C>>, hash_cost: u32) -> Self {
        Self {
            secrets,
            pool,
            hash_cost,
        }
    }

    /// Upsert the user described by `spec` and return its row id
    pub async fn reconcile_user(
        &self,
        namespace: &str,
        spec: &DatabaseUserSpec,
    ) -> Result<i64, ReconcileError> {
        let password = self
            .read_secret_key(&spec.password_secret, namespace, PASSWORD_SECRET_KEY)
            .await?;

        let cost = self.hash_cost;
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password, cost))
            .await
            .map_err(|e| ReconcileError::Hash(e.to_string()))??;

        let db_ref = &spec.database.password_secret_ref;
        let db_password = self
            .read_secret_key(&db_ref.name, namespace, &db_ref.key)
            .await
            .and_then(|bytes| {
                utf8_secret(bytes).ok_or_else(|| ReconcileError::InvalidSecretValue {
                    name: db_ref.name.clone(),
                    namespace: namespace.to_string(),
                    key: db_ref.key.clone(),
                })
            })?;

        let data_source = DataSource {
            host: spec.database.host.clone(),
            port: spec.database.port,
            database: spec.database.database.clone(),
            username: spec.database.username.clone(),
            password: db_password,
        };
        let url = Zeroizing::new(data_source.url()?);
        let connection = self.pool.acquire(POSTGRES_DRIVER, &url).await?;

        let record = UserRecord {
            username: spec.username.clone(),
            password_hash,
            first_name: spec.first_name.clone(),
            last_name: spec.last_name.clone(),
            email: spec.email.clone(),
            active: spec.active,
            staff: spec.staff,
            superuser: spec.superuser,
        };
        debug!(user = ?record, "Upserting user");

        let id = connection
            .upsert_user(&record)
            .await
            .map_err(|source| ReconcileError::Query {
                username: spec.username.clone(),
                source,
            })?;

        metrics::increment_users_upserted();
        Ok(id)
    }

    async fn read_secret_key(
        &self,
        name: &str,
        namespace: &str,
        key: &str,
    ) -> Result<Zeroizing<Vec<u8>>, ReconcileError> {
        let mut data = self.secrets.get(name, namespace).await?;
        data.remove(key)
            .map(Zeroizing::new)
            .ok_or_else(|| ReconcileError::MissingSecretKey {
                name: name.to_string(),
                namespace: namespace.to_string(),
                key: key.to_string(),
            })
    }
}

#[async_trait]
impl<C> Component<DatabaseUser> for CredentialReconciler<C>
where
    C: Connector,
    C::Connection: UserStore,
{
    fn name(&self) -> &'static str {
        "credentials"
    }

    async fn reconcile(&self, target: &mut DatabaseUser) -> Result<Outcome, ReconcileError> {
        let namespace = target.target_namespace();
        let id = self.reconcile_user(&namespace, &target.spec).await?;

        info!(
            "User {} ({}/{}) reconciled with id {}",
            target.spec.username,
            namespace,
            target.target_name(),
            id
        );
        target.status.get_or_insert_with(Default::default).user_id = Some(id);
        target.set_status(Status::Ready, format!("User {id} created"));
        Ok(Outcome::done())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_has_scheme_prefix_and_verifies() {
        let hash = hash_password(b"secret", 4).unwrap();
        let bcrypt_part = hash.strip_prefix(HASH_PREFIX).unwrap();
        assert!(bcrypt_part.starts_with("$2b$04$"));

        let digest = format!("{:x}", Sha256::digest(b"secret"));
        assert!(bcrypt::verify(digest, bcrypt_part).unwrap());
    }

    #[test]
    fn test_hash_accepts_long_and_empty_passwords() {
        let long = vec![b'x'; 500];
        assert!(hash_password(&long, 4).unwrap().starts_with(HASH_PREFIX));
        assert!(hash_password(b"", 4).unwrap().starts_with(HASH_PREFIX));
    }

    #[test]
    fn test_utf8_secret() {
        let text = utf8_secret(Zeroizing::new(b"s3cret".to_vec())).unwrap();
        assert_eq!(text.as_str(), "s3cret");
        assert!(utf8_secret(Zeroizing::new(vec![0xff, 0xfe, 0x41])).is_none());
    }

    #[test]
    fn test_invalid_cost_is_terminal() {
        let err = hash_password(b"secret", 99).unwrap_err();
        assert!(!err.is_requeueable());
    }
}
