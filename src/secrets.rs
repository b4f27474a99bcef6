//! # Secret Store
//!
//! Key-value secret access with get/put semantics.
//!
//! Writes replace the whole secret (read-modify-write), never individual fields.
//! A concurrent writer makes the replace fail with a conflict, which is retried
//! on the next pass.
//! [`KubeSecrets`] backs both traits with Kubernetes `Secret` objects.

use crate::constants::FIELD_MANAGER;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{ObjectMeta, PostParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Contents of a secret: key to raw bytes
pub type SecretData = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret {namespace}/{name} not found")]
    NotFound { name: String, namespace: String },
    #[error("secret store request for {namespace}/{name} failed: {message}")]
    Backend {
        name: String,
        namespace: String,
        message: String,
    },
}

impl SecretError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SecretError::NotFound { .. })
    }
}

/// Read access to secrets
#[async_trait]
pub trait SecretReader: Send + Sync {
    /// Fetch a secret; fails with [`SecretError::NotFound`] when absent
    async fn get(&self, name: &str, namespace: &str) -> Result<SecretData, SecretError>;
}

/// Read-write access to secrets
#[async_trait]
pub trait SecretStore: SecretReader {
    /// Write `data` as the complete contents of the secret, creating it if needed
    async fn put(&self, name: &str, namespace: &str, data: SecretData)
        -> Result<(), SecretError>;
}

/// Kubernetes-backed secret store
#[derive(Clone)]
pub struct KubeSecrets {
    client: Client,
}

impl std::fmt::Debug for KubeSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecrets").finish_non_exhaustive()
    }
}

impl KubeSecrets {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn backend_error(name: &str, namespace: &str, e: &kube::Error) -> SecretError {
    SecretError::Backend {
        name: name.to_string(),
        namespace: namespace.to_string(),
        message: e.to_string(),
    }
}

#[async_trait]
impl SecretReader for KubeSecrets {
    async fn get(&self, name: &str, namespace: &str) -> Result<SecretData, SecretError> {
        let secret = self
            .api(namespace)
            .get_opt(name)
            .await
            .map_err(|e| backend_error(name, namespace, &e))?
            .ok_or_else(|| SecretError::NotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            })?;

        Ok(secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(key, ByteString(value))| (key, value))
            .collect())
    }
}

/// Full replacement of a secret's data
///
/// Metadata of an existing secret (including `resourceVersion`) is kept so the
/// replace is rejected if someone else wrote in between. Every key not in `data`
/// is dropped regardless of which field manager created it.
fn replacement_secret(
    existing: Option<Secret>,
    name: &str,
    namespace: &str,
    data: SecretData,
) -> Secret {
    let mut secret = existing.unwrap_or_else(|| Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        ..Secret::default()
    });
    secret.string_data = None;
    secret.data = Some(
        data.into_iter()
            .map(|(key, value)| (key, ByteString(value)))
            .collect(),
    );
    secret
}

#[async_trait]
impl SecretStore for KubeSecrets {
    async fn put(
        &self,
        name: &str,
        namespace: &str,
        data: SecretData,
    ) -> Result<(), SecretError> {
        let api = self.api(namespace);
        let existing = api
            .get_opt(name)
            .await
            .map_err(|e| backend_error(name, namespace, &e))?;
        let creating = existing.is_none();
        let secret = replacement_secret(existing, name, namespace, data);

        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };
        let written = if creating {
            api.create(&params, &secret).await
        } else {
            api.replace(name, &params, &secret).await
        };

        match written {
            Ok(_) => {
                debug!(secret.name = name, secret.namespace = namespace, "secret written");
                Ok(())
            }
            Err(kube::Error::Api(api_err)) if api_err.code == 409 => Err(SecretError::Backend {
                name: name.to_string(),
                namespace: namespace.to_string(),
                message: "secret changed since it was read, retrying on the next pass".to_string(),
            }),
            Err(e) => Err(backend_error(name, namespace, &e)),
        }
    }
}
