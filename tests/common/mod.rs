//! Common test utilities
//!
//! In-memory stand-ins for the operator's external collaborators: the secret
//! store, the credential database and its connector, the chat client and the
//! deployment status reporter.

#![allow(dead_code, reason = "Each test binary uses a different subset")]

use async_trait::async_trait;
use platform_operator::database::{StoreError, UserRecord, UserStore};
use platform_operator::dbpool::{ConnectionKey, Connector, PoolError};
use platform_operator::messaging::{Attachment, MessagingClient, MessagingError, StatusReporter};
use platform_operator::secrets::{SecretData, SecretError, SecretReader, SecretStore};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;

// ---------------------------------------------------------------------------
// Secret store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: Mutex<HashMap<(String, String), SecretData>>,
    writes: AtomicUsize,
    pub fail_requests: AtomicBool,
}

impl InMemorySecretStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert<K, V>(&self, name: &str, namespace: &str, pairs: &[(K, V)])
    where
        K: AsRef<str>,
        V: AsRef<[u8]>,
    {
        let data = pairs
            .iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_vec()))
            .collect();
        self.secrets
            .lock()
            .unwrap()
            .insert((name.to_string(), namespace.to_string()), data);
    }

    pub fn secret(&self, name: &str, namespace: &str) -> Option<SecretData> {
        self.secrets
            .lock()
            .unwrap()
            .get(&(name.to_string(), namespace.to_string()))
            .cloned()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_available(&self, name: &str, namespace: &str) -> Result<(), SecretError> {
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(SecretError::Backend {
                name: name.to_string(),
                namespace: namespace.to_string(),
                message: "connection reset by peer".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SecretReader for InMemorySecretStore {
    async fn get(&self, name: &str, namespace: &str) -> Result<SecretData, SecretError> {
        self.check_available(name, namespace)?;
        self.secret(name, namespace).ok_or_else(|| SecretError::NotFound {
            name: name.to_string(),
            namespace: namespace.to_string(),
        })
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn put(&self, name: &str, namespace: &str, data: SecretData) -> Result<(), SecretError> {
        self.check_available(name, namespace)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.secrets
            .lock()
            .unwrap()
            .insert((name.to_string(), namespace.to_string()), data);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Credential database
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub id: i64,
    pub record: UserRecord,
    /// Logical timestamp set only on insert
    pub date_joined: u64,
}

/// A `auth_user` table keyed by username
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    rows: Mutex<HashMap<String, UserRow>>,
    next_id: AtomicU64,
    tick: AtomicU64,
    pub fail_queries: AtomicBool,
}

impl InMemoryDatabase {
    pub fn row(&self, username: &str) -> Option<UserRow> {
        self.rows.lock().unwrap().get(username).cloned()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

/// A session on an [`InMemoryDatabase`]; `session` tells sessions apart
#[derive(Debug, Clone)]
pub struct InMemoryConnection {
    pub session: usize,
    pub database: Arc<InMemoryDatabase>,
}

#[async_trait]
impl UserStore for InMemoryConnection {
    async fn upsert_user(&self, user: &UserRecord) -> Result<i64, StoreError> {
        let db = &self.database;
        if db.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Query(
                "relation \"auth_user\" does not exist".to_string(),
            ));
        }

        let now = db.tick.fetch_add(1, Ordering::SeqCst);
        let mut rows = db.rows.lock().unwrap();
        let row = rows
            .entry(user.username.clone())
            .and_modify(|row| row.record = user.clone())
            .or_insert_with(|| UserRow {
                id: i64::try_from(db.next_id.fetch_add(1, Ordering::SeqCst) + 1).unwrap(),
                record: user.clone(),
                date_joined: now,
            });
        Ok(row.id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryConnector {
    pub database: Arc<InMemoryDatabase>,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub unreachable: AtomicBool,
    /// Holds every `open` until this many callers are opening at once
    pub barrier: Option<Arc<Barrier>>,
    pub keys: Mutex<Vec<ConnectionKey>>,
}

impl InMemoryConnector {
    pub fn with_barrier(parties: usize) -> Self {
        Self {
            barrier: Some(Arc::new(Barrier::new(parties))),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    type Connection = InMemoryConnection;

    async fn open(&self, key: &ConnectionKey) -> Result<InMemoryConnection, PoolError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(PoolError::Open("connection refused".to_string()));
        }
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        self.keys.lock().unwrap().push(key.clone());
        Ok(InMemoryConnection {
            session: self.opened.fetch_add(1, Ordering::SeqCst),
            database: Arc::clone(&self.database),
        })
    }

    async fn close(&self, _connection: InMemoryConnection) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RecordingMessaging {
    sent: Mutex<Vec<(String, Attachment)>>,
    attempts: AtomicUsize,
    failing_channels: Mutex<HashSet<String>>,
}

impl RecordingMessaging {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_channel(&self, channel: &str) {
        self.failing_channels
            .lock()
            .unwrap()
            .insert(channel.to_string());
    }

    pub fn heal(&self) {
        self.failing_channels.lock().unwrap().clear();
    }

    /// Successfully delivered messages, in send order
    pub fn sent(&self) -> Vec<(String, Attachment)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.sent().into_iter().map(|(c, _)| c).collect();
        channels.sort();
        channels
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessagingClient for RecordingMessaging {
    async fn post_message(
        &self,
        channel: &str,
        attachment: &Attachment,
    ) -> Result<(String, String), MessagingError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing_channels.lock().unwrap().contains(channel) {
            return Err(MessagingError::Rejected {
                endpoint: "memory".to_string(),
                message: "channel_not_found".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel.to_string(), attachment.clone()));
        Ok((channel.to_string(), attempt.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<(String, String, String)>>,
    pub fail: AtomicBool,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reports(&self) -> Vec<(String, String, String)> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusReporter for RecordingReporter {
    async fn post_status(
        &self,
        name: &str,
        environment: &str,
        tag: &str,
    ) -> Result<(), MessagingError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MessagingError::Transport {
                endpoint: "memory".to_string(),
                message: "503 Service Unavailable".to_string(),
            });
        }
        self.reports.lock().unwrap().push((
            name.to_string(),
            environment.to_string(),
            tag.to_string(),
        ));
        Ok(())
    }
}
