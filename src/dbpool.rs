//! # Connection Pool
//!
//! Process-wide cache of live database connections keyed by driver name and
//! data source name.
//!
//! - A hit returns the cached handle; no new connection is opened.
//! - A miss opens a connection and then performs an atomic insert-if-absent.
//!   The loser of a first-access race closes its redundant connection and
//!   returns the winner's handle.
//! - Nothing is cached when opening fails, so the next call retries from scratch.
//! - Entries are never evicted; connections live as long as the process.
//!
//! The pool is an explicit value rather than a global. Create one at startup and
//! share it through the reconciler context; tests build their own.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::observability::metrics;

/// Identity of a pooled connection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    driver_name: String,
    data_source_name: String,
}

impl ConnectionKey {
    pub fn new(driver_name: impl Into<String>, data_source_name: impl Into<String>) -> Self {
        Self {
            driver_name: driver_name.into(),
            data_source_name: data_source_name.into(),
        }
    }

    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    pub fn data_source_name(&self) -> &str {
        &self.data_source_name
    }
}

// The data source name embeds a password and must never reach the logs.
impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <redacted>", self.driver_name)
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("unsupported database driver {0:?}")]
    UnsupportedDriver(String),
    #[error("invalid data source: {0}")]
    InvalidDataSource(String),
    #[error("unable to open database connection: {0}")]
    Open(String),
}

/// Opens and closes connections for the pool
#[async_trait]
pub trait Connector: Send + Sync {
    /// Shared handle to an open session; cloning must not open a new session
    type Connection: Clone + Send + Sync + 'static;

    async fn open(&self, key: &ConnectionKey) -> Result<Self::Connection, PoolError>;

    /// Close a connection that lost an insertion race
    async fn close(&self, connection: Self::Connection);
}

/// Race-safe registry of live connections
pub struct ConnectionPool<C: Connector> {
    connector: C,
    connections: DashMap<ConnectionKey, C::Connection>,
}

impl<C: Connector> fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> ConnectionPool<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            connections: DashMap::new(),
        }
    }

    /// Return the live connection for `(driver_name, data_source_name)`, opening it on first use
    pub async fn acquire(
        &self,
        driver_name: &str,
        data_source_name: &str,
    ) -> Result<C::Connection, PoolError> {
        let key = ConnectionKey::new(driver_name, data_source_name);

        if let Some(existing) = self.connections.get(&key) {
            return Ok(existing.value().clone());
        }

        let opened = self.connector.open(&key).await?;
        metrics::increment_pool_connections_opened();

        // The entry guard must be released before awaiting the close below.
        let (connection, redundant) = match self.connections.entry(key) {
            Entry::Occupied(entry) => (entry.get().clone(), Some(opened)),
            Entry::Vacant(entry) => {
                info!("Opened new pooled database connection for {}", entry.key());
                entry.insert(opened.clone());
                (opened, None)
            }
        };

        if let Some(redundant) = redundant {
            debug!("Lost connection insert race, closing redundant connection");
            self.connector.close(redundant).await;
            metrics::increment_pool_connections_discarded();
        }

        Ok(connection)
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Number of cached connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
