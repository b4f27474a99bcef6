//! # Credential Store
//!
//! PostgreSQL access for managed users.
//!
//! - [`DataSource`] builds the connection URL (always `sslmode=verify-full`)
//! - [`PostgresConnector`] opens pooled `sea-orm` connections
//! - [`UserStore`] is the single upsert the credential reconciler needs

use crate::constants::POSTGRES_DRIVER;
use crate::dbpool::{ConnectionKey, Connector, PoolError};
use async_trait::async_trait;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr,
    Statement, Value,
};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use url::Url;
use zeroize::Zeroizing;

/// Upsert keyed by username. `date_joined` is only written on first insert so
/// replays never reset account history.
pub const UPSERT_USER_SQL: &str = r"
INSERT INTO auth_user (username, password, first_name, last_name, email, is_active, is_staff, is_superuser, date_joined)
  VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
  ON CONFLICT (username) DO UPDATE SET
    password=EXCLUDED.password,
    first_name=EXCLUDED.first_name,
    last_name=EXCLUDED.last_name,
    email=EXCLUDED.email,
    is_active=EXCLUDED.is_active,
    is_staff=EXCLUDED.is_staff,
    is_superuser=EXCLUDED.is_superuser
  RETURNING id;";

/// Connection parameters for a PostgreSQL database
#[derive(Clone)]
pub struct DataSource {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: Zeroizing<String>,
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSource")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl DataSource {
    /// Connection URL with full certificate and hostname verification
    pub fn url(&self) -> Result<String, PoolError> {
        let mut url = Url::parse(&format!("postgres://{}", self.host))
            .map_err(|e| PoolError::InvalidDataSource(format!("host {:?}: {e}", self.host)))?;
        url.set_port(Some(self.port))
            .map_err(|()| PoolError::InvalidDataSource(format!("port {}", self.port)))?;
        url.set_username(&self.username).map_err(|()| {
            PoolError::InvalidDataSource(format!("username {:?}", self.username))
        })?;
        url.set_password(Some(self.password.as_str()))
            .map_err(|()| PoolError::InvalidDataSource("password".to_string()))?;
        url.set_path(&format!("/{}", self.database));
        url.query_pairs_mut().append_pair("sslmode", "verify-full");
        Ok(url.into())
    }
}

/// Opens PostgreSQL connections through `sea-orm`
#[derive(Debug, Clone)]
pub struct PostgresConnector {
    max_connections: u32,
    connect_timeout: Duration,
}

impl Default for PostgresConnector {
    fn default() -> Self {
        Self {
            max_connections: 5,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    type Connection = DatabaseConnection;

    async fn open(&self, key: &ConnectionKey) -> Result<DatabaseConnection, PoolError> {
        if key.driver_name() != POSTGRES_DRIVER {
            return Err(PoolError::UnsupportedDriver(key.driver_name().to_string()));
        }

        let mut options = ConnectOptions::new(key.data_source_name().to_string());
        options
            .max_connections(self.max_connections)
            .connect_timeout(self.connect_timeout)
            .sqlx_logging(false);

        Database::connect(options)
            .await
            .map_err(|e| PoolError::Open(e.to_string()))
    }

    async fn close(&self, connection: DatabaseConnection) {
        if let Err(e) = connection.close().await {
            warn!("Failed to close redundant database connection: {}", e);
        }
    }
}

/// Desired contents of a user row
#[derive(Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub active: bool,
    pub staff: bool,
    pub superuser: bool,
}

impl fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRecord")
            .field("username", &self.username)
            .field("password_hash", &"***")
            .field("email", &self.email)
            .field("active", &self.active)
            .field("staff", &self.staff)
            .field("superuser", &self.superuser)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("query failed: {0}")]
    Query(String),
    #[error("upsert returned no row for user {0:?}")]
    NoRowReturned(String),
}

impl From<DbErr> for StoreError {
    fn from(e: DbErr) -> Self {
        StoreError::Query(e.to_string())
    }
}

/// Insert-or-update of user rows
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Upsert `user` keyed by username and return the row id
    async fn upsert_user(&self, user: &UserRecord) -> Result<i64, StoreError>;
}

#[async_trait]
impl UserStore for DatabaseConnection {
    async fn upsert_user(&self, user: &UserRecord) -> Result<i64, StoreError> {
        let values: [Value; 8] = [
            user.username.clone().into(),
            user.password_hash.clone().into(),
            user.first_name.clone().into(),
            user.last_name.clone().into(),
            user.email.clone().into(),
            user.active.into(),
            user.staff.into(),
            user.superuser.into(),
        ];
        let statement =
            Statement::from_sql_and_values(DatabaseBackend::Postgres, UPSERT_USER_SQL, values);

        let row = self
            .query_one(statement)
            .await?
            .ok_or_else(|| StoreError::NoRowReturned(user.username.clone()))?;

        // Django's auth_user.id is a serial (int4); bigserial tables are accepted too
        match row.try_get::<i32>("", "id") {
            Ok(id) => Ok(i64::from(id)),
            Err(_) => Ok(row.try_get::<i64>("", "id")?),
        }
    }
}
