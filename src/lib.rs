//! # Platform Operator
//!
//! A Kubernetes operator that idempotently drives three stateful external systems
//! from custom resources:
//!
//! - **Credential store**: `DatabaseUser` resources become rows in a PostgreSQL
//!   `auth_user` table, with passwords hashed as `bcrypt_sha256`
//! - **Keyring**: each `Platform` owns a secret of time-labelled keys that is
//!   rotated on a configurable lifetime
//! - **Notifications**: `Platform` deployments and errors are announced to Slack
//!   channels exactly once per distinct event
//!
//! Every pass may run any number of times, concurrently with others; all writes
//! are idempotent and database connections are shared through a race-safe
//! [`dbpool::ConnectionPool`].

pub mod clock;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod database;
pub mod dbpool;
pub mod messaging;
pub mod observability;
pub mod runtime;
pub mod secrets;
