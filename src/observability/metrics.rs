//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `platform_operator_reconciliations_total` - Reconciliation passes by kind
//! - `platform_operator_reconciliation_errors_total` - Failed passes by kind and class
//! - `platform_operator_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `platform_operator_pool_connections_opened_total` - Database connections opened
//! - `platform_operator_pool_connections_discarded_total` - Connections closed after losing an insert race
//! - `platform_operator_users_upserted_total` - Successful user upserts
//! - `platform_operator_keys_added_total` - Keys generated by rotation
//! - `platform_operator_keys_removed_total` - Keys retired by rotation
//! - `platform_operator_notifications_sent_total` - Messages sent, by outcome
//! - `platform_operator_notifications_suppressed_total` - Duplicate notifications suppressed

use anyhow::Result;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "platform_operator_reconciliations_total",
            "Total number of reconciliation passes",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "platform_operator_reconciliation_errors_total",
            "Total number of failed reconciliation passes",
        ),
        &["kind", "class"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "platform_operator_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static POOL_CONNECTIONS_OPENED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "platform_operator_pool_connections_opened_total",
        "Total number of database connections opened by the pool",
    )
    .expect("Failed to create POOL_CONNECTIONS_OPENED_TOTAL metric - this should never happen")
});

static POOL_CONNECTIONS_DISCARDED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "platform_operator_pool_connections_discarded_total",
        "Total number of redundant connections closed after losing an insert race",
    )
    .expect("Failed to create POOL_CONNECTIONS_DISCARDED_TOTAL metric - this should never happen")
});

static USERS_UPSERTED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "platform_operator_users_upserted_total",
        "Total number of successful user upserts",
    )
    .expect("Failed to create USERS_UPSERTED_TOTAL metric - this should never happen")
});

static KEYS_ADDED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "platform_operator_keys_added_total",
        "Total number of keyring entries generated",
    )
    .expect("Failed to create KEYS_ADDED_TOTAL metric - this should never happen")
});

static KEYS_REMOVED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "platform_operator_keys_removed_total",
        "Total number of expired keyring entries removed",
    )
    .expect("Failed to create KEYS_REMOVED_TOTAL metric - this should never happen")
});

static NOTIFICATIONS_SENT_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "platform_operator_notifications_sent_total",
            "Total number of notification messages attempted",
        ),
        &["outcome"],
    )
    .expect("Failed to create NOTIFICATIONS_SENT_TOTAL metric - this should never happen")
});

static NOTIFICATIONS_SUPPRESSED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "platform_operator_notifications_suppressed_total",
        "Total number of notifications suppressed as duplicates",
    )
    .expect("Failed to create NOTIFICATIONS_SUPPRESSED_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Only fails when a metric is registered twice"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(POOL_CONNECTIONS_OPENED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(POOL_CONNECTIONS_DISCARDED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(USERS_UPSERTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(KEYS_ADDED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(KEYS_REMOVED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(NOTIFICATIONS_SENT_TOTAL.clone()))?;
    REGISTRY.register(Box::new(NOTIFICATIONS_SUPPRESSED_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_reconciliation_errors(kind: &str, class: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[kind, class])
        .inc();
}

pub fn observe_reconciliation_duration(kind: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[kind])
        .observe(duration);
}

pub fn increment_pool_connections_opened() {
    POOL_CONNECTIONS_OPENED_TOTAL.inc();
}

pub fn increment_pool_connections_discarded() {
    POOL_CONNECTIONS_DISCARDED_TOTAL.inc();
}

pub fn increment_users_upserted() {
    USERS_UPSERTED_TOTAL.inc();
}

pub fn increment_keys_added(count: usize) {
    KEYS_ADDED_TOTAL.inc_by(count as u64);
}

pub fn increment_keys_removed(count: usize) {
    KEYS_REMOVED_TOTAL.inc_by(count as u64);
}

pub fn increment_notifications_sent(outcome: &str) {
    NOTIFICATIONS_SENT_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn increment_notifications_suppressed() {
    NOTIFICATIONS_SUPPRESSED_TOTAL.inc();
}

/// Gather all registered metric families
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    REGISTRY.gather()
}
