//! # Key Rotation Tests
//!
//! Time-windowed keyring behaviour under a pinned clock:
//! - bootstrap of an absent keyring
//! - growth once the newest key outlives its lifetime
//! - expiry after two lifetimes, never emptying the keyring
//! - corrupted labels surface as terminal errors

mod common;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use common::InMemorySecretStore;
use platform_operator::clock::FixedClock;
use platform_operator::controller::keyring::{format_label, KeyRotator, RotationReport};
use platform_operator::controller::{ComponentRunner, ReconcileError, Reconcilable};
use platform_operator::crd::{NotificationsSpec, Platform, PlatformSpec, Status};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const NAMESPACE: &str = "default";
const KEYRING: &str = "foo.keyring";
const LIFETIME_SECS: i64 = 10_000;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn lifetime() -> Duration {
    Duration::from_secs(LIFETIME_SECS.unsigned_abs())
}

fn ago(secs: i64) -> String {
    format_label(now() - ChronoDuration::seconds(secs))
}

fn rotator(store: &Arc<InMemorySecretStore>) -> KeyRotator {
    KeyRotator::new(store.clone(), Arc::new(FixedClock(now())))
}

fn labels(store: &InMemorySecretStore) -> Vec<String> {
    store
        .secret(KEYRING, NAMESPACE)
        .unwrap_or_default()
        .into_keys()
        .collect()
}

#[tokio::test]
async fn test_bootstrap_creates_single_key() {
    let store = InMemorySecretStore::new();

    let report = rotator(&store)
        .rotate(KEYRING, NAMESPACE, lifetime())
        .await
        .unwrap();

    assert_eq!(
        report,
        RotationReport {
            added: 1,
            removed: 0,
            size: 1
        }
    );
    let keyring = store.secret(KEYRING, NAMESPACE).unwrap();
    let (label, key) = keyring.iter().next().unwrap();
    assert_eq!(label, &format_label(now()));
    assert_eq!(key.len(), 86);
}

#[tokio::test]
async fn test_empty_keyring_is_bootstrapped() {
    let store = InMemorySecretStore::new();
    store.insert::<&str, &str>(KEYRING, NAMESPACE, &[]);

    let report = rotator(&store)
        .rotate(KEYRING, NAMESPACE, lifetime())
        .await
        .unwrap();

    assert_eq!(report.size, 1);
}

#[tokio::test]
async fn test_key_within_lifetime_is_a_no_write_pass() {
    let store = InMemorySecretStore::new();
    store.insert(KEYRING, NAMESPACE, &[(&ago(LIFETIME_SECS), "k1")]);

    let report = rotator(&store)
        .rotate(KEYRING, NAMESPACE, lifetime())
        .await
        .unwrap();

    assert!(!report.changed());
    assert_eq!(report.size, 1);
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn test_repeated_passes_converge() {
    let store = InMemorySecretStore::new();
    let rotator = rotator(&store);

    rotator.rotate(KEYRING, NAMESPACE, lifetime()).await.unwrap();
    let after_first = store.secret(KEYRING, NAMESPACE);
    let report = rotator.rotate(KEYRING, NAMESPACE, lifetime()).await.unwrap();

    assert!(!report.changed());
    assert_eq!(store.secret(KEYRING, NAMESPACE), after_first);
    assert_eq!(store.writes(), 1);
}

#[tokio::test]
async fn test_expired_newest_key_gets_a_successor() {
    let store = InMemorySecretStore::new();
    // 1.0001 x lifetime in the past
    let old = ago(LIFETIME_SECS + 1);
    store.insert(KEYRING, NAMESPACE, &[(&old, "k1")]);

    let report = rotator(&store)
        .rotate(KEYRING, NAMESPACE, lifetime())
        .await
        .unwrap();

    assert_eq!(report.added, 1);
    assert_eq!(report.removed, 0);
    assert_eq!(labels(&store), vec![old, format_label(now())]);
}

#[tokio::test]
async fn test_key_older_than_two_lifetimes_is_removed() {
    let store = InMemorySecretStore::new();
    let expired = ago(2 * LIFETIME_SECS + 1);
    let current = ago(LIFETIME_SECS / 2);
    store.insert(KEYRING, NAMESPACE, &[(&expired, "k1"), (&current, "k2")]);

    let report = rotator(&store)
        .rotate(KEYRING, NAMESPACE, lifetime())
        .await
        .unwrap();

    assert_eq!(report.removed, 1);
    assert_eq!(report.added, 0);
    assert_eq!(labels(&store), vec![current]);
}

#[tokio::test]
async fn test_superseded_key_in_grace_window_is_kept() {
    let store = InMemorySecretStore::new();
    let superseded = ago(2 * LIFETIME_SECS - 1);
    let current = ago(LIFETIME_SECS - 1);
    store.insert(KEYRING, NAMESPACE, &[(&superseded, "k1"), (&current, "k2")]);

    let report = rotator(&store)
        .rotate(KEYRING, NAMESPACE, lifetime())
        .await
        .unwrap();

    assert!(!report.changed());
    assert_eq!(labels(&store).len(), 2);
}

#[tokio::test]
async fn test_lone_ancient_key_is_kept_until_successor_exists() {
    let store = InMemorySecretStore::new();
    let ancient = ago(10 * LIFETIME_SECS);
    store.insert(KEYRING, NAMESPACE, &[(&ancient, "k1")]);

    let first = rotator(&store)
        .rotate(KEYRING, NAMESPACE, lifetime())
        .await
        .unwrap();
    assert_eq!((first.added, first.removed, first.size), (1, 0, 2));

    // With a newer successor in place, the ancient key goes on the next pass
    let second = rotator(&store)
        .rotate(KEYRING, NAMESPACE, lifetime())
        .await
        .unwrap();
    assert_eq!((second.added, second.removed, second.size), (0, 1, 1));
    assert_eq!(labels(&store), vec![format_label(now())]);
}

#[tokio::test]
async fn test_malformed_label_is_terminal_and_nothing_is_written() {
    let store = InMemorySecretStore::new();
    store.insert(
        KEYRING,
        NAMESPACE,
        &[(ago(3 * LIFETIME_SECS).as_str(), "k1"), ("last-tuesday", "k2")],
    );

    let err = rotator(&store)
        .rotate(KEYRING, NAMESPACE, lifetime())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::MalformedLabel { ref label, .. } if label == "last-tuesday"));
    assert!(!err.is_requeueable());
    assert!(err.to_string().contains("default/foo.keyring"));
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn test_store_failure_is_requeueable() {
    let store = InMemorySecretStore::new();
    store.fail_requests.store(true, Ordering::SeqCst);

    let err = rotator(&store)
        .rotate(KEYRING, NAMESPACE, lifetime())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::SecretStore(_)));
    assert!(err.is_requeueable());
}

#[tokio::test]
async fn test_sub_second_lifetime_is_rejected_before_any_write() {
    let store = InMemorySecretStore::new();
    store.insert(KEYRING, NAMESPACE, &[(ago(0).as_str(), "k1")]);

    let err = rotator(&store)
        .rotate(KEYRING, NAMESPACE, Duration::from_millis(500))
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::InvalidLifetime { ref value, .. } if value == "500ms"));
    assert!(!err.is_requeueable());
    assert_eq!(store.writes(), 0);
    assert_eq!(store.secret(KEYRING, NAMESPACE).unwrap()[&ago(0)], b"k1".to_vec());
}

fn platform(key_lifetime: &str) -> Platform {
    let mut platform = Platform::new(
        "foo",
        PlatformSpec {
            hostname: "foo.example.com".to_string(),
            version: "1234-eb6b515-main".to_string(),
            environment: "dev".to_string(),
            key_lifetime: key_lifetime.to_string(),
            notifications: NotificationsSpec::default(),
        },
    );
    platform.metadata.namespace = Some(NAMESPACE.to_string());
    platform
}

#[tokio::test]
async fn test_platform_pass_rotates_its_keyring() {
    let store = InMemorySecretStore::new();
    let runner = ComponentRunner::<Platform>::new().with(rotator(&store));
    let mut foo = platform("8760h");

    runner.run(&mut foo).await.unwrap();

    assert_eq!(foo.current_status(), Some(Status::Ready));
    assert!(foo.status.unwrap().message.unwrap().contains(KEYRING));
    assert_eq!(labels(&store).len(), 1);
}

#[tokio::test]
async fn test_invalid_key_lifetime_is_terminal() {
    let store = InMemorySecretStore::new();
    let runner = ComponentRunner::<Platform>::new().with(rotator(&store));
    let mut foo = platform("one year");

    let err = runner.run(&mut foo).await.unwrap_err();

    assert!(matches!(err, ReconcileError::InvalidLifetime { ref value, .. } if value == "one year"));
    assert!(!err.is_requeueable());
    assert_eq!(foo.current_status(), Some(Status::Error));
    assert_eq!(store.writes(), 0);
}
