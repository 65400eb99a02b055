//! Tests for connection liveness checks

use std::time::Duration;

use tarn_core::PhysicalConnection;

use super::*;
use crate::pool::PoolConfig;
use crate::testing::MockConnection;

fn ping_config(threshold_ms: u64) -> PoolConfig {
    PoolConfig::default()
        .with_ping_enabled(true)
        .with_ping_query("SELECT 1")
        .with_ping_idle_threshold_ms(threshold_ms)
}

#[test]
fn test_should_ping_requires_enabled() {
    let config = PoolConfig::default().with_ping_idle_threshold_ms(0);
    assert!(!should_ping(&config, Duration::from_secs(60)));
}

#[test]
fn test_should_ping_respects_threshold() {
    let config = ping_config(1000);
    assert!(!should_ping(&config, Duration::from_millis(500)));
    assert!(!should_ping(&config, Duration::from_millis(1000)));
    assert!(should_ping(&config, Duration::from_millis(1500)));
}

#[test]
fn test_should_ping_without_threshold() {
    let config = ping_config(0).without_ping_idle_threshold();
    assert!(!should_ping(&config, Duration::from_secs(3600)));
}

#[tokio::test]
async fn test_ping_skipped_for_recent_connection() {
    let conn = MockConnection::new(0);
    let outcome = ping_connection(&conn, Duration::from_millis(500), &ping_config(1000)).await;

    assert_eq!(outcome, PingOutcome::Skipped);
    assert!(outcome.is_usable());
    assert_eq!(conn.probes(), 0);
}

#[tokio::test]
async fn test_ping_probes_idle_connection() {
    let conn = MockConnection::new(0);
    let outcome = ping_connection(&conn, Duration::from_millis(1500), &ping_config(1000)).await;

    assert!(matches!(outcome, PingOutcome::Alive(_)));
    assert!(outcome.is_usable());
    assert_eq!(conn.probes(), 1);
    // Not in auto-commit mode, so the probe is rolled back
    assert_eq!(conn.rollbacks(), 1);
}

#[tokio::test]
async fn test_ping_skips_rollback_in_auto_commit() {
    let conn = MockConnection::new(0).auto_commit();
    let outcome = ping_connection(&conn, Duration::from_millis(1500), &ping_config(1000)).await;

    assert!(outcome.is_usable());
    assert_eq!(conn.rollbacks(), 0);
}

#[tokio::test]
async fn test_ping_closed_connection() {
    let conn = MockConnection::new(0);
    conn.set_closed(true);

    let outcome = ping_connection(&conn, Duration::from_millis(1500), &ping_config(1000)).await;
    assert_eq!(outcome, PingOutcome::Closed);
    assert!(!outcome.is_usable());
    assert_eq!(conn.probes(), 0);
}

#[tokio::test]
async fn test_ping_failure_closes_connection() {
    let conn = MockConnection::new(0);
    conn.set_fail_probe(true);

    let outcome = ping_connection(&conn, Duration::from_millis(1500), &ping_config(1000)).await;
    match outcome {
        PingOutcome::Failed(msg) => assert!(msg.contains("SELECT 1")),
        other => panic!("expected failed ping, got {:?}", other),
    }
    assert!(conn.is_closed());
    assert_eq!(conn.closes(), 1);
}

#[tokio::test]
async fn test_ping_rollback_failure_is_a_failed_ping() {
    let conn = MockConnection::new(0);
    conn.set_fail_rollback(true);

    let outcome = ping_connection(&conn, Duration::from_millis(1500), &ping_config(1000)).await;
    assert!(matches!(outcome, PingOutcome::Failed(_)));
    assert!(conn.is_closed());
}
