use std::time::Duration;
use synergy_devkit::{ConnectScript, MockBackend, TestHarness};
use synergy_relay::{ConnectionState, ConnectionSupervisor};
use tokio::time::Instant;

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn supervisor(harness: &TestHarness) -> ConnectionSupervisor<MockBackend> {
    ConnectionSupervisor::new(
        harness.endpoint.clone(),
        harness.backend.clone(),
        harness.supervisor_options(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_refusals_back_off_then_reset() {
    let harness = TestHarness::new();
    harness.backend.script_connects([ConnectScript::Refuse; 3]);
    let mut supervisor = supervisor(&harness);

    let start = Instant::now();
    supervisor.connect_with_retry().await;

    assert_eq!(start.elapsed(), secs(1 + 2 + 4));
    assert!(supervisor.is_connected());
    assert_eq!(harness.backend.connect_count(), 4);
    assert_eq!(supervisor.backoff_delay(), secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_is_capped() {
    let harness = TestHarness::new();
    harness.backend.script_connects([ConnectScript::Refuse; 8]);
    let mut supervisor = supervisor(&harness);

    let start = Instant::now();
    supervisor.connect_with_retry().await;

    assert_eq!(start.elapsed(), secs(1 + 2 + 4 + 8 + 16 + 32 + 60 + 60));
    assert_eq!(harness.backend.connect_count(), 9);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_attempt_times_out() {
    let harness = TestHarness::new();
    harness.backend.script_connects([ConnectScript::Silent]);
    let mut supervisor = supervisor(&harness);

    let start = Instant::now();
    supervisor.connect_with_retry().await;

    // 10s attempt timeout, then the first 1s backoff
    assert_eq!(start.elapsed(), secs(11));
    assert_eq!(harness.backend.connect_count(), 2);
    assert_eq!(harness.backend.disconnect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_error_is_retried() {
    let harness = TestHarness::new();
    harness.backend.script_connects([ConnectScript::Fail]);
    let mut supervisor = supervisor(&harness);

    supervisor.connect_with_retry().await;
    assert!(supervisor.is_connected());
    assert_eq!(harness.backend.connect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_client_id_per_attempt() {
    let harness = TestHarness::new();
    harness.backend.script_connects([ConnectScript::Refuse]);
    let mut supervisor = supervisor(&harness);
    supervisor.connect_with_retry().await;

    let ids = harness.backend.client_ids();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
    assert!(ids.iter().all(|id| id.starts_with("test-")));
}

#[tokio::test(start_paused = true)]
async fn test_superseded_callbacks_are_ignored() {
    let harness = TestHarness::new();
    let mut supervisor = supervisor(&harness);
    supervisor.connect_with_retry().await;
    supervisor.reconnect().await;
    assert!(supervisor.is_connected());

    let old = harness.backend.link(0).unwrap();
    assert!(!old.is_current());
    assert!(!old.disconnected());
    assert_eq!(supervisor.state(), ConnectionState::Connected);

    let current = harness.backend.link(1).unwrap();
    assert!(current.disconnected());
    assert_eq!(supervisor.state(), ConnectionState::Disconnected);

    // Disconnected -> Connected skips Connecting
    assert!(!current.connected());
    assert_eq!(supervisor.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_link_is_reestablished() {
    let harness = TestHarness::new();
    let mut supervisor = supervisor(&harness);
    supervisor.connect_with_retry().await;

    assert!(harness.backend.drop_connection());
    assert!(!supervisor.is_connected());

    supervisor.connect_with_retry().await;
    assert!(supervisor.is_connected());
    assert_eq!(harness.backend.connect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_retrying() {
    let harness = TestHarness::new();
    harness.backend.script_connects([ConnectScript::Silent; 10]);
    let mut supervisor = supervisor(&harness);

    tokio::select! {
        _ = supervisor.connect_with_retry() => panic!("no attempt can succeed"),
        _ = tokio::time::sleep(secs(25)) => {}
    }
    // attempts at 0s, 11s and 23s
    assert_eq!(harness.backend.connect_count(), 3);
    assert!(!supervisor.is_connected());

    supervisor.close().await;
    assert_eq!(supervisor.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let harness = TestHarness::new();
    let mut supervisor = supervisor(&harness);
    supervisor.connect_with_retry().await;

    supervisor.close().await;
    supervisor.close().await;
    assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    assert_eq!(harness.backend.disconnect_count(), 2);
}
