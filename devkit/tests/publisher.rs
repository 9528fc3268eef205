use std::time::Duration;
use synergy_devkit::{ConnectScript, TestHarness, TEST_TOPIC};
use synergy_relay::{PublishOutcome, RetryLadder, SwitchEvent, RELAY_QOS};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_cold_publish_connects_first() {
    let harness = TestHarness::new();
    let mut publisher = harness.publisher();
    assert!(!publisher.is_connected());

    assert!(publisher.publish(br#"{"current_desktop":"desktop1"}"#).await);
    assert!(publisher.is_connected());
    assert_eq!(harness.backend.connect_count(), 1);

    let published = harness.backend.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, TEST_TOPIC);
    assert_eq!(published[0].qos, RELAY_QOS);
}

#[tokio::test(start_paused = true)]
async fn test_publish_blocks_until_connected() {
    let harness = TestHarness::new();
    harness.backend.script_connects([ConnectScript::Refuse, ConnectScript::Silent]);
    let mut publisher = harness.publisher();

    let start = Instant::now();
    assert!(publisher.publish(b"{}").await);
    // refused (1s backoff), unanswered (10s timeout + 2s backoff), accepted
    assert_eq!(start.elapsed(), Duration::from_secs(13));
}

#[tokio::test(start_paused = true)]
async fn test_failed_publish_marks_disconnected() {
    let harness = TestHarness::new();
    harness.backend.script_publishes([false]);
    let mut publisher = harness.publisher();
    publisher.connect().await;

    assert!(!publisher.publish(b"{}").await);
    assert!(!publisher.is_connected());

    // next publish reconnects
    assert!(publisher.publish(b"{}").await);
    assert_eq!(harness.backend.connect_count(), 2);
    assert_eq!(harness.backend.published().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_ladder_waits_two_then_four_seconds() {
    let harness = TestHarness::new();
    harness.backend.script_publishes([false, false, true]);
    let mut publisher = harness.publisher();
    publisher.connect().await;

    let mut ladder = RetryLadder::default();
    let start = Instant::now();
    let outcome = publisher.publish_with_retry(b"{}", &mut ladder).await;

    assert_eq!(outcome, PublishOutcome::Delivered { attempts: 3 });
    assert_eq!(start.elapsed(), Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_message_dropped_after_three_attempts() {
    let harness = TestHarness::new();
    harness.backend.script_publishes([false, false, false]);
    let mut publisher = harness.publisher();
    publisher.connect().await;

    let mut ladder = RetryLadder::default();
    let start = Instant::now();
    let outcome = publisher.publish_with_retry(b"{}", &mut ladder).await;

    assert_eq!(outcome, PublishOutcome::Dropped { attempts: 3 });
    assert!(!outcome.is_delivered());
    assert_eq!(start.elapsed(), Duration::from_secs(6));
    assert_eq!(harness.backend.publish_attempts(), 3);
    assert!(harness.backend.published().is_empty());

    // the ladder starts over for the next message
    let outcome = publisher.publish_with_retry(b"{}", &mut ladder).await;
    assert_eq!(outcome, PublishOutcome::Delivered { attempts: 1 });
}

#[tokio::test(start_paused = true)]
async fn test_publish_event_wire_format() {
    let harness = TestHarness::new();
    let mut publisher = harness.publisher();
    let event = SwitchEvent {
        desktop: "desktop1".to_string(),
        timestamp: "2025-01-28T10:15:02.123456+01:00".to_string(),
    };

    assert!(publisher.publish_event(&event).await);
    let payload = harness.backend.last_json(TEST_TOPIC).unwrap();
    assert_eq!(payload["current_desktop"], "desktop1");
    assert_eq!(payload["timestamp"], "2025-01-28T10:15:02.123456+01:00");
}

#[tokio::test]
async fn test_close_twice() {
    let harness = TestHarness::new();
    let mut publisher = harness.publisher();
    publisher.close().await;
    publisher.connect().await;
    publisher.close().await;
    publisher.close().await;
    assert!(!publisher.is_connected());
}
