/*!
Test harness for the relay roles.

Wires a `MockBackend` into publishers and subscribers, counts alert firings
and offers polling helpers that also work under paused tokio time.
*/

use crate::mqtt_stub::MockBackend;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use synergy_relay::{
    AlertCallback, BrokerEndpoint, MatchRule, Publisher, Subscriber, SubscriberOptions,
    SupervisorOptions,
};

pub const TEST_TOPIC: &str = "synergy";

pub struct TestHarness {
    pub backend: MockBackend,
    pub endpoint: BrokerEndpoint,
    alerts: Arc<AtomicUsize>,
}

impl TestHarness {
    pub fn new() -> Self {
        // test output only, ignore "already set" from other tests
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "debug".into()),
            )
            .try_init()
            .ok();

        Self {
            backend: MockBackend::new(),
            endpoint: BrokerEndpoint::new("broker.test", 1883),
            alerts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions::with_prefix("test")
    }

    pub fn publisher(&self) -> Publisher<MockBackend> {
        Publisher::new(
            self.endpoint.clone(),
            TEST_TOPIC,
            self.backend.clone(),
            self.supervisor_options(),
        )
    }

    pub fn subscriber(&self, rule: MatchRule) -> Subscriber<MockBackend> {
        self.subscriber_with(rule, SubscriberOptions::default())
    }

    pub fn subscriber_with(
        &self,
        rule: MatchRule,
        options: SubscriberOptions,
    ) -> Subscriber<MockBackend> {
        Subscriber::new(
            self.endpoint.clone(),
            TEST_TOPIC,
            rule,
            self.alert(),
            self.backend.clone(),
            options,
        )
    }

    /// Alert callback bumping the harness counter.
    pub fn alert(&self) -> AlertCallback {
        let alerts = self.alerts.clone();
        Arc::new(move || {
            alerts.fetch_add(1, Ordering::SeqCst);
        })
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.load(Ordering::SeqCst)
    }

    /// Polls `condition` every 10ms until it holds or `timeout` passes.
    pub async fn wait_until(&self, timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt_stub::PayloadBuilder;

    #[tokio::test]
    async fn test_harness_alert_counter() {
        let harness = TestHarness::new();
        let alert = harness.alert();
        alert();
        alert();
        assert_eq!(harness.alert_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_times_out() {
        let harness = TestHarness::new();
        let start = tokio::time::Instant::now();
        assert!(!harness.wait_until(Duration::from_secs(1), || false).await);
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_subscriber_registers_handler() {
        let harness = TestHarness::new();
        let _subscriber = harness.subscriber(MatchRule::desktop("desktop1"));
        assert!(harness.backend.has_handler());

        harness.backend.set_transport_up(true);
        assert!(harness
            .backend
            .simulate_incoming(TEST_TOPIC, PayloadBuilder::switch("desktop1").build()));
        assert_eq!(harness.alert_count(), 1);
    }
}
