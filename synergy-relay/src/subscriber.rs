//! Subscriber role: watches one topic and fires the alert callback when the
//! configured key/value appears.
//!
//! A disconnect the backend reports moves the supervisor state to
//! `Disconnected`, and `run` reconnects and resubscribes as soon as it sees
//! that. Besides, a watchdog wakes every `poll_interval` and forces a
//! reconnect when nothing arrived for `stale_after` *and* the backend reports
//! the transport down. That second path only catches half-open links where
//! the last disconnect went unnoticed.

use crate::backend::{ClientBackend, MessageHandler};
use crate::models::{BrokerEndpoint, MatchRule};
use crate::state::Liveness;
use crate::supervisor::{ConnectionSupervisor, SupervisorOptions};
use crate::RELAY_QOS;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Zero-argument side effect supplied by the application (bell, notification...).
pub type AlertCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SubscriberOptions {
    pub supervisor: SupervisorOptions,
    pub poll_interval: Duration,
    pub stale_after: Duration,
}

impl Default for SubscriberOptions {
    fn default() -> Self {
        Self {
            supervisor: SupervisorOptions::with_prefix("found-him"),
            poll_interval: Duration::from_secs(10),
            stale_after: Duration::from_secs(120),
        }
    }
}

/// Inbound message dispatch, shared with the backend I/O task.
#[derive(Clone)]
pub struct MessageMatcher {
    rule: MatchRule,
    alert: AlertCallback,
    liveness: Liveness,
}

impl MessageMatcher {
    pub fn new(rule: MatchRule, alert: AlertCallback) -> Self {
        Self {
            rule,
            alert,
            liveness: Liveness::new(),
        }
    }

    pub fn rule(&self) -> &MatchRule {
        &self.rule
    }

    /// Returns whether the alert fired. Never fails: undecodable payloads are
    /// logged at debug level and dropped.
    pub fn handle(&self, topic: &str, payload: &[u8]) -> bool {
        self.liveness.touch();

        let value: serde_json::Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(e) => {
                debug!(
                    "Failed to parse JSON message on {topic}: {e} ({})",
                    String::from_utf8_lossy(payload)
                );
                return false;
            }
        };

        if !self.rule.matches(&value) {
            return false;
        }
        info!("Match found! {} = {}", self.rule.key, self.rule.value);
        (self.alert)();
        true
    }

    pub fn last_message_age(&self) -> Duration {
        self.liveness.age()
    }

    pub fn touch(&self) {
        self.liveness.touch();
    }

    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    pub fn into_handler(self) -> MessageHandler {
        Arc::new(move |topic: &str, payload: &[u8]| {
            self.handle(topic, payload);
        })
    }
}

pub struct Subscriber<B: ClientBackend> {
    supervisor: ConnectionSupervisor<B>,
    topic: String,
    matcher: MessageMatcher,
    poll_interval: Duration,
    stale_after: Duration,
}

impl<B: ClientBackend> Subscriber<B> {
    pub fn new(
        endpoint: BrokerEndpoint,
        topic: impl Into<String>,
        rule: MatchRule,
        alert: AlertCallback,
        backend: B,
        options: SubscriberOptions,
    ) -> Self {
        let matcher = MessageMatcher::new(rule, alert);
        let mut supervisor = ConnectionSupervisor::new(endpoint, backend, options.supervisor);
        supervisor
            .backend_mut()
            .set_message_handler(matcher.clone().into_handler());
        Self {
            supervisor,
            topic: topic.into(),
            matcher,
            poll_interval: options.poll_interval,
            stale_after: options.stale_after,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn rule(&self) -> &MatchRule {
        self.matcher.rule()
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor<B> {
        &self.supervisor
    }

    pub fn matcher(&self) -> &MessageMatcher {
        &self.matcher
    }

    pub fn last_message_age(&self) -> Duration {
        self.matcher.last_message_age()
    }

    pub fn is_stale(&self) -> bool {
        self.matcher.liveness().is_older_than(self.stale_after)
    }

    /// Connects, subscribes and supervises the link until `shutdown` fires,
    /// then disconnects.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        let cancelled = tokio::select! {
            _ = shutdown.cancelled() => true,
            _ = self.establish(false) => false,
        };
        if cancelled {
            info!("Shutdown requested before the first connection");
            self.supervisor.close().await;
            return;
        }
        self.matcher.touch();

        let mut link_state = self.supervisor.watch_state();
        link_state.borrow_and_update();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
                changed = link_state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            link_state.borrow_and_update();

            let force = if !self.supervisor.is_connected() {
                warn!("Connection lost, reconnecting");
                false
            } else if self.is_stale() && !self.supervisor.backend().is_connected() {
                warn!(
                    "No messages received for {:?} and the connection is down, reconnecting",
                    self.last_message_age()
                );
                true
            } else {
                continue;
            };
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.establish(force) => {}
            }
            link_state.borrow_and_update();
            self.matcher.touch();
        }

        info!("Received shutdown signal, closing MQTT connection");
        self.supervisor.close().await;
    }

    /// Connect (or force a reconnect) and subscribe; retries until both succeed.
    async fn establish(&mut self, force: bool) {
        if force {
            self.supervisor.reconnect().await;
        }
        loop {
            self.supervisor.connect_with_retry().await;
            match self
                .supervisor
                .backend()
                .subscribe(&self.topic, RELAY_QOS)
                .await
            {
                Ok(()) => {
                    info!("Listening for messages on topic '{}'", self.topic);
                    return;
                }
                Err(e) => {
                    error!("Subscribe to '{}' failed: {e}", self.topic);
                    self.supervisor.close().await;
                    self.supervisor.back_off().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_matcher(rule: MatchRule) -> (MessageMatcher, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let alert: AlertCallback = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (MessageMatcher::new(rule, alert), fired)
    }

    fn payload(value: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn test_match_fires_once() {
        let (matcher, fired) = counting_matcher(MatchRule::desktop("target"));
        let hit = matcher.handle(
            "synergy",
            &payload(json!({"current_desktop": "target", "timestamp": "t1"})),
        );
        assert!(hit);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_other_value_does_not_fire() {
        let (matcher, fired) = counting_matcher(MatchRule::desktop("target"));
        matcher.handle(
            "synergy",
            &payload(json!({"current_desktop": "other", "timestamp": "t1"})),
        );
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_key_does_not_fire() {
        let (matcher, fired) = counting_matcher(MatchRule::desktop("target"));
        matcher.handle(
            "synergy",
            &payload(json!({"other_key": "target", "timestamp": "t1"})),
        );
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_undecodable_payload_is_dropped() {
        let (matcher, fired) = counting_matcher(MatchRule::desktop("target"));
        assert!(!matcher.handle("synergy", b"not json"));
        assert!(!matcher.handle("synergy", &[0xff, 0xfe, 0x00]));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_custom_key() {
        let (matcher, fired) = counting_matcher(MatchRule::new("desktop", "target"));
        matcher.handle("synergy", &payload(json!({"desktop": "target"})));
        matcher.handle("synergy", &payload(json!({"current_desktop": "target"})));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_message_refreshes_liveness() {
        let (matcher, _fired) = counting_matcher(MatchRule::desktop("target"));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(matcher.last_message_age() >= Duration::from_secs(30));

        matcher.handle("synergy", b"not json");
        assert_eq!(matcher.last_message_age(), Duration::ZERO);
    }
}
