use crate::backend::ClientBackend;
use crate::backoff::RetryLadder;
use crate::models::{BrokerEndpoint, SwitchEvent};
use crate::supervisor::{ConnectionSupervisor, SupervisorOptions};
use crate::RELAY_QOS;
use tracing::{debug, error, warn};

/// Result of publishing one message through the retry ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered { attempts: u32 },
    /// Attempts exhausted; the message is not requeued.
    Dropped { attempts: u32 },
}

impl PublishOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, PublishOutcome::Delivered { .. })
    }
}

/// Publishes switch events to one topic, reconnecting on demand.
pub struct Publisher<B: ClientBackend> {
    supervisor: ConnectionSupervisor<B>,
    topic: String,
}

impl<B: ClientBackend> Publisher<B> {
    pub fn new(
        endpoint: BrokerEndpoint,
        topic: impl Into<String>,
        backend: B,
        options: SupervisorOptions,
    ) -> Self {
        Self {
            supervisor: ConnectionSupervisor::new(endpoint, backend, options),
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor<B> {
        &self.supervisor
    }

    pub fn is_connected(&self) -> bool {
        self.supervisor.is_connected()
    }

    /// Initial connection; blocks until connected.
    pub async fn connect(&mut self) {
        self.supervisor.connect_with_retry().await;
    }

    /// Single publish attempt. A cold publisher connects first (blocking until
    /// a connection exists); a backend failure marks the link disconnected.
    pub async fn publish(&mut self, payload: &[u8]) -> bool {
        if !self.supervisor.is_connected() {
            debug!("Not connected, attempting to reconnect");
            self.supervisor.connect_with_retry().await;
        }

        match self
            .supervisor
            .backend()
            .publish(&self.topic, payload.to_vec(), RELAY_QOS)
            .await
        {
            Ok(()) => {
                debug!("Successfully published message to {}", self.topic);
                true
            }
            Err(e) => {
                error!("Failed to publish message: {e}");
                self.supervisor.mark_disconnected();
                false
            }
        }
    }

    pub async fn publish_event(&mut self, event: &SwitchEvent) -> bool {
        match event.to_payload() {
            Ok(payload) => self.publish(&payload).await,
            Err(e) => {
                error!("Failed to serialize switch event: {e}");
                false
            }
        }
    }

    /// Up to `ladder.max_attempts()` publishes, sleeping between attempts.
    pub async fn publish_with_retry(
        &mut self,
        payload: &[u8],
        ladder: &mut RetryLadder,
    ) -> PublishOutcome {
        ladder.restart();
        let mut attempt = 1;
        loop {
            if self.publish(payload).await {
                return PublishOutcome::Delivered { attempts: attempt };
            }
            match ladder.wait_after(attempt) {
                Some(wait) => {
                    debug!(
                        "Publish retry {attempt}/{}, waiting {wait:?}",
                        ladder.max_attempts()
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                None => {
                    warn!("Giving up on message after {attempt} attempts");
                    return PublishOutcome::Dropped { attempts: attempt };
                }
            }
        }
    }

    /// Best-effort shutdown; safe to call more than once.
    pub async fn close(&mut self) {
        self.supervisor.close().await;
    }
}
