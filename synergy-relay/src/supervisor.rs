//! Connection supervisor: drives one backend connection to `Connected`,
//! retrying forever with exponential backoff.
//!
//! The connection state lives in a `watch` channel. The backend I/O task
//! moves it through `LinkEvents`; the supervisor moves it when starting an
//! attempt and on teardown. Backoff state sits behind a mutex since both the
//! control flow and callers inspecting it may touch it concurrently.

use crate::backend::{ClientBackend, LinkEvents};
use crate::backoff::BackoffPolicy;
use crate::error::{RelayError, Result};
use crate::models::{BrokerEndpoint, ConnectionState};
use crate::state::{new_state, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Max wait for the CONNACK of one attempt
    pub attempt_timeout: Duration,
    pub backoff: BackoffPolicy,
    /// Client ids are `<prefix>-<uuid>`, regenerated per attempt
    pub client_prefix: String,
}

impl SupervisorOptions {
    pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn with_prefix(client_prefix: impl Into<String>) -> Self {
        Self {
            client_prefix: client_prefix.into(),
            ..Self::default()
        }
    }
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            attempt_timeout: Self::DEFAULT_ATTEMPT_TIMEOUT,
            backoff: BackoffPolicy::default(),
            client_prefix: "synergy-relay".to_string(),
        }
    }
}

pub struct ConnectionSupervisor<B: ClientBackend> {
    endpoint: BrokerEndpoint,
    backend: B,
    state: Arc<watch::Sender<ConnectionState>>,
    attempt: Arc<AtomicU64>,
    backoff: Shared<BackoffPolicy>,
    attempt_timeout: Duration,
    client_prefix: String,
}

impl<B: ClientBackend> ConnectionSupervisor<B> {
    pub fn new(endpoint: BrokerEndpoint, backend: B, options: SupervisorOptions) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            endpoint,
            backend,
            state: Arc::new(state),
            attempt: Arc::new(AtomicU64::new(0)),
            backoff: new_state(options.backoff),
            attempt_timeout: options.attempt_timeout,
            client_prefix: options.client_prefix,
        }
    }

    pub fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Receiver for observing state changes (tests, diagnostics).
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Delay the next failed attempt will wait.
    pub fn backoff_delay(&self) -> Duration {
        self.backoff.lock().current()
    }

    /// Blocks until connected. Never fails; bound it with a cancellation
    /// signal (dropping the future aborts the current wait or sleep).
    pub async fn connect_with_retry(&mut self) {
        while !self.is_connected() {
            let client_id = format!("{}-{}", self.client_prefix, Uuid::new_v4().simple());
            info!("Attempting to connect to {} as {client_id}", self.endpoint);

            match self.attempt(&client_id).await {
                Ok(()) => {
                    self.backoff.lock().reset();
                    info!("Successfully connected to {}", self.endpoint);
                }
                Err(e) => {
                    let delay = self.backoff.lock().next_delay();
                    warn!("Connection failed: {e}. Retrying in {delay:?}");
                    self.teardown().await;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Drops the current link, half-open or not, and reconnects.
    pub async fn reconnect(&mut self) {
        self.teardown().await;
        self.connect_with_retry().await;
    }

    /// Sleeps for the next connection backoff delay.
    pub async fn back_off(&self) {
        let delay = self.backoff.lock().next_delay();
        debug!("backing off for {delay:?}");
        tokio::time::sleep(delay).await;
    }

    /// Local failure seen by a caller (e.g. publish rejected).
    pub fn mark_disconnected(&self) {
        self.state.send_if_modified(|state| {
            let changed = *state != ConnectionState::Disconnected;
            *state = ConnectionState::Disconnected;
            changed
        });
    }

    /// Best-effort disconnect; idempotent and never fails.
    pub async fn close(&mut self) {
        self.teardown().await;
    }

    async fn attempt(&mut self, client_id: &str) -> Result<()> {
        // supersede callbacks of any previous connection
        self.attempt.fetch_add(1, Ordering::SeqCst);
        self.mark_disconnected();
        self.state.send_replace(ConnectionState::Connecting);

        let mut rx = self.state.subscribe();
        let events = LinkEvents::new(self.state.clone(), self.attempt.clone());
        self.backend
            .connect(&self.endpoint, client_id, events)
            .await?;

        let outcome = async {
            loop {
                let current = *rx.borrow_and_update();
                match current {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected => {
                        return Err(RelayError::ConnectRefused(format!(
                            "{} closed the connection during handshake",
                            self.endpoint
                        )))
                    }
                    ConnectionState::Connecting => {}
                }
                if rx.changed().await.is_err() {
                    return Err(RelayError::NotConnected);
                }
            }
        };

        match tokio::time::timeout(self.attempt_timeout, outcome).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::ConnectTimeout(self.attempt_timeout)),
        }
    }

    async fn teardown(&mut self) {
        // late callbacks of the torn-down link must not flip the state back
        self.attempt.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.backend.disconnect().await {
            debug!("Error during cleanup: {e}");
        }
        self.mark_disconnected();
    }
}
