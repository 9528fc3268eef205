//! Synergy Relay - connection lifecycle core
//!
//! Relays Synergy "desktop focus switch" events to an MQTT topic and watches
//! that topic to fire a local alert when a given desktop becomes active:
//! - Reconnect/backoff supervisor shared by both roles
//! - Pluggable MQTT backends selected by name at runtime
//! - Publisher with a bounded per-message retry ladder
//! - Subscriber with key/value matching and a staleness watchdog
//! - Log line extraction and the line relay loop

pub mod backend;
pub mod backoff;
pub mod config;
pub mod error;
pub mod extract;
pub mod factory;
pub mod models;
pub mod publisher;
pub mod relay;
pub mod state;
pub mod subscriber;
pub mod supervisor;

pub use backend::{Backend, ClientBackend, LinkEvents, MessageHandler};
pub use backoff::{BackoffPolicy, RetryLadder};
pub use config::{RelayConfig, WatchConfig};
pub use error::{RelayError, Result};
pub use extract::{extract_desktop, extract_switch_event};
pub use factory::{BackendDescriptor, BackendFactory};
pub use models::{BrokerEndpoint, ConnectionState, MatchRule, SwitchEvent};
pub use publisher::{PublishOutcome, Publisher};
pub use relay::{relay_lines, RelayStats};
pub use state::Liveness;
pub use subscriber::{AlertCallback, MessageMatcher, Subscriber, SubscriberOptions};
pub use supervisor::{ConnectionSupervisor, SupervisorOptions};

/// QoS used for every publish and subscribe in the relay (at-least-once).
pub const RELAY_QOS: rumqttc::QoS = rumqttc::QoS::AtLeastOnce;
