//! Backend registry: resolves a client type name to a backend and builds the
//! publisher/subscriber around it.
//!
//! Names are validated before anything is constructed, so a typo in the
//! configuration fails at startup and never reaches the network.

use crate::backend::{Backend, RumqttBackend};
use crate::error::{RelayError, Result};
use crate::models::{BrokerEndpoint, MatchRule};
use crate::publisher::Publisher;
use crate::subscriber::{AlertCallback, Subscriber, SubscriberOptions};
use crate::supervisor::SupervisorOptions;

/// A pluggable transport choice.
#[derive(Debug, Clone, Copy)]
pub struct BackendDescriptor {
    pub name: &'static str,
    pub summary: &'static str,
    /// Cargo feature gating the backend
    pub feature: &'static str,
    constructor: Option<fn() -> Backend>,
}

impl BackendDescriptor {
    /// False when the backend was left out of this build.
    pub fn is_available(&self) -> bool {
        self.constructor.is_some()
    }
}

fn build_rumqtt() -> Backend {
    Backend::Rumqtt(RumqttBackend::new())
}

#[cfg(feature = "mqtt-v5")]
fn build_rumqtt_v5() -> Backend {
    Backend::RumqttV5(crate::backend::RumqttV5Backend::new())
}

#[cfg(feature = "mqtt-v5")]
const V5_CONSTRUCTOR: Option<fn() -> Backend> = Some(build_rumqtt_v5 as fn() -> Backend);
#[cfg(not(feature = "mqtt-v5"))]
const V5_CONSTRUCTOR: Option<fn() -> Backend> = None;

static BACKENDS: [BackendDescriptor; 2] = [
    BackendDescriptor {
        name: RumqttBackend::NAME,
        summary: "MQTT 3.1.1 via rumqttc",
        feature: "default",
        constructor: Some(build_rumqtt as fn() -> Backend),
    },
    BackendDescriptor {
        name: "rumqttc-v5",
        summary: "MQTT 5 via rumqttc",
        feature: "mqtt-v5",
        constructor: V5_CONSTRUCTOR,
    },
];

pub struct BackendFactory;

impl BackendFactory {
    pub const DEFAULT_BACKEND: &'static str = RumqttBackend::NAME;

    pub fn descriptors() -> &'static [BackendDescriptor] {
        &BACKENDS
    }

    /// Registered names in registry order (default first).
    pub fn supported_names() -> Vec<&'static str> {
        BACKENDS.iter().map(|d| d.name).collect()
    }

    pub fn default_name() -> &'static str {
        Self::DEFAULT_BACKEND
    }

    /// Configuration-time check, no backend is constructed.
    pub fn resolve(name: &str) -> Result<&'static BackendDescriptor> {
        let descriptor = BACKENDS
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| RelayError::UnknownBackend {
                name: name.to_string(),
                supported: Self::supported_names(),
            })?;
        if descriptor.is_available() {
            Ok(descriptor)
        } else {
            Err(RelayError::BackendUnavailable {
                name: descriptor.name,
                feature: descriptor.feature,
            })
        }
    }

    pub fn create_backend(name: &str) -> Result<Backend> {
        let descriptor = Self::resolve(name)?;
        let build = descriptor
            .constructor
            .ok_or(RelayError::BackendUnavailable {
                name: descriptor.name,
                feature: descriptor.feature,
            })?;
        Ok(build())
    }

    pub fn create_publisher(
        name: &str,
        endpoint: BrokerEndpoint,
        topic: &str,
    ) -> Result<Publisher<Backend>> {
        let backend = Self::create_backend(name)?;
        Ok(Publisher::new(
            endpoint,
            topic,
            backend,
            SupervisorOptions::with_prefix("waldo"),
        ))
    }

    pub fn create_subscriber(
        name: &str,
        endpoint: BrokerEndpoint,
        topic: &str,
        rule: MatchRule,
        alert: AlertCallback,
    ) -> Result<Subscriber<Backend>> {
        let backend = Self::create_backend(name)?;
        Ok(Subscriber::new(
            endpoint,
            topic,
            rule,
            alert,
            backend,
            SubscriberOptions::default(),
        ))
    }
}
