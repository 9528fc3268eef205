//! Runtime configuration of both roles.
//!
//! Values come from CLI flags, the environment or `.env` (resolved by the
//! binaries); this module only holds them and checks them before any
//! connection is attempted.

use crate::error::{RelayError, Result};
use crate::factory::BackendFactory;
use crate::models::{BrokerEndpoint, MatchRule, DEFAULT_MATCH_KEY};
use std::path::PathBuf;

pub const DEFAULT_BROKER: &str = "localhost";
pub const DEFAULT_PORT: u16 = 1883;
pub const DEFAULT_TOPIC: &str = "synergy";

/// Publisher role (`waldo`).
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub broker: String,
    pub port: u16,
    pub topic: String,
    pub client_type: String,
    /// Synergy log to read; stdin when unset
    pub log_path: Option<PathBuf>,
}

/// Subscriber role (`found-him`).
#[derive(Debug, Clone, PartialEq)]
pub struct WatchConfig {
    pub broker: String,
    pub port: u16,
    pub topic: String,
    pub client_type: String,
    pub key: String,
    pub value: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            broker: DEFAULT_BROKER.to_string(),
            port: DEFAULT_PORT,
            topic: DEFAULT_TOPIC.to_string(),
            client_type: BackendFactory::default_name().to_string(),
            log_path: None,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            broker: DEFAULT_BROKER.to_string(),
            port: DEFAULT_PORT,
            topic: DEFAULT_TOPIC.to_string(),
            client_type: BackendFactory::default_name().to_string(),
            key: DEFAULT_MATCH_KEY.to_string(),
            value: String::new(),
        }
    }
}

/// Checks shared by both roles.
fn validate_common(broker: &str, port: u16, topic: &str, client_type: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if broker.trim().is_empty() {
        errors.push("MQTT_BROKER must be specified".to_string());
    }
    // u16 caps the upper bound already
    if port == 0 {
        errors.push(format!("Invalid MQTT_PORT: {port}. Must be between 1-65535"));
    }
    if topic.trim().is_empty() {
        errors.push("MQTT_TOPIC must be specified".to_string());
    }
    if let Err(e) = BackendFactory::resolve(client_type) {
        errors.push(e.to_string());
    }
    errors
}

fn into_result(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(RelayError::InvalidConfig(errors))
    }
}

impl RelayConfig {
    /// Every problem found, empty when valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = validate_common(&self.broker, self.port, &self.topic, &self.client_type);
        if let Some(path) = &self.log_path {
            if !path.exists() {
                errors.push(format!("Synergy log file not found: {}", path.display()));
            } else if !path.is_file() {
                errors.push(format!("Synergy log path is not a file: {}", path.display()));
            }
        }
        errors
    }

    pub fn ensure_valid(&self) -> Result<()> {
        into_result(self.validate())
    }

    pub fn endpoint(&self) -> BrokerEndpoint {
        BrokerEndpoint::new(self.broker.clone(), self.port)
    }

    pub fn summary(&self) -> Vec<String> {
        let mut lines = vec![
            "Configuration Summary:".to_string(),
            format!("  MQTT Broker: {}:{}", self.broker, self.port),
            format!("  MQTT Topic: {}", self.topic),
            format!("  Client Type: {}", self.client_type),
        ];
        match &self.log_path {
            Some(path) => lines.push(format!("  Synergy Log: {}", path.display())),
            None => lines.push("  Synergy Log: <stdin>".to_string()),
        }
        lines
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = validate_common(&self.broker, self.port, &self.topic, &self.client_type);
        if self.key.trim().is_empty() {
            errors.push("match key must not be empty".to_string());
        }
        if self.value.trim().is_empty() {
            errors.push("TARGET_DESKTOP must be specified for secondary machines".to_string());
        }
        errors
    }

    pub fn ensure_valid(&self) -> Result<()> {
        into_result(self.validate())
    }

    pub fn endpoint(&self) -> BrokerEndpoint {
        BrokerEndpoint::new(self.broker.clone(), self.port)
    }

    pub fn rule(&self) -> MatchRule {
        MatchRule::new(self.key.clone(), self.value.clone())
    }

    pub fn summary(&self) -> Vec<String> {
        vec![
            "Configuration Summary:".to_string(),
            format!("  MQTT Broker: {}:{}", self.broker, self.port),
            format!("  MQTT Topic: {}", self.topic),
            format!("  Client Type: {}", self.client_type),
            format!("  Target: {} = {}", self.key, self.value),
        ]
    }
}
