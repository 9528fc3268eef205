use serde::{Deserialize, Serialize};
use std::fmt;

/// Default JSON key inspected by the subscriber.
pub const DEFAULT_MATCH_KEY: &str = "current_desktop";

/// Status of the single logical connection owned by a supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// Allowed moves: Disconnected -> Connecting -> Connected, and back to
    /// Disconnected from either of the other two.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
}

impl BrokerEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One detected desktop activation (wire payload `{current_desktop, timestamp}`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchEvent {
    #[serde(rename = "current_desktop")]
    pub desktop: String,
    /// ISO-8601 local time of detection
    pub timestamp: String,
}

impl SwitchEvent {
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Alert condition of a subscriber: `payload[key] == value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRule {
    pub key: String,
    pub value: String,
}

impl MatchRule {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Rule on the default `current_desktop` key.
    pub fn desktop(value: impl Into<String>) -> Self {
        Self::new(DEFAULT_MATCH_KEY, value)
    }

    /// Only a JSON string equal to `value` matches; absent keys, other types
    /// and non-object payloads never do.
    pub fn matches(&self, payload: &serde_json::Value) -> bool {
        matches!(payload.get(&self.key), Some(serde_json::Value::String(s)) if *s == self.value)
    }
}
