//! found-him - Synergy client side of the relay
//!
//! Subscribes to the switch topic and rings the local bell whenever the
//! watched key (default `current_desktop`) carries this machine's name.

mod bell;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use synergy_relay::config::{DEFAULT_BROKER, DEFAULT_PORT, DEFAULT_TOPIC};
use synergy_relay::models::DEFAULT_MATCH_KEY;
use synergy_relay::{AlertCallback, BackendFactory, WatchConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "found-him", version, about = "MQTT JSON message listener with auto-reconnect")]
struct Args {
    /// MQTT broker address
    #[arg(short, long, env = "MQTT_BROKER", default_value = DEFAULT_BROKER)]
    broker: String,

    /// MQTT broker port
    #[arg(short, long, env = "MQTT_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// MQTT topic to subscribe
    #[arg(short, long, env = "MQTT_TOPIC", default_value = DEFAULT_TOPIC)]
    topic: String,

    /// JSON key to check
    #[arg(short, long, default_value = DEFAULT_MATCH_KEY)]
    key: String,

    /// Value to match for the key (defaults to this machine's hostname)
    #[arg(env = "TARGET_DESKTOP")]
    value: Option<String>,

    /// MQTT client backend
    #[arg(long, env = "MQTT_CLIENT_TYPE", default_value = BackendFactory::DEFAULT_BACKEND)]
    client_type: String,

    /// Enable debug logging
    #[arg(long, env = "DEBUG_MODE")]
    debug: bool,
}

impl Args {
    fn into_config(self) -> WatchConfig {
        WatchConfig {
            broker: self.broker,
            port: self.port,
            topic: self.topic,
            client_type: self.client_type,
            key: self.key,
            value: self.value.unwrap_or_else(default_target),
        }
    }
}

/// Lowercase hostname, the name Synergy usually reports for this screen.
fn default_target() -> String {
    gethostname::gethostname()
        .to_string_lossy()
        .to_lowercase()
}

fn init_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("debug")
        } else {
            let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "error".to_string());
            EnvFilter::new(level.to_lowercase())
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_alert(config: &WatchConfig) -> AlertCallback {
    let runtime = tokio::runtime::Handle::current();
    let announcement = format!("Match found! {} = {}", config.key, config.value);
    Arc::new(move || {
        println!("{announcement}");
        runtime.spawn(bell::ring());
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let debug_mode = args.debug;
    init_logging(debug_mode);

    let config = args.into_config();
    config.ensure_valid().context("Configuration rejected")?;

    if debug_mode {
        info!("Debug logging enabled");
        for line in config.summary() {
            debug!("{line}");
        }
        println!("Listening for messages on topic '{}'", config.topic);
        println!(
            "Will ring bell when '{}' matches '{}'",
            config.key, config.value
        );
    }

    let mut subscriber = BackendFactory::create_subscriber(
        &config.client_type,
        config.endpoint(),
        &config.topic,
        config.rule(),
        build_alert(&config),
    )
    .context("Failed to create MQTT subscriber")?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for interrupt signal: {e}");
            return;
        }
        signal_token.cancel();
    });

    subscriber.run(shutdown).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_value_and_key() {
        let args = Args::try_parse_from(["found-him", "-k", "desktop", "office"]).unwrap();
        let config = args.into_config();
        assert_eq!(config.key, "desktop");
        assert_eq!(config.value, "office");
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_default_target_is_lowercase() {
        let target = default_target();
        assert_eq!(target, target.to_lowercase());
    }

    #[test]
    fn test_unknown_client_type_fails_validation() {
        let args =
            Args::try_parse_from(["found-him", "--client-type", "paho", "office"]).unwrap();
        let errors = args.into_config().validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("paho"));
    }
}
