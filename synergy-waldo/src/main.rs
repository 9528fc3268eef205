//! waldo - Synergy server side of the relay
//!
//! Reads the Synergy server log (stdin or `--log-file`), extracts every
//! desktop switch and publishes it to the MQTT topic. Each delivered desktop
//! name is echoed on stdout; diagnostics go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use synergy_relay::config::{DEFAULT_BROKER, DEFAULT_PORT, DEFAULT_TOPIC};
use synergy_relay::{relay_lines, BackendFactory, RelayConfig, RetryLadder};
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "waldo", version, about = "Process Synergy logs and publish desktop switches to MQTT")]
struct Args {
    /// MQTT broker address
    #[arg(short, long, env = "MQTT_BROKER", default_value = DEFAULT_BROKER)]
    broker: String,

    /// MQTT broker port
    #[arg(short, long, env = "MQTT_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// MQTT topic
    #[arg(short, long, env = "MQTT_TOPIC", default_value = DEFAULT_TOPIC)]
    topic: String,

    /// MQTT client backend
    #[arg(long, env = "MQTT_CLIENT_TYPE", default_value = BackendFactory::DEFAULT_BACKEND)]
    client_type: String,

    /// Synergy log to read instead of stdin
    #[arg(long, env = "SYNERGY_LOG_PATH")]
    log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, env = "DEBUG_MODE")]
    debug: bool,
}

impl Args {
    fn into_config(self) -> RelayConfig {
        RelayConfig {
            broker: self.broker,
            port: self.port,
            topic: self.topic,
            client_type: self.client_type,
            log_path: self.log_file,
        }
    }
}

/// RUST_LOG wins, then `--debug`, then LOG_LEVEL (errors only by default).
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

async fn open_input(config: &RelayConfig) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    match &config.log_path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open Synergy log {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let debug_mode = args.debug;
    init_logging(debug_mode);
    if debug_mode {
        info!("Debug logging enabled");
    }

    let config = args.into_config();
    config.ensure_valid().context("Configuration rejected")?;
    for line in config.summary() {
        debug!("{line}");
    }

    let mut publisher =
        BackendFactory::create_publisher(&config.client_type, config.endpoint(), &config.topic)
            .context("Failed to create MQTT publisher")?;
    let input = open_input(&config).await?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for interrupt signal: {e}");
            return;
        }
        signal_token.cancel();
    });

    let connected = tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = publisher.connect() => true,
    };

    let result = if connected {
        let mut ladder = RetryLadder::default();
        relay_lines(input, &mut publisher, &mut ladder, &shutdown, |event| {
            println!("{}", event.desktop);
        })
        .await
    } else {
        info!("Received interrupt signal before connecting, shutting down");
        Ok(Default::default())
    };

    info!("Closing MQTT connection");
    publisher.close().await;

    let stats = result.context("Unexpected error while processing logs")?;
    debug!(
        "Processed {} lines, {} switches ({} delivered, {} dropped)",
        stats.lines, stats.events, stats.delivered, stats.dropped
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["waldo"]).unwrap();
        assert_eq!(args.topic, "synergy");
        assert_eq!(args.client_type, "rumqttc");
        assert!(args.log_file.is_none());
    }

    #[test]
    fn test_flags_override() {
        let args = Args::try_parse_from([
            "waldo",
            "-b",
            "vault.local",
            "-p",
            "1884",
            "--client-type",
            "rumqttc-v5",
            "--log-file",
            "/var/log/synergy.log",
            "--debug",
        ])
        .unwrap();
        assert!(args.debug);
        let config = args.into_config();
        assert_eq!(config.endpoint().to_string(), "vault.local:1884");
        assert_eq!(config.client_type, "rumqttc-v5");
        assert_eq!(config.log_path, Some(PathBuf::from("/var/log/synergy.log")));
    }

    #[test]
    fn test_port_out_of_range_rejected_by_parser() {
        assert!(Args::try_parse_from(["waldo", "--port", "70000"]).is_err());
    }
}
