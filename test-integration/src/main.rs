//! Live smoke test of the publish -> subscribe -> alert path.
//!
//! Needs a broker on 127.0.0.1:1883 (override with MQTT_BROKER/MQTT_PORT).
//! Runs once per built backend on a throwaway topic and exits non-zero on the
//! first backend whose alert does not fire.

use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use synergy_relay::{
    extract_switch_event, BackendFactory, BrokerEndpoint, MatchRule, RetryLadder,
};
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const MQTT_BROKER: &str = "127.0.0.1";
const MQTT_PORT: u16 = 1883;
const TARGET: &str = "smoketest";

fn endpoint() -> Result<BrokerEndpoint> {
    let host = std::env::var("MQTT_BROKER").unwrap_or_else(|_| MQTT_BROKER.to_string());
    let port = match std::env::var("MQTT_PORT") {
        Ok(port) => port.parse().context("MQTT_PORT is not a port number")?,
        Err(_) => MQTT_PORT,
    };
    Ok(BrokerEndpoint::new(host, port))
}

async fn smoke(backend: &str, endpoint: &BrokerEndpoint) -> Result<()> {
    let topic = format!("synergy/smoke/{}", uuid::Uuid::new_v4().simple());
    let alerts = Arc::new(AtomicUsize::new(0));
    let counter = alerts.clone();

    let mut subscriber = BackendFactory::create_subscriber(
        backend,
        endpoint.clone(),
        &topic,
        MatchRule::desktop(TARGET),
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )?;
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let watcher = tokio::spawn(async move { subscriber.run(token).await });

    // give the SUBSCRIBE a moment to reach the broker
    sleep(Duration::from_secs(1)).await;

    let mut publisher = BackendFactory::create_publisher(backend, endpoint.clone(), &topic)?;
    timeout(Duration::from_secs(10), publisher.connect())
        .await
        .context("publisher could not connect")?;

    let mut ladder = RetryLadder::default();
    for line in [
        r#"INFO: switch from "laptop" to "elsewhere-pc" at 10,10"#,
        r#"INFO: switch from "elsewhere-pc" to "smoketest-pc" at 0,540"#,
    ] {
        let payload = extract_switch_event(line)
            .context("fixture line is not a switch")?
            .to_payload()?;
        if !publisher.publish_with_retry(&payload, &mut ladder).await.is_delivered() {
            warn!("[{backend}] publish dropped");
        }
    }

    let mut waited = Duration::ZERO;
    while alerts.load(Ordering::SeqCst) == 0 && waited < Duration::from_secs(5) {
        sleep(Duration::from_millis(100)).await;
        waited += Duration::from_millis(100);
    }

    publisher.close().await;
    shutdown.cancel();
    watcher.await?;

    match alerts.load(Ordering::SeqCst) {
        1 => Ok(()),
        0 => bail!("[{backend}] alert never fired on {topic}"),
        n => bail!("[{backend}] alert fired {n} times, expected once"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let endpoint = endpoint()?;
    info!("Starting smoke test against {endpoint}");

    for descriptor in BackendFactory::descriptors() {
        if !descriptor.is_available() {
            warn!("Skipping {}: not built", descriptor.name);
            continue;
        }
        smoke(descriptor.name, &endpoint).await?;
        info!("{} OK", descriptor.name);
    }
    Ok(())
}
