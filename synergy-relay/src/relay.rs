//! Log-processing loop of the publisher role: every switch line becomes one
//! published event; an event that exhausts the retry ladder is skipped.

use crate::backend::ClientBackend;
use crate::backoff::RetryLadder;
use crate::error::Result;
use crate::extract::extract_switch_event;
use crate::models::SwitchEvent;
use crate::publisher::{PublishOutcome, Publisher};
use std::borrow::Cow;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub lines: u64,
    pub events: u64,
    pub delivered: u64,
    pub dropped: u64,
}

/// Runs until EOF or `shutdown`. `on_delivered` sees every event the
/// backend accepted. Lines that are not valid UTF-8 are decoded lossily.
pub async fn relay_lines<R, B, F>(
    mut reader: R,
    publisher: &mut Publisher<B>,
    ladder: &mut RetryLadder,
    shutdown: &CancellationToken,
    mut on_delivered: F,
) -> Result<RelayStats>
where
    R: AsyncBufRead + Unpin,
    B: ClientBackend,
    F: FnMut(&SwitchEvent),
{
    let mut stats = RelayStats::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("Received interrupt signal, shutting down");
                break;
            }
            read = reader.read_until(b'\n', &mut buf) => read?,
        };
        if read == 0 {
            debug!("end of log input");
            break;
        }
        stats.lines += 1;
        let line = decode_line(&buf);

        let Some(event) = extract_switch_event(&line) else {
            continue;
        };
        stats.events += 1;
        let payload = event.to_payload()?;

        let outcome = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("Received interrupt signal while publishing, shutting down");
                break;
            }
            outcome = publisher.publish_with_retry(&payload, ladder) => outcome,
        };

        match outcome {
            PublishOutcome::Delivered { .. } => {
                stats.delivered += 1;
                on_delivered(&event);
            }
            PublishOutcome::Dropped { attempts } => {
                stats.dropped += 1;
                warn!(
                    "Dropping switch to '{}' after {attempts} failed attempts",
                    event.desktop
                );
            }
        }
    }

    Ok(stats)
}

fn decode_line(raw: &[u8]) -> Cow<'_, str> {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = String::from_utf8_lossy(raw);
    if let Cow::Owned(_) = line {
        debug!("replaced invalid UTF-8 in log line: {line}");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_line_strips_line_ending() {
        assert_eq!(decode_line(b"switch\r\n"), "switch");
        assert_eq!(decode_line(b"switch"), "switch");
    }

    #[test]
    fn test_decode_line_replaces_invalid_bytes() {
        assert_eq!(decode_line(b"caf\xe9-pc\n"), "caf\u{fffd}-pc");
    }
}
