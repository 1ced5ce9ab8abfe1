//! JSONL Event Reader - Normalized Feed Events from a File or Stdin
//!
//! One `FeedEvent` per line, internally tagged by `type`. Blank lines are
//! skipped; malformed lines are logged and skipped so one bad record
//! cannot stop a session. The upstream collectors (spot feeds, target
//! book feed, discovery, resolution) write this format.

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use super::ingress::FeedIngress;
use crate::ports::feed::FeedEvent;

/// Counts from one pump run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpStats {
    /// Events forwarded to the ingress.
    pub events: u64,
    /// Lines that failed to parse.
    pub skipped: u64,
}

/// Parse one line; `None` for blanks.
pub fn parse_line(line: &str) -> Option<Result<FeedEvent>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(serde_json::from_str(trimmed).context("Malformed feed event"))
}

/// Forward every event from `reader` into the ingress.
pub async fn pump<R: AsyncBufRead + Unpin>(
    reader: R,
    ingress: &FeedIngress,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<PumpStats> {
    let mut lines = reader.lines();
    let mut stats = PumpStats::default();
    let mut line_no = 0u64;
    loop {
        let line = tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            line = lines.next_line() => line.context("Failed to read feed line")?,
        };
        let Some(line) = line else {
            break;
        };
        line_no += 1;
        match parse_line(&line) {
            None => {}
            Some(Ok(event)) => {
                ingress.send(event).await?;
                stats.events += 1;
            }
            Some(Err(e)) => {
                warn!(line = line_no, error = %e, "Skipping feed line");
                stats.skipped += 1;
            }
        }
    }
    Ok(stats)
}

/// Pump from a path, or stdin when `source` is "-".
#[instrument(skip(ingress, shutdown))]
pub async fn pump_source(
    source: &str,
    ingress: FeedIngress,
    shutdown: broadcast::Receiver<()>,
) -> Result<PumpStats> {
    let stats = if source == "-" {
        pump(BufReader::new(tokio::io::stdin()), &ingress, shutdown).await?
    } else {
        let file = File::open(source)
            .await
            .with_context(|| format!("Failed to open feed source {source}"))?;
        pump(BufReader::new(file), &ingress, shutdown).await?
    };
    info!(events = stats.events, skipped = stats.skipped, "Feed source finished");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::feeds::ingress::ingress;
    use crate::ports::feed::FeedSource;

    #[tokio::test]
    async fn test_pump_skips_bad_lines() {
        let input = concat!(
            r#"{"type":"spot_tick","asset":"BTC","price":100000.0,"ts_ms":1}"#,
            "\n\nnot json\n",
            r#"{"type":"funding_rate","asset":"ETH","rate":0.0001,"ts_ms":2}"#,
            "\n"
        );
        let (tx, mut rx) = ingress(8);
        let (_stop, shutdown) = broadcast::channel(1);
        let stats = pump(BufReader::new(input.as_bytes()), &tx, shutdown).await.unwrap();
        assert_eq!(stats, PumpStats { events: 2, skipped: 1 });

        drop(tx);
        let first = rx.next_event().await.unwrap();
        assert!(matches!(first, FeedEvent::SpotTick { .. }));
        let second = rx.next_event().await.unwrap();
        assert!(matches!(second, FeedEvent::FundingRate { .. }));
    }

    #[test]
    fn test_parse_line_blank() {
        assert!(parse_line("   ").is_none());
        assert!(parse_line("{}").is_some_and(|r| r.is_err()));
    }
}
