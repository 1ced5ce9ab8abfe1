//! Trade Journal - Append-only JSONL Fill and Settlement Records
//!
//! Persists journal entries to daily JSONL files named
//! `trades/YYYY-MM-DD.jsonl` (UTC day of the entry's timestamp). Each
//! line is a self-contained JSON record for easy parsing and streaming.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{instrument, warn};

use crate::ports::journal::{JournalEntry, TradeJournal};

/// Append-only JSONL journal with daily file rotation.
pub struct JsonlJournal {
    /// Directory holding the daily files.
    trades_dir: PathBuf,
    /// Serializes appends so lines never interleave.
    write_lock: Mutex<()>,
}

impl JsonlJournal {
    /// Create the journal under `data_dir/trades`.
    pub async fn new(data_dir: &str) -> Result<Self> {
        let trades_dir = Path::new(data_dir).join("trades");
        fs::create_dir_all(&trades_dir)
            .await
            .context("Failed to create trades directory")?;
        Ok(Self {
            trades_dir,
            write_lock: Mutex::new(()),
        })
    }

    fn day_of(ts_ms: u64) -> NaiveDate {
        i64::try_from(ts_ms)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now)
            .date_naive()
    }

    /// Path of the file for one UTC day.
    pub fn path_for(&self, day: NaiveDate) -> PathBuf {
        self.trades_dir.join(format!("{}.jsonl", day.format("%Y-%m-%d")))
    }

    /// Read back one day's entries, skipping malformed lines.
    pub async fn read_day(&self, day: NaiveDate) -> Result<Vec<JournalEntry>> {
        let path = self.path_for(day);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context("Failed to read journal file"),
        };
        let mut entries = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(file = %path.display(), error = %e, "Skipping malformed journal line"),
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl TradeJournal for JsonlJournal {
    #[instrument(skip_all, fields(ts_ms = entry.ts_ms()))]
    async fn append(&self, entry: &JournalEntry) -> Result<()> {
        let path = self.path_for(Self::day_of(entry.ts_ms()));
        let mut json = serde_json::to_string(entry).context("Failed to serialize journal entry")?;
        json.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context("Failed to open journal file")?;
        file.write_all(json.as_bytes())
            .await
            .context("Failed to write journal entry")?;
        file.flush().await.context("Failed to flush journal")?;
        Ok(())
    }
}
