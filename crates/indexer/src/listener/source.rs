//! Record sources for the sync engine.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use super::events::IndexedRecord;

/// A stream of delivered records, in ledger order.
#[async_trait]
pub trait EventSource: Send {
    /// Next record, or `None` when nothing more is available right now.
    ///
    /// A source that may grow returns `None` at its current end and can be
    /// polled again later.
    async fn next(&mut self) -> Result<Option<IndexedRecord>>;
}

/// Reads one JSON record per line from a file.
///
/// In follow mode an unterminated last line is held back until its newline
/// arrives, so a writer appending to the file is never read mid-record.
pub struct JsonlSource {
    path: PathBuf,
    reader: BufReader<File>,
    pending: String,
    line_number: usize,
    follow: bool,
}

impl JsonlSource {
    /// Open `path` for reading from the start.
    pub async fn open<P: AsRef<Path>>(path: P, follow: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .await
            .with_context(|| format!("Failed to open event source {}", path.display()))?;

        debug!("Opened event source {} (follow={})", path.display(), follow);

        Ok(Self {
            path,
            reader: BufReader::new(file),
            pending: String::new(),
            line_number: 0,
            follow,
        })
    }

    /// Number of complete lines consumed so far.
    pub fn line_number(&self) -> usize {
        self.line_number
    }
}

#[async_trait]
impl EventSource for JsonlSource {
    async fn next(&mut self) -> Result<Option<IndexedRecord>> {
        loop {
            let read = self
                .reader
                .read_line(&mut self.pending)
                .await
                .with_context(|| format!("Failed to read {}", self.path.display()))?;

            let terminated = self.pending.ends_with('\n');
            if read == 0 && self.pending.is_empty() {
                return Ok(None);
            }
            if !terminated && self.follow {
                return Ok(None);
            }

            let line = std::mem::take(&mut self.pending);
            self.line_number += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let record = serde_json::from_str(trimmed).with_context(|| {
                format!(
                    "Invalid record at {}:{}",
                    self.path.display(),
                    self.line_number
                )
            })?;
            return Ok(Some(record));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const PAYMENT: &str = r#"{"kind":"payment","id":"op-1","ledger":7,"from":"GA","to":"GB","amount":"1.0","transaction_hash":"ab"}"#;
    const EFFECT: &str = r#"{"kind":"effect","id":"eff-1","ledger":8,"type":"account_debited","account":"GA","amount":"1.0"}"#;

    #[tokio::test]
    async fn test_reads_records_and_skips_blank_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", PAYMENT).unwrap();
        writeln!(file).unwrap();
        write!(file, "{}", EFFECT).unwrap();
        file.flush().unwrap();

        let mut source = JsonlSource::open(file.path(), false).await.unwrap();
        assert_eq!(source.next().await.unwrap().unwrap().id(), "op-1");
        // Unterminated last line is still read outside follow mode.
        assert_eq!(source.next().await.unwrap().unwrap().id(), "eff-1");
        assert!(source.next().await.unwrap().is_none());
        assert_eq!(source.line_number(), 3);
    }

    #[tokio::test]
    async fn test_follow_waits_for_complete_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", PAYMENT).unwrap();
        let (head, tail) = EFFECT.split_at(20);
        write!(file, "{}", head).unwrap();
        file.flush().unwrap();

        let mut source = JsonlSource::open(file.path(), true).await.unwrap();
        assert_eq!(source.next().await.unwrap().unwrap().id(), "op-1");
        assert!(source.next().await.unwrap().is_none());

        writeln!(file, "{}", tail).unwrap();
        file.flush().unwrap();
        assert_eq!(source.next().await.unwrap().unwrap().id(), "eff-1");
        assert!(source.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_line_reports_position() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", PAYMENT).unwrap();
        writeln!(file, "{{not json").unwrap();
        file.flush().unwrap();

        let mut source = JsonlSource::open(file.path(), false).await.unwrap();
        source.next().await.unwrap();
        let err = source.next().await.unwrap_err();
        assert!(err.to_string().contains(":2"), "got: {}", err);
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let result = JsonlSource::open("/nonexistent/events.jsonl", false).await;
        assert!(result.is_err());
    }
}
