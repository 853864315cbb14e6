use anyhow::{Context, Result};
use async_trait::async_trait;
use intraday_core::{DecisionLog, DecisionRecord};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// In-memory log for tests and dry runs without persistence.
#[derive(Default)]
pub struct MemoryDecisionLog {
    records: Mutex<Vec<DecisionRecord>>,
}

impl MemoryDecisionLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> Vec<DecisionRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl DecisionLog for MemoryDecisionLog {
    async fn append(&self, record: &DecisionRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Append-only JSON-lines log on disk, one record per line. Replaying
/// the file at startup reconstructs the day's risk aggregates.
pub struct JsonlDecisionLog {
    file: Mutex<File>,
}

impl JsonlDecisionLog {
    /// Opens (creating if absent) the log file in append mode.
    ///
    /// # Errors
    /// I/O errors opening the file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening decision log {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Reads every record from an existing log file. A missing file is
    /// an empty history, not an error.
    ///
    /// # Errors
    /// I/O errors, or a line that does not parse as a record.
    pub fn replay(path: impl AsRef<Path>) -> Result<Vec<DecisionRecord>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(
            File::open(path).with_context(|| format!("reading decision log {}", path.display()))?,
        );
        let mut records = Vec::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line)
                .with_context(|| format!("decision log line {} is corrupt", number + 1))?;
            records.push(record);
        }
        Ok(records)
    }
}

#[async_trait]
impl DecisionLog for JsonlDecisionLog {
    async fn append(&self, record: &DecisionRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let mut file = self.file.lock();
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }
}
