//! Dead-letter destinations for records the persistence sink gave up on

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use contracts::{ContractError, DeadLetter, Record};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StoreError;

/// One dead-lettered record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub record: Record,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Appends entries as JSON lines.
pub struct FileDeadLetter {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileDeadLetter {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), "dead letter file opened");
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry back, in append order.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<DeadLetterEntry>, StoreError> {
        let content = std::fs::read_to_string(path)?;
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str(line).map_err(|e| StoreError::DeadLetterFormat {
                    line: idx + 1,
                    message: e.to_string(),
                })
            })
            .collect()
    }
}

impl DeadLetter for FileDeadLetter {
    async fn record(&self, record: &Record, reason: &str) -> Result<(), ContractError> {
        let entry = DeadLetterEntry {
            record: record.clone(),
            reason: reason.to_string(),
            failed_at: Utc::now(),
        };
        let line = serde_json::to_string(&entry)
            .map_err(|e| ContractError::Other(format!("dead letter encode: {e}")))?;

        let mut writer = self.writer.lock();
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

/// Keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryDeadLetter {
    entries: Mutex<Vec<DeadLetterEntry>>,
}

impl MemoryDeadLetter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<DeadLetterEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeadLetter for MemoryDeadLetter {
    async fn record(&self, record: &Record, reason: &str) -> Result<(), ContractError> {
        self.entries.lock().push(DeadLetterEntry {
            record: record.clone(),
            reason: reason.to_string(),
            failed_at: Utc::now(),
        });
        Ok(())
    }
}
