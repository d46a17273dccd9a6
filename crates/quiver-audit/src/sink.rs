//! Audit record sinks.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use quiver_core::RequestId;

use crate::error::{AuditError, AuditResult};
use crate::record::AuditRecord;

/// Storage backend for audit records.
///
/// Implementations must be thread-safe and append-only: a stored record is
/// never rewritten.
pub trait AuditSink: Send + Sync {
    /// Persist one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    fn append(&self, record: &AuditRecord) -> AuditResult<()>;

    /// All records of one request, in append order.
    ///
    /// # Errors
    ///
    /// Returns an error if records cannot be read back.
    fn records_for(&self, request_id: &RequestId) -> AuditResult<Vec<AuditRecord>>;

    /// Total number of stored records.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn count(&self) -> AuditResult<usize>;

    /// Flush pending writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to flush.
    fn flush(&self) -> AuditResult<()> {
        Ok(())
    }
}

fn poisoned() -> AuditError {
    AuditError::Sink("audit sink lock poisoned".to_owned())
}

/// In-process sink.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn all(&self) -> AuditResult<Vec<AuditRecord>> {
        Ok(self.records.read().map_err(|_| poisoned())?.clone())
    }
}

impl AuditSink for MemorySink {
    fn append(&self, record: &AuditRecord) -> AuditResult<()> {
        self.records
            .write()
            .map_err(|_| poisoned())?
            .push(record.clone());
        Ok(())
    }

    fn records_for(&self, request_id: &RequestId) -> AuditResult<Vec<AuditRecord>> {
        Ok(self
            .records
            .read()
            .map_err(|_| poisoned())?
            .iter()
            .filter(|r| r.body.request_id == *request_id)
            .cloned()
            .collect())
    }

    fn count(&self) -> AuditResult<usize> {
        Ok(self.records.read().map_err(|_| poisoned())?.len())
    }
}

/// Append-only JSON-lines file sink.
///
/// One record per line. The file is opened in append mode and every record
/// is written with a single `write_all`.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlSink {
    /// Open or create the log at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Sink`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record in the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a line is not a record.
    pub fn read_all(path: impl AsRef<Path>) -> AuditResult<Vec<AuditRecord>> {
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| {
                AuditError::Encoding(format!("line {}: {e}", n.saturating_add(1)))
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

impl AuditSink for JsonlSink {
    fn append(&self, record: &AuditRecord) -> AuditResult<()> {
        let mut line =
            serde_json::to_vec(record).map_err(|e| AuditError::Encoding(e.to_string()))?;
        line.push(b'\n');
        let mut file = self.file.lock().map_err(|_| poisoned())?;
        file.write_all(&line)?;
        Ok(())
    }

    fn records_for(&self, request_id: &RequestId) -> AuditResult<Vec<AuditRecord>> {
        Ok(Self::read_all(&self.path)?
            .into_iter()
            .filter(|r| r.body.request_id == *request_id)
            .collect())
    }

    fn count(&self) -> AuditResult<usize> {
        Ok(Self::read_all(&self.path)?.len())
    }

    fn flush(&self) -> AuditResult<()> {
        self.file.lock().map_err(|_| poisoned())?.sync_data()?;
        Ok(())
    }
}
