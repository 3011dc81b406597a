//! Persistence of finished extraction results.
//!
//! Each stored record gets a UUID v4 and a UTC creation timestamp. The
//! result itself is kept as its JSON serialisation, exactly as it would be
//! returned to a caller, so a stored record never depends on the crate
//! version that reads it.

use crate::error::FinMetricsError;
use crate::output::ExtractionResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One persisted result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResult {
    pub id: Uuid,
    pub filename: String,
    pub result_json: String,
    pub created_at: DateTime<Utc>,
}

impl StoredResult {
    fn new(filename: &str, result: &ExtractionResult) -> Result<Self, FinMetricsError> {
        let result_json = result
            .to_json()
            .map_err(|e| FinMetricsError::Internal(format!("serialise result: {e}")))?;
        Ok(Self {
            id: Uuid::new_v4(),
            filename: filename.to_string(),
            result_json,
            created_at: Utc::now(),
        })
    }

    /// Decode the stored JSON back into a result.
    pub fn result(&self) -> Result<ExtractionResult, serde_json::Error> {
        serde_json::from_str(&self.result_json)
    }
}

/// Append-only store of extraction results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn append(&self, filename: &str, result: &ExtractionResult) -> Result<StoredResult, FinMetricsError>;

    async fn get(&self, id: Uuid) -> Result<Option<StoredResult>, FinMetricsError>;

    /// All records, newest first.
    async fn list(&self) -> Result<Vec<StoredResult>, FinMetricsError>;
}

fn newest_first(mut records: Vec<StoredResult>) -> Vec<StoredResult> {
    records.reverse();
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    records
}

/// In-process store, lost on exit.
#[derive(Default)]
pub struct MemoryResultStore {
    records: RwLock<Vec<StoredResult>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn append(&self, filename: &str, result: &ExtractionResult) -> Result<StoredResult, FinMetricsError> {
        let record = StoredResult::new(filename, result)?;
        self.records.write().await.push(record.clone());
        debug!("Stored result {} for '{}'", record.id, filename);
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<StoredResult>, FinMetricsError> {
        Ok(self.records.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<StoredResult>, FinMetricsError> {
        Ok(newest_first(self.records.read().await.clone()))
    }
}

/// JSON-lines file store: one [`StoredResult`] per line.
///
/// Lines that fail to parse are skipped with a warning.
pub struct JsonlResultStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn failed(&self, detail: impl std::fmt::Display) -> FinMetricsError {
        FinMetricsError::StoreFailed {
            location: self.path.display().to_string(),
            detail: detail.to_string(),
        }
    }

    async fn read_all(&self) -> Result<Vec<StoredResult>, FinMetricsError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.failed(e)),
        };

        let records = contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(n, line)| match serde_json::from_str::<StoredResult>(line) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!("{}:{}: skipping unreadable record: {}", self.path.display(), n + 1, e);
                    None
                }
            })
            .collect();
        Ok(records)
    }
}

#[async_trait]
impl ResultStore for JsonlResultStore {
    async fn append(&self, filename: &str, result: &ExtractionResult) -> Result<StoredResult, FinMetricsError> {
        let record = StoredResult::new(filename, result)?;
        let mut line = serde_json::to_string(&record).map_err(|e| self.failed(e))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| self.failed(e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.failed(e))?;
        file.write_all(line.as_bytes()).await.map_err(|e| self.failed(e))?;
        file.flush().await.map_err(|e| self.failed(e))?;

        info!("Stored result {} in {}", record.id, self.path.display());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<StoredResult>, FinMetricsError> {
        Ok(self.read_all().await?.into_iter().find(|r| r.id == id))
    }

    async fn list(&self) -> Result<Vec<StoredResult>, FinMetricsError> {
        Ok(newest_first(self.read_all().await?))
    }
}
