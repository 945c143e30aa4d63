//! Best-effort audit trail for guard decisions.
//!
//! Sinks are fire-and-forget: `record` never blocks and never fails from the
//! caller's side. A sink that cannot keep up drops records and counts them.

use bastion_core::config::AuditTarget;
use bastion_core::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// Which side of the pipeline a check ran on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditDirection {
    Input,
    Output,
}

/// One guard decision. Carries a fingerprint, never the raw text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub fingerprint: String,
    pub direction: AuditDirection,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Destination for audit records.
pub trait AuditSink: Send + Sync + std::fmt::Debug {
    /// Hand off a record. Must return promptly and must not panic.
    fn record(&self, record: AuditRecord);
}

/// Discards every record.
#[derive(Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _record: AuditRecord) {}
}

/// Emits each record as a structured tracing event on `bastion::audit`.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        tracing::info!(
            target: "bastion::audit",
            fingerprint = %record.fingerprint,
            direction = ?record.direction,
            allowed = record.allowed,
            reason = record.reason.as_deref().unwrap_or(""),
            "guard verdict"
        );
    }
}

/// Channel capacity of the JSONL writer.
const JSONL_CHANNEL_CAPACITY: usize = 1024;

/// Appends records as JSON lines from a background task.
#[derive(Debug)]
pub struct JsonlAuditSink {
    sender: mpsc::Sender<AuditRecord>,
    dropped: Arc<AtomicU64>,
    path: PathBuf,
}

impl JsonlAuditSink {
    /// Start the writer task. Must be called from within a tokio runtime.
    pub fn spawn(path: impl Into<PathBuf>, capacity: usize) -> AppResult<Self> {
        let path = path.into();

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(AppError::Config(
                "JSONL audit sink requires a running tokio runtime".to_string(),
            ));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));

        tokio::spawn(write_records(path.clone(), receiver, Arc::clone(&dropped)));

        tracing::debug!("Audit log writing to {:?}", path);

        Ok(Self {
            sender,
            dropped,
            path,
        })
    }

    /// Records lost to a full channel or failed writes.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, record: AuditRecord) {
        if let Err(e) = self.sender.try_send(record) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Audit record dropped: {}", e);
        }
    }
}

async fn write_records(
    path: PathBuf,
    mut receiver: mpsc::Receiver<AuditRecord>,
    dropped: Arc<AtomicU64>,
) {
    let mut file = match tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
    {
        Ok(file) => Some(file),
        Err(e) => {
            tracing::warn!("Failed to open audit log {:?}: {}", path, e);
            None
        }
    };

    while let Some(record) = receiver.recv().await {
        let Some(handle) = file.as_mut() else {
            dropped.fetch_add(1, Ordering::Relaxed);
            continue;
        };

        let line = match serde_json::to_string(&record) {
            Ok(json) => json + "\n",
            Err(e) => {
                dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Failed to serialize audit record: {}", e);
                continue;
            }
        };

        let written = async {
            handle.write_all(line.as_bytes()).await?;
            handle.flush().await
        }
        .await;

        if let Err(e) = written {
            dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Failed to write audit record: {}", e);
        }
    }
}

/// Create the sink selected by configuration.
pub fn create_sink(target: AuditTarget, jsonl_path: &Path) -> AppResult<Arc<dyn AuditSink>> {
    match target {
        AuditTarget::None => Ok(Arc::new(NoopAuditSink)),
        AuditTarget::Tracing => Ok(Arc::new(TracingAuditSink)),
        AuditTarget::Jsonl => Ok(Arc::new(JsonlAuditSink::spawn(
            jsonl_path,
            JSONL_CHANNEL_CAPACITY,
        )?)),
    }
}
