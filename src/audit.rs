//! Append-only audit trail
//!
//! Every routing decision, redaction, compliance verdict and final outcome is
//! recorded as an `AuditEvent` keyed by correlation id. Events carry a SHA-256
//! digest of the redacted payload, never the payload itself.
//!
//! Sink failures never reach the execution path: `AuditTrail` hands events to
//! a writer task, which logs failed writes and counts them in
//! `supportroute_audit_failures_total`.

use crate::config::{AuditConfig, AuditSinkKind};
use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::operation::{CorrelationId, Outcome};
use crate::privacy::{ComplianceVerdict, PiiCategory};
use crate::router::RoutingDecision;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

/// Stage of the operation lifecycle an event records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    RoutingDecision,
    Redaction,
    ComplianceVerdict,
    Outcome,
}

/// One immutable audit record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub correlation_id: CorrelationId,
    pub event_type: AuditEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_decision: Option<RoutingDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compliance_verdict: Option<ComplianceVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub pii_categories: BTreeMap<PiiCategory, usize>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(correlation_id: CorrelationId, event_type: AuditEventType) -> Self {
        Self {
            correlation_id,
            event_type,
            payload_digest: None,
            routing_decision: None,
            compliance_verdict: None,
            outcome: None,
            error_kind: None,
            pii_categories: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn decision(decision: &RoutingDecision) -> Self {
        let mut event = Self::new(decision.operation_id, AuditEventType::RoutingDecision);
        event.routing_decision = Some(decision.clone());
        event
    }

    pub fn with_digest(mut self, digest: Option<String>) -> Self {
        self.payload_digest = digest;
        self
    }

    pub fn with_verdict(mut self, verdict: ComplianceVerdict) -> Self {
        self.compliance_verdict = Some(verdict);
        self
    }

    pub fn with_outcome(mut self, outcome: Outcome, error_kind: Option<&'static str>) -> Self {
        self.outcome = Some(outcome);
        self.error_kind = error_kind;
        self
    }

    pub fn with_categories(mut self, categories: BTreeMap<PiiCategory, usize>) -> Self {
        self.pii_categories = categories;
        self
    }
}

/// Hex-encoded SHA-256 of a payload
pub fn payload_digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("audit I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Append-only destination for audit events
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// In-process sink, for tests and single-node deployments
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn events_for(&self, id: CorrelationId) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.correlation_id == id)
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

/// JSON-lines file opened in append mode
pub struct JsonlAuditSink {
    path: PathBuf,
    file: tokio::sync::Mutex<tokio::fs::File>,
}

impl JsonlAuditSink {
    /// Open (or create) the file, creating parent directories as needed
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: tokio::sync::Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Events queued between the execution path and the writer task
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

enum AuditMessage {
    Record(AuditEvent),
    Flush(oneshot::Sender<()>),
}

/// Audit front-end used by the executor
///
/// `record` only enqueues: a single writer task owns the sink and appends
/// events in the order they were recorded. A full queue or a stopped writer
/// drops the event and counts an audit failure.
#[derive(Clone)]
pub struct AuditTrail {
    sender: mpsc::Sender<AuditMessage>,
    metrics: Option<Metrics>,
}

impl AuditTrail {
    /// Spawn the writer task; must be called inside a tokio runtime
    pub fn new(sink: Arc<dyn AuditSink>, metrics: Option<Metrics>) -> Self {
        Self::with_capacity(sink, metrics, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(
        sink: Arc<dyn AuditSink>,
        metrics: Option<Metrics>,
        capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let writer = AuditWriter {
            receiver: rx,
            sink,
            metrics: metrics.clone(),
        };
        tokio::spawn(writer.run());
        Self { sender: tx, metrics }
    }

    /// Build the configured sink
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file sink cannot be opened.
    pub async fn from_config(config: &AuditConfig, metrics: Option<Metrics>) -> AppResult<Self> {
        let sink: Arc<dyn AuditSink> = match config.sink {
            AuditSinkKind::Memory => Arc::new(MemoryAuditSink::new()),
            AuditSinkKind::File => {
                let path = config.path.as_deref().ok_or_else(|| {
                    AppError::Config("audit.path is required for the file sink".to_string())
                })?;
                let sink = JsonlAuditSink::open(path).await.map_err(|e| {
                    AppError::Config(format!("Failed to open audit file {}: {}", path, e))
                })?;
                tracing::info!(path = %path, "Audit events appended to JSON-lines file");
                Arc::new(sink)
            }
        };
        Ok(Self::with_capacity(sink, metrics, config.queue_capacity))
    }

    /// Queue an event without waiting for the sink
    pub fn record(&self, event: AuditEvent) {
        if let Err(e) = self.sender.try_send(AuditMessage::Record(event)) {
            let (reason, event) = match e {
                TrySendError::Full(AuditMessage::Record(event)) => ("queue full", event),
                TrySendError::Closed(AuditMessage::Record(event)) => ("writer stopped", event),
                _ => return,
            };
            tracing::error!(
                correlation_id = %event.correlation_id,
                event_type = ?event.event_type,
                reason,
                "Dropped audit event"
            );
            if let Some(metrics) = &self.metrics {
                metrics.audit_failure();
            }
        }
    }

    /// Wait until every event recorded before this call has reached the sink
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(AuditMessage::Flush(tx)).await.is_err() {
            tracing::error!("Audit writer stopped, nothing to flush");
            return;
        }
        let _ = rx.await;
    }
}

struct AuditWriter {
    receiver: mpsc::Receiver<AuditMessage>,
    sink: Arc<dyn AuditSink>,
    metrics: Option<Metrics>,
}

impl AuditWriter {
    async fn run(mut self) {
        while let Some(message) = self.receiver.recv().await {
            match message {
                AuditMessage::Record(event) => {
                    if let Err(e) = self.sink.record(&event).await {
                        tracing::error!(
                            correlation_id = %event.correlation_id,
                            event_type = ?event.event_type,
                            error = %e,
                            "Failed to record audit event"
                        );
                        if let Some(metrics) = &self.metrics {
                            metrics.audit_failure();
                        }
                    }
                }
                AuditMessage::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        tracing::debug!("Audit writer stopped");
    }
}
