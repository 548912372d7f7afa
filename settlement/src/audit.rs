//! Audit trail
//!
//! Every milestone of a settlement run is written to an [`AuditSink`].
//! Sinks may fail; [`AuditRecorder`] turns those failures into log lines so
//! an audit outage never changes the outcome returned to the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Audit sink errors
#[derive(Error, Debug)]
pub enum AuditError {
    /// Sink unreachable or rejected the write
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),

    /// Entry could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Audit action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Cycle completed
    SettlementCompleted,
    /// Circuit breaker blocked the cycle
    SettlementHalted,
    /// Cycle failed during collection or execution
    SettlementFailed,
}

/// Audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Action
    pub action: AuditAction,

    /// Entity kind (`settlement_cycle`)
    pub entity_type: String,

    /// Entity ID, when one exists
    pub entity_id: Option<Uuid>,

    /// Structured details
    pub details: serde_json::Value,

    /// Recorded timestamp
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Entry about a settlement cycle
    pub fn cycle(action: AuditAction, cycle_id: Option<Uuid>, details: serde_json::Value) -> Self {
        Self {
            action,
            entity_type: "settlement_cycle".to_string(),
            entity_id: cycle_id,
            details,
            recorded_at: Utc::now(),
        }
    }
}

/// Audit log collaborator
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist one entry
    async fn log_audit(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Writes entries as structured `tracing` events (target `audit`)
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log_audit(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let details = serde_json::to_string(&entry.details)?;
        info!(
            target: "audit",
            action = ?entry.action,
            entity_type = %entry.entity_type,
            entity_id = ?entry.entity_id,
            details = %details,
            "audit"
        );
        Ok(())
    }
}

/// Keeps entries in memory; can be told to fail
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditSink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryAuditSink {
    /// Create empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Entries written so far
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn log_audit(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("memory sink set to fail".to_string()));
        }
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }
}

/// Applies the audit failure policy on top of a sink.
///
/// A failed write is logged at `warn!` and swallowed. Once
/// `max_consecutive_failures` writes in a row have failed, each further
/// failure is logged at `error!` instead. A successful write resets the count.
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
    consecutive_failures: AtomicU32,
    max_consecutive_failures: u32,
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder")
            .field("consecutive_failures", &self.consecutive_failures())
            .field("max_consecutive_failures", &self.max_consecutive_failures)
            .finish()
    }
}

impl AuditRecorder {
    /// Wrap a sink
    pub fn new(sink: Arc<dyn AuditSink>, max_consecutive_failures: u32) -> Self {
        Self {
            sink,
            consecutive_failures: AtomicU32::new(0),
            max_consecutive_failures,
        }
    }

    /// Back-to-back failures so far
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Write an entry; returns whether it was persisted
    pub async fn record(&self, entry: AuditEntry) -> bool {
        match self.sink.log_audit(&entry).await {
            Ok(()) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                true
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.max_consecutive_failures {
                    error!(
                        action = ?entry.action,
                        entity_id = ?entry.entity_id,
                        failures,
                        "Audit log persistently failing: {}",
                        e
                    );
                } else {
                    warn!(
                        action = ?entry.action,
                        entity_id = ?entry.entity_id,
                        failures,
                        "Audit log write failed: {}",
                        e
                    );
                }
                false
            }
        }
    }
}
