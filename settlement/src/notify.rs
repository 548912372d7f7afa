//! Notification collaborator
//!
//! Best-effort: a failed send is logged and otherwise ignored.

use async_trait::async_trait;
use circuit_breaker::Breach;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Notifier errors
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Channel unreachable or rejected the event
    #[error("Notifier unavailable: {0}")]
    Unavailable(String),

    /// Event could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    /// Routine
    Info,
    /// Needs a look
    Warning,
    /// Page someone
    Critical,
}

/// Settlement event sent to operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SettlementEvent {
    /// Cycle completed
    CycleCompleted {
        /// Cycle
        cycle_id: Uuid,
        /// Transactions settled
        transactions_processed: usize,
        /// Instructions generated
        settlements_generated: usize,
        /// Gross volume
        total_volume: Decimal,
        /// Breaker warnings raised
        warnings: Vec<Breach>,
    },
    /// Circuit breaker blocked the cycle
    CircuitBreakerTriggered {
        /// Network
        network: String,
        /// Blocking breaches
        violations: Vec<Breach>,
        /// Non-blocking breaches
        warnings: Vec<Breach>,
    },
    /// Cycle failed; may be stuck in `processing`
    CycleFailed {
        /// Cycle, if one was created
        cycle_id: Option<Uuid>,
        /// Network
        network: String,
        /// Error text
        error: String,
    },
}

impl SettlementEvent {
    /// Severity of the event
    pub fn level(&self) -> NotificationLevel {
        match self {
            SettlementEvent::CycleCompleted { warnings, .. } if !warnings.is_empty() => {
                NotificationLevel::Warning
            }
            SettlementEvent::CycleCompleted { .. } => NotificationLevel::Info,
            SettlementEvent::CircuitBreakerTriggered { .. } => NotificationLevel::Warning,
            SettlementEvent::CycleFailed { .. } => NotificationLevel::Critical,
        }
    }
}

/// Notification sink
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one event
    async fn notify(&self, event: &SettlementEvent) -> Result<(), NotifyError>;
}

/// Emits events as `tracing` records (target `notification`)
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: &SettlementEvent) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(event)?;
        match event.level() {
            NotificationLevel::Info => info!(target: "notification", event = %payload, "notification"),
            NotificationLevel::Warning => warn!(target: "notification", event = %payload, "notification"),
            NotificationLevel::Critical => error!(target: "notification", event = %payload, "CRITICAL notification"),
        }
        Ok(())
    }
}

/// Collects events in memory; can be told to fail
#[derive(Debug, Default, Clone)]
pub struct MemoryNotifier {
    events: Arc<Mutex<Vec<SettlementEvent>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryNotifier {
    /// Create empty notifier
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Events delivered so far
    pub async fn events(&self) -> Vec<SettlementEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, event: &SettlementEvent) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Unavailable("memory notifier set to fail".to_string()));
        }
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
