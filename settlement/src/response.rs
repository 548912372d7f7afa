//! Request and response shapes of the "process settlement" operation

use crate::Error;
use circuit_breaker::Breach;
use netting_core::SettlementInstruction;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Network administrator
    Admin,
    /// Settlement operator
    Operator,
    /// Trading member
    Member,
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// User ID
    pub user_id: String,

    /// Role
    pub role: Role,
}

impl Actor {
    /// Create new actor
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    /// May trigger settlement
    pub fn can_settle(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Operator)
    }
}

/// Input of `process_settlement`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessSettlementRequest {
    /// Compute without persisting
    #[serde(default)]
    pub simulation: bool,

    /// Network to settle; the configured default when absent
    #[serde(default)]
    pub network: Option<String>,

    /// Quoted OTC spread as a fraction, checked by the spread breakers
    #[serde(default)]
    pub otc_spread: Option<Decimal>,
}

impl ProcessSettlementRequest {
    /// Dry run
    pub fn simulation() -> Self {
        Self {
            simulation: true,
            ..Default::default()
        }
    }

    /// Real run
    pub fn execute() -> Self {
        Self::default()
    }

    /// Reject malformed input before any computation
    pub fn validate(&self) -> crate::Result<()> {
        if let Some(network) = &self.network {
            if network.trim().is_empty() {
                return Err(Error::Validation("network must not be empty".to_string()));
            }
        }

        if let Some(spread) = self.otc_spread {
            if spread < Decimal::ZERO || spread >= Decimal::ONE {
                return Err(Error::Validation(format!(
                    "otc_spread {} must be a fraction in [0, 1)",
                    spread
                )));
            }
        }

        Ok(())
    }
}

/// Successful outcome of `process_settlement`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettlementResponse {
    /// Real run completed
    Completed(CycleSummary),
    /// Simulation preview
    Preview(SimulationPreview),
    /// Nothing to settle
    NoTransactions(NoTransactions),
}

impl SettlementResponse {
    /// HTTP-style status code
    pub fn status_code(&self) -> u16 {
        200
    }
}

/// Nothing to settle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoTransactions {
    /// Explanation
    pub message: String,
    /// Always 0
    pub count: usize,
}

impl NoTransactions {
    /// Standard empty response
    pub fn new() -> Self {
        Self {
            message: "No unsettled transactions to process".to_string(),
            count: 0,
        }
    }
}

impl Default for NoTransactions {
    fn default() -> Self {
        Self::new()
    }
}

/// Simulation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationPreview {
    /// Always true
    pub simulation: bool,
    /// Always true
    pub success: bool,
    /// Projected figures
    pub preview: PreviewStats,
    /// Breaker outcome
    pub circuit_breakers: BreakerSummary,
    /// Instructions that a real run would persist
    pub settlements: Vec<SettlementInstruction>,
}

/// Projected figures of a simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewStats {
    /// Transactions that would be settled
    pub transactions_to_process: usize,
    /// Instructions that would be generated
    pub settlements_generated: usize,
    /// Gross volume
    pub total_volume: Decimal,
    /// Payment count reduction, percent
    pub estimated_savings_percentage: Decimal,
    /// Distinct members
    pub unique_members: usize,
    /// Largest instruction
    pub max_single_settlement: Decimal,
}

/// Breaker outcome reported with a preview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSummary {
    /// No violations
    pub passed: bool,
    /// Non-blocking breaches
    pub warnings: Vec<Breach>,
}

/// Real run result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    /// Always true
    pub success: bool,
    /// Persisted cycle
    pub cycle_id: Uuid,
    /// Transactions settled
    pub transactions_processed: usize,
    /// Instructions persisted
    pub settlements_generated: usize,
    /// Gross volume
    pub total_volume: Decimal,
    /// Payment count reduction, percent
    pub savings_percentage: Decimal,
    /// Wall-clock time of the run
    pub processing_time_seconds: f64,
    /// Non-blocking breaches
    pub circuit_breaker_warnings: Vec<Breach>,
}

/// Error body `{ error, message, details?, violations?, warnings? }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable error identifier
    pub error: String,

    /// Human-readable message
    pub message: String,

    /// Extra context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Blocking breaches (circuit breaker halts only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violations: Option<Vec<Breach>>,

    /// Non-blocking breaches (circuit breaker halts only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<Breach>>,
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        match err {
            Error::CircuitBreaker {
                violations,
                warnings,
            } => Self {
                error: err.code().to_string(),
                message: "Settlement halted by circuit breakers".to_string(),
                details: Some(serde_json::Value::from(
                    violations.iter().map(|v| v.message.clone()).collect::<Vec<_>>(),
                )),
                violations: Some(violations.clone()),
                warnings: Some(warnings.clone()),
            },
            Error::Database {
                cycle_id: Some(cycle_id),
                ..
            } => Self {
                error: err.code().to_string(),
                message: err.to_string(),
                details: Some(serde_json::json!({
                    "cycle_id": cycle_id,
                    "hint": "cycle may remain in processing; check settlement_cycles"
                })),
                violations: None,
                warnings: None,
            },
            _ => Self {
                error: err.code().to_string(),
                message: err.to_string(),
                details: None,
                violations: None,
                warnings: None,
            },
        }
    }
}

/// Reduction in payment count achieved by netting, in percent (2 dp)
pub fn savings_percentage(transaction_count: usize, instruction_count: usize) -> Decimal {
    if transaction_count == 0 {
        return Decimal::ZERO;
    }

    let saved = Decimal::from(transaction_count) - Decimal::from(instruction_count);
    (saved / Decimal::from(transaction_count) * Decimal::ONE_HUNDRED).round_dp(2)
}
