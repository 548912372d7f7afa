//! Core types for circuit breakers

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggregate figures of a proposed settlement batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementMetrics {
    /// Gross volume of the batch
    pub total_volume: Decimal,

    /// Distinct members appearing in the batch
    pub member_count: usize,

    /// Largest single settlement instruction
    pub max_single_settlement: Decimal,

    /// OTC spread as a fraction, when quoted
    pub otc_spread: Option<Decimal>,

    /// Seconds elapsed since the cycle started
    pub processing_time_seconds: Option<Decimal>,

    /// Rolling daily volume including this batch
    pub daily_volume: Option<Decimal>,

    /// Largest absolute net position of any member
    pub max_member_exposure: Option<Decimal>,
}

/// Individual threshold check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerCheck {
    /// Largest settlement above limit
    MaxSettlementAmount,
    /// Too many members
    MaxMembers,
    /// Spread below floor
    MinOtcSpread,
    /// Spread above ceiling
    MaxOtcSpread,
    /// Processing took too long
    ProcessingTimeout,
    /// Daily volume above limit
    MaxDailyVolume,
    /// Single member exposure above threshold
    MaxMemberExposure,
}

impl BreakerCheck {
    /// Stable identifier used in responses and audit records
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerCheck::MaxSettlementAmount => "max_settlement_amount",
            BreakerCheck::MaxMembers => "max_members",
            BreakerCheck::MinOtcSpread => "min_otc_spread",
            BreakerCheck::MaxOtcSpread => "max_otc_spread",
            BreakerCheck::ProcessingTimeout => "processing_timeout",
            BreakerCheck::MaxDailyVolume => "max_daily_volume",
            BreakerCheck::MaxMemberExposure => "max_member_exposure",
        }
    }

    /// Severity a breach of this check carries
    pub fn severity(&self) -> Severity {
        match self {
            BreakerCheck::MinOtcSpread | BreakerCheck::MaxMemberExposure => Severity::Warning,
            _ => Severity::Critical,
        }
    }
}

impl std::fmt::Display for BreakerCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breach severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Blocks execution
    Critical,
    /// Reported only
    Warning,
}

/// A tripped threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breach {
    /// Which check tripped
    #[serde(rename = "type")]
    pub check: BreakerCheck,

    /// Human-readable description embedding value and limit
    pub message: String,

    /// Severity
    pub severity: Severity,

    /// Observed value
    pub value: Decimal,

    /// Configured limit
    pub limit: Decimal,
}

/// Outcome of evaluating every check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerResult {
    /// True iff there are no violations
    pub passed: bool,

    /// Critical breaches, in check order
    pub violations: Vec<Breach>,

    /// Non-blocking breaches, in check order
    pub warnings: Vec<Breach>,
}

impl CircuitBreakerResult {
    /// Split breaches by severity
    pub fn from_breaches(breaches: Vec<Breach>) -> Self {
        let (violations, warnings): (Vec<_>, Vec<_>) = breaches
            .into_iter()
            .partition(|b| b.severity == Severity::Critical);

        Self {
            passed: violations.is_empty(),
            violations,
            warnings,
        }
    }

    /// Violation of a given check, if any
    pub fn violation(&self, check: BreakerCheck) -> Option<&Breach> {
        self.violations.iter().find(|b| b.check == check)
    }

    /// Warning of a given check, if any
    pub fn warning(&self, check: BreakerCheck) -> Option<&Breach> {
        self.warnings.iter().find(|b| b.check == check)
    }
}
