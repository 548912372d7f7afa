//! Core types for netting

use crate::{currency, Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Network participant identifier (opaque)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    /// Create new member ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Entered, awaiting counterparty confirmation
    Pending,
    /// Confirmed by both sides
    Confirmed,
    /// Included in a completed settlement cycle
    Settled,
}

impl TransactionStatus {
    /// Whether a transaction in this status may enter a netting run
    pub fn is_nettable(&self) -> bool {
        matches!(self, TransactionStatus::Pending | TransactionStatus::Confirmed)
    }
}

/// Bilateral obligation between two members
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction ID
    pub id: Uuid,

    /// Paying member
    pub from_member_id: MemberId,

    /// Receiving member
    pub to_member_id: MemberId,

    /// Amount in USD, two-decimal precision
    pub amount_usd: Decimal,

    /// Lifecycle status
    pub status: TransactionStatus,

    /// Cycle that settled this transaction (written once)
    #[serde(default)]
    pub settlement_cycle_id: Option<Uuid>,

    /// Trade date
    pub trade_date: NaiveDate,

    /// Optional reference / description
    #[serde(default)]
    pub reference: Option<String>,
}

impl Transaction {
    /// Create a confirmed, unsettled transaction dated today
    pub fn new(from: MemberId, to: MemberId, amount_usd: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_member_id: from,
            to_member_id: to,
            amount_usd,
            status: TransactionStatus::Confirmed,
            settlement_cycle_id: None,
            trade_date: Utc::now().date_naive(),
            reference: None,
        }
    }

    /// Attach a reference
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Eligible for the next netting run
    pub fn is_unsettled(&self) -> bool {
        self.settlement_cycle_id.is_none() && self.status.is_nettable()
    }

    /// Validate structure before netting.
    ///
    /// Amount must be positive, cent-aligned and inside the safe cent range;
    /// payer and payee must be distinct, non-empty members.
    pub fn validate(&self) -> Result<()> {
        let reject = |reason: String| Error::InvalidTransaction {
            id: self.id,
            reason,
        };

        if self.from_member_id.as_str().is_empty() || self.to_member_id.as_str().is_empty() {
            return Err(reject("member id is empty".to_string()));
        }

        if self.from_member_id == self.to_member_id {
            return Err(reject(format!(
                "payer and payee are both {}",
                self.from_member_id
            )));
        }

        if self.amount_usd <= Decimal::ZERO {
            return Err(reject(format!("amount {} is not positive", self.amount_usd)));
        }

        if !currency::is_cent_aligned(self.amount_usd) {
            return Err(reject(format!(
                "amount {} is not a multiple of 0.01",
                self.amount_usd
            )));
        }

        let cents = currency::dollars_to_cents(self.amount_usd).map_err(|e| reject(e.to_string()))?;
        if !currency::is_valid_amount(cents) {
            return Err(reject(format!("amount {} is out of range", self.amount_usd)));
        }

        Ok(())
    }
}

/// Net balance of one member across a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetPosition {
    /// Member
    pub member_id: MemberId,

    /// Signed balance (positive = net receiver, negative = net payer)
    pub net_amount: Decimal,

    /// Transactions that contributed to this balance
    pub transaction_ids: Vec<Uuid>,
}

impl NetPosition {
    /// Create a zero position
    pub fn new(member_id: MemberId) -> Self {
        Self {
            member_id,
            net_amount: Decimal::ZERO,
            transaction_ids: Vec::new(),
        }
    }

    /// Check if net payer (owes money)
    pub fn is_net_payer(&self) -> bool {
        self.net_amount < Decimal::ZERO
    }

    /// Check if net receiver (receives money)
    pub fn is_net_receiver(&self) -> bool {
        self.net_amount > Decimal::ZERO
    }

    /// Get absolute net position
    pub fn abs_net_amount(&self) -> Decimal {
        self.net_amount.abs()
    }
}

/// Directed payment produced by netting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementInstruction {
    /// Payer
    pub from_member_id: MemberId,

    /// Payee
    pub to_member_id: MemberId,

    /// Amount to transfer (strictly positive)
    pub amount: Decimal,

    /// Network fee on `amount`
    pub fee: Decimal,
}

/// Settlement cycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    /// Cycle row created, instructions being written
    Processing,
    /// All writes succeeded
    Completed,
    /// A write failed and the cycle was abandoned
    Failed,
}

/// One persisted execution of the netting pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementCycle {
    /// Cycle ID
    pub id: Uuid,

    /// When the cycle started
    pub cycle_time: DateTime<Utc>,

    /// Status
    pub status: CycleStatus,

    /// Transactions included
    pub total_transactions: usize,

    /// Gross volume of included transactions
    pub total_volume: Decimal,

    /// Instructions generated
    pub net_settlements_count: usize,

    /// Reduction in payment count achieved by netting, in percent
    pub savings_percentage: Decimal,

    /// When the cycle reached `completed`
    pub completed_at: Option<DateTime<Utc>>,
}

impl SettlementCycle {
    /// Open a cycle in `processing`
    pub fn processing(id: Uuid, cycle_time: DateTime<Utc>) -> Self {
        Self {
            id,
            cycle_time,
            status: CycleStatus::Processing,
            total_transactions: 0,
            total_volume: Decimal::ZERO,
            net_settlements_count: 0,
            savings_percentage: Decimal::ZERO,
            completed_at: None,
        }
    }
}
