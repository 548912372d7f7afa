//! Persistence collaborator
//!
//! The engine never talks to a database directly; it drives a
//! [`SettlementStore`]. [`InMemoryStore`] is the reference implementation used
//! by the CLI and the tests, with fault injection for failure paths.

use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use netting_core::{CycleStatus, SettlementCycle, SettlementInstruction, Transaction, TransactionStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Persisted settlement instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionRecord {
    /// Instruction ID
    pub id: Uuid,

    /// Owning cycle
    pub cycle_id: Uuid,

    /// Payment details
    #[serde(flatten)]
    pub instruction: SettlementInstruction,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// Store used by the settlement engine
#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// Unsettled, unclaimed transactions of a network (read-only)
    async fn fetch_unsettled(&self, network: &str) -> Result<Vec<Transaction>>;

    /// Atomically tag every unsettled, unclaimed transaction with `claim_id`
    /// and return them. Claimed rows are invisible to later fetches and claims.
    async fn claim_unsettled(&self, network: &str, claim_id: Uuid) -> Result<Vec<Transaction>>;

    /// Drop a claim so its transactions become eligible again
    async fn release_claim(&self, claim_id: Uuid) -> Result<usize>;

    /// Insert a cycle row (status `processing`)
    async fn create_cycle(&self, network: &str, cycle: &SettlementCycle) -> Result<()>;

    /// Insert instructions tagged with the cycle
    async fn insert_instructions(
        &self,
        cycle_id: Uuid,
        instructions: &[SettlementInstruction],
    ) -> Result<()>;

    /// Stamp transactions with the cycle id and mark them settled
    async fn mark_settled(&self, cycle_id: Uuid, transaction_ids: &[Uuid]) -> Result<usize>;

    /// Write final statistics and `completed` status
    async fn complete_cycle(&self, cycle: &SettlementCycle) -> Result<()>;

    /// Mark a cycle `failed`
    async fn fail_cycle(&self, cycle_id: Uuid) -> Result<()>;

    /// Gross volume of cycles completed at or after `since`
    async fn completed_volume_since(&self, network: &str, since: DateTime<Utc>) -> Result<Decimal>;
}

/// Store operation, for fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `fetch_unsettled`
    FetchUnsettled,
    /// `claim_unsettled`
    ClaimUnsettled,
    /// `release_claim`
    ReleaseClaim,
    /// `create_cycle`
    CreateCycle,
    /// `insert_instructions`
    InsertInstructions,
    /// `mark_settled`
    MarkSettled,
    /// `complete_cycle`
    CompleteCycle,
    /// `fail_cycle`
    FailCycle,
    /// `completed_volume_since`
    CompletedVolume,
}

#[derive(Debug, Clone)]
struct StoredTransaction {
    network: String,
    transaction: Transaction,
    claimed_by: Option<Uuid>,
}

impl StoredTransaction {
    fn is_eligible(&self, network: &str) -> bool {
        self.network == network && self.claimed_by.is_none() && self.transaction.is_unsettled()
    }
}

#[derive(Debug, Default)]
struct StoreState {
    transactions: Vec<StoredTransaction>,
    cycles: HashMap<Uuid, (String, SettlementCycle)>,
    instructions: Vec<InstructionRecord>,
    faults: HashSet<StoreOp>,
}

impl StoreState {
    fn check(&self, op: StoreOp) -> Result<()> {
        if self.faults.contains(&op) {
            return Err(Error::database(format!("injected failure in {:?}", op)));
        }
        Ok(())
    }
}

/// In-memory settlement store
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transaction to a network
    pub async fn insert_transaction(&self, network: &str, transaction: Transaction) {
        let mut state = self.state.write().await;
        state.transactions.push(StoredTransaction {
            network: network.to_string(),
            transaction,
            claimed_by: None,
        });
    }

    /// Every transaction of a network, in insertion order
    pub async fn transactions(&self, network: &str) -> Vec<Transaction> {
        let state = self.state.read().await;
        state
            .transactions
            .iter()
            .filter(|t| t.network == network)
            .map(|t| t.transaction.clone())
            .collect()
    }

    /// Transactions currently held by a claim
    pub async fn claimed_count(&self) -> usize {
        let state = self.state.read().await;
        state.transactions.iter().filter(|t| t.claimed_by.is_some()).count()
    }

    /// Look up a cycle
    pub async fn cycle(&self, cycle_id: Uuid) -> Option<SettlementCycle> {
        let state = self.state.read().await;
        state.cycles.get(&cycle_id).map(|(_, c)| c.clone())
    }

    /// Every cycle
    pub async fn cycles(&self) -> Vec<SettlementCycle> {
        let state = self.state.read().await;
        let mut cycles: Vec<_> = state.cycles.values().map(|(_, c)| c.clone()).collect();
        cycles.sort_by_key(|c| c.cycle_time);
        cycles
    }

    /// Instructions of a cycle, in insertion order
    pub async fn instructions(&self, cycle_id: Uuid) -> Vec<InstructionRecord> {
        let state = self.state.read().await;
        state
            .instructions
            .iter()
            .filter(|i| i.cycle_id == cycle_id)
            .cloned()
            .collect()
    }

    /// Make `op` fail until [`clear_faults`](Self::clear_faults)
    pub async fn fail_on(&self, op: StoreOp) {
        self.state.write().await.faults.insert(op);
    }

    /// Remove every injected fault
    pub async fn clear_faults(&self) {
        self.state.write().await.faults.clear();
    }
}

#[async_trait]
impl SettlementStore for InMemoryStore {
    async fn fetch_unsettled(&self, network: &str) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        state.check(StoreOp::FetchUnsettled)?;

        Ok(state
            .transactions
            .iter()
            .filter(|t| t.is_eligible(network))
            .map(|t| t.transaction.clone())
            .collect())
    }

    async fn claim_unsettled(&self, network: &str, claim_id: Uuid) -> Result<Vec<Transaction>> {
        let mut state = self.state.write().await;
        state.check(StoreOp::ClaimUnsettled)?;

        let mut claimed = Vec::new();
        for stored in state.transactions.iter_mut().filter(|t| t.is_eligible(network)) {
            stored.claimed_by = Some(claim_id);
            claimed.push(stored.transaction.clone());
        }

        Ok(claimed)
    }

    async fn release_claim(&self, claim_id: Uuid) -> Result<usize> {
        let mut state = self.state.write().await;
        state.check(StoreOp::ReleaseClaim)?;

        let mut released = 0;
        for stored in state
            .transactions
            .iter_mut()
            .filter(|t| t.claimed_by == Some(claim_id))
        {
            stored.claimed_by = None;
            released += 1;
        }

        Ok(released)
    }

    async fn create_cycle(&self, network: &str, cycle: &SettlementCycle) -> Result<()> {
        let mut state = self.state.write().await;
        state.check(StoreOp::CreateCycle)?;

        if state.cycles.contains_key(&cycle.id) {
            return Err(Error::database(format!("cycle {} already exists", cycle.id)));
        }

        state
            .cycles
            .insert(cycle.id, (network.to_string(), cycle.clone()));
        Ok(())
    }

    async fn insert_instructions(
        &self,
        cycle_id: Uuid,
        instructions: &[SettlementInstruction],
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.check(StoreOp::InsertInstructions)?;

        if !state.cycles.contains_key(&cycle_id) {
            return Err(Error::database(format!("cycle {} not found", cycle_id)));
        }

        let now = Utc::now();
        state
            .instructions
            .extend(instructions.iter().map(|instruction| InstructionRecord {
                id: Uuid::new_v4(),
                cycle_id,
                instruction: instruction.clone(),
                created_at: now,
            }));
        Ok(())
    }

    async fn mark_settled(&self, cycle_id: Uuid, transaction_ids: &[Uuid]) -> Result<usize> {
        let mut state = self.state.write().await;
        state.check(StoreOp::MarkSettled)?;

        let wanted: HashSet<Uuid> = transaction_ids.iter().copied().collect();

        // Validate the whole set before touching any row
        for stored in state
            .transactions
            .iter()
            .filter(|t| wanted.contains(&t.transaction.id))
        {
            if let Some(existing) = stored.transaction.settlement_cycle_id {
                return Err(Error::database(format!(
                    "transaction {} already settled in cycle {}",
                    stored.transaction.id, existing
                )));
            }
            if stored.claimed_by.is_some_and(|claim| claim != cycle_id) {
                return Err(Error::database(format!(
                    "transaction {} is claimed by another run",
                    stored.transaction.id
                )));
            }
        }

        let mut updated = 0;
        for stored in state
            .transactions
            .iter_mut()
            .filter(|t| wanted.contains(&t.transaction.id))
        {
            stored.transaction.settlement_cycle_id = Some(cycle_id);
            stored.transaction.status = TransactionStatus::Settled;
            stored.claimed_by = None;
            updated += 1;
        }

        if updated != wanted.len() {
            return Err(Error::database(format!(
                "marked {} of {} transactions settled",
                updated,
                wanted.len()
            )));
        }

        Ok(updated)
    }

    async fn complete_cycle(&self, cycle: &SettlementCycle) -> Result<()> {
        let mut state = self.state.write().await;
        state.check(StoreOp::CompleteCycle)?;

        let (_, stored) = state
            .cycles
            .get_mut(&cycle.id)
            .ok_or_else(|| Error::database(format!("cycle {} not found", cycle.id)))?;
        *stored = cycle.clone();
        Ok(())
    }

    async fn fail_cycle(&self, cycle_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        state.check(StoreOp::FailCycle)?;

        let (_, stored) = state
            .cycles
            .get_mut(&cycle_id)
            .ok_or_else(|| Error::database(format!("cycle {} not found", cycle_id)))?;
        stored.status = CycleStatus::Failed;
        Ok(())
    }

    async fn completed_volume_since(&self, network: &str, since: DateTime<Utc>) -> Result<Decimal> {
        let state = self.state.read().await;
        state.check(StoreOp::CompletedVolume)?;

        Ok(state
            .cycles
            .values()
            .filter(|(n, c)| {
                n == network
                    && c.status == CycleStatus::Completed
                    && c.completed_at.is_some_and(|at| at >= since)
            })
            .map(|(_, c)| c.total_volume)
            .sum())
    }
}
