//! Main settlement engine
//!
//! Drives one settlement run through collection, netting, circuit breaker
//! validation and either a preview or persistence.
//!
//! Real runs on the same network are serialized twice over: an in-process
//! async mutex per network, and a store-level claim that stamps candidate
//! transactions with the prospective cycle id before any computation, so a
//! concurrent run (in this process or another one sharing the store) sees
//! nothing to settle. Simulations take neither and never write.

use crate::{
    audit::{AuditAction, AuditEntry, AuditRecorder, AuditSink, TracingAuditSink},
    config::Config,
    cycle::{CycleState, CycleTracker},
    notify::{Notifier, SettlementEvent, TracingNotifier},
    response::*,
    store::{InMemoryStore, SettlementStore},
    Error, Result,
};
use chrono::{Duration, Utc};
use circuit_breaker::{check_circuit_breakers, CircuitBreakerConfig, SettlementMetrics};
use dashmap::DashMap;
use netting_core::{
    calculate_net_positions, CycleStatus, NetPositions, NettingStats, SettlementCycle,
    SettlementGenerator, SettlementInstruction, Transaction,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Positions and instructions computed from one batch
#[derive(Debug, Clone)]
pub struct NettedBatch {
    /// Net position per member
    pub positions: NetPositions,

    /// Instructions settling every position
    pub instructions: Vec<SettlementInstruction>,

    /// Gross vs net comparison
    pub stats: NettingStats,
}

impl NettedBatch {
    /// Largest single instruction, zero when there are none
    pub fn max_single_settlement(&self) -> Decimal {
        self.instructions
            .iter()
            .map(|i| i.amount)
            .max()
            .unwrap_or(Decimal::ZERO)
    }

    /// Largest absolute net position
    pub fn max_member_exposure(&self) -> Decimal {
        self.positions
            .values()
            .map(|p| p.abs_net_amount())
            .max()
            .unwrap_or(Decimal::ZERO)
    }
}

/// Settlement engine
pub struct SettlementEngine {
    /// Configuration
    config: Config,

    /// Persistence collaborator
    store: Arc<dyn SettlementStore>,

    /// Audit collaborator with failure policy
    audit: AuditRecorder,

    /// Notification collaborator
    notifier: Arc<dyn Notifier>,

    /// Instruction generator
    generator: SettlementGenerator,

    /// One mutex per network for real runs
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for SettlementEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementEngine")
            .field("config", &self.config)
            .field("audit", &self.audit)
            .field("generator", &self.generator)
            .finish_non_exhaustive()
    }
}

impl SettlementEngine {
    /// Create new settlement engine
    pub fn new(
        config: Config,
        store: Arc<dyn SettlementStore>,
        audit_sink: Arc<dyn AuditSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        config.validate()?;

        let audit = AuditRecorder::new(audit_sink, config.audit.max_consecutive_failures);
        let generator = SettlementGenerator::new(config.fees.rate);

        Ok(Self {
            config,
            store,
            audit,
            notifier,
            generator,
            locks: DashMap::new(),
        })
    }

    /// Engine over an in-memory store with tracing collaborators
    pub fn in_memory(config: Config) -> Result<(Self, InMemoryStore)> {
        let store = InMemoryStore::new();
        let engine = Self::new(
            config,
            Arc::new(store.clone()),
            Arc::new(TracingAuditSink),
            Arc::new(TracingNotifier),
        )?;
        Ok((engine, store))
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run settlement with the configured circuit breakers
    pub async fn process_settlement(
        &self,
        actor: Option<&Actor>,
        request: &ProcessSettlementRequest,
    ) -> Result<SettlementResponse> {
        let breakers = self.config.circuit_breakers.clone();
        self.process_settlement_with(actor, request, &breakers).await
    }

    /// Run settlement with caller-supplied circuit breaker thresholds
    pub async fn process_settlement_with(
        &self,
        actor: Option<&Actor>,
        request: &ProcessSettlementRequest,
        breakers: &CircuitBreakerConfig,
    ) -> Result<SettlementResponse> {
        authorize(actor)?;
        request.validate()?;
        breakers
            .validate()
            .map_err(|e| Error::Validation(e.to_string()))?;

        let network = request
            .network
            .clone()
            .unwrap_or_else(|| self.config.default_network.clone());

        if request.simulation {
            self.simulate(&network, request, breakers).await
        } else {
            let lock = self.network_lock(&network);
            let result = {
                let _guard = lock.lock().await;
                self.execute(&network, request, breakers).await
            };
            drop(lock);
            self.release_network_lock(&network);
            result
        }
    }

    /// Reduce a batch to positions, instructions and statistics
    pub fn net(&self, transactions: &[Transaction]) -> Result<NettedBatch> {
        let positions = calculate_net_positions(transactions);
        let instructions = self.generator.generate(&positions)?;
        let stats = NettingStats::compute(transactions, &positions, &instructions);

        info!(
            "Netting complete: {} gross -> {} net ({:.1}% volume efficiency, {} -> {} payments)",
            stats.gross_volume,
            stats.net_volume,
            stats.volume_efficiency * Decimal::ONE_HUNDRED,
            stats.gross_transaction_count,
            stats.instruction_count
        );

        Ok(NettedBatch {
            positions,
            instructions,
            stats,
        })
    }

    async fn simulate(
        &self,
        network: &str,
        request: &ProcessSettlementRequest,
        breakers: &CircuitBreakerConfig,
    ) -> Result<SettlementResponse> {
        let started = Instant::now();
        let mut tracker = CycleTracker::new(Uuid::now_v7());

        tracker.advance(CycleState::Collecting)?;
        let transactions = match self.store.fetch_unsettled(network).await {
            Ok(transactions) => transactions,
            Err(e) => {
                tracker.advance(CycleState::Failed)?;
                error!(network, "Simulation could not read transactions: {}", e);
                return Err(e);
            }
        };

        if transactions.is_empty() {
            tracker.advance(CycleState::Completed)?;
            return Ok(SettlementResponse::NoTransactions(NoTransactions::new()));
        }

        if let Err(e) = validate_batch(&transactions) {
            tracker.advance(CycleState::Failed)?;
            return Err(e);
        }

        tracker.advance(CycleState::Netting)?;
        let batch = self.net(&transactions)?;
        let daily_volume = self.daily_volume(network, batch.stats.gross_volume).await?;
        let metrics = batch_metrics(&batch, request.otc_spread, started, daily_volume);

        tracker.advance(CycleState::Validating)?;
        let result = check_circuit_breakers(&metrics, breakers);
        if !result.passed {
            tracker.advance(CycleState::Halted)?;
            warn!(
                network,
                violations = result.violations.len(),
                "Simulation halted by circuit breakers"
            );
            return Err(Error::CircuitBreaker {
                violations: result.violations,
                warnings: result.warnings,
            });
        }

        tracker.advance(CycleState::Previewing)?;
        let preview = SimulationPreview {
            simulation: true,
            success: true,
            preview: PreviewStats {
                transactions_to_process: transactions.len(),
                settlements_generated: batch.instructions.len(),
                total_volume: batch.stats.gross_volume,
                estimated_savings_percentage: savings_percentage(
                    transactions.len(),
                    batch.instructions.len(),
                ),
                unique_members: batch.positions.len(),
                max_single_settlement: batch.max_single_settlement(),
            },
            circuit_breakers: BreakerSummary {
                passed: result.passed,
                warnings: result.warnings,
            },
            settlements: batch.instructions,
        };

        tracker.advance(CycleState::Completed)?;
        info!(
            network,
            transactions = preview.preview.transactions_to_process,
            settlements = preview.preview.settlements_generated,
            "Settlement simulation complete"
        );

        Ok(SettlementResponse::Preview(preview))
    }

    async fn execute(
        &self,
        network: &str,
        request: &ProcessSettlementRequest,
        breakers: &CircuitBreakerConfig,
    ) -> Result<SettlementResponse> {
        let started = Instant::now();
        let cycle_id = Uuid::now_v7();
        let mut tracker = CycleTracker::new(cycle_id);

        info!(network, %cycle_id, "Starting settlement cycle");

        tracker.advance(CycleState::Collecting)?;
        let transactions = match self.store.claim_unsettled(network, cycle_id).await {
            Ok(transactions) => transactions,
            Err(e) => {
                tracker.advance(CycleState::Failed)?;
                self.report_failure(network, None, &e).await;
                return Err(e);
            }
        };

        if transactions.is_empty() {
            tracker.advance(CycleState::Completed)?;
            info!(network, "No unsettled transactions");
            return Ok(SettlementResponse::NoTransactions(NoTransactions::new()));
        }

        info!(network, "Claimed {} unsettled transactions", transactions.len());

        if let Err(e) = validate_batch(&transactions) {
            tracker.advance(CycleState::Failed)?;
            self.release_claim(cycle_id).await;
            self.report_failure(network, None, &e).await;
            return Err(e);
        }

        tracker.advance(CycleState::Netting)?;
        let batch = match self.net(&transactions) {
            Ok(batch) => batch,
            Err(e) => {
                tracker.advance(CycleState::Failed)?;
                self.release_claim(cycle_id).await;
                self.report_failure(network, None, &e).await;
                return Err(e);
            }
        };

        let daily_volume = match self.daily_volume(network, batch.stats.gross_volume).await {
            Ok(volume) => volume,
            Err(e) => {
                tracker.advance(CycleState::Failed)?;
                self.release_claim(cycle_id).await;
                self.report_failure(network, None, &e).await;
                return Err(e);
            }
        };
        let metrics = batch_metrics(&batch, request.otc_spread, started, daily_volume);

        tracker.advance(CycleState::Validating)?;
        let result = check_circuit_breakers(&metrics, breakers);
        if !result.passed {
            tracker.advance(CycleState::Halted)?;
            self.release_claim(cycle_id).await;

            warn!(
                network,
                %cycle_id,
                violations = result.violations.len(),
                "Settlement halted by circuit breakers"
            );

            self.audit
                .record(AuditEntry::cycle(
                    AuditAction::SettlementHalted,
                    None,
                    json!({
                        "network": network,
                        "transactions": transactions.len(),
                        "violations": result.violations,
                        "warnings": result.warnings,
                    }),
                ))
                .await;

            self.send(SettlementEvent::CircuitBreakerTriggered {
                network: network.to_string(),
                violations: result.violations.clone(),
                warnings: result.warnings.clone(),
            })
            .await;

            return Err(Error::CircuitBreaker {
                violations: result.violations,
                warnings: result.warnings,
            });
        }

        tracker.advance(CycleState::Executing)?;
        let cycle = match self.persist(network, cycle_id, &transactions, &batch).await {
            Ok(cycle) => cycle,
            Err((created, e)) => {
                tracker.advance(CycleState::Failed)?;
                self.compensate(cycle_id, created).await;
                self.report_failure(network, created.then_some(cycle_id), &e).await;
                return Err(e);
            }
        };

        tracker.advance(CycleState::Completed)?;
        let processing_time_seconds = started.elapsed().as_secs_f64();

        info!(
            network,
            %cycle_id,
            transactions = cycle.total_transactions,
            settlements = cycle.net_settlements_count,
            savings = %cycle.savings_percentage,
            "Settlement cycle complete in {:.3}s",
            processing_time_seconds
        );

        self.audit
            .record(AuditEntry::cycle(
                AuditAction::SettlementCompleted,
                Some(cycle_id),
                json!({
                    "network": network,
                    "stats": batch.stats,
                    "savings_percentage": cycle.savings_percentage,
                    "processing_time_seconds": processing_time_seconds,
                    "warnings": result.warnings,
                }),
            ))
            .await;

        self.send(SettlementEvent::CycleCompleted {
            cycle_id,
            transactions_processed: cycle.total_transactions,
            settlements_generated: cycle.net_settlements_count,
            total_volume: cycle.total_volume,
            warnings: result.warnings.clone(),
        })
        .await;

        Ok(SettlementResponse::Completed(CycleSummary {
            success: true,
            cycle_id,
            transactions_processed: cycle.total_transactions,
            settlements_generated: cycle.net_settlements_count,
            total_volume: cycle.total_volume,
            savings_percentage: cycle.savings_percentage,
            processing_time_seconds,
            circuit_breaker_warnings: result.warnings,
        }))
    }

    /// Cycle row, instructions, transaction stamps, completion.
    ///
    /// On error, reports whether the cycle row had been created.
    async fn persist(
        &self,
        network: &str,
        cycle_id: Uuid,
        transactions: &[Transaction],
        batch: &NettedBatch,
    ) -> std::result::Result<SettlementCycle, (bool, Error)> {
        let mut cycle = SettlementCycle::processing(cycle_id, Utc::now());
        self.store
            .create_cycle(network, &cycle)
            .await
            .map_err(|e| (false, e))?;

        self.store
            .insert_instructions(cycle_id, &batch.instructions)
            .await
            .map_err(|e| (true, e.in_cycle(cycle_id)))?;

        let ids: Vec<Uuid> = transactions.iter().map(|t| t.id).collect();
        self.store
            .mark_settled(cycle_id, &ids)
            .await
            .map_err(|e| (true, e.in_cycle(cycle_id)))?;

        cycle.status = CycleStatus::Completed;
        cycle.total_transactions = transactions.len();
        cycle.total_volume = batch.stats.gross_volume;
        cycle.net_settlements_count = batch.instructions.len();
        cycle.savings_percentage = savings_percentage(transactions.len(), batch.instructions.len());
        cycle.completed_at = Some(Utc::now());

        self.store
            .complete_cycle(&cycle)
            .await
            .map_err(|e| (true, e.in_cycle(cycle_id)))?;

        Ok(cycle)
    }

    /// Best-effort cleanup after a persistence failure
    async fn compensate(&self, cycle_id: Uuid, created: bool) {
        if created {
            if let Err(e) = self.store.fail_cycle(cycle_id).await {
                error!(%cycle_id, "Cycle may be stuck in processing; fail_cycle failed: {}", e);
            }
        }
        self.release_claim(cycle_id).await;
    }

    async fn release_claim(&self, claim_id: Uuid) {
        match self.store.release_claim(claim_id).await {
            Ok(released) => info!(%claim_id, released, "Released transaction claim"),
            Err(e) => error!(%claim_id, "Failed to release transaction claim: {}", e),
        }
    }

    async fn report_failure(&self, network: &str, cycle_id: Option<Uuid>, err: &Error) {
        error!(network, cycle_id = ?cycle_id, code = err.code(), "Settlement cycle failed: {}", err);

        self.audit
            .record(AuditEntry::cycle(
                AuditAction::SettlementFailed,
                cycle_id,
                json!({
                    "network": network,
                    "error": err.code(),
                    "message": err.to_string(),
                }),
            ))
            .await;

        if matches!(err, Error::Database { .. }) {
            self.send(SettlementEvent::CycleFailed {
                cycle_id,
                network: network.to_string(),
                error: err.to_string(),
            })
            .await;
        }
    }

    async fn send(&self, event: SettlementEvent) {
        if let Err(e) = self.notifier.notify(&event).await {
            warn!(level = ?event.level(), "Notification failed: {}", e);
        }
    }

    async fn daily_volume(&self, network: &str, batch_volume: Decimal) -> Result<Decimal> {
        let hours = self.config.daily_volume_window_hours;
        let since = Duration::try_hours(hours)
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| {
                Error::Config(format!("daily volume window of {} hours is out of range", hours))
            })?;
        let settled = self.store.completed_volume_since(network, since).await?;
        Ok(settled + batch_volume)
    }

    fn network_lock(&self, network: &str) -> Arc<Mutex<()>> {
        self.locks.entry(network.to_string()).or_default().clone()
    }

    /// Forget the network's mutex once no run holds it.
    ///
    /// Clones are only handed out under the shard lock `remove_if` takes, so
    /// a strong count of one means no other run can be waiting on it.
    fn release_network_lock(&self, network: &str) {
        self.locks
            .remove_if(network, |_, lock| Arc::strong_count(lock) == 1);
    }
}

fn authorize(actor: Option<&Actor>) -> Result<()> {
    let actor = actor.ok_or_else(|| Error::Unauthenticated("no caller identity".to_string()))?;

    if !actor.can_settle() {
        return Err(Error::Forbidden(format!(
            "user {} with role {:?} may not run settlement",
            actor.user_id, actor.role
        )));
    }

    Ok(())
}

fn validate_batch(transactions: &[Transaction]) -> Result<()> {
    for tx in transactions {
        tx.validate().map_err(|e| Error::Validation(e.to_string()))?;
    }
    Ok(())
}

fn batch_metrics(
    batch: &NettedBatch,
    otc_spread: Option<Decimal>,
    started: Instant,
    daily_volume: Decimal,
) -> SettlementMetrics {
    let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

    SettlementMetrics {
        total_volume: batch.stats.gross_volume,
        member_count: batch.positions.len(),
        max_single_settlement: batch.max_single_settlement(),
        otc_spread,
        processing_time_seconds: Some(Decimal::new(elapsed_ms, 3)),
        daily_volume: Some(daily_volume),
        max_member_exposure: Some(batch.max_member_exposure()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netting_core::MemberId;
    use rust_decimal_macros::dec;

    fn admin() -> Actor {
        Actor::new("ops-1", Role::Admin)
    }

    fn tx(from: &str, to: &str, amount: Decimal) -> Transaction {
        Transaction::new(MemberId::new(from), MemberId::new(to), amount)
    }

    #[tokio::test]
    async fn test_engine_creation() {
        let (engine, _store) = SettlementEngine::in_memory(Config::default()).unwrap();
        assert_eq!(engine.config().default_network, "default");
    }

    #[tokio::test]
    async fn test_oversized_volume_window_rejected() {
        let config = Config {
            daily_volume_window_hours: 3_000_000_000,
            ..Default::default()
        };
        assert!(matches!(
            SettlementEngine::in_memory(config),
            Err(Error::Config(_))
        ));

        let config = Config {
            daily_volume_window_hours: crate::config::MAX_DAILY_VOLUME_WINDOW_HOURS,
            ..Default::default()
        };
        let (engine, store) = SettlementEngine::in_memory(config).unwrap();
        store.insert_transaction("default", tx("A", "B", dec!(10))).await;

        let response = engine
            .process_settlement(Some(&admin()), &ProcessSettlementRequest::simulation())
            .await
            .unwrap();
        assert!(matches!(response, SettlementResponse::Preview(_)));
    }

    #[tokio::test]
    async fn test_network_locks_do_not_accumulate() {
        let (engine, store) = SettlementEngine::in_memory(Config::default()).unwrap();
        store.insert_transaction("net-0", tx("A", "B", dec!(10))).await;

        for i in 0..50 {
            let request = ProcessSettlementRequest {
                network: Some(format!("net-{}", i)),
                ..Default::default()
            };
            engine.process_settlement(Some(&admin()), &request).await.unwrap();
        }

        assert!(engine.locks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_network_lock_released_after_concurrent_runs() {
        let (engine, store) = SettlementEngine::in_memory(Config::default()).unwrap();
        store.insert_transaction("default", tx("A", "B", dec!(10))).await;
        let engine = Arc::new(engine);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    engine
                        .process_settlement(Some(&admin()), &ProcessSettlementRequest::execute())
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(engine.locks.is_empty());
        assert_eq!(store.cycles().await.len(), 1);
    }

    #[tokio::test]
    async fn test_settlement_with_no_transactions() {
        let (engine, _store) = SettlementEngine::in_memory(Config::default()).unwrap();

        let response = engine
            .process_settlement(Some(&admin()), &ProcessSettlementRequest::execute())
            .await
            .unwrap();

        match response {
            SettlementResponse::NoTransactions(body) => assert_eq!(body.count, 0),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_authorization_checked_first() {
        let (engine, store) = SettlementEngine::in_memory(Config::default()).unwrap();
        store.insert_transaction("default", tx("A", "B", dec!(10))).await;

        let err = engine
            .process_settlement(None, &ProcessSettlementRequest::execute())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 401);

        let member = Actor::new("m-1", Role::Member);
        let err = engine
            .process_settlement(Some(&member), &ProcessSettlementRequest::execute())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);

        assert_eq!(store.fetch_unsettled("default").await.unwrap().len(), 1);
    }

    #[test]
    fn test_batch_metrics() {
        let (engine, _store) = SettlementEngine::in_memory(Config::default()).unwrap();
        let batch = engine
            .net(&[tx("A", "B", dec!(100)), tx("B", "A", dec!(60)), tx("C", "A", dec!(5))])
            .unwrap();

        let metrics = batch_metrics(&batch, Some(dec!(0.005)), Instant::now(), dec!(165));
        assert_eq!(metrics.member_count, 3);
        assert_eq!(metrics.total_volume, dec!(165));
        assert_eq!(metrics.max_single_settlement, dec!(35));
        assert_eq!(metrics.max_member_exposure, Some(dec!(40)));
        assert_eq!(metrics.otc_spread, Some(dec!(0.005)));
    }
}
