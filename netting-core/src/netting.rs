//! Multilateral net position calculation
//!
//! # Algorithm
//!
//! 1. Open a zero position for every member seen as payer or payee
//! 2. For each transaction, debit the payer and credit the payee
//! 3. Record the transaction against both members
//!
//! One linear pass; summation is commutative so the result does not depend
//! on batch order.
//!
//! # Example
//!
//! ```text
//! Gross obligations:
//!   A owes B: $100
//!   B owes C: $80
//!   C owes A: $50
//!
//! Net positions:
//!   A: -$50 (net payer)
//!   B: +$20 (net receiver)
//!   C: +$30 (net receiver)
//! ```

use crate::types::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Net positions keyed by member, in member order
pub type NetPositions = BTreeMap<MemberId, NetPosition>;

/// Reduce a batch of transactions to one net position per member.
///
/// Total over any input: the batch is assumed to have passed
/// [`Transaction::validate`]. Positions always sum to zero.
pub fn calculate_net_positions(transactions: &[Transaction]) -> NetPositions {
    let mut positions = NetPositions::new();

    for tx in transactions {
        let payer = positions
            .entry(tx.from_member_id.clone())
            .or_insert_with(|| NetPosition::new(tx.from_member_id.clone()));
        payer.net_amount -= tx.amount_usd;
        payer.transaction_ids.push(tx.id);

        let payee = positions
            .entry(tx.to_member_id.clone())
            .or_insert_with(|| NetPosition::new(tx.to_member_id.clone()));
        payee.net_amount += tx.amount_usd;
        payee.transaction_ids.push(tx.id);
    }

    // Contributing ids in a canonical order so reordered batches compare equal
    for position in positions.values_mut() {
        position.transaction_ids.sort_unstable();
    }

    tracing::debug!(
        members = positions.len(),
        transactions = transactions.len(),
        "Net positions calculated"
    );

    positions
}

/// Sum of every net amount; zero for any batch
pub fn total_net(positions: &NetPositions) -> Decimal {
    positions.values().map(|p| p.net_amount).sum()
}

/// Netting statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NettingStats {
    /// Distinct members in the batch
    pub member_count: usize,

    /// Number of gross transactions
    pub gross_transaction_count: usize,

    /// Number of net instructions
    pub instruction_count: usize,

    /// Total gross volume
    pub gross_volume: Decimal,

    /// Total volume moved by instructions
    pub net_volume: Decimal,

    /// Volume that no longer moves
    pub amount_saved: Decimal,

    /// Volume efficiency (0.0 - 1.0)
    pub volume_efficiency: Decimal,

    /// Payments eliminated by netting
    pub transfers_eliminated: usize,
}

impl NettingStats {
    /// Compare a batch with the instructions generated from it
    pub fn compute(
        transactions: &[Transaction],
        positions: &NetPositions,
        instructions: &[SettlementInstruction],
    ) -> Self {
        let gross_volume: Decimal = transactions.iter().map(|t| t.amount_usd).sum();
        let net_volume: Decimal = instructions.iter().map(|i| i.amount).sum();
        let amount_saved = gross_volume - net_volume;

        let volume_efficiency = if gross_volume > Decimal::ZERO {
            (amount_saved / gross_volume).round_dp(4)
        } else {
            Decimal::ZERO
        };

        Self {
            member_count: positions.len(),
            gross_transaction_count: transactions.len(),
            instruction_count: instructions.len(),
            gross_volume,
            net_volume,
            amount_saved,
            volume_efficiency,
            transfers_eliminated: transactions.len().saturating_sub(instructions.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tx(from: &str, to: &str, amount: Decimal) -> Transaction {
        Transaction::new(MemberId::new(from), MemberId::new(to), amount)
    }

    fn net(positions: &NetPositions, member: &str) -> Decimal {
        positions[&MemberId::new(member)].net_amount
    }

    #[test]
    fn test_empty_batch() {
        let positions = calculate_net_positions(&[]);
        assert!(positions.is_empty());
        assert_eq!(total_net(&positions), Decimal::ZERO);
    }

    #[test]
    fn test_triangle() {
        let positions = calculate_net_positions(&[
            tx("A", "B", dec!(100)),
            tx("B", "C", dec!(80)),
            tx("C", "A", dec!(50)),
        ]);

        assert_eq!(net(&positions, "A"), dec!(-50));
        assert_eq!(net(&positions, "B"), dec!(20));
        assert_eq!(net(&positions, "C"), dec!(30));
        assert_eq!(total_net(&positions), Decimal::ZERO);
    }

    #[test]
    fn test_circular_flow_nets_to_zero() {
        let positions = calculate_net_positions(&[
            tx("A", "B", dec!(100)),
            tx("B", "C", dec!(100)),
            tx("C", "A", dec!(100)),
        ]);

        assert_eq!(positions.len(), 3);
        assert!(positions.values().all(|p| p.net_amount.is_zero()));
    }

    #[test]
    fn test_bilateral_offset() {
        let batch = [tx("A", "B", dec!(100)), tx("B", "A", dec!(60))];
        let positions = calculate_net_positions(&batch);

        assert_eq!(net(&positions, "A"), dec!(-40));
        assert_eq!(net(&positions, "B"), dec!(40));

        let a = &positions[&MemberId::new("A")];
        assert_eq!(a.transaction_ids.len(), 2);
        assert!(a.transaction_ids.contains(&batch[0].id));
        assert!(a.transaction_ids.contains(&batch[1].id));
    }

    #[test]
    fn test_order_independent() {
        let batch = vec![
            tx("A", "B", dec!(10.25)),
            tx("C", "A", dec!(3.10)),
            tx("B", "C", dec!(7.00)),
            tx("D", "B", dec!(0.01)),
        ];
        let mut reversed = batch.clone();
        reversed.reverse();

        assert_eq!(calculate_net_positions(&batch), calculate_net_positions(&reversed));
    }

    #[test]
    fn test_stats() {
        let batch = [
            tx("A", "B", dec!(100)),
            tx("B", "C", dec!(80)),
            tx("C", "A", dec!(50)),
        ];
        let positions = calculate_net_positions(&batch);
        let instructions = vec![
            SettlementInstruction {
                from_member_id: MemberId::new("A"),
                to_member_id: MemberId::new("C"),
                amount: dec!(30),
                fee: dec!(0.24),
            },
            SettlementInstruction {
                from_member_id: MemberId::new("A"),
                to_member_id: MemberId::new("B"),
                amount: dec!(20),
                fee: dec!(0.16),
            },
        ];

        let stats = NettingStats::compute(&batch, &positions, &instructions);
        assert_eq!(stats.member_count, 3);
        assert_eq!(stats.gross_volume, dec!(230));
        assert_eq!(stats.net_volume, dec!(50));
        assert_eq!(stats.amount_saved, dec!(180));
        assert_eq!(stats.volume_efficiency, dec!(0.7826));
        assert_eq!(stats.transfers_eliminated, 1);
    }
}
