//! Settlement instruction generation
//!
//! Turns net positions into directed payments by greedy bipartite matching:
//! the largest remaining payer pays the largest remaining receiver
//! `min(payer, receiver)`, and whichever side reaches zero is dropped.
//! At most `payers + receivers - 1` instructions come out.
//!
//! Greedy largest-with-largest pairing is not a proven global minimum for
//! every topology; finding the true minimum instruction count is a
//! combinatorial search this generator does not attempt.

use crate::{
    currency,
    netting::NetPositions,
    types::*,
    Error, Result,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Network fee charged on every instruction (0.8%)
pub const DEFAULT_FEE_RATE: Decimal = Decimal::from_parts(8, 0, 0, false, 3);

/// Settlement generator
#[derive(Debug, Clone)]
pub struct SettlementGenerator {
    /// Fee rate as a fraction of the instruction amount
    fee_rate: Decimal,
}

impl Default for SettlementGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_FEE_RATE)
    }
}

impl SettlementGenerator {
    /// Create new generator with a fee rate (`0.008` = 0.8%)
    pub fn new(fee_rate: Decimal) -> Self {
        Self { fee_rate }
    }

    /// Fee rate in use
    pub fn fee_rate(&self) -> Decimal {
        self.fee_rate
    }

    /// Fee on an instruction amount, rounded half-up to the cent
    pub fn fee_for(&self, amount: Decimal) -> Result<Decimal> {
        let cents = currency::dollars_to_cents(amount)?;
        let fee = currency::percentage_of(cents, self.fee_rate)?;
        Ok(currency::cents_to_dollars(fee))
    }

    /// Generate instructions that settle every non-zero position.
    ///
    /// Ties on amount are broken by member id, so identical positions always
    /// yield the identical instruction sequence.
    pub fn generate(&self, positions: &NetPositions) -> Result<Vec<SettlementInstruction>> {
        // BTreeMap iteration is member order; the stable sort keeps it for ties
        let mut payers: Vec<(&MemberId, Decimal)> = positions
            .values()
            .filter(|p| p.is_net_payer())
            .map(|p| (&p.member_id, p.abs_net_amount()))
            .collect();

        let mut receivers: Vec<(&MemberId, Decimal)> = positions
            .values()
            .filter(|p| p.is_net_receiver())
            .map(|p| (&p.member_id, p.abs_net_amount()))
            .collect();

        payers.sort_by(|a, b| b.1.cmp(&a.1));
        receivers.sort_by(|a, b| b.1.cmp(&a.1));

        let mut instructions = Vec::with_capacity(
            (payers.len() + receivers.len()).saturating_sub(1),
        );
        let (mut p, mut r) = (0, 0);

        while p < payers.len() && r < receivers.len() {
            let amount = payers[p].1.min(receivers[r].1);

            instructions.push(SettlementInstruction {
                from_member_id: payers[p].0.clone(),
                to_member_id: receivers[r].0.clone(),
                amount,
                fee: self.fee_for(amount)?,
            });

            payers[p].1 -= amount;
            receivers[r].1 -= amount;

            if payers[p].1.is_zero() {
                p += 1;
            }
            if receivers[r].1.is_zero() {
                r += 1;
            }
        }

        if p < payers.len() || r < receivers.len() {
            return Err(Error::Conservation(format!(
                "net positions sum to {} instead of zero",
                crate::netting::total_net(positions)
            )));
        }

        verify_conservation(positions, &instructions)?;

        tracing::debug!(
            payers = payers.len(),
            receivers = receivers.len(),
            instructions = instructions.len(),
            "Settlement instructions generated"
        );

        Ok(instructions)
    }
}

/// Check that instructions reproduce every net position exactly
pub fn verify_conservation(
    positions: &NetPositions,
    instructions: &[SettlementInstruction],
) -> Result<()> {
    let mut flows: BTreeMap<&MemberId, Decimal> = BTreeMap::new();

    for instruction in instructions {
        if instruction.amount <= Decimal::ZERO {
            return Err(Error::Conservation(format!(
                "instruction {} -> {} has non-positive amount {}",
                instruction.from_member_id, instruction.to_member_id, instruction.amount
            )));
        }
        if instruction.from_member_id == instruction.to_member_id {
            return Err(Error::Conservation(format!(
                "self-instruction for {}",
                instruction.from_member_id
            )));
        }

        *flows.entry(&instruction.from_member_id).or_default() -= instruction.amount;
        *flows.entry(&instruction.to_member_id).or_default() += instruction.amount;
    }

    for position in positions.values() {
        let flow = flows.remove(&position.member_id).unwrap_or_default();
        if flow != position.net_amount {
            return Err(Error::Conservation(format!(
                "member {} nets {} but instructions move {}",
                position.member_id, position.net_amount, flow
            )));
        }
    }

    if let Some((member, flow)) = flows.into_iter().find(|(_, flow)| !flow.is_zero()) {
        return Err(Error::Conservation(format!(
            "instructions move {} for unknown member {}",
            flow, member
        )));
    }

    Ok(())
}
