//! Circuit breaker thresholds

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Threshold configuration.
///
/// Immutable for the duration of one evaluation; override per call for
/// tests or per-network policy. Missing fields in a config file fall back
/// to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Largest single settlement instruction (USD)
    pub max_settlement_amount: Decimal,

    /// Distinct members in one cycle
    pub max_members: usize,

    /// OTC spread floor, as a fraction (warning)
    pub min_otc_spread: Decimal,

    /// OTC spread ceiling, as a fraction
    pub max_otc_spread: Decimal,

    /// Elapsed processing time (seconds)
    pub processing_timeout_seconds: u64,

    /// Rolling daily settled volume (USD)
    pub max_daily_volume: Decimal,

    /// Largest single-member net exposure (USD, warning)
    pub max_member_exposure: Decimal,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_settlement_amount: Decimal::from(10_000_000),  // $10M
            max_members: 20,
            min_otc_spread: Decimal::new(3, 3),                // 0.3%
            max_otc_spread: Decimal::new(1, 2),                // 1.0%
            processing_timeout_seconds: 3600,                  // 1 hour
            max_daily_volume: Decimal::from(100_000_000),      // $100M
            max_member_exposure: Decimal::from(5_000_000),     // $5M
        }
    }
}

impl CircuitBreakerConfig {
    /// Reject negative limits and an inverted spread band
    pub fn validate(&self) -> Result<()> {
        let amounts = [
            ("max_settlement_amount", self.max_settlement_amount),
            ("min_otc_spread", self.min_otc_spread),
            ("max_otc_spread", self.max_otc_spread),
            ("max_daily_volume", self.max_daily_volume),
            ("max_member_exposure", self.max_member_exposure),
        ];

        for (name, value) in amounts {
            if value < Decimal::ZERO {
                return Err(Error::InvalidConfig(format!(
                    "{} must not be negative (got {})",
                    name, value
                )));
            }
        }

        if self.min_otc_spread > self.max_otc_spread {
            return Err(Error::InvalidConfig(format!(
                "min_otc_spread {} is above max_otc_spread {}",
                self.min_otc_spread, self.max_otc_spread
            )));
        }

        Ok(())
    }
}
