//! Threshold evaluation
//!
//! | Check                 | Trips when                    | Severity |
//! |-----------------------|-------------------------------|----------|
//! | max_settlement_amount | largest settlement > limit    | critical |
//! | max_members           | members > limit               | critical |
//! | min_otc_spread        | spread < limit (if quoted)    | warning  |
//! | max_otc_spread        | spread > limit (if quoted)    | critical |
//! | processing_timeout    | elapsed > limit (if measured) | critical |
//! | max_daily_volume      | daily volume > limit (if any) | critical |
//! | max_member_exposure   | exposure > limit (if any)     | warning  |
//!
//! A value equal to its limit passes.

use crate::{config::CircuitBreakerConfig, types::*};
use netting_core::currency::{format_percent, format_usd, group_thousands};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::warn;

/// Circuit breaker bound to one configuration
#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create new circuit breaker
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run every check against the metrics
    pub fn evaluate(&self, metrics: &SettlementMetrics) -> CircuitBreakerResult {
        check_circuit_breakers(metrics, &self.config)
    }
}

/// Run every check against the metrics using `config`.
///
/// Pure: no state, no side effects beyond `warn!` for each breach.
pub fn check_circuit_breakers(
    metrics: &SettlementMetrics,
    config: &CircuitBreakerConfig,
) -> CircuitBreakerResult {
    let mut breaches = Vec::new();

    if metrics.max_single_settlement > config.max_settlement_amount {
        breaches.push(breach(
            BreakerCheck::MaxSettlementAmount,
            format!(
                "Largest settlement {} exceeds maximum of {}",
                format_usd(metrics.max_single_settlement),
                format_usd(config.max_settlement_amount)
            ),
            metrics.max_single_settlement,
            config.max_settlement_amount,
        ));
    }

    if metrics.member_count > config.max_members {
        breaches.push(breach(
            BreakerCheck::MaxMembers,
            format!(
                "Member count {} exceeds maximum of {}",
                group_thousands(metrics.member_count as u64),
                group_thousands(config.max_members as u64)
            ),
            Decimal::from(metrics.member_count),
            Decimal::from(config.max_members),
        ));
    }

    if let Some(spread) = metrics.otc_spread {
        if spread < config.min_otc_spread {
            breaches.push(breach(
                BreakerCheck::MinOtcSpread,
                format!(
                    "OTC spread {} is below minimum of {}",
                    format_percent(spread),
                    format_percent(config.min_otc_spread)
                ),
                spread,
                config.min_otc_spread,
            ));
        }

        if spread > config.max_otc_spread {
            breaches.push(breach(
                BreakerCheck::MaxOtcSpread,
                format!(
                    "OTC spread {} exceeds maximum of {}",
                    format_percent(spread),
                    format_percent(config.max_otc_spread)
                ),
                spread,
                config.max_otc_spread,
            ));
        }
    }

    if let Some(elapsed) = metrics.processing_time_seconds {
        let limit = Decimal::from(config.processing_timeout_seconds);
        if elapsed > limit {
            breaches.push(breach(
                BreakerCheck::ProcessingTimeout,
                format!(
                    "Processing time {} exceeds timeout of {}",
                    format_seconds(elapsed),
                    format_seconds(limit)
                ),
                elapsed,
                limit,
            ));
        }
    }

    if let Some(daily) = metrics.daily_volume {
        if daily > config.max_daily_volume {
            breaches.push(breach(
                BreakerCheck::MaxDailyVolume,
                format!(
                    "Daily volume {} exceeds maximum of {}",
                    format_usd(daily),
                    format_usd(config.max_daily_volume)
                ),
                daily,
                config.max_daily_volume,
            ));
        }
    }

    if let Some(exposure) = metrics.max_member_exposure {
        if exposure > config.max_member_exposure {
            breaches.push(breach(
                BreakerCheck::MaxMemberExposure,
                format!(
                    "Largest member exposure {} exceeds threshold of {}",
                    format_usd(exposure),
                    format_usd(config.max_member_exposure)
                ),
                exposure,
                config.max_member_exposure,
            ));
        }
    }

    for b in &breaches {
        warn!(check = %b.check, severity = ?b.severity, "{}", b.message);
    }

    CircuitBreakerResult::from_breaches(breaches)
}

fn breach(check: BreakerCheck, message: String, value: Decimal, limit: Decimal) -> Breach {
    Breach {
        check,
        message,
        severity: check.severity(),
        value,
        limit,
    }
}

/// `3,601s`, or `12.50s` for fractional values
fn format_seconds(seconds: Decimal) -> String {
    if seconds.fract().is_zero() {
        if let Some(whole) = seconds.to_u64() {
            return format!("{}s", group_thousands(whole));
        }
    }
    format!("{:.2}s", seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn clean_metrics() -> SettlementMetrics {
        SettlementMetrics {
            total_volume: dec!(1000),
            member_count: 3,
            max_single_settlement: dec!(500),
            ..Default::default()
        }
    }

    #[test]
    fn test_clean_batch_passes() {
        let result = CircuitBreaker::default().evaluate(&clean_metrics());
        assert!(result.passed);
        assert!(result.violations.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_settlement_amount_violation() {
        let metrics = SettlementMetrics {
            max_single_settlement: dec!(10000001),
            ..clean_metrics()
        };
        let result = CircuitBreaker::default().evaluate(&metrics);

        assert!(!result.passed);
        assert_eq!(result.violations.len(), 1);
        let v = &result.violations[0];
        assert_eq!(v.check, BreakerCheck::MaxSettlementAmount);
        assert_eq!(v.limit, dec!(10000000));
        assert_eq!(v.severity, Severity::Critical);
        assert_eq!(
            v.message,
            "Largest settlement $10,000,001.00 exceeds maximum of $10,000,000.00"
        );
    }

    #[test]
    fn test_sub_cent_overage_is_visible_in_message() {
        let metrics = SettlementMetrics {
            max_single_settlement: dec!(10000000.001),
            ..clean_metrics()
        };
        let result = CircuitBreaker::default().evaluate(&metrics);

        assert!(!result.passed);
        assert_eq!(
            result.violations[0].message,
            "Largest settlement $10,000,000.001 exceeds maximum of $10,000,000.00"
        );
    }

    #[test]
    fn test_low_spread_only_warns() {
        let metrics = SettlementMetrics {
            otc_spread: Some(dec!(0.002)),
            ..clean_metrics()
        };
        let result = CircuitBreaker::default().evaluate(&metrics);

        assert!(result.passed);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].check, BreakerCheck::MinOtcSpread);
        assert_eq!(
            result.warnings[0].message,
            "OTC spread 0.20% is below minimum of 0.30%"
        );
    }

    #[test]
    fn test_all_breaches_reported_together() {
        let metrics = SettlementMetrics {
            total_volume: dec!(200000000),
            member_count: 25,
            max_single_settlement: dec!(20000000),
            otc_spread: Some(dec!(0.02)),
            processing_time_seconds: Some(dec!(4000)),
            daily_volume: Some(dec!(200000000)),
            max_member_exposure: Some(dec!(6000000)),
        };
        let result = CircuitBreaker::default().evaluate(&metrics);

        assert!(!result.passed);
        let checks: Vec<_> = result.violations.iter().map(|b| b.check).collect();
        assert_eq!(
            checks,
            vec![
                BreakerCheck::MaxSettlementAmount,
                BreakerCheck::MaxMembers,
                BreakerCheck::MaxOtcSpread,
                BreakerCheck::ProcessingTimeout,
                BreakerCheck::MaxDailyVolume,
            ]
        );
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].check, BreakerCheck::MaxMemberExposure);
    }

    #[test]
    fn test_messages_are_human_readable() {
        let metrics = SettlementMetrics {
            member_count: 21,
            processing_time_seconds: Some(dec!(3601)),
            ..clean_metrics()
        };
        let result = CircuitBreaker::default().evaluate(&metrics);

        assert_eq!(
            result.violation(BreakerCheck::MaxMembers).unwrap().message,
            "Member count 21 exceeds maximum of 20"
        );
        assert_eq!(
            result.violation(BreakerCheck::ProcessingTimeout).unwrap().message,
            "Processing time 3,601s exceeds timeout of 3,600s"
        );
    }

    #[test]
    fn test_breach_serializes_with_type_key() {
        let metrics = SettlementMetrics {
            max_member_exposure: Some(dec!(5000000.01)),
            ..clean_metrics()
        };
        let result = CircuitBreaker::default().evaluate(&metrics);
        let json = serde_json::to_value(&result.warnings[0]).unwrap();

        assert_eq!(json["type"], "max_member_exposure");
        assert_eq!(json["severity"], "warning");
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(dec!(3600)), "3,600s");
        assert_eq!(format_seconds(dec!(12.5)), "12.50s");
    }
}
