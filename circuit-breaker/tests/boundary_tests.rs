//! Boundary tests for every circuit breaker check
//!
//! Each row sets one metric to exactly its default limit (must pass) and to
//! the limit plus the smallest unit (must trip with the listed severity).

use circuit_breaker::{
    check_circuit_breakers, BreakerCheck, CircuitBreakerConfig, SettlementMetrics, Severity,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

struct Case {
    check: BreakerCheck,
    at_limit: SettlementMetrics,
    past_limit: SettlementMetrics,
    severity: Severity,
}

fn base() -> SettlementMetrics {
    SettlementMetrics {
        total_volume: dec!(1000),
        member_count: 2,
        max_single_settlement: dec!(100),
        ..Default::default()
    }
}

fn cases() -> Vec<Case> {
    vec![
        Case {
            check: BreakerCheck::MaxSettlementAmount,
            at_limit: SettlementMetrics { max_single_settlement: dec!(10000000), ..base() },
            past_limit: SettlementMetrics { max_single_settlement: dec!(10000000.01), ..base() },
            severity: Severity::Critical,
        },
        Case {
            check: BreakerCheck::MaxMembers,
            at_limit: SettlementMetrics { member_count: 20, ..base() },
            past_limit: SettlementMetrics { member_count: 21, ..base() },
            severity: Severity::Critical,
        },
        Case {
            check: BreakerCheck::MinOtcSpread,
            at_limit: SettlementMetrics { otc_spread: Some(dec!(0.003)), ..base() },
            past_limit: SettlementMetrics { otc_spread: Some(dec!(0.0029)), ..base() },
            severity: Severity::Warning,
        },
        Case {
            check: BreakerCheck::MaxOtcSpread,
            at_limit: SettlementMetrics { otc_spread: Some(dec!(0.01)), ..base() },
            past_limit: SettlementMetrics { otc_spread: Some(dec!(0.0101)), ..base() },
            severity: Severity::Critical,
        },
        Case {
            check: BreakerCheck::ProcessingTimeout,
            at_limit: SettlementMetrics { processing_time_seconds: Some(dec!(3600)), ..base() },
            past_limit: SettlementMetrics { processing_time_seconds: Some(dec!(3601)), ..base() },
            severity: Severity::Critical,
        },
        Case {
            check: BreakerCheck::MaxDailyVolume,
            at_limit: SettlementMetrics { daily_volume: Some(dec!(100000000)), ..base() },
            past_limit: SettlementMetrics { daily_volume: Some(dec!(100000000.01)), ..base() },
            severity: Severity::Critical,
        },
        Case {
            check: BreakerCheck::MaxMemberExposure,
            at_limit: SettlementMetrics { max_member_exposure: Some(dec!(5000000)), ..base() },
            past_limit: SettlementMetrics { max_member_exposure: Some(dec!(5000000.01)), ..base() },
            severity: Severity::Warning,
        },
    ]
}

#[test]
fn test_value_at_limit_passes() {
    let config = CircuitBreakerConfig::default();

    for case in cases() {
        let result = check_circuit_breakers(&case.at_limit, &config);
        assert!(result.passed, "{} tripped at its limit", case.check);
        assert!(result.violations.is_empty(), "{} violated at its limit", case.check);
        assert!(result.warnings.is_empty(), "{} warned at its limit", case.check);
    }
}

#[test]
fn test_value_past_limit_trips() {
    let config = CircuitBreakerConfig::default();

    for case in cases() {
        let result = check_circuit_breakers(&case.past_limit, &config);

        let breach = match case.severity {
            Severity::Critical => {
                assert!(!result.passed, "{} should block", case.check);
                assert_eq!(result.violations.len(), 1, "{}", case.check);
                assert!(result.warnings.is_empty(), "{}", case.check);
                &result.violations[0]
            }
            Severity::Warning => {
                assert!(result.passed, "{} should not block", case.check);
                assert!(result.violations.is_empty(), "{}", case.check);
                assert_eq!(result.warnings.len(), 1, "{}", case.check);
                &result.warnings[0]
            }
        };

        assert_eq!(breach.check, case.check);
        assert_eq!(breach.severity, case.severity);
        assert!(
            breach.message.chars().any(|c| c.is_ascii_digit()),
            "{} message lacks figures: {}",
            case.check,
            breach.message
        );
    }
}

#[test]
fn test_optional_checks_skipped_when_absent() {
    let metrics = SettlementMetrics {
        otc_spread: None,
        processing_time_seconds: None,
        daily_volume: None,
        max_member_exposure: None,
        ..base()
    };
    let config = CircuitBreakerConfig {
        min_otc_spread: Decimal::ONE,
        max_otc_spread: Decimal::ONE,
        processing_timeout_seconds: 0,
        max_daily_volume: Decimal::ZERO,
        max_member_exposure: Decimal::ZERO,
        ..Default::default()
    };

    let result = check_circuit_breakers(&metrics, &config);
    assert!(result.passed);
    assert!(result.warnings.is_empty());
}

#[test]
fn test_override_config_per_call() {
    let metrics = SettlementMetrics {
        max_single_settlement: dec!(600),
        ..base()
    };
    let strict = CircuitBreakerConfig {
        max_settlement_amount: dec!(500),
        ..Default::default()
    };

    assert!(check_circuit_breakers(&metrics, &CircuitBreakerConfig::default()).passed);

    let result = check_circuit_breakers(&metrics, &strict);
    assert!(!result.passed);
    let v = result.violation(BreakerCheck::MaxSettlementAmount).unwrap();
    assert_eq!(v.value, dec!(600));
    assert_eq!(v.limit, dec!(500));
    assert_eq!(v.message, "Largest settlement $600.00 exceeds maximum of $500.00");
}
