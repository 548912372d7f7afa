//! Configuration for settlement cycles

use circuit_breaker::CircuitBreakerConfig;
use netting_core::DEFAULT_FEE_RATE;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Longest rolling daily-volume window accepted (one leap year)
pub const MAX_DAILY_VOLUME_WINDOW_HOURS: i64 = 8784;

/// Settlement engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Network settled when a request names none
    pub default_network: String,

    /// Circuit breaker thresholds
    pub circuit_breakers: CircuitBreakerConfig,

    /// Fee configuration
    pub fees: FeeConfig,

    /// Audit configuration
    pub audit: AuditConfig,

    /// Window (hours) over which completed cycles count toward daily volume
    pub daily_volume_window_hours: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "settlement-engine".to_string(),
            default_network: "default".to_string(),
            circuit_breakers: CircuitBreakerConfig::default(),
            fees: FeeConfig::default(),
            audit: AuditConfig::default(),
            daily_volume_window_hours: 24,
        }
    }
}

/// Fee configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Fee rate as a fraction of each instruction (0.008 = 0.8%)
    pub rate: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            rate: DEFAULT_FEE_RATE,
        }
    }
}

/// Audit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Consecutive audit write failures before escalating to `error!`
    pub max_consecutive_failures: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 5,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(network) = std::env::var("SETTLEMENT_NETWORK") {
            config.default_network = network;
        }

        if let Ok(rate) = std::env::var("SETTLEMENT_FEE_RATE") {
            config.fees.rate = parse_env("SETTLEMENT_FEE_RATE", &rate)?;
        }

        if let Ok(amount) = std::env::var("SETTLEMENT_MAX_SETTLEMENT_AMOUNT") {
            config.circuit_breakers.max_settlement_amount =
                parse_env("SETTLEMENT_MAX_SETTLEMENT_AMOUNT", &amount)?;
        }

        if let Ok(members) = std::env::var("SETTLEMENT_MAX_MEMBERS") {
            config.circuit_breakers.max_members = parse_env("SETTLEMENT_MAX_MEMBERS", &members)?;
        }

        if let Ok(volume) = std::env::var("SETTLEMENT_MAX_DAILY_VOLUME") {
            config.circuit_breakers.max_daily_volume =
                parse_env("SETTLEMENT_MAX_DAILY_VOLUME", &volume)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> crate::Result<()> {
        if self.fees.rate < Decimal::ZERO || self.fees.rate >= Decimal::ONE {
            return Err(crate::Error::Config(format!(
                "fee rate {} must be in [0, 1)",
                self.fees.rate
            )));
        }

        if self.daily_volume_window_hours <= 0
            || self.daily_volume_window_hours > MAX_DAILY_VOLUME_WINDOW_HOURS
        {
            return Err(crate::Error::Config(format!(
                "daily_volume_window_hours {} must be in 1..={}",
                self.daily_volume_window_hours, MAX_DAILY_VOLUME_WINDOW_HOURS
            )));
        }

        if self.default_network.trim().is_empty() {
            return Err(crate::Error::Config("default_network is empty".to_string()));
        }

        self.circuit_breakers.validate()?;
        Ok(())
    }
}

fn parse_env<T>(name: &str, value: &str) -> crate::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| crate::Error::Config(format!("{}={:?}: {}", name, value, e)))
}
