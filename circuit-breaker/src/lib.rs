//! Circuit breakers for settlement cycles
//!
//! Threshold checks run against the aggregate figures of a proposed
//! settlement batch. A breach is either a **violation** (critical, blocks
//! execution) or a **warning** (reported, never blocks). Every check runs on
//! every evaluation so callers see all breaches at once.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;
pub mod validator;

pub use config::CircuitBreakerConfig;
pub use error::{Error, Result};
pub use types::*;
pub use validator::{check_circuit_breakers, CircuitBreaker};
