//! Netting Core
//!
//! Pure multilateral netting for a trading network: integer-cent money
//! helpers, net position calculation and settlement instruction generation.
//!
//! # Pipeline
//!
//! 1. **Positions**: reduce a batch of unsettled transactions to one signed
//!    balance per member ([`calculate_net_positions`])
//! 2. **Instructions**: greedily pair the largest payer with the largest
//!    receiver until every balance is zero ([`SettlementGenerator`])
//! 3. **Statistics**: compare gross obligations with the net payments
//!    ([`NettingStats`])
//!
//! Nothing in this crate performs I/O or holds state, so every function is
//! safe to call from any thread.
//!
//! # Example
//!
//! ```
//! use netting_core::{calculate_net_positions, MemberId, SettlementGenerator, Transaction};
//! use rust_decimal::Decimal;
//!
//! let batch = vec![
//!     Transaction::new(MemberId::new("A"), MemberId::new("B"), Decimal::new(10000, 2)),
//!     Transaction::new(MemberId::new("B"), MemberId::new("A"), Decimal::new(6000, 2)),
//! ];
//!
//! let positions = calculate_net_positions(&batch);
//! let instructions = SettlementGenerator::default().generate(&positions).unwrap();
//!
//! assert_eq!(instructions.len(), 1);
//! assert_eq!(instructions[0].amount, Decimal::new(4000, 2));
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod currency;
pub mod error;
pub mod generator;
pub mod netting;
pub mod types;

// Re-exports
pub use error::{Error, Result};
pub use generator::{verify_conservation, SettlementGenerator, DEFAULT_FEE_RATE};
pub use netting::{calculate_net_positions, total_net, NetPositions, NettingStats};
pub use types::*;
