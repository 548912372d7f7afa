//! Settlement Engine
//!
//! Runs multilateral netting settlement cycles over confirmed member
//! transactions.
//!
//! # Architecture
//!
//! One call to [`SettlementEngine::process_settlement`] moves through:
//!
//! 1. **Collection**: Claim every unsettled transaction of the network
//! 2. **Netting**: Reduce them to net positions and greedy instructions
//! 3. **Validation**: Run the circuit breakers over the batch metrics
//! 4. **Execution**: Persist cycle, instructions and transaction updates
//!
//! A simulation stops after validation and returns a preview instead,
//! without touching the store. A breaker violation halts the run with
//! nothing persisted.
//!
//! # Example
//!
//! ```no_run
//! use settlement::{Actor, Config, ProcessSettlementRequest, Role, SettlementEngine};
//!
//! #[tokio::main]
//! async fn main() -> settlement::Result<()> {
//!     let (engine, _store) = SettlementEngine::in_memory(Config::default())?;
//!     let operator = Actor::new("ops-1", Role::Operator);
//!
//!     let response = engine
//!         .process_settlement(Some(&operator), &ProcessSettlementRequest::simulation())
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&response).unwrap_or_default());
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod audit;
pub mod config;
pub mod cycle;
pub mod engine;
pub mod error;
pub mod notify;
pub mod response;
pub mod store;

// Re-exports
pub use config::Config;
pub use engine::{NettedBatch, SettlementEngine};
pub use error::{Error, Result};
pub use response::*;
pub use store::{InMemoryStore, SettlementStore};
