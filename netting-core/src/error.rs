//! Error types for netting core

use thiserror::Error;

/// Result type for netting operations
pub type Result<T> = std::result::Result<T, Error>;

/// Netting errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Amount is negative, not cent-aligned or out of range
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Transaction failed structural validation
    #[error("Invalid transaction {id}: {reason}")]
    InvalidTransaction {
        /// Offending transaction
        id: uuid::Uuid,
        /// Why it was rejected
        reason: String,
    },

    /// Positions or instructions do not balance
    #[error("Conservation violated: {0}")]
    Conservation(String),
}
