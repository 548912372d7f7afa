//! Error types for settlement cycles

use circuit_breaker::Breach;
use thiserror::Error;
use uuid::Uuid;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Settlement errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed caller input or transaction data
    #[error("Validation error: {0}")]
    Validation(String),

    /// No caller identity
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Caller lacks the required role
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Safety thresholds forbid execution
    #[error("Circuit breaker triggered: {} violation(s)", violations.len())]
    CircuitBreaker {
        /// Blocking breaches
        violations: Vec<Breach>,
        /// Non-blocking breaches
        warnings: Vec<Breach>,
    },

    /// Persistence collaborator failed
    #[error("Database error: {message}")]
    Database {
        /// Store message
        message: String,
        /// Cycle row written before the failure, if any
        cycle_id: Option<Uuid>,
    },

    /// Netting error
    #[error("Netting error: {0}")]
    Netting(#[from] netting_core::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// HTTP-style status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) | Error::CircuitBreaker { .. } => 400,
            Error::Unauthenticated(_) => 401,
            Error::Forbidden(_) => 403,
            Error::Database { .. }
            | Error::Netting(_)
            | Error::Config(_)
            | Error::Io(_)
            | Error::Other(_) => 500,
        }
    }

    /// Stable error identifier
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::Unauthenticated(_) => "unauthenticated",
            Error::Forbidden(_) => "forbidden",
            Error::CircuitBreaker { .. } => "circuit_breaker_triggered",
            Error::Database { .. } => "database_error",
            Error::Netting(_) | Error::Config(_) | Error::Io(_) | Error::Other(_) => "unknown",
        }
    }
}

impl Error {
    /// Store failure with no cycle row involved
    pub fn database(message: impl Into<String>) -> Self {
        Error::Database {
            message: message.into(),
            cycle_id: None,
        }
    }

    /// Tag a store failure with the cycle row it left behind
    pub fn in_cycle(self, id: Uuid) -> Self {
        match self {
            Error::Database { message, .. } => Error::Database {
                message,
                cycle_id: Some(id),
            },
            other => other,
        }
    }
}

impl From<circuit_breaker::Error> for Error {
    fn from(err: circuit_breaker::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::Validation("bad".into()).status_code(), 400);
        assert_eq!(Error::Unauthenticated("who".into()).status_code(), 401);
        assert_eq!(Error::Forbidden("no".into()).status_code(), 403);
        assert_eq!(
            Error::CircuitBreaker { violations: vec![], warnings: vec![] }.status_code(),
            400
        );
        assert_eq!(Error::database("down").status_code(), 500);
        assert_eq!(Error::from("boom").code(), "unknown");
    }

    #[test]
    fn test_in_cycle_tags_database_errors_only() {
        let id = Uuid::new_v4();
        assert!(matches!(
            Error::database("down").in_cycle(id),
            Error::Database { cycle_id: Some(c), .. } if c == id
        ));
        assert!(matches!(
            Error::Validation("bad".into()).in_cycle(id),
            Error::Validation(_)
        ));
    }
}
