//! Error types for the chip wagering engine
//!
//! Errors are grouped by concern: store failures, configuration failures and the
//! user-facing casino taxonomy. Callers can match on `CasinoError` to decide which
//! failures are user-correctable and which are idempotency no-ops.

use crate::common::traits::LedgerField;
use crate::common::types::{SessionId, WagerId};

/// Failures raised by a `LedgerStore` implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Adjusting {field} by {delta} would go below zero (current {current})")]
    Underflow {
        field: LedgerField,
        current: i64,
        delta: i64,
    },

    #[error("Counter overflow on {0}")]
    Overflow(LedgerField),

    #[error("Corrupted record {key}: {reason}")]
    CorruptedRecord { key: String, reason: String },
}

/// Configuration and validation errors, fatal at startup
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

/// Root error type for engine operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CasinoError {
    #[error("Insufficient funds: need {needed} chips, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("Insufficient chips: tried to exchange {requested}, have {available}")]
    InsufficientChips { requested: u64, available: u64 },

    #[error("Invalid bet: {0}")]
    InvalidBet(String),

    #[error("Wager {0} already settled")]
    AlreadySettled(WagerId),

    #[error("Unknown wager {0}")]
    UnknownWager(WagerId),

    #[error("Session {0} expired")]
    SessionExpired(SessionId),

    #[error("Unknown session {0}")]
    UnknownSession(SessionId),

    #[error("User {user} already has an active blackjack session {session_id}")]
    SessionInProgress { user: String, session_id: SessionId },

    #[error("Action {action} is not allowed while the session is {state}")]
    IllegalAction { action: String, state: String },

    #[error("Wager {wager_id} was placed on {expected}, not {actual}")]
    GameMismatch {
        wager_id: WagerId,
        expected: String,
        actual: String,
    },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl CasinoError {
    /// Idempotency guards: callers may log these and treat them as success
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            CasinoError::AlreadySettled(_) | CasinoError::UnknownWager(_)
        )
    }

    /// Errors the user can fix by changing their request
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            CasinoError::InsufficientFunds { .. }
                | CasinoError::InsufficientChips { .. }
                | CasinoError::InvalidBet(_)
                | CasinoError::SessionInProgress { .. }
                | CasinoError::IllegalAction { .. }
        )
    }
}

impl From<StoreError> for CasinoError {
    fn from(e: StoreError) -> Self {
        match e {
            // Underflow only escapes a service when a caller skipped balance validation
            StoreError::Underflow { current, delta, .. } => CasinoError::InsufficientFunds {
                needed: delta.unsigned_abs(),
                available: current.max(0) as u64,
            },
            StoreError::Unavailable(reason) => CasinoError::StoreUnavailable(reason),
            other => CasinoError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::CorruptedRecord {
            key: "<unknown>".to_string(),
            reason: e.to_string(),
        }
    }
}

/// Convenience type alias for Results
pub type CasinoResult<T> = Result<T, CasinoError>;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CasinoError::InsufficientFunds {
            needed: 100,
            available: 40,
        };
        assert!(err.to_string().contains("need 100"));
        assert!(err.to_string().contains("have 40"));
    }

    #[test]
    fn test_underflow_maps_to_insufficient_funds() {
        let store_error = StoreError::Underflow {
            field: LedgerField::Chips,
            current: 30,
            delta: -50,
        };
        let err: CasinoError = store_error.into();
        assert_eq!(
            err,
            CasinoError::InsufficientFunds {
                needed: 50,
                available: 30
            }
        );
    }

    #[test]
    fn test_unavailable_maps_to_store_unavailable() {
        let err: CasinoError = StoreError::Unavailable("timeout".to_string()).into();
        assert_eq!(err, CasinoError::StoreUnavailable("timeout".to_string()));
        assert_eq!(err.to_string(), "Store unavailable: timeout");
        assert!(!err.is_benign());
    }

    #[test]
    fn test_benign_classification() {
        let id = WagerId::new();
        assert!(CasinoError::AlreadySettled(id).is_benign());
        assert!(CasinoError::UnknownWager(id).is_benign());
        assert!(CasinoError::InvalidBet("zero".to_string()).is_user_correctable());
    }
}
