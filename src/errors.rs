//! Error types for the SweetFlips core.
//!
//! Every rejection carries a specific reason so the HTTP layer can surface a
//! structured failure kind rather than a generic error.

use thiserror::Error;

/// Root error type for all core operations
#[derive(Debug, Error)]
pub enum SweetFlipsError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

/// Synchronous input validation failures, rejected before any state change
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Client seed must not be empty")]
    MissingClientSeed,

    #[error("Unknown risk tier: {0}")]
    InvalidRiskTier(String),
}

/// Game-session lifecycle failures
#[derive(Debug, Error)]
pub enum SessionError {
    /// Unknown, already-settled, and expired session ids are deliberately
    /// indistinguishable to the caller.
    #[error("Invalid or expired session")]
    NotFound,

    #[error("Session does not belong to user")]
    OwnershipMismatch,
}

/// Balance-mutation failures; the ledger is untouched when these are returned
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: u64, requested: u64 },

    #[error("Unknown user: {0}")]
    UserNotFound(String),

    #[error("Amount must be positive for {0} transactions")]
    NonPositiveAmount(&'static str),

    /// The resulting balance would not fit the stored integer range.
    #[error("Balance outside representable range")]
    BalanceOverflow,
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Convenience type alias for Results
pub type SweetFlipsResult<T> = Result<T, SweetFlipsError>;

impl SweetFlipsError {
    /// Stable machine-readable reason code, used by the API error body.
    pub fn reason_code(&self) -> &'static str {
        match self {
            SweetFlipsError::Validation(_) => "VALIDATION_FAILED",
            SweetFlipsError::Session(SessionError::NotFound) => "SESSION_NOT_FOUND",
            SweetFlipsError::Session(SessionError::OwnershipMismatch) => "SESSION_OWNERSHIP",
            SweetFlipsError::Ledger(LedgerError::InsufficientFunds { .. }) => "INSUFFICIENT_FUNDS",
            SweetFlipsError::Ledger(LedgerError::UserNotFound(_)) => "USER_NOT_FOUND",
            SweetFlipsError::Ledger(LedgerError::NonPositiveAmount(_)) => "VALIDATION_FAILED",
            SweetFlipsError::Ledger(LedgerError::BalanceOverflow) => "VALIDATION_FAILED",
            SweetFlipsError::Storage(_) => "STORAGE_ERROR",
            SweetFlipsError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SweetFlipsError::Ledger(LedgerError::InsufficientFunds {
            balance: 100,
            requested: 150,
        });
        assert!(err.to_string().contains("balance 100"));
        assert_eq!(err.reason_code(), "INSUFFICIENT_FUNDS");
    }

    #[test]
    fn test_error_conversion() {
        let err: SweetFlipsError = SessionError::OwnershipMismatch.into();
        assert_eq!(err.reason_code(), "SESSION_OWNERSHIP");
    }

    #[test]
    fn test_session_reasons_are_distinct() {
        let not_found: SweetFlipsError = SessionError::NotFound.into();
        let mismatch: SweetFlipsError = SessionError::OwnershipMismatch.into();
        assert_ne!(not_found.reason_code(), mismatch.reason_code());
    }
}
