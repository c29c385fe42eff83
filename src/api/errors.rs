//! API error handling.
//!
//! Structured error responses with proper HTTP status codes and request
//! tracking. Core errors map onto stable reason codes so clients can branch
//! on the failure kind.

use crate::errors::{LedgerError, SessionError, SweetFlipsError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

/// Error body with structured information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable reason code (VALIDATION_FAILED, INSUFFICIENT_FUNDS, ...)
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (can be any JSON)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error with request tracking
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub request_id: String,
}

impl ApiError {
    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "VALIDATION_FAILED".to_string(),
            message,
            details: None,
            request_id,
        }
    }

    pub fn not_found(request_id: String, message: String) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND".to_string(),
            message,
            details: None,
            request_id,
        }
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message,
            details: None,
            request_id,
        }
    }

    pub fn rate_limited(request_id: String) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            code: "RATE_LIMITED".to_string(),
            message: "Too many requests".to_string(),
            details: None,
            request_id,
        }
    }

    /// Map a core error onto an HTTP status, keeping its reason code and
    /// attaching structured details where they help the client.
    pub fn from_core(request_id: String, err: SweetFlipsError) -> Self {
        let status = match &err {
            SweetFlipsError::Validation(_) => StatusCode::BAD_REQUEST,
            SweetFlipsError::Session(SessionError::NotFound) => StatusCode::NOT_FOUND,
            SweetFlipsError::Session(SessionError::OwnershipMismatch) => StatusCode::FORBIDDEN,
            SweetFlipsError::Ledger(LedgerError::InsufficientFunds { .. }) => StatusCode::CONFLICT,
            SweetFlipsError::Ledger(LedgerError::UserNotFound(_)) => StatusCode::NOT_FOUND,
            SweetFlipsError::Ledger(LedgerError::NonPositiveAmount(_)) => StatusCode::BAD_REQUEST,
            SweetFlipsError::Ledger(LedgerError::BalanceOverflow) => StatusCode::BAD_REQUEST,
            SweetFlipsError::Storage(_) | SweetFlipsError::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let details = match &err {
            SweetFlipsError::Ledger(LedgerError::InsufficientFunds { balance, requested }) => {
                Some(serde_json::json!({ "balance": balance, "requested": requested }))
            }
            _ => None,
        };

        // Storage internals stay out of client-facing messages.
        let message = match &err {
            SweetFlipsError::Storage(_) => "Internal storage error".to_string(),
            other => other.to_string(),
        };

        Self {
            status,
            code: err.reason_code().to_string(),
            message,
            details,
            request_id,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.request_id, self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            request_id: self.request_id,
            error: ErrorBody {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        });

        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_funds_maps_to_conflict_with_details() {
        let err = ApiError::from_core(
            "req-1".to_string(),
            LedgerError::InsufficientFunds {
                balance: 100,
                requested: 150,
            }
            .into(),
        );
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.code, "INSUFFICIENT_FUNDS");
        assert_eq!(err.details.unwrap()["balance"], 100);
    }

    #[test]
    fn test_rate_limited_is_structured() {
        let err = ApiError::rate_limited("req-9".to_string());
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.code, "RATE_LIMITED");
        assert_eq!(err.request_id, "req-9");
    }

    #[test]
    fn test_session_errors_map_to_distinct_statuses() {
        let not_found = ApiError::from_core("r".to_string(), SessionError::NotFound.into());
        let forbidden =
            ApiError::from_core("r".to_string(), SessionError::OwnershipMismatch.into());
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);
        assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
    }
}
