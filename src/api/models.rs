//! Request/response models.
//!
//! Clients speak in fractional tokens; the core speaks in integer token
//! cents. The conversion happens here and nowhere else.

use crate::fairness::RiskTier;
use crate::ledger::AuditRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cents per token.
const TOKEN_SCALE: f64 = 100.0;

/// Largest accepted token amount; keeps the cents value well inside u64.
const MAX_TOKEN_AMOUNT: f64 = 1e12;

/// Convert a client-supplied token amount into cents. Rejects non-finite,
/// non-positive, and absurdly large values before they reach the core.
pub fn tokens_to_cents(amount: f64) -> Result<u64, String> {
    if !amount.is_finite() {
        return Err("Amount must be a finite number".to_string());
    }
    if amount <= 0.0 {
        return Err("Amount must be positive".to_string());
    }
    if amount > MAX_TOKEN_AMOUNT {
        return Err(format!("Amount exceeds maximum of {}", MAX_TOKEN_AMOUNT));
    }
    Ok((amount * TOKEN_SCALE).round() as u64)
}

/// Signed variant for admin adjustments.
pub fn tokens_to_cents_signed(amount: f64) -> Result<i64, String> {
    if !amount.is_finite() {
        return Err("Amount must be a finite number".to_string());
    }
    if amount == 0.0 {
        return Err("Amount must be non-zero".to_string());
    }
    if amount.abs() > MAX_TOKEN_AMOUNT {
        return Err(format!("Amount exceeds maximum of {}", MAX_TOKEN_AMOUNT));
    }
    Ok((amount * TOKEN_SCALE).round() as i64)
}

pub fn cents_to_tokens(cents: u64) -> f64 {
    cents as f64 / TOKEN_SCALE
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct BetRequest {
    pub user_id: String,
    /// Stake in tokens.
    pub amount: f64,
    pub client_seed: String,
    pub risk: RiskTier,
}

#[derive(Debug, Serialize)]
pub struct BetResponse {
    pub session_id: String,
    /// SHA-256 commitment to the secret server seed.
    pub server_seed_hash: String,
    pub expires_at: DateTime<Utc>,
    pub balance: f64,
}

#[derive(Debug, Deserialize)]
pub struct SettleRequest {
    pub session_id: String,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct SettleResponse {
    pub session_id: String,
    pub position: u8,
    pub multiplier: f64,
    pub payout: f64,
    pub stake: f64,
    pub risk: RiskTier,
    /// Revealed now that the round is over.
    pub server_seed: String,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
    pub balance: f64,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub server_seed: String,
    pub client_seed: String,
    pub nonce: u64,
    pub expected_position: u8,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub is_valid: bool,
    pub computed_position: u8,
}

#[derive(Debug, Deserialize)]
pub struct SeedHashRequest {
    pub server_seed: String,
}

#[derive(Debug, Serialize)]
pub struct SeedHashResponse {
    pub hash: String,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: String,
    pub balance: f64,
}

#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    pub user_id: String,
    /// Tokens to credit.
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct AdminAdjustRequest {
    pub user_id: String,
    /// Signed token delta.
    pub amount: f64,
    pub actor: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct AuditResponse {
    pub user_id: String,
    pub records: Vec<AuditEntry>,
}

#[derive(Debug, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub kind: String,
    pub amount: f64,
    pub balance_before: f64,
    pub balance_after: f64,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<AuditRecord> for AuditEntry {
    fn from(record: AuditRecord) -> Self {
        Self {
            id: record.id,
            kind: record.kind.as_str().to_string(),
            amount: record.amount as f64 / TOKEN_SCALE,
            balance_before: cents_to_tokens(record.balance_before),
            balance_after: cents_to_tokens(record.balance_after),
            metadata: record.metadata,
            created_at: record.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_to_cents() {
        assert_eq!(tokens_to_cents(1.0).unwrap(), 100);
        assert_eq!(tokens_to_cents(0.01).unwrap(), 1);
        assert_eq!(tokens_to_cents(12.345).unwrap(), 1235);
    }

    #[test]
    fn test_tokens_to_cents_rejects_bad_input() {
        assert!(tokens_to_cents(0.0).is_err());
        assert!(tokens_to_cents(-5.0).is_err());
        assert!(tokens_to_cents(f64::NAN).is_err());
        assert!(tokens_to_cents(f64::INFINITY).is_err());
        assert!(tokens_to_cents(1e13).is_err());
    }

    #[test]
    fn test_signed_conversion() {
        assert_eq!(tokens_to_cents_signed(-2.5).unwrap(), -250);
        assert!(tokens_to_cents_signed(0.0).is_err());
    }

    #[test]
    fn test_round_trip() {
        assert_eq!(cents_to_tokens(tokens_to_cents(7.5).unwrap()), 7.5);
    }
}
