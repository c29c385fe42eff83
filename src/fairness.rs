//! Provably fair Plinko outcome derivation.
//!
//! The outcome of a round is a pure function of (server seed, client seed,
//! nonce): HMAC-SHA256 keyed by the server seed over `"{client_seed}:{nonce}"`
//! drives a 16-row bounded walk over 15 slots. The server seed is committed
//! via its SHA-256 hash before the bet and revealed at settlement, so anyone
//! can recompute the result independently.

use crate::errors::ValidationError;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

type HmacSha256 = Hmac<Sha256>;

/// Number of rows the ball falls through.
pub const ROWS: usize = 16;

/// Number of landing slots (positions 0..=14).
pub const SLOT_COUNT: usize = 15;

/// Starting position, the middle slot.
const START_POSITION: u8 = 7;

/// Payout multiplier profile. Higher tiers trade win frequency for
/// multiplier magnitude.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskTier::Low => write!(f, "low"),
            RiskTier::Medium => write!(f, "medium"),
            RiskTier::High => write!(f, "high"),
        }
    }
}

impl FromStr for RiskTier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(RiskTier::Low),
            "medium" => Ok(RiskTier::Medium),
            "high" => Ok(RiskTier::High),
            other => Err(ValidationError::InvalidRiskTier(other.to_string())),
        }
    }
}

// Multipliers in hundredths (190 = 1.90x) so payout arithmetic stays in
// integers. Static configuration, one table per tier.
const MULTIPLIERS_LOW: [u64; SLOT_COUNT] = [
    1600, 900, 200, 140, 130, 110, 100, 50, 100, 110, 130, 140, 200, 900, 1600,
];
const MULTIPLIERS_MEDIUM: [u64; SLOT_COUNT] = [
    3300, 1100, 400, 200, 110, 60, 40, 20, 40, 60, 110, 200, 400, 1100, 3300,
];
const MULTIPLIERS_HIGH: [u64; SLOT_COUNT] = [
    17000, 2600, 810, 200, 70, 20, 10, 0, 10, 20, 70, 200, 810, 2600, 17000,
];

impl RiskTier {
    /// Multiplier table for this tier, indexed by landing position.
    pub fn multipliers(&self) -> &'static [u64; SLOT_COUNT] {
        match self {
            RiskTier::Low => &MULTIPLIERS_LOW,
            RiskTier::Medium => &MULTIPLIERS_MEDIUM,
            RiskTier::High => &MULTIPLIERS_HIGH,
        }
    }

    /// Multiplier in hundredths for a landing position.
    pub fn multiplier(&self, position: u8) -> u64 {
        self.multipliers()[position as usize % SLOT_COUNT]
    }
}

/// Derive the landing position for a (server seed, client seed, nonce) triple.
///
/// Deterministic and total: the same triple always yields the same position,
/// and the result is always in `0..SLOT_COUNT`.
pub fn derive_outcome(server_seed: &str, client_seed: &str, nonce: u64) -> u8 {
    let digest = outcome_digest(server_seed, client_seed, nonce);

    let mut position = START_POSITION;
    for row in 0..ROWS {
        let byte = digest[row / 4];
        let bit = (byte >> ((row % 4) * 2)) & 1;
        if bit == 0 {
            // Left, clamped at the edge. The clamp slightly biases outcomes
            // near the boundaries; this is the defined game behavior.
            position = position.saturating_sub(1);
        } else if position < (SLOT_COUNT as u8 - 1) {
            position += 1;
        }
    }
    position
}

/// HMAC-SHA256 digest over `"{client_seed}:{nonce}"` keyed by the server seed.
fn outcome_digest(server_seed: &str, client_seed: &str, nonce: u64) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(server_seed.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(format!("{}:{}", client_seed, nonce).as_bytes());
    let bytes = mac.finalize().into_bytes();
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    out
}

/// Payout for a stake landing in `position` under `risk`, in token cents.
pub fn compute_payout(position: u8, stake: u64, risk: RiskTier) -> u64 {
    let multiplier = risk.multiplier(position);
    ((stake as u128 * multiplier as u128) / 100) as u64
}

/// Recompute the outcome and compare with the claimed position. Used for
/// independent auditing once the server seed has been disclosed.
pub fn verify(server_seed: &str, client_seed: &str, nonce: u64, claimed_position: u8) -> bool {
    derive_outcome(server_seed, client_seed, nonce) == claimed_position
}

/// SHA-256 hash of a server seed, hex encoded. Shown to the player before the
/// bet as the fairness commitment.
pub fn server_seed_hash(server_seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(server_seed.as_bytes());
    hex::encode(hasher.finalize())
}
