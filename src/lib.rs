//! SweetFlips core: provably fair Plinko engine, session store, and token
//! ledger with an append-only audit trail, exposed over a thin HTTP API.
//!
//! The fairness contract: the server commits to a secret seed via its
//! SHA-256 hash at bet time, reveals it at settlement, and the outcome is a
//! pure function of (server seed, client seed, nonce) anyone can recompute.

pub mod api;
pub mod config;
pub mod errors;
pub mod fairness;
pub mod ledger;
pub mod service;
pub mod session;

pub use config::{ConfigLoader, SweetFlipsConfig};
pub use errors::{SweetFlipsError, SweetFlipsResult};
pub use fairness::RiskTier;
pub use ledger::{Ledger, Provenance, TransactionKind};
pub use service::{RoundService, StakeLimits};
pub use session::SessionStore;
