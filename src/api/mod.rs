//! HTTP boundary for the SweetFlips core.
//!
//! Thin axum surface over the round service: bet placement, settlement,
//! fairness verification, and the ledger query/mutation endpoints.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod security;
pub mod server;

pub use server::ApiServer;
