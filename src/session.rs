//! In-memory game session store.
//!
//! Bridges the two-phase bet lifecycle (stake, then settle) by holding seed
//! material and the stake between requests. Sessions are keyed by an
//! unguessable id, expire after a fixed TTL, and support exactly one
//! settlement.
//!
//! State lives in process memory: all requests for a session must hit the same
//! instance. Multi-instance deployment requires replacing this with a shared
//! external store.

use crate::errors::{SessionError, SweetFlipsResult};
use crate::fairness::{self, RiskTier};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use rand::RngCore;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use uuid::Uuid;

/// Default session lifetime.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(300);

/// Default interval between expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// An in-progress bet between placement and settlement.
#[derive(Debug, Clone)]
pub struct GameSession {
    pub id: String,
    pub owner: String,
    /// Stake in token cents.
    pub stake: u64,
    pub risk: RiskTier,
    /// Secret until settlement; only its hash is shown at bet time.
    pub server_seed: String,
    pub client_seed: String,
    pub nonce: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl GameSession {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Result of settling a session. Carries the revealed seed material so the
/// player can verify the outcome independently.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub session_id: String,
    pub owner: String,
    pub position: u8,
    /// Multiplier in hundredths.
    pub multiplier: u64,
    /// Payout in token cents.
    pub payout: u64,
    pub stake: u64,
    pub risk: RiskTier,
    pub server_seed: String,
    pub client_seed: String,
    pub nonce: u64,
}

/// Concurrent map of open sessions with lazy and periodic expiry.
pub struct SessionStore {
    sessions: DashMap<String, GameSession>,
    ttl: ChronoDuration,
    sweeper_running: Arc<AtomicBool>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_SESSION_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl: ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(300)),
            sweeper_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open a session for a placed bet: fresh unguessable id, fresh random
    /// server seed, nonce 0, expiry now + TTL.
    pub fn open(
        &self,
        owner: &str,
        stake: u64,
        risk: RiskTier,
        client_seed: &str,
    ) -> GameSession {
        let now = Utc::now();
        let session = GameSession {
            id: Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            stake,
            risk,
            server_seed: generate_server_seed(),
            client_seed: client_seed.to_string(),
            nonce: 0,
            created_at: now,
            expires_at: now + self.ttl,
        };
        self.sessions.insert(session.id.clone(), session.clone());
        session
    }

    /// Look up a session. Expired entries are removed on access and reported
    /// as not found, independent of the periodic sweep.
    pub fn get(&self, session_id: &str) -> SweetFlipsResult<GameSession> {
        let session = self
            .sessions
            .get(session_id)
            .map(|entry| entry.clone())
            .ok_or(SessionError::NotFound)?;

        if session.is_expired(Utc::now()) {
            self.sessions.remove(session_id);
            return Err(SessionError::NotFound.into());
        }
        Ok(session)
    }

    /// Settle a session: validate existence, expiry and ownership, derive the
    /// outcome from the stored seed material, and consume the session. A
    /// second settle of the same id fails with not-found.
    pub fn settle(&self, session_id: &str, owner: &str) -> SweetFlipsResult<RoundOutcome> {
        // Ownership is checked before removal so a mismatch leaves the
        // session intact for its real owner.
        let session = self.get(session_id)?;
        if session.owner != owner {
            return Err(SessionError::OwnershipMismatch.into());
        }

        let (_, session) = self
            .sessions
            .remove_if(session_id, |_, s| s.owner == owner)
            .ok_or(SessionError::NotFound)?;

        let position =
            fairness::derive_outcome(&session.server_seed, &session.client_seed, session.nonce);
        let multiplier = session.risk.multiplier(position);
        let payout = fairness::compute_payout(position, session.stake, session.risk);

        Ok(RoundOutcome {
            session_id: session.id,
            owner: session.owner,
            position,
            multiplier,
            payout,
            stake: session.stake,
            risk: session.risk,
            server_seed: session.server_seed,
            client_seed: session.client_seed,
            nonce: session.nonce,
        })
    }

    /// Remove every session whose expiry has passed. Returns how many were
    /// dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired(now));
        before - self.sessions.len()
    }

    /// Number of currently stored sessions, including not-yet-swept expired
    /// ones.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Start the periodic expiry sweep task.
    pub fn spawn_sweeper(store: Arc<SessionStore>, interval: Duration) {
        if store.sweeper_running.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            while store.sweeper_running.load(Ordering::SeqCst) {
                tick.tick().await;
                let removed = store.sweep_expired();
                if removed > 0 {
                    tracing::debug!("Session sweep removed {} expired sessions", removed);
                }
            }
        });
    }

    pub fn stop_sweeper(&self) {
        self.sweeper_running.store(false, Ordering::SeqCst);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 32 bytes from the OS CSPRNG, hex encoded.
fn generate_server_seed() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SweetFlipsError;

    #[test]
    fn test_open_and_get() {
        let store = SessionStore::new();
        let session = store.open("user-a", 500, RiskTier::Medium, "client-seed");
        assert_eq!(session.nonce, 0);
        assert_eq!(session.server_seed.len(), 64);

        let fetched = store.get(&session.id).unwrap();
        assert_eq!(fetched.owner, "user-a");
        assert_eq!(fetched.stake, 500);
    }

    #[test]
    fn test_expired_session_is_not_found_on_get() {
        let store = SessionStore::with_ttl(Duration::ZERO);
        let session = store.open("user-a", 100, RiskTier::Low, "seed");
        let err = store.get(&session.id).unwrap_err();
        assert!(matches!(
            err,
            SweetFlipsError::Session(SessionError::NotFound)
        ));
        // Lazy expiry removed the entry.
        assert!(store.is_empty());
    }

    #[test]
    fn test_settle_consumes_session() {
        let store = SessionStore::new();
        let session = store.open("user-a", 1000, RiskTier::High, "seed");

        let outcome = store.settle(&session.id, "user-a").unwrap();
        assert!((outcome.position as usize) < fairness::SLOT_COUNT);
        assert_eq!(outcome.server_seed, session.server_seed);

        let second = store.settle(&session.id, "user-a").unwrap_err();
        assert!(matches!(
            second,
            SweetFlipsError::Session(SessionError::NotFound)
        ));
    }

    #[test]
    fn test_settle_rejects_wrong_owner_and_keeps_session() {
        let store = SessionStore::new();
        let session = store.open("user-a", 1000, RiskTier::Low, "seed");

        let err = store.settle(&session.id, "user-b").unwrap_err();
        assert!(matches!(
            err,
            SweetFlipsError::Session(SessionError::OwnershipMismatch)
        ));

        // Still settleable by the real owner.
        assert!(store.settle(&session.id, "user-a").is_ok());
    }

    #[test]
    fn test_settlement_outcome_is_verifiable() {
        let store = SessionStore::new();
        let session = store.open("user-a", 200, RiskTier::Medium, "my-seed");
        let outcome = store.settle(&session.id, "user-a").unwrap();

        assert!(fairness::verify(
            &outcome.server_seed,
            &outcome.client_seed,
            outcome.nonce,
            outcome.position
        ));
        assert_eq!(
            outcome.payout,
            fairness::compute_payout(outcome.position, 200, RiskTier::Medium)
        );
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let expired = SessionStore::with_ttl(Duration::ZERO);
        expired.open("user-a", 100, RiskTier::Low, "seed");
        expired.open("user-b", 100, RiskTier::Low, "seed");
        assert_eq!(expired.sweep_expired(), 2);
        assert!(expired.is_empty());

        let live = SessionStore::new();
        live.open("user-a", 100, RiskTier::Low, "seed");
        assert_eq!(live.sweep_expired(), 0);
        assert_eq!(live.len(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_start_and_stop() {
        let store = Arc::new(SessionStore::new());
        SessionStore::spawn_sweeper(store.clone(), Duration::from_secs(3600));
        assert!(store.sweeper_running.load(Ordering::SeqCst));

        // A second spawn is a no-op while the first is running.
        SessionStore::spawn_sweeper(store.clone(), Duration::from_secs(3600));
        assert!(store.sweeper_running.load(Ordering::SeqCst));

        store.stop_sweeper();
        assert!(!store.sweeper_running.load(Ordering::SeqCst));
    }

    #[test]
    fn test_server_seeds_are_unique() {
        let store = SessionStore::new();
        let a = store.open("user", 100, RiskTier::Low, "seed");
        let b = store.open("user", 100, RiskTier::Low, "seed");
        assert_ne!(a.server_seed, b.server_seed);
        assert_ne!(a.id, b.id);
    }
}
