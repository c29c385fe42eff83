//! Round orchestration: the bet/settle flow across the ledger and the
//! session store.
//!
//! A bet debits the stake and opens a session in that order, so a failed
//! debit never leaves a dangling session. Settlement consumes the session
//! first and credits any payout after; the audit trail ties the two halves
//! together through the session id in the metadata.

use crate::errors::{SweetFlipsResult, ValidationError};
use crate::fairness::{self, RiskTier};
use crate::ledger::{Ledger, Provenance, TransactionKind};
use crate::session::{GameSession, RoundOutcome, SessionStore};
use serde::Serialize;
use std::sync::Arc;

/// Stake bounds in token cents, enforced before any state change.
#[derive(Debug, Clone)]
pub struct StakeLimits {
    pub min: u64,
    pub max: u64,
}

impl Default for StakeLimits {
    fn default() -> Self {
        Self {
            min: 1,
            max: 1_000_000, // 10,000 tokens
        }
    }
}

/// What the player gets back at bet time. The raw server seed stays secret;
/// only its hash is disclosed.
#[derive(Debug, Clone, Serialize)]
pub struct BetReceipt {
    pub session_id: String,
    pub server_seed_hash: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub balance: u64,
}

/// Settlement result with the revealed seed material and the post-credit
/// balance.
#[derive(Debug, Clone, Serialize)]
pub struct SettledRound {
    pub session_id: String,
    pub position: u8,
    /// Multiplier in hundredths.
    pub multiplier: u64,
    pub payout: u64,
    pub stake: u64,
    pub risk: RiskTier,
    pub server_seed: String,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
    pub balance: u64,
}

/// Stateless facade over the ledger and session store. Cheap to clone via
/// the inner Arcs.
pub struct RoundService {
    ledger: Arc<Ledger>,
    sessions: Arc<SessionStore>,
    limits: StakeLimits,
}

impl RoundService {
    pub fn new(ledger: Arc<Ledger>, sessions: Arc<SessionStore>) -> Self {
        Self {
            ledger,
            sessions,
            limits: StakeLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: StakeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Place a bet: validate, debit the stake, open a session. Returns the
    /// fairness commitment, never the raw seed.
    pub fn place_bet(
        &self,
        user_id: &str,
        stake: u64,
        risk: RiskTier,
        client_seed: &str,
        provenance: &Provenance,
    ) -> SweetFlipsResult<BetReceipt> {
        if client_seed.trim().is_empty() {
            return Err(ValidationError::MissingClientSeed.into());
        }
        if stake < self.limits.min || stake > self.limits.max {
            return Err(ValidationError::InvalidAmount(format!(
                "stake {} outside allowed range {}..={}",
                stake, self.limits.min, self.limits.max
            ))
            .into());
        }

        let balance = self.ledger.apply_balance_change(
            user_id,
            TransactionKind::Spend,
            stake as i64,
            serde_json::json!({ "action": "plinko_bet", "risk": risk.to_string() }),
            provenance,
        )?;
        self.log_suspicion(user_id, TransactionKind::Spend, stake as i64);

        let session = self.sessions.open(user_id, stake, risk, client_seed);
        tracing::info!(
            user_id,
            session_id = %session.id,
            stake,
            risk = %risk,
            "Bet placed"
        );

        Ok(Self::receipt(&session, balance))
    }

    /// Settle a session and credit any winnings. The session is consumed
    /// even when the payout is zero.
    pub fn settle(
        &self,
        session_id: &str,
        user_id: &str,
        provenance: &Provenance,
    ) -> SweetFlipsResult<SettledRound> {
        let outcome = self.sessions.settle(session_id, user_id)?;

        let balance = if outcome.payout > 0 {
            let balance = self.ledger.apply_balance_change(
                user_id,
                TransactionKind::Payout,
                outcome.payout as i64,
                serde_json::json!({
                    "action": "plinko_payout",
                    "session_id": outcome.session_id,
                    "position": outcome.position,
                    "multiplier": outcome.multiplier,
                }),
                provenance,
            )?;
            self.log_suspicion(user_id, TransactionKind::Payout, outcome.payout as i64);
            balance
        } else {
            self.ledger.balance(user_id)?
        };

        tracing::info!(
            user_id,
            session_id,
            position = outcome.position,
            payout = outcome.payout,
            "Round settled"
        );

        Ok(Self::settled(outcome, balance))
    }

    /// Convert loyalty points into tokens (credit).
    pub fn convert(
        &self,
        user_id: &str,
        amount: u64,
        provenance: &Provenance,
    ) -> SweetFlipsResult<u64> {
        let balance = self.ledger.apply_balance_change(
            user_id,
            TransactionKind::Convert,
            amount as i64,
            serde_json::json!({ "action": "convert" }),
            provenance,
        )?;
        self.log_suspicion(user_id, TransactionKind::Convert, amount as i64);
        Ok(balance)
    }

    /// Signed manual correction, attributed to an admin actor in the audit
    /// metadata.
    pub fn admin_adjust(
        &self,
        user_id: &str,
        delta: i64,
        actor: &str,
        reason: &str,
        provenance: &Provenance,
    ) -> SweetFlipsResult<u64> {
        let balance = self.ledger.apply_balance_change(
            user_id,
            TransactionKind::AdminAdjustment,
            delta,
            serde_json::json!({ "action": "admin_adjustment", "actor": actor, "reason": reason }),
            provenance,
        )?;
        tracing::info!(user_id, delta, actor, "Admin balance adjustment");
        Ok(balance)
    }

    fn log_suspicion(&self, user_id: &str, kind: TransactionKind, amount: i64) {
        match self.ledger.check_suspicious_activity(user_id, kind, amount) {
            Ok(report) if report.suspicious => {
                tracing::warn!(
                    user_id,
                    kind = %kind,
                    amount,
                    reason = report.reason.as_deref().unwrap_or(""),
                    "Suspicious activity flagged"
                );
            }
            Ok(_) => {}
            Err(err) => {
                // Advisory path: a failed check never blocks the operation.
                tracing::warn!(user_id, error = %err, "Suspicion check failed");
            }
        }
    }

    fn receipt(session: &GameSession, balance: u64) -> BetReceipt {
        BetReceipt {
            session_id: session.id.clone(),
            server_seed_hash: fairness::server_seed_hash(&session.server_seed),
            expires_at: session.expires_at,
            balance,
        }
    }

    fn settled(outcome: RoundOutcome, balance: u64) -> SettledRound {
        SettledRound {
            session_id: outcome.session_id,
            position: outcome.position,
            multiplier: outcome.multiplier,
            payout: outcome.payout,
            stake: outcome.stake,
            risk: outcome.risk,
            server_seed_hash: fairness::server_seed_hash(&outcome.server_seed),
            server_seed: outcome.server_seed,
            client_seed: outcome.client_seed,
            nonce: outcome.nonce,
            balance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{LedgerError, SessionError, SweetFlipsError};

    fn service_with_balance(balance: u64) -> RoundService {
        let ledger = Arc::new(Ledger::open_in_memory().unwrap());
        ledger.create_user("player", balance).unwrap();
        RoundService::new(ledger, Arc::new(SessionStore::new()))
    }

    #[test]
    fn test_bet_debits_stake_and_hides_seed() {
        let service = service_with_balance(1000);
        let receipt = service
            .place_bet("player", 400, RiskTier::Medium, "seed", &Provenance::default())
            .unwrap();
        assert_eq!(receipt.balance, 600);
        assert_eq!(receipt.server_seed_hash.len(), 64);
        assert_eq!(service.ledger().balance("player").unwrap(), 600);
    }

    #[test]
    fn test_bet_rejected_when_stake_exceeds_balance() {
        let service = service_with_balance(100);
        let err = service
            .place_bet("player", 150, RiskTier::Low, "seed", &Provenance::default())
            .unwrap_err();
        assert!(matches!(
            err,
            SweetFlipsError::Ledger(LedgerError::InsufficientFunds { .. })
        ));
        // No session was opened and no audit row written.
        assert!(service.sessions().is_empty());
        assert_eq!(service.ledger().audit_count("player").unwrap(), 0);
    }

    #[test]
    fn test_bet_rejects_empty_client_seed() {
        let service = service_with_balance(1000);
        let err = service
            .place_bet("player", 100, RiskTier::Low, "   ", &Provenance::default())
            .unwrap_err();
        assert_eq!(err.reason_code(), "VALIDATION_FAILED");
        assert_eq!(service.ledger().balance("player").unwrap(), 1000);
    }

    #[test]
    fn test_bet_rejects_zero_stake() {
        let service = service_with_balance(1000);
        let err = service
            .place_bet("player", 0, RiskTier::Low, "seed", &Provenance::default())
            .unwrap_err();
        assert_eq!(err.reason_code(), "VALIDATION_FAILED");
    }

    #[test]
    fn test_settle_credits_payout_and_reveals_seed() {
        let service = service_with_balance(1000);
        let receipt = service
            .place_bet("player", 200, RiskTier::Low, "seed", &Provenance::default())
            .unwrap();

        let settled = service
            .settle(&receipt.session_id, "player", &Provenance::default())
            .unwrap();

        assert_eq!(settled.server_seed_hash, receipt.server_seed_hash);
        assert!(fairness::verify(
            &settled.server_seed,
            &settled.client_seed,
            settled.nonce,
            settled.position
        ));
        assert_eq!(
            settled.payout,
            fairness::compute_payout(settled.position, 200, RiskTier::Low)
        );
        assert_eq!(settled.balance, 800 + settled.payout);
    }

    #[test]
    fn test_double_settle_rejected() {
        let service = service_with_balance(1000);
        let receipt = service
            .place_bet("player", 100, RiskTier::Medium, "seed", &Provenance::default())
            .unwrap();
        service
            .settle(&receipt.session_id, "player", &Provenance::default())
            .unwrap();

        let err = service
            .settle(&receipt.session_id, "player", &Provenance::default())
            .unwrap_err();
        assert!(matches!(
            err,
            SweetFlipsError::Session(SessionError::NotFound)
        ));
    }

    #[test]
    fn test_settle_rejects_other_user() {
        let service = service_with_balance(1000);
        service.ledger().create_user("other", 0).unwrap();
        let receipt = service
            .place_bet("player", 100, RiskTier::Medium, "seed", &Provenance::default())
            .unwrap();

        let err = service
            .settle(&receipt.session_id, "other", &Provenance::default())
            .unwrap_err();
        assert_eq!(err.reason_code(), "SESSION_OWNERSHIP");
    }

    #[test]
    fn test_convert_credits_balance() {
        let service = service_with_balance(0);
        let balance = service
            .convert("player", 500, &Provenance::default())
            .unwrap();
        assert_eq!(balance, 500);
    }

    #[test]
    fn test_admin_adjust_signed() {
        let service = service_with_balance(100);
        let up = service
            .admin_adjust("player", 50, "admin-1", "goodwill", &Provenance::default())
            .unwrap();
        assert_eq!(up, 150);
        let down = service
            .admin_adjust("player", -150, "admin-1", "chargeback", &Provenance::default())
            .unwrap();
        assert_eq!(down, 0);
    }
}
