//! End-to-end round flow against a file-backed ledger.

use std::sync::Arc;
use std::time::Duration;
use sweetflips_core::{
    fairness,
    ledger::{Ledger, Provenance, TransactionKind},
    service::{RoundService, StakeLimits},
    session::SessionStore,
    RiskTier,
};
use tempfile::TempDir;

fn file_backed_service(initial_balance: u64) -> (RoundService, TempDir) {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(Ledger::open(dir.path().join("ledger.db")).unwrap());
    ledger.create_user("player", initial_balance).unwrap();
    let service = RoundService::new(ledger, Arc::new(SessionStore::new()));
    (service, dir)
}

#[test]
fn full_round_settles_and_verifies() {
    let (service, _dir) = file_backed_service(10_000);

    let receipt = service
        .place_bet("player", 4_000, RiskTier::Low, "my-seed", &Provenance::default())
        .unwrap();
    assert_eq!(receipt.balance, 6_000);

    let settled = service
        .settle(&receipt.session_id, "player", &Provenance::default())
        .unwrap();

    // The commitment shown at bet time matches the revealed seed.
    assert_eq!(
        fairness::server_seed_hash(&settled.server_seed),
        receipt.server_seed_hash
    );
    assert!(fairness::verify(
        &settled.server_seed,
        &settled.client_seed,
        settled.nonce,
        settled.position
    ));
    assert_eq!(settled.balance, 6_000 + settled.payout);
    assert_eq!(service.ledger().balance("player").unwrap(), settled.balance);
}

#[test]
fn over_debit_leaves_balance_and_audit_untouched() {
    let (service, _dir) = file_backed_service(100);

    let err = service
        .place_bet("player", 150, RiskTier::Medium, "seed", &Provenance::default())
        .unwrap_err();
    assert_eq!(err.reason_code(), "INSUFFICIENT_FUNDS");
    assert_eq!(service.ledger().balance("player").unwrap(), 100);
    assert_eq!(service.ledger().audit_count("player").unwrap(), 0);
    assert!(service.sessions().is_empty());
}

#[test]
fn audit_rows_chain_before_and_after_balances() {
    let (service, _dir) = file_backed_service(10_000);

    let receipt = service
        .place_bet("player", 1_000, RiskTier::High, "seed", &Provenance::default())
        .unwrap();
    let settled = service
        .settle(&receipt.session_id, "player", &Provenance::default())
        .unwrap();

    let records = service.ledger().audit_records("player", 10).unwrap();
    // Spend always writes one row; payout writes one more unless it was zero.
    let expected = if settled.payout > 0 { 2 } else { 1 };
    assert_eq!(records.len(), expected);

    // Newest first: each row's balance_before equals the next row's
    // balance_after.
    for pair in records.windows(2) {
        assert_eq!(pair[0].balance_before, pair[1].balance_after);
    }
    let oldest = records.last().unwrap();
    assert_eq!(oldest.kind, TransactionKind::Spend);
    assert_eq!(oldest.balance_before, 10_000);
    assert_eq!(oldest.balance_after, 9_000);
}

#[test]
fn double_settle_is_rejected() {
    let (service, _dir) = file_backed_service(1_000);

    let receipt = service
        .place_bet("player", 100, RiskTier::Low, "seed", &Provenance::default())
        .unwrap();
    let settled = service
        .settle(&receipt.session_id, "player", &Provenance::default())
        .unwrap();

    let err = service
        .settle(&receipt.session_id, "player", &Provenance::default())
        .unwrap_err();
    assert_eq!(err.reason_code(), "SESSION_NOT_FOUND");
    // The payout was credited exactly once.
    assert_eq!(
        service.ledger().balance("player").unwrap(),
        900 + settled.payout
    );
}

#[test]
fn expired_session_cannot_be_settled() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(Ledger::open(dir.path().join("ledger.db")).unwrap());
    ledger.create_user("player", 1_000).unwrap();
    let sessions = Arc::new(SessionStore::with_ttl(Duration::ZERO));
    let service = RoundService::new(ledger, sessions);

    let receipt = service
        .place_bet("player", 100, RiskTier::Medium, "seed", &Provenance::default())
        .unwrap();
    let err = service
        .settle(&receipt.session_id, "player", &Provenance::default())
        .unwrap_err();
    assert_eq!(err.reason_code(), "SESSION_NOT_FOUND");
    // The stake stays debited; expiry does not refund.
    assert_eq!(service.ledger().balance("player").unwrap(), 900);
}

#[test]
fn settlement_by_another_user_is_rejected() {
    let (service, _dir) = file_backed_service(1_000);
    service.ledger().create_user("intruder", 0).unwrap();

    let receipt = service
        .place_bet("player", 100, RiskTier::Low, "seed", &Provenance::default())
        .unwrap();

    let err = service
        .settle(&receipt.session_id, "intruder", &Provenance::default())
        .unwrap_err();
    assert_eq!(err.reason_code(), "SESSION_OWNERSHIP");

    // The rightful owner can still settle.
    assert!(service
        .settle(&receipt.session_id, "player", &Provenance::default())
        .is_ok());
}

#[test]
fn stake_limits_are_enforced() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(Ledger::open(dir.path().join("ledger.db")).unwrap());
    ledger.create_user("player", 100_000).unwrap();
    let service = RoundService::new(ledger, Arc::new(SessionStore::new()))
        .with_limits(StakeLimits { min: 100, max: 5_000 });

    for stake in [50, 5_001] {
        let err = service
            .place_bet("player", stake, RiskTier::Low, "seed", &Provenance::default())
            .unwrap_err();
        assert_eq!(err.reason_code(), "VALIDATION_FAILED");
    }
    assert!(service
        .place_bet("player", 100, RiskTier::Low, "seed", &Provenance::default())
        .is_ok());
}

#[test]
fn burst_of_transactions_gets_flagged() {
    let (service, _dir) = file_backed_service(100_000);

    for i in 0..11 {
        service
            .place_bet("player", 100 + i, RiskTier::Low, "seed", &Provenance::default())
            .unwrap();
    }

    let report = service
        .ledger()
        .check_suspicious_activity("player", TransactionKind::Spend, 100)
        .unwrap();
    assert!(report.suspicious);
}

#[test]
fn ledger_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.db");

    {
        let ledger = Ledger::open(&path).unwrap();
        ledger.create_user("player", 500).unwrap();
        ledger
            .apply_balance_change(
                "player",
                TransactionKind::Spend,
                200,
                serde_json::json!({}),
                &Provenance::default(),
            )
            .unwrap();
    }

    let reopened = Ledger::open(&path).unwrap();
    assert_eq!(reopened.balance("player").unwrap(), 300);
    assert_eq!(reopened.audit_count("player").unwrap(), 1);
}
