//! Token ledger: atomic balance mutation with an append-only audit trail.
//!
//! Every change to a user's balance happens inside a single SQLite
//! transaction that re-reads the current balance, rejects overdrafts, writes
//! the new balance, and inserts exactly one audit record. Balance and audit
//! log are always consistent with each other: an audit write failure rolls
//! the balance change back too.
//!
//! Amounts are u64 token cents (100 cents = 1 token) everywhere; signed
//! arithmetic only appears where admin adjustments allow a negative delta.

use crate::errors::{LedgerError, SweetFlipsResult};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Mutex;

/// Kinds of balance-changing transactions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Loyalty points converted into tokens (credit).
    Convert,
    /// Tokens staked on a game round (debit).
    Spend,
    /// Winnings from a settled round (credit).
    Payout,
    /// Manual correction by an admin (signed).
    AdminAdjustment,
    /// Tokens spent in the shop (debit).
    Purchase,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Convert => "convert",
            TransactionKind::Spend => "spend",
            TransactionKind::Payout => "payout",
            TransactionKind::AdminAdjustment => "admin_adjustment",
            TransactionKind::Purchase => "purchase",
        }
    }

    fn from_str_lossy(s: &str) -> Self {
        match s {
            "convert" => TransactionKind::Convert,
            "spend" => TransactionKind::Spend,
            "payout" => TransactionKind::Payout,
            "purchase" => TransactionKind::Purchase,
            _ => TransactionKind::AdminAdjustment,
        }
    }

    /// Signed delta this kind applies for a given magnitude. Admin
    /// adjustments carry their own sign.
    fn signed_delta(&self, amount: i64) -> i64 {
        match self {
            TransactionKind::Convert | TransactionKind::Payout => amount,
            TransactionKind::Spend | TransactionKind::Purchase => -amount,
            TransactionKind::AdminAdjustment => amount,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Best-effort request provenance captured into the audit record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Provenance {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// One immutable audit row. Never updated or deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub user_id: String,
    pub kind: TransactionKind,
    /// Signed magnitude of the change (negative only for admin adjustments).
    pub amount: i64,
    pub balance_before: u64,
    pub balance_after: u64,
    pub metadata: serde_json::Value,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Advisory output of the anomaly heuristics. Never blocks an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspicionReport {
    pub suspicious: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SuspicionReport {
    fn clean() -> Self {
        Self {
            suspicious: false,
            reason: None,
        }
    }

    fn flagged(reason: impl Into<String>) -> Self {
        Self {
            suspicious: true,
            reason: Some(reason.into()),
        }
    }
}

/// Thresholds for the advisory anomaly heuristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspicionThresholds {
    /// More than this many transactions in the trailing hour gets flagged.
    pub max_hourly_transactions: u64,
    /// A single convert above this many token cents gets flagged.
    pub large_convert_cents: u64,
    /// More than this many identical (kind, amount) pairs per hour gets
    /// flagged.
    pub max_identical_transactions: u64,
}

impl Default for SuspicionThresholds {
    fn default() -> Self {
        Self {
            max_hourly_transactions: 10,
            large_convert_cents: 1_000_000, // 10,000 tokens
            max_identical_transactions: 3,
        }
    }
}

/// SQLite-backed ledger. The connection mutex serializes writers; SQLite
/// transactions provide the atomicity and rollback.
pub struct Ledger {
    conn: Mutex<Connection>,
    thresholds: SuspicionThresholds,
}

impl Ledger {
    /// Open (or create) the ledger database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> SweetFlipsResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory ledger, used by tests.
    pub fn open_in_memory() -> SweetFlipsResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> SweetFlipsResult<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            thresholds: SuspicionThresholds::default(),
        })
    }

    pub fn with_thresholds(mut self, thresholds: SuspicionThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Create a user row with an initial balance. No audit record: only
    /// balance *changes* are audited.
    pub fn create_user(&self, user_id: &str, initial_balance: u64) -> SweetFlipsResult<()> {
        // Balances are stored as signed integers; anything past i64::MAX
        // would wrap negative on insert.
        if initial_balance > i64::MAX as u64 {
            return Err(LedgerError::BalanceOverflow.into());
        }
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        conn.execute(
            "INSERT OR IGNORE INTO users (id, balance) VALUES (?1, ?2)",
            params![user_id, initial_balance as i64],
        )?;
        Ok(())
    }

    /// Current balance in token cents.
    pub fn balance(&self, user_id: &str) -> SweetFlipsResult<u64> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        let balance: Option<i64> = conn
            .query_row(
                "SELECT balance FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        balance
            .map(|b| b.max(0) as u64)
            .ok_or_else(|| LedgerError::UserNotFound(user_id.to_string()).into())
    }

    /// Apply a balance change atomically and record exactly one audit row.
    ///
    /// `amount` is the magnitude of the change in token cents; its sign is
    /// taken from the kind, except admin adjustments which pass a signed
    /// value. Returns the new balance. On any failure (unknown user,
    /// overdraft, audit write) nothing is persisted.
    pub fn apply_balance_change(
        &self,
        user_id: &str,
        kind: TransactionKind,
        amount: i64,
        metadata: serde_json::Value,
        provenance: &Provenance,
    ) -> SweetFlipsResult<u64> {
        if amount <= 0 && kind != TransactionKind::AdminAdjustment {
            return Err(LedgerError::NonPositiveAmount(kind.as_str()).into());
        }
        if amount == 0 {
            return Err(LedgerError::NonPositiveAmount(kind.as_str()).into());
        }

        let mut conn = self.conn.lock().expect("ledger mutex poisoned");
        let tx = conn.transaction()?;

        // Re-read inside the transaction so concurrent mutations cannot be
        // lost.
        let balance_before: i64 = tx
            .query_row(
                "SELECT balance FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| LedgerError::UserNotFound(user_id.to_string()))?;

        let delta = kind.signed_delta(amount);
        // Checked addition so a credit near i64::MAX rolls back instead of
        // wrapping.
        let balance_after = balance_before
            .checked_add(delta)
            .ok_or(LedgerError::BalanceOverflow)?;
        if balance_after < 0 {
            // Dropping the transaction rolls it back; nothing is visible.
            return Err(LedgerError::InsufficientFunds {
                balance: balance_before.max(0) as u64,
                requested: amount.unsigned_abs(),
            }
            .into());
        }

        tx.execute(
            "UPDATE users SET balance = ?1 WHERE id = ?2",
            params![balance_after, user_id],
        )?;
        tx.execute(
            "INSERT INTO audit_log \
             (user_id, kind, amount, balance_before, balance_after, metadata, ip, user_agent, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                user_id,
                kind.as_str(),
                amount,
                balance_before,
                balance_after,
                metadata.to_string(),
                provenance.ip,
                provenance.user_agent,
                timestamp_now(),
            ],
        )?;
        tx.commit()?;

        Ok(balance_after as u64)
    }

    /// Heuristic anomaly check, advisory only. Run after a mutation so the
    /// trailing-hour counts include it; callers log the report and proceed
    /// regardless.
    pub fn check_suspicious_activity(
        &self,
        user_id: &str,
        kind: TransactionKind,
        amount: i64,
    ) -> SweetFlipsResult<SuspicionReport> {
        let cutoff = hour_cutoff();
        let conn = self.conn.lock().expect("ledger mutex poisoned");

        let hourly: u64 = conn.query_row(
            "SELECT COUNT(*) FROM audit_log WHERE user_id = ?1 AND created_at >= ?2",
            params![user_id, cutoff],
            |row| row.get::<_, i64>(0).map(|c| c as u64),
        )?;
        if hourly > self.thresholds.max_hourly_transactions {
            return Ok(SuspicionReport::flagged(format!(
                "{} transactions in the last hour (limit {})",
                hourly, self.thresholds.max_hourly_transactions
            )));
        }

        if kind == TransactionKind::Convert
            && amount.unsigned_abs() > self.thresholds.large_convert_cents
        {
            return Ok(SuspicionReport::flagged(format!(
                "convert of {} cents exceeds threshold {}",
                amount, self.thresholds.large_convert_cents
            )));
        }

        let identical: u64 = conn.query_row(
            "SELECT COUNT(*) FROM audit_log \
             WHERE user_id = ?1 AND kind = ?2 AND amount = ?3 AND created_at >= ?4",
            params![user_id, kind.as_str(), amount, cutoff],
            |row| row.get::<_, i64>(0).map(|c| c as u64),
        )?;
        if identical > self.thresholds.max_identical_transactions {
            return Ok(SuspicionReport::flagged(format!(
                "{} identical {} transactions of {} cents in the last hour",
                identical,
                kind.as_str(),
                amount
            )));
        }

        Ok(SuspicionReport::clean())
    }

    /// Most recent audit records for a user, newest first.
    pub fn audit_records(&self, user_id: &str, limit: usize) -> SweetFlipsResult<Vec<AuditRecord>> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, user_id, kind, amount, balance_before, balance_after, \
                    metadata, ip, user_agent, created_at \
             FROM audit_log WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit as i64], row_to_audit_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Total audit rows written for a user.
    pub fn audit_count(&self, user_id: &str) -> SweetFlipsResult<u64> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM audit_log WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
             id TEXT PRIMARY KEY,
             balance INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS audit_log (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             user_id TEXT NOT NULL,
             kind TEXT NOT NULL,
             amount INTEGER NOT NULL,
             balance_before INTEGER NOT NULL,
             balance_after INTEGER NOT NULL,
             metadata TEXT NOT NULL,
             ip TEXT,
             user_agent TEXT,
             created_at TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_audit_user_time
             ON audit_log (user_id, created_at);",
    )
}

fn row_to_audit_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRecord> {
    let kind: String = row.get(2)?;
    let metadata: String = row.get(6)?;
    let created_at: String = row.get(9)?;
    Ok(AuditRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: TransactionKind::from_str_lossy(&kind),
        amount: row.get(3)?,
        balance_before: row.get::<_, i64>(4)?.max(0) as u64,
        balance_after: row.get::<_, i64>(5)?.max(0) as u64,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
        ip: row.get(7)?,
        user_agent: row.get(8)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

/// Fixed-width RFC 3339 UTC timestamps so lexicographic comparison in SQL
/// matches chronological order.
fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn hour_cutoff() -> String {
    (Utc::now() - chrono::Duration::hours(1)).to_rfc3339_opts(SecondsFormat::Micros, true)
}
