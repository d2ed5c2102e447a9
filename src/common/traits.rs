//! Shared traits and interfaces
//!
//! The engine consumes persistence only through `LedgerStore`, so any backend
//! that offers atomic per-user counters and versioned records can host it.

use crate::audit::{AuditEntry, AuditEvent};
use crate::errors::StoreResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-user numeric fields kept by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerField {
    Chips,
    Currency,
    GamesPlayed,
    TotalBets,
    Winnings,
    Losses,
    GamesWon,
    GamesLost,
    ConsecutiveLosses,
}

impl LedgerField {
    pub const COUNT: usize = 9;

    pub const ALL: [LedgerField; Self::COUNT] = [
        LedgerField::Chips,
        LedgerField::Currency,
        LedgerField::GamesPlayed,
        LedgerField::TotalBets,
        LedgerField::Winnings,
        LedgerField::Losses,
        LedgerField::GamesWon,
        LedgerField::GamesLost,
        LedgerField::ConsecutiveLosses,
    ];

    pub fn index(&self) -> usize {
        match self {
            LedgerField::Chips => 0,
            LedgerField::Currency => 1,
            LedgerField::GamesPlayed => 2,
            LedgerField::TotalBets => 3,
            LedgerField::Winnings => 4,
            LedgerField::Losses => 5,
            LedgerField::GamesWon => 6,
            LedgerField::GamesLost => 7,
            LedgerField::ConsecutiveLosses => 8,
        }
    }
}

impl fmt::Display for LedgerField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LedgerField::Chips => "chips",
            LedgerField::Currency => "currency",
            LedgerField::GamesPlayed => "games_played",
            LedgerField::TotalBets => "total_bets",
            LedgerField::Winnings => "winnings",
            LedgerField::Losses => "losses",
            LedgerField::GamesWon => "games_won",
            LedgerField::GamesLost => "games_lost",
            LedgerField::ConsecutiveLosses => "consecutive_losses",
        };
        write!(f, "{}", name)
    }
}

/// One step of an all-or-nothing batch against a single user's fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOp {
    Add(LedgerField, i64),
    Set(LedgerField, i64),
}

impl LedgerOp {
    pub fn field(&self) -> LedgerField {
        match self {
            LedgerOp::Add(field, _) | LedgerOp::Set(field, _) => *field,
        }
    }
}

/// Versioned opaque record used for compare-and-swap status transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedRecord {
    pub version: u64,
    pub data: Vec<u8>,
}

/// Outcome of a compare-and-swap attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    Swapped { new_version: u64 },
    VersionMismatch { current: u64 },
    Missing,
}

impl CasOutcome {
    pub fn is_swapped(&self) -> bool {
        matches!(self, CasOutcome::Swapped { .. })
    }
}

/// Persistent ledger store consumed by the engine
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Atomically add `delta` to a field and return the new value
    async fn atomic_adjust(&self, user: &str, field: LedgerField, delta: i64) -> StoreResult<i64>;

    /// Apply a batch of ops to one user atomically; returns the post-batch values in op order
    async fn apply(&self, user: &str, ops: &[LedgerOp]) -> StoreResult<Vec<i64>>;

    /// Read the current value of a field (0 if never written)
    async fn get_value(&self, user: &str, field: LedgerField) -> StoreResult<i64>;

    /// Read a versioned record
    async fn get_record(&self, key: &str) -> StoreResult<Option<VersionedRecord>>;

    /// Insert a record at version 1 unless the key exists; true when inserted
    async fn insert_if_absent(&self, key: &str, data: Vec<u8>) -> StoreResult<bool>;

    /// Replace a record only if it is still at `expected_version`
    async fn compare_and_swap(
        &self,
        key: &str,
        expected_version: u64,
        data: Vec<u8>,
    ) -> StoreResult<CasOutcome>;

    /// Delete a record only if it is still at `expected_version`; true when removed
    async fn remove_if_version(&self, key: &str, expected_version: u64) -> StoreResult<bool>;

    /// List records whose key starts with `prefix`
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, VersionedRecord)>>;

    /// Append an event to the audit trail; the store assigns sequence and chain hash
    async fn append_log(&self, event: AuditEvent) -> StoreResult<AuditEntry>;
}
