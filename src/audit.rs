//! Append-only audit trail
//!
//! Every ledger mutation made by the engine emits an `AuditEvent`. The store seals
//! each event into an `AuditEntry` whose hash covers the previous entry's hash, so
//! a tampered or dropped entry breaks the chain. Writes are fire-and-forget: a
//! failed append is logged and never fails the operation that produced it.

use crate::common::traits::LedgerStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

/// What kind of ledger movement an entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Deposit,
    WagerPlaced,
    WagerRefunded,
    Payout,
    Exchange,
}

/// Unsealed audit event produced by a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub user: String,
    pub kind: AuditKind,
    /// Signed chip movement (negative for debits)
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl AuditEvent {
    pub fn new(user: &str, kind: AuditKind, amount: i64) -> Self {
        Self {
            user: user.to_string(),
            kind,
            amount,
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl ToString) -> Self {
        self.reference = Some(reference.to_string());
        self
    }
}

/// Sealed, hash-chained audit entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuditEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    pub hash: String,
}

impl AuditEntry {
    /// Seal an event at `sequence`, chaining it to `prev_hash`
    pub fn seal(sequence: u64, prev_hash: Option<String>, event: AuditEvent) -> Self {
        let timestamp = Utc::now();
        let hash = compute_hash(sequence, &timestamp, &event, prev_hash.as_deref());
        Self {
            sequence,
            timestamp,
            event,
            prev_hash,
            hash,
        }
    }

    /// Recompute this entry's hash from its contents
    pub fn recompute_hash(&self) -> String {
        compute_hash(
            self.sequence,
            &self.timestamp,
            &self.event,
            self.prev_hash.as_deref(),
        )
    }
}

fn compute_hash(
    sequence: u64,
    timestamp: &DateTime<Utc>,
    event: &AuditEvent,
    prev_hash: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.unwrap_or("").as_bytes());
    hasher.update(sequence.to_be_bytes());
    hasher.update(timestamp.timestamp_micros().to_be_bytes());
    hasher.update(event.user.as_bytes());
    hasher.update([event.kind as u8]);
    hasher.update(event.amount.to_be_bytes());
    hasher.update(event.reference.as_deref().unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

/// Check that `entries` form an unbroken chain in sequence order
pub fn verify_chain(entries: &[AuditEntry]) -> bool {
    let mut prev: Option<&str> = None;
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 && entry.sequence != entries[i - 1].sequence + 1 {
            return false;
        }
        if entry.prev_hash.as_deref() != prev {
            return false;
        }
        if entry.recompute_hash() != entry.hash {
            return false;
        }
        prev = Some(entry.hash.as_str());
    }
    true
}

/// Append an event without letting audit failures surface to the caller
pub async fn record(store: &dyn LedgerStore, event: AuditEvent) {
    let user = event.user.clone();
    let kind = event.kind;
    if let Err(e) = store.append_log(event).await {
        warn!(user = %user, kind = ?kind, error = %e, "Audit log append failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(n: usize) -> Vec<AuditEntry> {
        let mut entries: Vec<AuditEntry> = Vec::new();
        for i in 0..n {
            let prev = entries.last().map(|e| e.hash.clone());
            let event = AuditEvent::new("alice", AuditKind::Payout, 10 * i as i64);
            entries.push(AuditEntry::seal(i as u64 + 1, prev, event));
        }
        entries
    }

    #[test]
    fn test_chain_verifies() {
        assert!(verify_chain(&chain(5)));
        assert!(verify_chain(&[]));
    }

    #[test]
    fn test_tampered_amount_breaks_chain() {
        let mut entries = chain(4);
        entries[2].event.amount = 1_000_000;
        assert!(!verify_chain(&entries));
    }

    #[test]
    fn test_dropped_entry_breaks_chain() {
        let mut entries = chain(4);
        entries.remove(1);
        assert!(!verify_chain(&entries));
    }
}
