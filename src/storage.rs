//! In-memory ledger store backed by `DashMap`
//!
//! Each user's counters live in a single map entry, so every adjustment and every
//! batch runs under that entry's shard lock and can never interleave with another
//! write for the same user. Records carry a version for compare-and-swap.

use crate::{
    audit::{AuditEntry, AuditEvent},
    common::traits::{CasOutcome, LedgerField, LedgerOp, LedgerStore, VersionedRecord},
    errors::{StoreError, StoreResult},
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};
use tracing::trace;

type Counters = [i64; LedgerField::COUNT];

/// Concurrent in-process implementation of `LedgerStore`
pub struct InMemoryLedgerStore {
    accounts: DashMap<String, Counters>,
    records: DashMap<String, VersionedRecord>,
    audit_log: Mutex<Vec<AuditEntry>>,
    counters_available: AtomicBool,
    records_available: AtomicBool,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            records: DashMap::new(),
            audit_log: Mutex::new(Vec::new()),
            counters_available: AtomicBool::new(true),
            records_available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage of the counter half of the store
    pub fn set_counters_available(&self, available: bool) {
        self.counters_available.store(available, Ordering::SeqCst);
    }

    /// Simulate an outage of the record half of the store
    pub fn set_records_available(&self, available: bool) {
        self.records_available.store(available, Ordering::SeqCst);
    }

    /// Snapshot of the audit trail in sequence order
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        match self.audit_log.lock() {
            Ok(log) => log.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of users with at least one counter written
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    fn check_counters(&self) -> StoreResult<()> {
        if self.counters_available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("ledger counters offline".to_string()))
        }
    }

    fn check_records(&self) -> StoreResult<()> {
        if self.records_available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("record store offline".to_string()))
        }
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `ops` to a copy of `counters`; the caller commits only on success
fn apply_ops(counters: &Counters, ops: &[LedgerOp]) -> StoreResult<(Counters, Vec<i64>)> {
    let mut next = *counters;
    let mut results = Vec::with_capacity(ops.len());

    for op in ops {
        let field = op.field();
        let slot = &mut next[field.index()];
        let value = match *op {
            LedgerOp::Add(_, delta) => slot
                .checked_add(delta)
                .ok_or(StoreError::Overflow(field))?,
            LedgerOp::Set(_, value) => value,
        };
        if value < 0 {
            let delta = match *op {
                LedgerOp::Add(_, delta) => delta,
                LedgerOp::Set(_, value) => value - *slot,
            };
            return Err(StoreError::Underflow {
                field,
                current: *slot,
                delta,
            });
        }
        *slot = value;
        results.push(value);
    }

    Ok((next, results))
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn atomic_adjust(&self, user: &str, field: LedgerField, delta: i64) -> StoreResult<i64> {
        let values = self.apply(user, &[LedgerOp::Add(field, delta)]).await?;
        Ok(values[0])
    }

    async fn apply(&self, user: &str, ops: &[LedgerOp]) -> StoreResult<Vec<i64>> {
        self.check_counters()?;

        let mut entry = self
            .accounts
            .entry(user.to_string())
            .or_insert([0; LedgerField::COUNT]);
        let (next, results) = apply_ops(entry.value(), ops)?;
        *entry.value_mut() = next;

        trace!(user, ops = ops.len(), "Applied ledger batch");
        Ok(results)
    }

    async fn get_value(&self, user: &str, field: LedgerField) -> StoreResult<i64> {
        self.check_counters()?;
        Ok(self
            .accounts
            .get(user)
            .map(|counters| counters[field.index()])
            .unwrap_or(0))
    }

    async fn get_record(&self, key: &str) -> StoreResult<Option<VersionedRecord>> {
        self.check_records()?;
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn insert_if_absent(&self, key: &str, data: Vec<u8>) -> StoreResult<bool> {
        self.check_records()?;
        match self.records.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(VersionedRecord { version: 1, data });
                Ok(true)
            }
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected_version: u64,
        data: Vec<u8>,
    ) -> StoreResult<CasOutcome> {
        self.check_records()?;
        let Some(mut record) = self.records.get_mut(key) else {
            return Ok(CasOutcome::Missing);
        };
        if record.version != expected_version {
            return Ok(CasOutcome::VersionMismatch {
                current: record.version,
            });
        }
        record.version += 1;
        record.data = data;
        Ok(CasOutcome::Swapped {
            new_version: record.version,
        })
    }

    async fn remove_if_version(&self, key: &str, expected_version: u64) -> StoreResult<bool> {
        self.check_records()?;
        Ok(self
            .records
            .remove_if(key, |_, record| record.version == expected_version)
            .is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, VersionedRecord)>> {
        self.check_records()?;
        let mut rows: Vec<(String, VersionedRecord)> = self
            .records
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows)
    }

    async fn append_log(&self, event: AuditEvent) -> StoreResult<AuditEntry> {
        let mut log = self
            .audit_log
            .lock()
            .map_err(|_| StoreError::Unavailable("audit log poisoned".to_string()))?;
        let prev_hash = log.last().map(|e| e.hash.clone());
        let sequence = log.len() as u64 + 1;
        let entry = AuditEntry::seal(sequence, prev_hash, event);
        log.push(entry.clone());
        Ok(entry)
    }
}

/// Store wrapper with scripted failures, for exercising recovery paths
#[cfg(test)]
pub(crate) mod faults {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct Script {
        failing_batches: usize,
        failing_inserts: Vec<String>,
        failing_reads: Vec<String>,
        /// Key prefix and the swaps still allowed before swaps start failing
        failing_swaps: Option<(String, usize)>,
    }

    pub(crate) struct FaultyStore {
        inner: Arc<InMemoryLedgerStore>,
        script: Mutex<Script>,
    }

    fn scripted(what: &str) -> StoreError {
        StoreError::Unavailable(format!("scripted {} failure", what))
    }

    impl FaultyStore {
        pub(crate) fn new(inner: Arc<InMemoryLedgerStore>) -> Self {
            Self {
                inner,
                script: Mutex::new(Script::default()),
            }
        }

        /// The next `n` counter writes fail
        pub(crate) fn fail_next_batches(&self, n: usize) {
            self.script.lock().unwrap().failing_batches = n;
        }

        pub(crate) fn fail_inserts(&self, prefix: &str) {
            self.script.lock().unwrap().failing_inserts.push(prefix.to_string());
        }

        pub(crate) fn fail_reads(&self, prefix: &str) {
            self.script.lock().unwrap().failing_reads.push(prefix.to_string());
        }

        /// Let `allowed` more swaps under `prefix` through, then fail the rest
        pub(crate) fn fail_swaps_after(&self, prefix: &str, allowed: usize) {
            self.script.lock().unwrap().failing_swaps = Some((prefix.to_string(), allowed));
        }

        pub(crate) fn heal(&self) {
            *self.script.lock().unwrap() = Script::default();
        }

        fn check_batch(&self) -> StoreResult<()> {
            let mut script = self.script.lock().unwrap();
            if script.failing_batches > 0 {
                script.failing_batches -= 1;
                return Err(scripted("batch"));
            }
            Ok(())
        }

        fn check_prefix(prefixes: &[String], key: &str, what: &str) -> StoreResult<()> {
            if prefixes.iter().any(|p| key.starts_with(p.as_str())) {
                return Err(scripted(what));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl LedgerStore for FaultyStore {
        async fn atomic_adjust(&self, user: &str, field: LedgerField, delta: i64) -> StoreResult<i64> {
            self.check_batch()?;
            self.inner.atomic_adjust(user, field, delta).await
        }

        async fn apply(&self, user: &str, ops: &[LedgerOp]) -> StoreResult<Vec<i64>> {
            self.check_batch()?;
            self.inner.apply(user, ops).await
        }

        async fn get_value(&self, user: &str, field: LedgerField) -> StoreResult<i64> {
            self.inner.get_value(user, field).await
        }

        async fn get_record(&self, key: &str) -> StoreResult<Option<VersionedRecord>> {
            Self::check_prefix(&self.script.lock().unwrap().failing_reads, key, "read")?;
            self.inner.get_record(key).await
        }

        async fn insert_if_absent(&self, key: &str, data: Vec<u8>) -> StoreResult<bool> {
            Self::check_prefix(&self.script.lock().unwrap().failing_inserts, key, "insert")?;
            self.inner.insert_if_absent(key, data).await
        }

        async fn compare_and_swap(
            &self,
            key: &str,
            expected_version: u64,
            data: Vec<u8>,
        ) -> StoreResult<CasOutcome> {
            {
                let mut script = self.script.lock().unwrap();
                if let Some((prefix, allowed)) = script.failing_swaps.as_mut() {
                    if key.starts_with(prefix.as_str()) {
                        if *allowed == 0 {
                            return Err(scripted("swap"));
                        }
                        *allowed -= 1;
                    }
                }
            }
            self.inner.compare_and_swap(key, expected_version, data).await
        }

        async fn remove_if_version(&self, key: &str, expected_version: u64) -> StoreResult<bool> {
            self.inner.remove_if_version(key, expected_version).await
        }

        async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, VersionedRecord)>> {
            self.inner.scan_prefix(prefix).await
        }

        async fn append_log(&self, event: AuditEvent) -> StoreResult<AuditEntry> {
            self.inner.append_log(event).await
        }
    }
}
