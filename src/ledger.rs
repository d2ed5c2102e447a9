//! Chip ledger and wager registration
//!
//! Every balance change is a single atomic adjustment against the store. There is
//! no read-then-write path: `debit` relies on the store rejecting an adjustment
//! that would go below zero.

use crate::audit::{self, AuditEvent, AuditKind};
use crate::common::traits::{CasOutcome, LedgerField, LedgerStore, VersionedRecord};
use crate::common::types::{GameType, Wager, WagerId, WagerStatus};
use crate::config::LimitsConfig;
use crate::errors::{CasinoError, CasinoResult, StoreError};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct WagerLedger {
    store: Arc<dyn LedgerStore>,
    limits: LimitsConfig,
}

fn to_delta(amount: u64) -> CasinoResult<i64> {
    i64::try_from(amount)
        .map_err(|_| CasinoError::InvalidBet(format!("amount {} is out of range", amount)))
}

impl WagerLedger {
    pub fn new(store: Arc<dyn LedgerStore>, limits: LimitsConfig) -> Self {
        Self { store, limits }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Remove `amount` chips; fails with `InsufficientFunds` and no effect if short
    pub async fn debit(&self, user: &str, amount: u64) -> CasinoResult<u64> {
        let delta = to_delta(amount)?;
        let balance = self
            .store
            .atomic_adjust(user, LedgerField::Chips, -delta)
            .await?;
        debug!(user, amount, balance, "Debited chips");
        Ok(balance as u64)
    }

    pub async fn credit(&self, user: &str, amount: u64) -> CasinoResult<u64> {
        let delta = to_delta(amount)?;
        let balance = self
            .store
            .atomic_adjust(user, LedgerField::Chips, delta)
            .await?;
        debug!(user, amount, balance, "Credited chips");
        Ok(balance as u64)
    }

    pub async fn get_balance(&self, user: &str) -> CasinoResult<u64> {
        let balance = self.store.get_value(user, LedgerField::Chips).await?;
        Ok(balance.max(0) as u64)
    }

    /// Reject zero, below-minimum and above-maximum bets before any mutation
    pub fn validate_bet(&self, amount: u64) -> CasinoResult<()> {
        if amount == 0 {
            return Err(CasinoError::InvalidBet("bet must be positive".to_string()));
        }
        if amount < self.limits.min_bet {
            return Err(CasinoError::InvalidBet(format!(
                "bet {} is below the minimum of {}",
                amount, self.limits.min_bet
            )));
        }
        if amount > self.limits.max_bet {
            return Err(CasinoError::InvalidBet(format!(
                "bet {} exceeds the maximum of {}",
                amount, self.limits.max_bet
            )));
        }
        Ok(())
    }

    /// Debit the stake and record a pending wager
    ///
    /// If the wager record cannot be written the debit is reversed, so chips are
    /// never left debited without a wager to settle.
    pub async fn register_wager(&self, user: &str, game: GameType, amount: u64) -> CasinoResult<Wager> {
        self.validate_bet(amount)?;
        self.debit(user, amount).await?;

        let wager = Wager::new(user, game, amount);
        let key = Wager::record_key(&wager.id);
        let inserted = match serde_json::to_vec(&wager) {
            Ok(data) => self.store.insert_if_absent(&key, data).await,
            Err(e) => Err(StoreError::from(e)),
        };

        match inserted {
            Ok(true) => {}
            Ok(false) => {
                self.compensate(user, amount, &wager.id).await;
                return Err(CasinoError::StoreUnavailable(format!(
                    "wager id collision on {}",
                    wager.id
                )));
            }
            Err(e) => {
                self.compensate(user, amount, &wager.id).await;
                return Err(e.into());
            }
        }

        audit::record(
            self.store.as_ref(),
            AuditEvent::new(user, AuditKind::WagerPlaced, -(amount as i64)).with_reference(wager.id),
        )
        .await;
        info!(user, wager_id = %wager.id, game = %game, amount, "Wager registered");
        Ok(wager)
    }

    async fn compensate(&self, user: &str, amount: u64, wager_id: &WagerId) {
        match self.credit(user, amount).await {
            Ok(_) => {
                warn!(user, wager_id = %wager_id, amount, "Wager record write failed, stake returned");
                audit::record(
                    self.store.as_ref(),
                    AuditEvent::new(user, AuditKind::WagerRefunded, amount as i64)
                        .with_reference(wager_id),
                )
                .await;
            }
            Err(e) => {
                error!(user, wager_id = %wager_id, amount, error = %e, "Failed to return stake after wager write failure");
            }
        }
    }

    /// Fetch a wager with its record version
    pub async fn load_wager(&self, id: &WagerId) -> CasinoResult<Option<(Wager, u64)>> {
        let key = Wager::record_key(id);
        match self.store.get_record(&key).await? {
            Some(VersionedRecord { version, data }) => {
                let wager: Wager = serde_json::from_slice(&data).map_err(|e| {
                    CasinoError::from(StoreError::CorruptedRecord {
                        key,
                        reason: e.to_string(),
                    })
                })?;
                Ok(Some((wager, version)))
            }
            None => Ok(None),
        }
    }

    /// Cancel a pending wager and return the full stake
    ///
    /// The record is swapped to `Settled` first so the stake can only come back
    /// once; if the credit then fails the record is reopened for a retry.
    pub async fn refund_wager(&self, id: &WagerId) -> CasinoResult<u64> {
        let (claimed, version) = self.claim_refund(id).await?;
        self.pay_refund(&claimed, version).await
    }

    /// Return the stake of a wager that never reached a game
    ///
    /// Used when the step after registration fails. If the wager record is
    /// unreachable the stake still goes back on the counter path and the record
    /// is left `Pending`; nothing else references it.
    pub async fn cancel_wager(&self, wager: &Wager) -> CasinoResult<u64> {
        match self.claim_refund(&wager.id).await {
            Ok((claimed, version)) => self.pay_refund(&claimed, version).await,
            Err(CasinoError::StoreUnavailable(reason)) => {
                warn!(
                    user = %wager.user,
                    wager_id = %wager.id,
                    reason = %reason,
                    "Wager record unreachable, returning stake directly"
                );
                let balance = self.credit(&wager.user, wager.amount).await?;
                audit::record(
                    self.store.as_ref(),
                    AuditEvent::new(&wager.user, AuditKind::WagerRefunded, wager.amount as i64)
                        .with_reference(wager.id),
                )
                .await;
                Ok(balance)
            }
            Err(e) => Err(e),
        }
    }

    /// Put a claimed wager back to `Pending`; false if the record could not be restored
    pub(crate) async fn reopen_wager(&self, wager: &Wager, claimed_version: u64) -> bool {
        let mut pending = wager.clone();
        pending.status = WagerStatus::Pending;
        pending.payout = None;
        pending.settled_at = None;

        let outcome = match serde_json::to_vec(&pending) {
            Ok(data) => {
                self.store
                    .compare_and_swap(&Wager::record_key(&wager.id), claimed_version, data)
                    .await
            }
            Err(e) => Err(StoreError::from(e)),
        };
        match outcome {
            Ok(CasOutcome::Swapped { .. }) => {
                warn!(user = %wager.user, wager_id = %wager.id, "Wager returned to pending");
                true
            }
            Ok(other) => {
                error!(wager_id = %wager.id, outcome = ?other, "Could not reopen wager");
                false
            }
            Err(e) => {
                error!(wager_id = %wager.id, error = %e, "Could not reopen wager");
                false
            }
        }
    }

    async fn claim_refund(&self, id: &WagerId) -> CasinoResult<(Wager, u64)> {
        let (mut wager, version) = self
            .load_wager(id)
            .await?
            .ok_or(CasinoError::UnknownWager(*id))?;
        if wager.is_settled() {
            return Err(CasinoError::AlreadySettled(*id));
        }

        wager.status = WagerStatus::Settled;
        wager.payout = Some(wager.amount);
        wager.settled_at = Some(Utc::now());
        let data = serde_json::to_vec(&wager).map_err(StoreError::from)?;

        match self
            .store
            .compare_and_swap(&Wager::record_key(id), version, data)
            .await?
        {
            CasOutcome::Swapped { new_version } => Ok((wager, new_version)),
            CasOutcome::VersionMismatch { .. } => Err(CasinoError::AlreadySettled(*id)),
            CasOutcome::Missing => Err(CasinoError::UnknownWager(*id)),
        }
    }

    async fn pay_refund(&self, claimed: &Wager, version: u64) -> CasinoResult<u64> {
        let balance = match self.credit(&claimed.user, claimed.amount).await {
            Ok(balance) => balance,
            Err(e) => {
                self.reopen_wager(claimed, version).await;
                return Err(e);
            }
        };
        audit::record(
            self.store.as_ref(),
            AuditEvent::new(&claimed.user, AuditKind::WagerRefunded, claimed.amount as i64)
                .with_reference(claimed.id),
        )
        .await;
        info!(user = %claimed.user, wager_id = %claimed.id, amount = claimed.amount, "Wager refunded");
        Ok(balance)
    }
}
