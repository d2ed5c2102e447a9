//! Turning outcomes into ledger credits, exactly once per wager
//!
//! Settlement first claims the wager by swapping its record from `Pending` to
//! `Settled` (with the payout attached). Only the caller that wins that swap moves
//! chips, in one batch together with statistics and the pity counter. If the batch
//! fails the claim is swapped back so a retry can settle the same wager; if that
//! swap fails as well the batch itself is retried.

use crate::audit::{self, AuditEvent, AuditKind};
use crate::common::traits::{CasOutcome, LedgerField, LedgerOp, LedgerStore};
use crate::common::types::{GameType, Multiplier, UserId, Wager, WagerId, WagerStatus};
use crate::errors::{CasinoError, CasinoResult, StoreError};
use crate::games::GameOutcome;
use crate::ledger::WagerLedger;
use crate::pity::PityOddsTracker;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Bonus owned by another subsystem (VIP tiers, boosts), applied to wins only
pub trait PayoutModifier: Send + Sync {
    fn name(&self) -> &str;

    fn adjust(&self, user: &str, game: GameType, multiplier: Multiplier) -> Multiplier;
}

/// Leaves multipliers unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct NoModifier;

impl PayoutModifier for NoModifier {
    fn name(&self) -> &str {
        "none"
    }

    fn adjust(&self, _user: &str, _game: GameType, multiplier: Multiplier) -> Multiplier {
        multiplier
    }
}

/// Adds a fixed amount to every winning multiplier
#[derive(Debug, Clone, Copy)]
pub struct FlatBoost {
    pub bonus: Multiplier,
}

impl PayoutModifier for FlatBoost {
    fn name(&self) -> &str {
        "flat_boost"
    }

    fn adjust(&self, _user: &str, _game: GameType, multiplier: Multiplier) -> Multiplier {
        multiplier.saturating_add(self.bonus)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub wager_id: WagerId,
    pub user: UserId,
    pub game: GameType,
    pub bet: u64,
    pub base_multiplier: Multiplier,
    pub pity_bonus: Multiplier,
    pub effective_multiplier: Multiplier,
    pub result: GameOutcome,
    pub payout: u64,
    pub balance: u64,
}

pub struct SettlementService {
    store: Arc<dyn LedgerStore>,
    ledger: Arc<WagerLedger>,
    pity: Arc<PityOddsTracker>,
}

/// Claim attempts before giving up on a record that keeps changing
const MAX_CLAIM_ATTEMPTS: usize = 3;

/// Batch attempts for a claim that could not be released
const MAX_BATCH_ATTEMPTS: u32 = 5;
const BATCH_RETRY_BACKOFF: Duration = Duration::from_millis(20);

impl SettlementService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        ledger: Arc<WagerLedger>,
        pity: Arc<PityOddsTracker>,
    ) -> Self {
        Self { store, ledger, pity }
    }

    /// Settle `wager_id` at `base_multiplier`
    ///
    /// A second call for the same wager fails with `AlreadySettled` and moves no
    /// chips; callers treat that as a no-op.
    pub async fn settle(
        &self,
        wager_id: &WagerId,
        base_multiplier: Multiplier,
        modifier: &dyn PayoutModifier,
    ) -> CasinoResult<SettlementReceipt> {
        let (wager, version) = self
            .ledger
            .load_wager(wager_id)
            .await?
            .ok_or(CasinoError::UnknownWager(*wager_id))?;
        if wager.is_settled() {
            debug!(wager_id = %wager_id, "Wager already settled");
            return Err(CasinoError::AlreadySettled(*wager_id));
        }

        let result = GameOutcome::classify(base_multiplier);
        let (pity_bonus, effective) = if result == GameOutcome::Win {
            let bonus = self.pity.current_bonus(&wager.user).await?;
            let boosted = modifier.adjust(&wager.user, wager.game, base_multiplier);
            (bonus, boosted.saturating_add(bonus))
        } else {
            (Multiplier::ZERO, base_multiplier)
        };
        let payout = effective.apply(wager.amount);

        let claimed_version = self.claim(wager.clone(), version, payout).await?;

        let ops = Self::settlement_ops(&wager, result, payout);
        let values = self
            .apply_claimed(&wager, &ops, claimed_version, payout)
            .await?;
        let balance = values.first().copied().unwrap_or(0).max(0) as u64;

        if payout > 0 {
            audit::record(
                self.store.as_ref(),
                AuditEvent::new(&wager.user, AuditKind::Payout, payout as i64).with_reference(wager_id),
            )
            .await;
        }

        info!(
            user = %wager.user,
            wager_id = %wager_id,
            game = %wager.game,
            bet = wager.amount,
            multiplier = %effective,
            pity_bonus = %pity_bonus,
            modifier = modifier.name(),
            result = %result,
            payout,
            "Wager settled"
        );

        Ok(SettlementReceipt {
            wager_id: *wager_id,
            user: wager.user,
            game: wager.game,
            bet: wager.amount,
            base_multiplier,
            pity_bonus,
            effective_multiplier: effective,
            result,
            payout,
            balance,
        })
    }

    /// The chip credit always comes first so the batch's first value is the new balance
    fn settlement_ops(wager: &Wager, result: GameOutcome, payout: u64) -> Vec<LedgerOp> {
        let bet = wager.amount as i64;
        let paid = payout as i64;
        let mut ops = Vec::with_capacity(6);

        ops.push(LedgerOp::Add(LedgerField::Chips, paid));
        ops.push(LedgerOp::Add(LedgerField::GamesPlayed, 1));
        ops.push(LedgerOp::Add(LedgerField::TotalBets, bet));
        match result {
            GameOutcome::Win => {
                ops.push(LedgerOp::Add(LedgerField::Winnings, paid - bet));
                ops.push(LedgerOp::Add(LedgerField::GamesWon, 1));
            }
            GameOutcome::Loss => {
                ops.push(LedgerOp::Add(LedgerField::Losses, bet - paid));
                ops.push(LedgerOp::Add(LedgerField::GamesLost, 1));
            }
            GameOutcome::Push => {}
        }
        if let Some(op) = PityOddsTracker::op_for(result) {
            ops.push(op);
        }
        ops
    }

    /// Swap the record to `Settled`; only one caller can succeed per wager
    async fn claim(&self, mut wager: Wager, mut version: u64, payout: u64) -> CasinoResult<u64> {
        let key = Wager::record_key(&wager.id);
        for _ in 0..MAX_CLAIM_ATTEMPTS {
            wager.status = WagerStatus::Settled;
            wager.payout = Some(payout);
            wager.settled_at = Some(Utc::now());
            let data = serde_json::to_vec(&wager).map_err(StoreError::from)?;

            match self.store.compare_and_swap(&key, version, data).await? {
                CasOutcome::Swapped { new_version } => return Ok(new_version),
                CasOutcome::Missing => return Err(CasinoError::UnknownWager(wager.id)),
                CasOutcome::VersionMismatch { .. } => {
                    let (current, current_version) = self
                        .ledger
                        .load_wager(&wager.id)
                        .await?
                        .ok_or(CasinoError::UnknownWager(wager.id))?;
                    if current.is_settled() {
                        return Err(CasinoError::AlreadySettled(wager.id));
                    }
                    wager = current;
                    version = current_version;
                }
            }
        }
        Err(CasinoError::StoreUnavailable(format!(
            "wager {} kept changing during settlement",
            wager.id
        )))
    }

    /// Land the ledger batch for a claimed wager
    ///
    /// A failed batch releases the claim so the wager can be settled again. While
    /// the claim cannot be released the batch is retried instead, because the
    /// record already reads `Settled` and no other caller would pay it.
    async fn apply_claimed(
        &self,
        wager: &Wager,
        ops: &[LedgerOp],
        claimed_version: u64,
        payout: u64,
    ) -> CasinoResult<Vec<i64>> {
        let mut attempt: u32 = 0;
        loop {
            let err = match self.store.apply(&wager.user, ops).await {
                Ok(values) => return Ok(values),
                Err(e) => e,
            };
            if self.ledger.reopen_wager(wager, claimed_version).await {
                return Err(err.into());
            }

            attempt += 1;
            if attempt >= MAX_BATCH_ATTEMPTS {
                error!(
                    user = %wager.user,
                    wager_id = %wager.id,
                    payout,
                    error = %err,
                    "Wager claimed but unpaid; payout is recorded on the wager for reconciliation"
                );
                return Err(err.into());
            }
            warn!(wager_id = %wager.id, attempt, error = %err, "Retrying ledger batch for claimed wager");
            tokio::time::sleep(BATCH_RETRY_BACKOFF * attempt).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LimitsConfig, PityConfig};
    use crate::storage::faults::FaultyStore;
    use crate::storage::InMemoryLedgerStore;

    struct Fixture {
        store: Arc<InMemoryLedgerStore>,
        ledger: Arc<WagerLedger>,
        service: SettlementService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryLedgerStore::new());
        let ledger = Arc::new(WagerLedger::new(store.clone(), LimitsConfig::default()));
        let pity = Arc::new(PityOddsTracker::new(store.clone(), PityConfig::default()));
        let service = SettlementService::new(store.clone(), ledger.clone(), pity);
        Fixture {
            store,
            ledger,
            service,
        }
    }

    #[tokio::test]
    async fn test_settle_once() {
        let f = fixture();
        f.ledger.credit("alice", 500).await.unwrap();
        let wager = f.ledger.register_wager("alice", GameType::Dice, 50).await.unwrap();

        let receipt = f
            .service
            .settle(&wager.id, Multiplier::from_hundredths(400), &NoModifier)
            .await
            .unwrap();
        assert_eq!(receipt.payout, 200);
        assert_eq!(receipt.balance, 650);

        let again = f
            .service
            .settle(&wager.id, Multiplier::from_hundredths(400), &NoModifier)
            .await;
        assert!(matches!(again, Err(CasinoError::AlreadySettled(_))));
        assert_eq!(f.ledger.get_balance("alice").await.unwrap(), 650);
    }

    #[tokio::test]
    async fn test_concurrent_settlement_pays_once() {
        let f = Arc::new(fixture());
        f.ledger.credit("bob", 100).await.unwrap();
        let wager = f.ledger.register_wager("bob", GameType::Slots, 100).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let f = Arc::clone(&f);
            let id = wager.id;
            handles.push(tokio::spawn(async move {
                f.service
                    .settle(&id, Multiplier::from_hundredths(300), &NoModifier)
                    .await
            }));
        }
        let mut paid = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                paid += 1;
            }
        }
        assert_eq!(paid, 1);
        assert_eq!(f.ledger.get_balance("bob").await.unwrap(), 300);
    }

    #[tokio::test]
    async fn test_unknown_wager_is_benign() {
        let f = fixture();
        let err = f
            .service
            .settle(&WagerId::new(), Multiplier::ONE, &NoModifier)
            .await
            .unwrap_err();
        assert!(err.is_benign());
    }

    #[tokio::test]
    async fn test_statistics_and_pity() {
        let f = fixture();
        f.ledger.credit("carol", 1000).await.unwrap();

        let lost = f.ledger.register_wager("carol", GameType::Roulette, 100).await.unwrap();
        f.service.settle(&lost.id, Multiplier::ZERO, &NoModifier).await.unwrap();
        let pushed = f.ledger.register_wager("carol", GameType::Blackjack, 100).await.unwrap();
        f.service.settle(&pushed.id, Multiplier::ONE, &NoModifier).await.unwrap();

        let store = f.store.as_ref();
        assert_eq!(store.get_value("carol", LedgerField::GamesPlayed).await.unwrap(), 2);
        assert_eq!(store.get_value("carol", LedgerField::TotalBets).await.unwrap(), 200);
        assert_eq!(store.get_value("carol", LedgerField::Losses).await.unwrap(), 100);
        assert_eq!(store.get_value("carol", LedgerField::GamesLost).await.unwrap(), 1);
        assert_eq!(store.get_value("carol", LedgerField::ConsecutiveLosses).await.unwrap(), 1);

        let won = f.ledger.register_wager("carol", GameType::Dice, 100).await.unwrap();
        let receipt = f
            .service
            .settle(&won.id, Multiplier::from_hundredths(200), &NoModifier)
            .await
            .unwrap();
        assert_eq!(receipt.pity_bonus.hundredths(), 5);
        assert_eq!(receipt.payout, 205);
        assert_eq!(store.get_value("carol", LedgerField::Winnings).await.unwrap(), 105);
        assert_eq!(store.get_value("carol", LedgerField::ConsecutiveLosses).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_modifier_applies_to_wins_only() {
        let f = fixture();
        f.ledger.credit("dave", 1000).await.unwrap();
        let boost = FlatBoost {
            bonus: Multiplier::from_hundredths(10),
        };

        let win = f.ledger.register_wager("dave", GameType::Dice, 100).await.unwrap();
        let receipt = f
            .service
            .settle(&win.id, Multiplier::from_hundredths(400), &boost)
            .await
            .unwrap();
        assert_eq!(receipt.payout, 410);

        let surrender = f.ledger.register_wager("dave", GameType::Blackjack, 100).await.unwrap();
        let receipt = f
            .service
            .settle(&surrender.id, Multiplier::from_hundredths(50), &boost)
            .await
            .unwrap();
        assert_eq!(receipt.payout, 50);
        assert_eq!(receipt.result, GameOutcome::Loss);
    }

    #[tokio::test]
    async fn test_failed_batch_can_be_retried() {
        let f = fixture();
        f.ledger.credit("erin", 100).await.unwrap();
        let wager = f.ledger.register_wager("erin", GameType::Blackjack, 100).await.unwrap();

        f.store.set_counters_available(false);
        let err = f
            .service
            .settle(&wager.id, Multiplier::from_hundredths(50), &NoModifier)
            .await
            .unwrap_err();
        assert!(matches!(err, CasinoError::StoreUnavailable(_)));
        let (pending, _) = f.ledger.load_wager(&wager.id).await.unwrap().unwrap();
        assert_eq!(pending.status, WagerStatus::Pending);

        f.store.set_counters_available(true);
        let receipt = f
            .service
            .settle(&wager.id, Multiplier::from_hundredths(50), &NoModifier)
            .await
            .unwrap();
        assert_eq!(receipt.balance, 50);
    }

    #[tokio::test]
    async fn test_unreleasable_claim_retries_batch() {
        let store = Arc::new(FaultyStore::new(Arc::new(InMemoryLedgerStore::new())));
        let ledger = Arc::new(WagerLedger::new(store.clone(), LimitsConfig::default()));
        let pity = Arc::new(PityOddsTracker::new(store.clone(), PityConfig::default()));
        let service = SettlementService::new(store.clone(), ledger.clone(), pity);

        ledger.credit("fay", 100).await.unwrap();
        let wager = ledger.register_wager("fay", GameType::Dice, 100).await.unwrap();

        // The claim swap lands, the first batch fails, and the release swap fails too
        store.fail_next_batches(1);
        store.fail_swaps_after("wager:", 1);
        let receipt = service
            .settle(&wager.id, Multiplier::from_hundredths(300), &NoModifier)
            .await
            .unwrap();
        assert_eq!(receipt.payout, 300);
        assert_eq!(ledger.get_balance("fay").await.unwrap(), 300);

        store.heal();
        let (stored, _) = ledger.load_wager(&wager.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WagerStatus::Settled);
        assert_eq!(stored.payout, Some(300));
        assert_eq!(store.get_value("fay", LedgerField::GamesPlayed).await.unwrap(), 1);
    }
}
