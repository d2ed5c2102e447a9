//! Progressive odds after losing streaks
//!
//! The counter lives in the store as the `ConsecutiveLosses` field, one per user
//! and shared by every game. Settlement folds the counter update into its own
//! ledger batch via [`PityOddsTracker::op_for`].

use crate::common::traits::{LedgerField, LedgerOp, LedgerStore};
use crate::common::types::Multiplier;
use crate::config::PityConfig;
use crate::errors::StoreResult;
use crate::games::GameOutcome;
use std::sync::Arc;

pub struct PityOddsTracker {
    store: Arc<dyn LedgerStore>,
    config: PityConfig,
}

impl PityOddsTracker {
    pub fn new(store: Arc<dyn LedgerStore>, config: PityConfig) -> Self {
        Self { store, config }
    }

    /// `min(losses / threshold, 1) * max_bonus`, rounded to the nearest hundredth
    pub fn bonus_for(&self, consecutive_losses: u64) -> Multiplier {
        if !self.config.enabled || self.config.threshold == 0 {
            return Multiplier::ZERO;
        }
        let threshold = self.config.threshold as u64;
        let capped = consecutive_losses.min(threshold);
        let max = self.config.max_bonus.hundredths() as u64;
        let hundredths = (2 * capped * max + threshold) / (2 * threshold);
        Multiplier::from_hundredths(hundredths as u32)
    }

    pub async fn consecutive_losses(&self, user: &str) -> StoreResult<u64> {
        let losses = self
            .store
            .get_value(user, LedgerField::ConsecutiveLosses)
            .await?;
        Ok(losses.max(0) as u64)
    }

    /// Bonus the user's next win would receive
    pub async fn current_bonus(&self, user: &str) -> StoreResult<Multiplier> {
        let losses = self.consecutive_losses(user).await?;
        Ok(self.bonus_for(losses))
    }

    /// Counter update for a settled round; pushes leave it alone
    pub fn op_for(result: GameOutcome) -> Option<LedgerOp> {
        match result {
            GameOutcome::Win => Some(LedgerOp::Set(LedgerField::ConsecutiveLosses, 0)),
            GameOutcome::Loss => Some(LedgerOp::Add(LedgerField::ConsecutiveLosses, 1)),
            GameOutcome::Push => None,
        }
    }

    /// Apply the counter update on its own, outside a settlement batch
    pub async fn record(&self, user: &str, result: GameOutcome) -> StoreResult<u64> {
        match Self::op_for(result) {
            Some(op) => {
                let values = self.store.apply(user, &[op]).await?;
                Ok(values.first().copied().unwrap_or(0).max(0) as u64)
            }
            None => self.consecutive_losses(user).await,
        }
    }
}
