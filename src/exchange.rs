//! Chip to currency exchange
//!
//! The chip debit and the currency credit are one store batch for the user, so
//! either both land or neither does.

use crate::audit::{self, AuditEvent, AuditKind};
use crate::common::traits::{LedgerField, LedgerOp, LedgerStore};
use crate::config::ExchangeConfig;
use crate::errors::{CasinoError, CasinoResult, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const BPS_SCALE: u128 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeReceipt {
    pub chips: u64,
    pub gross: u64,
    pub fee: u64,
    pub net: u64,
    pub chip_balance: u64,
    pub currency_balance: u64,
}

/// Amounts for an exchange, before any ledger change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeQuote {
    pub gross: u64,
    pub fee: u64,
    pub net: u64,
}

pub struct ExchangeService {
    store: Arc<dyn LedgerStore>,
    config: ExchangeConfig,
}

impl ExchangeService {
    pub fn new(store: Arc<dyn LedgerStore>, config: ExchangeConfig) -> Self {
        Self { store, config }
    }

    /// `net = floor(gross * (1 - fee))`; the fee takes the rounding remainder
    pub fn quote(&self, chips: u64) -> CasinoResult<ExchangeQuote> {
        let gross = chips
            .checked_mul(self.config.chip_value)
            .filter(|g| *g <= i64::MAX as u64)
            .ok_or_else(|| CasinoError::InvalidBet(format!("{} chips is too large to exchange", chips)))?;
        let keep = BPS_SCALE - self.config.fee_bps.min(10_000) as u128;
        let net = (gross as u128 * keep / BPS_SCALE) as u64;
        Ok(ExchangeQuote {
            gross,
            fee: gross - net,
            net,
        })
    }

    pub async fn exchange(&self, user: &str, chips: u64) -> CasinoResult<ExchangeReceipt> {
        if chips == 0 || chips < self.config.min_chips {
            return Err(CasinoError::InvalidBet(format!(
                "must exchange at least {} chips",
                self.config.min_chips.max(1)
            )));
        }
        let quote = self.quote(chips)?;

        let ops = [
            LedgerOp::Add(LedgerField::Chips, -(chips as i64)),
            LedgerOp::Add(LedgerField::Currency, quote.net as i64),
        ];
        let values = self.store.apply(user, &ops).await.map_err(|e| match e {
            StoreError::Underflow {
                field: LedgerField::Chips,
                current,
                ..
            } => CasinoError::InsufficientChips {
                requested: chips,
                available: current.max(0) as u64,
            },
            other => other.into(),
        })?;

        audit::record(
            self.store.as_ref(),
            AuditEvent::new(user, AuditKind::Exchange, -(chips as i64))
                .with_reference(format!("net={} fee={}", quote.net, quote.fee)),
        )
        .await;
        info!(user, chips, gross = quote.gross, fee = quote.fee, net = quote.net, "Chips exchanged");

        Ok(ExchangeReceipt {
            chips,
            gross: quote.gross,
            fee: quote.fee,
            net: quote.net,
            chip_balance: values[0].max(0) as u64,
            currency_balance: values[1].max(0) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryLedgerStore;

    fn service() -> (Arc<InMemoryLedgerStore>, ExchangeService) {
        let store = Arc::new(InMemoryLedgerStore::new());
        (store.clone(), ExchangeService::new(store, ExchangeConfig::default()))
    }

    #[tokio::test]
    async fn test_exchange_hundred_chips() {
        let (store, service) = service();
        store.atomic_adjust("alice", LedgerField::Chips, 250).await.unwrap();

        let receipt = service.exchange("alice", 100).await.unwrap();
        assert_eq!((receipt.gross, receipt.fee, receipt.net), (1000, 150, 850));
        assert_eq!(receipt.chip_balance, 150);
        assert_eq!(receipt.currency_balance, 850);
    }

    #[test]
    fn test_net_is_floored() {
        let (_, service) = service();
        for chips in [1u64, 3, 7, 33, 101, 9_999] {
            let quote = service.quote(chips).unwrap();
            assert_eq!(quote.net, chips * 10 * 85 / 100);
            assert_eq!(quote.fee + quote.net, quote.gross);
        }
    }

    #[tokio::test]
    async fn test_insufficient_chips_changes_nothing() {
        let (store, service) = service();
        store.atomic_adjust("bob", LedgerField::Chips, 20).await.unwrap();

        let err = service.exchange("bob", 21).await.unwrap_err();
        assert_eq!(
            err,
            CasinoError::InsufficientChips {
                requested: 21,
                available: 20
            }
        );
        assert_eq!(store.get_value("bob", LedgerField::Chips).await.unwrap(), 20);
        assert_eq!(store.get_value("bob", LedgerField::Currency).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_zero_chips_rejected() {
        let (_, service) = service();
        assert!(matches!(
            service.exchange("carol", 0).await,
            Err(CasinoError::InvalidBet(_))
        ));
    }

    #[tokio::test]
    async fn test_outage_applies_nothing() {
        let (store, service) = service();
        store.atomic_adjust("dave", LedgerField::Chips, 100).await.unwrap();
        store.set_counters_available(false);
        assert!(matches!(
            service.exchange("dave", 50).await,
            Err(CasinoError::StoreUnavailable(_))
        ));
        store.set_counters_available(true);
        assert_eq!(store.get_value("dave", LedgerField::Chips).await.unwrap(), 100);
    }
}
