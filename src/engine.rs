//! Casino engine facade
//!
//! Wires the ledger, outcome generator, pity tracker, settlement, exchange and
//! blackjack table around one store, and exposes the operations the command
//! layer calls.

use crate::audit::{self, AuditEvent, AuditKind};
use crate::common::traits::{LedgerField, LedgerStore};
use crate::common::types::{GameType, Multiplier, SessionId, Wager};
use crate::config::CasinoConfig;
use crate::errors::{CasinoError, CasinoResult};
use crate::exchange::{ExchangeReceipt, ExchangeService};
use crate::games::blackjack::{BlackjackAction, DealerPolicy, Deck, HouseEdgeDealer, SessionView};
use crate::games::{BetParameters, Outcome, OutcomeGenerator, RoundResult};
use crate::ledger::WagerLedger;
use crate::pity::PityOddsTracker;
use crate::settlement::{NoModifier, PayoutModifier, SettlementService};
use crate::tables::{BlackjackTable, SessionReaper, SharedRng};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Per-user counters kept by settlement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub chips: u64,
    pub currency: u64,
    pub games_played: u64,
    pub total_bets: u64,
    pub winnings: u64,
    pub losses: u64,
    pub games_won: u64,
    pub games_lost: u64,
    pub consecutive_losses: u64,
}

/// Builder for [`CasinoEngine`]
pub struct CasinoEngineBuilder {
    config: CasinoConfig,
    store: Arc<dyn LedgerStore>,
    seed: Option<u64>,
    dealer: Option<Arc<dyn DealerPolicy>>,
}

impl CasinoEngineBuilder {
    /// Deterministic random source, for tests and simulations
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Replace the configured house dealer
    pub fn with_dealer(mut self, dealer: Arc<dyn DealerPolicy>) -> Self {
        self.dealer = Some(dealer);
        self
    }

    /// Validate configuration and assemble the services
    pub fn build(self) -> CasinoResult<CasinoEngine> {
        self.config.validate()?;
        let config = self.config;
        let store = self.store;

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let rng: SharedRng = Arc::new(Mutex::new(rng));

        let generator = OutcomeGenerator::from_config(&config)?;
        let ledger = Arc::new(WagerLedger::new(store.clone(), config.limits.clone()));
        let pity = Arc::new(PityOddsTracker::new(store.clone(), config.pity.clone()));
        let settlement = Arc::new(SettlementService::new(
            store.clone(),
            ledger.clone(),
            pity.clone(),
        ));
        let exchange = ExchangeService::new(store.clone(), config.exchange.clone());
        let dealer = self
            .dealer
            .unwrap_or_else(|| Arc::new(HouseEdgeDealer::from_config(&config.blackjack)));
        let table = Arc::new(BlackjackTable::new(
            store.clone(),
            ledger.clone(),
            settlement.clone(),
            dealer,
            rng.clone(),
            config.blackjack.clone(),
        ));

        info!(
            min_bet = config.limits.min_bet,
            max_bet = config.limits.max_bet,
            slots_rtp = generator.slots.expected_return(),
            "Casino engine ready"
        );

        Ok(CasinoEngine {
            config,
            store,
            ledger,
            generator,
            pity,
            settlement,
            exchange,
            table,
            rng,
        })
    }
}

pub struct CasinoEngine {
    config: CasinoConfig,
    store: Arc<dyn LedgerStore>,
    ledger: Arc<WagerLedger>,
    generator: OutcomeGenerator,
    pity: Arc<PityOddsTracker>,
    settlement: Arc<SettlementService>,
    exchange: ExchangeService,
    table: Arc<BlackjackTable>,
    rng: SharedRng,
}

impl CasinoEngine {
    pub fn builder(config: CasinoConfig, store: Arc<dyn LedgerStore>) -> CasinoEngineBuilder {
        CasinoEngineBuilder {
            config,
            store,
            seed: None,
            dealer: None,
        }
    }

    /// Engine with an entropy-seeded random source and the configured dealer
    pub fn new(config: CasinoConfig, store: Arc<dyn LedgerStore>) -> CasinoResult<Self> {
        Self::builder(config, store).build()
    }

    pub fn config(&self) -> &CasinoConfig {
        &self.config
    }

    pub fn generator(&self) -> &OutcomeGenerator {
        &self.generator
    }

    pub fn table(&self) -> Arc<BlackjackTable> {
        self.table.clone()
    }

    /// Start the background sweep for abandoned blackjack hands
    pub fn spawn_reaper(&self) -> SessionReaper {
        SessionReaper::spawn(self.table.clone(), self.config.blackjack.reaper_interval())
    }

    /// Credit chips from outside the casino (rewards, admin grants)
    pub async fn deposit(&self, user: &str, amount: u64) -> CasinoResult<u64> {
        let balance = self.ledger.credit(user, amount).await?;
        audit::record(
            self.store.as_ref(),
            AuditEvent::new(user, AuditKind::Deposit, amount as i64),
        )
        .await;
        Ok(balance)
    }

    pub async fn balance(&self, user: &str) -> CasinoResult<u64> {
        self.ledger.get_balance(user).await
    }

    pub async fn register_wager(&self, user: &str, game: GameType, amount: u64) -> CasinoResult<Wager> {
        self.ledger.register_wager(user, game, amount).await
    }

    /// Draw and settle a slots, dice or roulette round for a registered wager
    pub async fn resolve_simple_game(
        &self,
        wager: &Wager,
        params: &BetParameters,
    ) -> CasinoResult<RoundResult> {
        self.resolve_simple_game_with(wager, params, &NoModifier).await
    }

    /// As [`resolve_simple_game`](Self::resolve_simple_game), with an external payout modifier
    pub async fn resolve_simple_game_with(
        &self,
        wager: &Wager,
        params: &BetParameters,
        modifier: &dyn PayoutModifier,
    ) -> CasinoResult<RoundResult> {
        self.check_game(wager, params.game_type())?;
        self.generator.validate(params)?;

        let (outcome, _) = {
            let mut rng = self.rng.lock().await;
            self.generator.play(params, &mut *rng)
        };
        self.settle_outcome(wager, outcome, modifier).await
    }

    /// Settle a wager against an outcome drawn elsewhere (replays, external RNG)
    ///
    /// Blackjack hands are owned by their session and only settle through the table.
    pub async fn settle_outcome(
        &self,
        wager: &Wager,
        outcome: Outcome,
        modifier: &dyn PayoutModifier,
    ) -> CasinoResult<RoundResult> {
        self.check_game(wager, outcome.game_type())?;
        let Some(base_multiplier) = self.generator.multiplier_for(&outcome) else {
            return Err(CasinoError::IllegalAction {
                action: "settle_outcome".to_string(),
                state: format!("{} hand owned by its session", outcome.game_type()),
            });
        };

        let receipt = self
            .settlement
            .settle(&wager.id, base_multiplier, modifier)
            .await?;

        Ok(RoundResult {
            wager_id: wager.id,
            outcome,
            base_multiplier,
            effective_multiplier: receipt.effective_multiplier,
            result: receipt.result,
            payout: receipt.payout,
            balance: receipt.balance,
        })
    }

    fn check_game(&self, wager: &Wager, actual: GameType) -> CasinoResult<()> {
        if wager.game != actual {
            return Err(CasinoError::GameMismatch {
                wager_id: wager.id,
                expected: wager.game.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }

    /// Register and resolve in one call; parameters are checked before any debit
    pub async fn play(&self, user: &str, amount: u64, params: &BetParameters) -> CasinoResult<RoundResult> {
        self.generator.validate(params)?;
        let wager = self.register_wager(user, params.game_type(), amount).await?;
        self.resolve_simple_game(&wager, params).await
    }

    pub async fn start_blackjack(&self, user: &str, bet: u64) -> CasinoResult<SessionView> {
        self.table.start(user, bet, &NoModifier).await
    }

    /// Start a hand from a prepared deck, dealt front to back
    pub async fn start_blackjack_with_deck(
        &self,
        user: &str,
        bet: u64,
        deck: Deck,
    ) -> CasinoResult<SessionView> {
        self.table.start_with_deck(user, bet, deck, &NoModifier).await
    }

    pub async fn act(&self, session_id: &SessionId, action: BlackjackAction) -> CasinoResult<SessionView> {
        self.table.act(session_id, action, &NoModifier).await
    }

    pub async fn act_with(
        &self,
        session_id: &SessionId,
        action: BlackjackAction,
        modifier: &dyn PayoutModifier,
    ) -> CasinoResult<SessionView> {
        self.table.act(session_id, action, modifier).await
    }

    pub async fn exchange(&self, user: &str, chips: u64) -> CasinoResult<ExchangeReceipt> {
        self.exchange.exchange(user, chips).await
    }

    pub async fn player_stats(&self, user: &str) -> CasinoResult<PlayerStats> {
        let mut values = [0u64; LedgerField::COUNT];
        for field in LedgerField::ALL {
            values[field.index()] = self.store.get_value(user, field).await?.max(0) as u64;
        }
        let get = |field: LedgerField| values[field.index()];

        Ok(PlayerStats {
            chips: get(LedgerField::Chips),
            currency: get(LedgerField::Currency),
            games_played: get(LedgerField::GamesPlayed),
            total_bets: get(LedgerField::TotalBets),
            winnings: get(LedgerField::Winnings),
            losses: get(LedgerField::Losses),
            games_won: get(LedgerField::GamesWon),
            games_lost: get(LedgerField::GamesLost),
            consecutive_losses: get(LedgerField::ConsecutiveLosses),
        })
    }

    /// Bonus the user's next win would receive
    pub async fn pity_bonus(&self, user: &str) -> CasinoResult<Multiplier> {
        Ok(self.pity.current_bonus(user).await?)
    }
}
