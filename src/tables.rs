//! Blackjack session registry
//!
//! Sessions are persisted as JSON records under `session:{id}` and resumed by id.
//! Each user has at most one live session, tracked by a pointer record that is
//! only ever created with `insert_if_absent`. Idle sessions are force-settled as
//! losses, either lazily on the next action or by the background [`SessionReaper`].

use crate::common::traits::{CasOutcome, LedgerStore, VersionedRecord};
use crate::common::types::{GameType, SessionId};
use crate::config::BlackjackConfig;
use crate::errors::{CasinoError, CasinoResult, StoreError};
use crate::games::blackjack::{BlackjackAction, BlackjackSession, DealerPolicy, Deck, SessionView};
use crate::ledger::WagerLedger;
use crate::settlement::{NoModifier, PayoutModifier, SettlementService};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Random source shared by every table operation
pub type SharedRng = Arc<Mutex<StdRng>>;

const SESSION_PREFIX: &str = "session:";

fn active_key(user: &str) -> String {
    format!("blackjack:active:{}", user)
}

fn corrupted(key: &str, e: serde_json::Error) -> CasinoError {
    StoreError::CorruptedRecord {
        key: key.to_string(),
        reason: e.to_string(),
    }
    .into()
}

pub struct BlackjackTable {
    store: Arc<dyn LedgerStore>,
    ledger: Arc<WagerLedger>,
    settlement: Arc<SettlementService>,
    dealer: Arc<dyn DealerPolicy>,
    rng: SharedRng,
    config: BlackjackConfig,
}

impl BlackjackTable {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        ledger: Arc<WagerLedger>,
        settlement: Arc<SettlementService>,
        dealer: Arc<dyn DealerPolicy>,
        rng: SharedRng,
        config: BlackjackConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            settlement,
            dealer,
            rng,
            config,
        }
    }

    /// Debit `bet`, shuffle a fresh deck and deal
    pub async fn start(
        &self,
        user: &str,
        bet: u64,
        modifier: &dyn PayoutModifier,
    ) -> CasinoResult<SessionView> {
        let deck = {
            let mut rng = self.rng.lock().await;
            Deck::shuffled(&mut *rng)
        };
        self.start_with_deck(user, bet, deck, modifier).await
    }

    /// Start a session dealing from a prepared deck
    pub async fn start_with_deck(
        &self,
        user: &str,
        bet: u64,
        deck: Deck,
        modifier: &dyn PayoutModifier,
    ) -> CasinoResult<SessionView> {
        self.ledger.validate_bet(bet)?;
        self.clear_previous(user).await?;

        let session_id = SessionId::new();
        let pointer = serde_json::to_vec(&session_id).map_err(StoreError::from)?;
        if !self.store.insert_if_absent(&active_key(user), pointer).await? {
            let existing = self.active_session_id(user).await?.unwrap_or(session_id);
            return Err(CasinoError::SessionInProgress {
                user: user.to_string(),
                session_id: existing,
            });
        }

        let wager = match self.ledger.register_wager(user, GameType::Blackjack, bet).await {
            Ok(wager) => wager,
            Err(e) => {
                self.release_pointer(user, &session_id).await;
                return Err(e);
            }
        };

        let session = BlackjackSession::deal(session_id, user, wager.id, bet, deck, Utc::now())?;
        let key = BlackjackSession::record_key(&session_id);
        let stored = match serde_json::to_vec(&session) {
            Ok(data) => self.store.insert_if_absent(&key, data).await,
            Err(e) => Err(StoreError::from(e)),
        };
        if let Err(e) = stored {
            error!(user, session_id = %session_id, error = %e, "Failed to persist blackjack session");
            if let Err(refund) = self.ledger.cancel_wager(&wager).await {
                error!(user, wager_id = %wager.id, amount = bet, error = %refund, "Stake refund failed; wager stays pending");
            }
            self.release_pointer(user, &session_id).await;
            return Err(e.into());
        }

        info!(user, session_id = %session_id, wager_id = %wager.id, bet, "Blackjack hand dealt");

        let mut view = session.view();
        if session.is_settled() {
            view.payout = self.finalize(&session, modifier).await?;
        }
        Ok(view)
    }

    /// Apply a player action; an idle session is force-settled instead
    pub async fn act(
        &self,
        session_id: &SessionId,
        action: BlackjackAction,
        modifier: &dyn PayoutModifier,
    ) -> CasinoResult<SessionView> {
        let (mut session, version) = self
            .load(session_id)
            .await?
            .ok_or(CasinoError::UnknownSession(*session_id))?;

        if session.is_settled() {
            return Err(CasinoError::IllegalAction {
                action: action.to_string(),
                state: session.state.to_string(),
            });
        }

        let now = Utc::now();
        if session.is_expired(now, self.config.action_timeout()) {
            return self.force_expire(session, version).await;
        }

        {
            let mut rng = self.rng.lock().await;
            session.apply(action, self.dealer.as_ref(), &mut *rng, now)?;
        }

        if !self.persist(&session, version).await? {
            return Err(CasinoError::IllegalAction {
                action: action.to_string(),
                state: "stale (another action was applied first)".to_string(),
            });
        }
        debug!(session_id = %session_id, action = %action, state = %session.state, "Blackjack action applied");

        let mut view = session.view();
        if session.is_settled() {
            view.payout = self.finalize(&session, modifier).await?;
        }
        Ok(view)
    }

    /// Current snapshot of a session
    pub async fn view(&self, session_id: &SessionId) -> CasinoResult<SessionView> {
        let (session, _) = self
            .load(session_id)
            .await?
            .ok_or(CasinoError::UnknownSession(*session_id))?;
        let mut view = session.view();
        if session.is_settled() {
            view.payout = self
                .ledger
                .load_wager(&session.wager_id)
                .await?
                .and_then(|(wager, _)| wager.payout);
        }
        Ok(view)
    }

    /// The user's live session, if any
    pub async fn active_session(&self, user: &str) -> CasinoResult<Option<SessionView>> {
        match self.active_session_id(user).await? {
            Some(id) => match self.view(&id).await {
                Ok(view) => Ok(Some(view)),
                Err(CasinoError::UnknownSession(_)) => Ok(None),
                Err(e) => Err(e),
            },
            None => Ok(None),
        }
    }

    /// Force-settle every session idle longer than the action timeout
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> CasinoResult<usize> {
        let timeout = self.config.action_timeout();
        let mut expired = 0;

        for (key, record) in self.store.scan_prefix(SESSION_PREFIX).await? {
            let session: BlackjackSession = match serde_json::from_slice(&record.data) {
                Ok(session) => session,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping unreadable session record");
                    continue;
                }
            };
            if !session.is_expired(now, timeout) {
                continue;
            }
            let session_id = session.id;
            match self.force_expire(session, record.version).await {
                Ok(view) if view.expired => expired += 1,
                Ok(_) => {}
                Err(e) => warn!(session_id = %session_id, error = %e, "Failed to expire session"),
            }
        }
        Ok(expired)
    }

    async fn force_expire(
        &self,
        mut session: BlackjackSession,
        version: u64,
    ) -> CasinoResult<SessionView> {
        session.expire();
        if !self.persist(&session, version).await? {
            // Someone else moved the session on; report what they left
            return self.view(&session.id).await;
        }
        info!(user = %session.user, session_id = %session.id, "Blackjack session timed out");

        let mut view = session.view();
        view.payout = self.finalize(&session, &NoModifier).await?;
        Ok(view)
    }

    /// Settle the wager of a finished session and free the user's slot
    async fn finalize(
        &self,
        session: &BlackjackSession,
        modifier: &dyn PayoutModifier,
    ) -> CasinoResult<Option<u64>> {
        let Some(outcome) = session.outcome() else {
            return Ok(None);
        };
        let multiplier = outcome.result.multiplier(&self.config);

        let payout = match self
            .settlement
            .settle(&session.wager_id, multiplier, modifier)
            .await
        {
            Ok(receipt) => receipt.payout,
            Err(CasinoError::AlreadySettled(_)) => self
                .ledger
                .load_wager(&session.wager_id)
                .await?
                .and_then(|(wager, _)| wager.payout)
                .unwrap_or(0),
            Err(e) => return Err(e),
        };

        self.release_pointer(&session.user, &session.id).await;
        Ok(Some(payout))
    }

    /// Settle or expire whatever the user left behind; a live hand blocks a new one
    async fn clear_previous(&self, user: &str) -> CasinoResult<()> {
        let Some(existing) = self.active_session_id(user).await? else {
            return Ok(());
        };

        match self.load(&existing).await? {
            None => {
                self.release_pointer(user, &existing).await;
                Ok(())
            }
            Some((session, _)) if session.is_settled() => {
                self.finalize(&session, &NoModifier).await?;
                Ok(())
            }
            Some((session, version)) if session.is_expired(Utc::now(), self.config.action_timeout()) => {
                self.force_expire(session, version).await?;
                Ok(())
            }
            Some(_) => Err(CasinoError::SessionInProgress {
                user: user.to_string(),
                session_id: existing,
            }),
        }
    }

    async fn active_session_id(&self, user: &str) -> CasinoResult<Option<SessionId>> {
        let key = active_key(user);
        match self.store.get_record(&key).await? {
            Some(record) => serde_json::from_slice(&record.data)
                .map(Some)
                .map_err(|e| corrupted(&key, e)),
            None => Ok(None),
        }
    }

    async fn release_pointer(&self, user: &str, session_id: &SessionId) {
        let key = active_key(user);
        let record = match self.store.get_record(&key).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) => {
                warn!(user, error = %e, "Could not read active session pointer");
                return;
            }
        };
        let points_here = serde_json::from_slice::<SessionId>(&record.data)
            .map(|id| id == *session_id)
            .unwrap_or(false);
        if !points_here {
            return;
        }
        if let Err(e) = self.store.remove_if_version(&key, record.version).await {
            warn!(user, session_id = %session_id, error = %e, "Could not clear active session pointer");
        }
    }

    async fn load(&self, session_id: &SessionId) -> CasinoResult<Option<(BlackjackSession, u64)>> {
        let key = BlackjackSession::record_key(session_id);
        match self.store.get_record(&key).await? {
            Some(VersionedRecord { version, data }) => {
                let session = serde_json::from_slice(&data).map_err(|e| corrupted(&key, e))?;
                Ok(Some((session, version)))
            }
            None => Ok(None),
        }
    }

    /// Write back a session read at `version`; false if it changed meanwhile
    async fn persist(&self, session: &BlackjackSession, version: u64) -> CasinoResult<bool> {
        let key = BlackjackSession::record_key(&session.id);
        let data = serde_json::to_vec(session).map_err(StoreError::from)?;
        match self.store.compare_and_swap(&key, version, data).await? {
            CasOutcome::Swapped { .. } => Ok(true),
            CasOutcome::VersionMismatch { .. } => Ok(false),
            CasOutcome::Missing => Err(CasinoError::UnknownSession(session.id)),
        }
    }
}

/// Background sweep that times out abandoned sessions
pub struct SessionReaper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SessionReaper {
    pub fn spawn(table: Arc<BlackjackTable>, every: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match table.expire_stale(Utc::now()).await {
                            Ok(0) => {}
                            Ok(count) => info!(count, "Reaped idle blackjack sessions"),
                            Err(e) => warn!(error = %e, "Session sweep failed"),
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Session reaper stopped");
        });

        Self { shutdown, handle }
    }

    /// Signal the sweep loop and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Session reaper task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::traits::LedgerField;
    use crate::config::{LimitsConfig, PityConfig};
    use crate::games::blackjack::{Card, HandResult, Rank, SessionState, StandardDealer, Suit};
    use crate::pity::PityOddsTracker;
    use crate::storage::faults::FaultyStore;
    use crate::storage::InMemoryLedgerStore;
    use rand::SeedableRng;

    fn table_on(store: Arc<dyn LedgerStore>) -> BlackjackTable {
        let ledger = Arc::new(WagerLedger::new(store.clone(), LimitsConfig::default()));
        let pity = Arc::new(PityOddsTracker::new(store.clone(), PityConfig::default()));
        let settlement = Arc::new(SettlementService::new(store.clone(), ledger.clone(), pity));
        BlackjackTable::new(
            store,
            ledger,
            settlement,
            Arc::new(StandardDealer::default()),
            Arc::new(Mutex::new(StdRng::seed_from_u64(1))),
            BlackjackConfig::default(),
        )
    }

    fn table() -> (Arc<InMemoryLedgerStore>, BlackjackTable) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let table = table_on(store.clone());
        (store, table)
    }

    fn deck(ranks: &[Rank]) -> Deck {
        Deck::stacked(ranks.iter().map(|r| Card::new(*r, Suit::Hearts)).collect())
    }

    async fn chips(store: &InMemoryLedgerStore, user: &str) -> i64 {
        store.get_value(user, LedgerField::Chips).await.unwrap()
    }

    #[tokio::test]
    async fn test_natural_settles_on_deal() {
        let (store, table) = table();
        store.atomic_adjust("alice", LedgerField::Chips, 100).await.unwrap();

        let view = table
            .start_with_deck(
                "alice",
                100,
                deck(&[Rank::Ace, Rank::Nine, Rank::King, Rank::Seven]),
                &NoModifier,
            )
            .await
            .unwrap();
        assert_eq!(view.result, Some(HandResult::Natural));
        assert_eq!(view.payout, Some(230));
        assert_eq!(chips(&store, "alice").await, 230);
        assert!(table.active_session("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_one_live_session_per_user() {
        let (store, table) = table();
        store.atomic_adjust("bob", LedgerField::Chips, 500).await.unwrap();

        let first = table
            .start_with_deck(
                "bob",
                100,
                deck(&[Rank::Ten, Rank::Nine, Rank::Six, Rank::Seven]),
                &NoModifier,
            )
            .await
            .unwrap();
        assert_eq!(first.state, SessionState::PlayerTurn);
        let second = table.start("bob", 100, &NoModifier).await.unwrap_err();
        assert!(matches!(second, CasinoError::SessionInProgress { .. }));
        assert_eq!(chips(&store, "bob").await, 400);

        table
            .act(&first.session_id, BlackjackAction::Surrender, &NoModifier)
            .await
            .unwrap();
        assert_eq!(chips(&store, "bob").await, 450);
        assert!(table.start("bob", 100, &NoModifier).await.is_ok());
    }

    #[tokio::test]
    async fn test_insufficient_funds_frees_slot() {
        let (store, table) = table();
        store.atomic_adjust("carol", LedgerField::Chips, 10).await.unwrap();
        let err = table.start("carol", 100, &NoModifier).await.unwrap_err();
        assert!(matches!(err, CasinoError::InsufficientFunds { .. }));
        assert!(table.active_session("carol").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_act_after_settle_is_illegal() {
        let (store, table) = table();
        store.atomic_adjust("dave", LedgerField::Chips, 100).await.unwrap();
        let view = table
            .start_with_deck(
                "dave",
                100,
                deck(&[Rank::Ten, Rank::Nine, Rank::Six, Rank::Seven]),
                &NoModifier,
            )
            .await
            .unwrap();
        table
            .act(&view.session_id, BlackjackAction::Surrender, &NoModifier)
            .await
            .unwrap();
        let err = table
            .act(&view.session_id, BlackjackAction::Hit, &NoModifier)
            .await
            .unwrap_err();
        assert!(matches!(err, CasinoError::IllegalAction { .. }));
    }

    #[tokio::test]
    async fn test_sweep_expires_idle_hands_as_losses() {
        let (store, table) = table();
        store.atomic_adjust("erin", LedgerField::Chips, 100).await.unwrap();
        let view = table
            .start_with_deck(
                "erin",
                100,
                deck(&[Rank::Ten, Rank::Nine, Rank::Six, Rank::Seven]),
                &NoModifier,
            )
            .await
            .unwrap();

        assert_eq!(table.expire_stale(Utc::now()).await.unwrap(), 0);
        let later = Utc::now() + chrono::Duration::seconds(61);
        assert_eq!(table.expire_stale(later).await.unwrap(), 1);

        let after = table.view(&view.session_id).await.unwrap();
        assert!(after.expired);
        assert_eq!(after.payout, Some(0));
        assert_eq!(after.dealer_cards.len(), 2);
        assert_eq!(chips(&store, "erin").await, 0);
        assert_eq!(store.get_value("erin", LedgerField::GamesLost).await.unwrap(), 1);
        assert_eq!(table.expire_stale(later).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let (_, table) = table();
        let err = table
            .act(&SessionId::new(), BlackjackAction::Hit, &NoModifier)
            .await
            .unwrap_err();
        assert!(matches!(err, CasinoError::UnknownSession(_)));
    }

    #[tokio::test]
    async fn test_dealer_bust_pays_double() {
        let (store, table) = table();
        store.atomic_adjust("fay", LedgerField::Chips, 100).await.unwrap();
        let view = table
            .start_with_deck(
                "fay",
                100,
                deck(&[Rank::Ten, Rank::Ten, Rank::Eight, Rank::Six, Rank::King]),
                &NoModifier,
            )
            .await
            .unwrap();
        assert_eq!(chips(&store, "fay").await, 0);

        let done = table
            .act(&view.session_id, BlackjackAction::Stand, &NoModifier)
            .await
            .unwrap();
        assert_eq!(done.result, Some(HandResult::DealerBust));
        assert_eq!(done.payout, Some(200));
        assert_eq!(chips(&store, "fay").await, 200);
        assert_eq!(store.get_value("fay", LedgerField::GamesWon).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dealer_higher_total_takes_stake() {
        let (store, table) = table();
        store.atomic_adjust("gus", LedgerField::Chips, 100).await.unwrap();
        let view = table
            .start_with_deck(
                "gus",
                100,
                deck(&[Rank::Ten, Rank::Ten, Rank::Seven, Rank::Eight]),
                &NoModifier,
            )
            .await
            .unwrap();

        let done = table
            .act(&view.session_id, BlackjackAction::Stand, &NoModifier)
            .await
            .unwrap();
        assert_eq!(done.result, Some(HandResult::Loss));
        assert_eq!(done.payout, Some(0));
        assert_eq!(chips(&store, "gus").await, 0);
        assert_eq!(store.get_value("gus", LedgerField::GamesLost).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_session_write_failure_returns_stake() {
        let store = Arc::new(FaultyStore::new(Arc::new(InMemoryLedgerStore::new())));
        let table = table_on(store.clone());
        store.atomic_adjust("hal", LedgerField::Chips, 500).await.unwrap();

        store.fail_inserts("session:");
        store.fail_reads("wager:");
        let err = table.start("hal", 100, &NoModifier).await.unwrap_err();
        assert!(matches!(err, CasinoError::StoreUnavailable(_)));
        assert_eq!(store.get_value("hal", LedgerField::Chips).await.unwrap(), 500);

        store.heal();
        assert!(table.active_session("hal").await.unwrap().is_none());
        let view = table.start("hal", 100, &NoModifier).await.unwrap();
        assert_eq!(view.bet, 100);
    }
}
