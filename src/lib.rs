//! Chipwager - chip-based casino wagering engine
//!
//! Bet registration against an atomic chip ledger, weighted outcome generation for
//! slots, dice and roulette, a resumable blackjack state machine, progressive
//! "pity" odds, idempotent settlement and chip exchange.
//!
//! Persistence is consumed through [`LedgerStore`]; [`InMemoryLedgerStore`] is the
//! bundled implementation.

pub mod audit;
pub mod common;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exchange;
pub mod games;
pub mod ledger;
pub mod pity;
pub mod settlement;
pub mod storage;
pub mod tables;

pub use audit::{verify_chain, AuditEntry, AuditEvent, AuditKind};
pub use common::traits::{CasOutcome, LedgerField, LedgerOp, LedgerStore, VersionedRecord};
pub use common::types::{GameType, Multiplier, SessionId, UserId, Wager, WagerId, WagerStatus};
pub use config::{CasinoConfig, ConfigLoader};
pub use engine::{CasinoEngine, CasinoEngineBuilder, PlayerStats};
pub use errors::{CasinoError, CasinoResult, ConfigurationError, StoreError, StoreResult};
pub use exchange::{ExchangeReceipt, ExchangeService};
pub use games::{
    BetParameters, BlackjackAction, GameOutcome, HandResult, Outcome, RoundResult, SessionState,
    SessionView,
};
pub use ledger::WagerLedger;
pub use pity::PityOddsTracker;
pub use settlement::{FlatBoost, NoModifier, PayoutModifier, SettlementReceipt, SettlementService};
pub use storage::InMemoryLedgerStore;
pub use tables::{BlackjackTable, SessionReaper};
