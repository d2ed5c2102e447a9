//! Game rules and random outcome generation
//!
//! Everything in here is pure: functions take a random source and validated
//! tables and return immutable outcomes. The ledger never appears below this line.

pub mod blackjack;
pub mod dice;
pub mod roulette;
pub mod slots;
pub mod types;
pub mod weighted;

pub use blackjack::{
    BlackjackAction, BlackjackOutcome, BlackjackSession, DealerPolicy, HandResult,
    HouseEdgeDealer, SessionState, SessionView, StandardDealer,
};
pub use dice::{DiceRoll, DiceTable};
pub use roulette::{RouletteBet, RouletteSpin, RouletteWheel};
pub use slots::{SlotMachine, SlotsOutcome, SlotsWin};
pub use types::*;
pub use weighted::WeightedTable;

use crate::common::types::Multiplier;
use crate::config::CasinoConfig;
use crate::errors::{CasinoError, CasinoResult, ConfigurationError};
use rand::Rng;

/// Validated tables for the single-round games
#[derive(Debug, Clone)]
pub struct OutcomeGenerator {
    pub slots: SlotMachine,
    pub dice: DiceTable,
    pub roulette: RouletteWheel,
}

impl OutcomeGenerator {
    pub fn from_config(config: &CasinoConfig) -> Result<Self, ConfigurationError> {
        Ok(Self {
            slots: SlotMachine::from_config(&config.slots)?,
            dice: DiceTable::from_config(&config.dice)?,
            roulette: RouletteWheel::from_config(&config.roulette)?,
        })
    }

    /// Reject parameters that can never win before any chips move
    pub fn validate(&self, params: &BetParameters) -> CasinoResult<()> {
        match params {
            BetParameters::Slots => Ok(()),
            BetParameters::Dice { target } if !DiceTable::is_valid_target(*target) => Err(
                CasinoError::InvalidBet(format!("dice target {} is outside 2..=12", target)),
            ),
            BetParameters::Dice { .. } => Ok(()),
            BetParameters::Roulette { bet } => bet.validate(),
        }
    }

    /// Draw an outcome and its base multiplier
    pub fn play<R: Rng + ?Sized>(&self, params: &BetParameters, rng: &mut R) -> (Outcome, Multiplier) {
        match *params {
            BetParameters::Slots => {
                let outcome = self.slots.spin(rng);
                let multiplier = outcome.multiplier;
                (Outcome::Slots(outcome), multiplier)
            }
            BetParameters::Dice { target } => {
                let roll = dice::roll(rng);
                let multiplier = self.dice.evaluate(&roll, target);
                (Outcome::Dice { roll, target }, multiplier)
            }
            BetParameters::Roulette { bet } => {
                let spin = self.roulette.spin(rng);
                let multiplier = self.roulette.evaluate(&spin, &bet);
                (Outcome::Roulette { spin, bet }, multiplier)
            }
        }
    }

    /// Base multiplier a single-round outcome earns; blackjack is priced by its table
    pub fn multiplier_for(&self, outcome: &Outcome) -> Option<Multiplier> {
        match outcome {
            Outcome::Slots(spin) => {
                let class = self.slots.classify(&spin.reels, spin.class == SlotsWin::Minimum);
                Some(self.slots.multiplier_for(class))
            }
            Outcome::Dice { roll, target } => Some(self.dice.evaluate(roll, *target)),
            Outcome::Roulette { spin, bet } => Some(self.roulette.evaluate(spin, bet)),
            Outcome::Blackjack(_) => None,
        }
    }

    /// Theoretical return to player of a unit bet with these parameters
    pub fn expected_return(&self, params: &BetParameters) -> f64 {
        match params {
            BetParameters::Slots => self.slots.expected_return(),
            BetParameters::Dice { target } => self.dice.expected_return(*target),
            BetParameters::Roulette { bet } => self.roulette.expected_return(bet),
        }
    }
}
