use super::blackjack::BlackjackOutcome;
use super::dice::DiceRoll;
use super::roulette::{RouletteBet, RouletteSpin};
use super::slots::SlotsOutcome;
use crate::common::types::{GameType, Multiplier, WagerId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Player's choice for a single-round game
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "game", rename_all = "lowercase")]
pub enum BetParameters {
    Slots,
    Dice { target: u8 },
    Roulette { bet: RouletteBet },
}

impl BetParameters {
    pub fn game_type(&self) -> GameType {
        match self {
            BetParameters::Slots => GameType::Slots,
            BetParameters::Dice { .. } => GameType::Dice,
            BetParameters::Roulette { .. } => GameType::Roulette,
        }
    }
}

/// How a settled round counts for statistics and the pity counter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameOutcome {
    Win,
    Push,
    Loss,
}

impl GameOutcome {
    /// Above 1x is a win, exactly 1x returns the stake, anything less is a loss
    pub fn classify(multiplier: Multiplier) -> Self {
        match multiplier.cmp(&Multiplier::ONE) {
            std::cmp::Ordering::Greater => GameOutcome::Win,
            std::cmp::Ordering::Equal => GameOutcome::Push,
            std::cmp::Ordering::Less => GameOutcome::Loss,
        }
    }

    pub fn is_win(&self) -> bool {
        *self == GameOutcome::Win
    }
}

impl fmt::Display for GameOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameOutcome::Win => write!(f, "win"),
            GameOutcome::Push => write!(f, "push"),
            GameOutcome::Loss => write!(f, "loss"),
        }
    }
}

/// Immutable result of a round, before settlement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "game", rename_all = "lowercase")]
pub enum Outcome {
    Slots(SlotsOutcome),
    Dice {
        roll: DiceRoll,
        target: u8,
    },
    Roulette {
        spin: RouletteSpin,
        bet: RouletteBet,
    },
    Blackjack(BlackjackOutcome),
}

impl Outcome {
    pub fn game_type(&self) -> GameType {
        match self {
            Outcome::Slots(_) => GameType::Slots,
            Outcome::Dice { .. } => GameType::Dice,
            Outcome::Roulette { .. } => GameType::Roulette,
            Outcome::Blackjack(_) => GameType::Blackjack,
        }
    }
}

/// Outcome together with its settled payout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundResult {
    pub wager_id: WagerId,
    pub outcome: Outcome,
    pub base_multiplier: Multiplier,
    pub effective_multiplier: Multiplier,
    pub result: GameOutcome,
    pub payout: u64,
    /// Chip balance right after the payout landed
    pub balance: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(GameOutcome::classify(Multiplier::from_hundredths(230)), GameOutcome::Win);
        assert_eq!(GameOutcome::classify(Multiplier::from_hundredths(101)), GameOutcome::Win);
        assert_eq!(GameOutcome::classify(Multiplier::ONE), GameOutcome::Push);
        assert_eq!(GameOutcome::classify(Multiplier::from_hundredths(50)), GameOutcome::Loss);
        assert_eq!(GameOutcome::classify(Multiplier::ZERO), GameOutcome::Loss);
    }

    #[test]
    fn test_bet_parameters_serialization() {
        let params = BetParameters::Dice { target: 7 };
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json, r#"{"game":"dice","target":7}"#);
        assert_eq!(params.game_type(), GameType::Dice);
    }
}
