//! Single-zero roulette with a weighted zero pocket
//!
//! Every pocket `1..=36` shares one weight; zero carries a slightly heavier one,
//! which is where the wheel's edge comes from on top of the payout table.

use super::weighted::WeightedTable;
use crate::common::types::Multiplier;
use crate::config::RouletteConfig;
use crate::errors::{CasinoError, ConfigurationError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const POCKETS: u8 = 37;

const RED_NUMBERS: [u8; 18] = [
    1, 3, 5, 7, 9, 12, 14, 16, 18, 19, 21, 23, 25, 27, 30, 32, 34, 36,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Black,
    Green,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    Even,
    Odd,
}

/// A drawn pocket and its derived attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouletteSpin {
    pub number: u8,
    pub color: Color,
    /// `None` for zero
    pub parity: Option<Parity>,
    /// 1, 2 or 3; `None` for zero
    pub dozen: Option<u8>,
    /// 1, 2 or 3; `None` for zero
    pub column: Option<u8>,
}

impl RouletteSpin {
    pub fn for_number(number: u8) -> Self {
        if number == 0 {
            return Self {
                number,
                color: Color::Green,
                parity: None,
                dozen: None,
                column: None,
            };
        }

        let color = if RED_NUMBERS.contains(&number) {
            Color::Red
        } else {
            Color::Black
        };
        let parity = if number % 2 == 0 {
            Parity::Even
        } else {
            Parity::Odd
        };
        let column = match number % 3 {
            1 => 1,
            2 => 2,
            _ => 3,
        };

        Self {
            number,
            color,
            parity: Some(parity),
            dozen: Some((number - 1) / 12 + 1),
            column: Some(column),
        }
    }
}

/// What the player bet on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum RouletteBet {
    Number(u8),
    Color(Color),
    Parity(Parity),
    Dozen(u8),
    Column(u8),
}

impl RouletteBet {
    /// Reject bets that can never win
    pub fn validate(&self) -> Result<(), CasinoError> {
        match *self {
            RouletteBet::Number(n) if n >= POCKETS => Err(CasinoError::InvalidBet(format!(
                "roulette number {} is not on the wheel",
                n
            ))),
            RouletteBet::Color(Color::Green) => Err(CasinoError::InvalidBet(
                "green is not a color bet; bet on number 0".to_string(),
            )),
            RouletteBet::Dozen(d) | RouletteBet::Column(d) if !(1..=3).contains(&d) => Err(
                CasinoError::InvalidBet(format!("{} must be 1, 2 or 3, got {}", self.kind(), d)),
            ),
            _ => Ok(()),
        }
    }

    pub fn wins(&self, spin: &RouletteSpin) -> bool {
        match *self {
            RouletteBet::Number(n) => spin.number == n,
            RouletteBet::Color(c) => spin.number != 0 && spin.color == c,
            RouletteBet::Parity(p) => spin.parity == Some(p),
            RouletteBet::Dozen(d) => spin.dozen == Some(d),
            RouletteBet::Column(c) => spin.column == Some(c),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            RouletteBet::Number(_) => "number",
            RouletteBet::Color(_) => "color",
            RouletteBet::Parity(_) => "parity",
            RouletteBet::Dozen(_) => "dozen",
            RouletteBet::Column(_) => "column",
        }
    }
}

impl fmt::Display for RouletteBet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouletteBet::Number(n) => write!(f, "number {}", n),
            RouletteBet::Color(c) => write!(f, "color {:?}", c),
            RouletteBet::Parity(p) => write!(f, "parity {:?}", p),
            RouletteBet::Dozen(d) => write!(f, "dozen {}", d),
            RouletteBet::Column(c) => write!(f, "column {}", c),
        }
    }
}

/// Validated wheel and payout table
#[derive(Debug, Clone)]
pub struct RouletteWheel {
    pockets: WeightedTable<u8>,
    payouts: RouletteConfig,
}

impl RouletteWheel {
    pub fn from_config(config: &RouletteConfig) -> Result<Self, ConfigurationError> {
        let pockets = WeightedTable::new(
            "roulette.pockets",
            (0..POCKETS)
                .map(|n| {
                    let weight = if n == 0 {
                        config.zero_weight
                    } else {
                        config.pocket_weight
                    };
                    (n, weight)
                })
                .collect(),
        )?;
        Ok(Self {
            pockets,
            payouts: config.clone(),
        })
    }

    pub fn spin<R: Rng + ?Sized>(&self, rng: &mut R) -> RouletteSpin {
        RouletteSpin::for_number(*self.pockets.sample(rng))
    }

    pub fn pocket_share(&self, number: u8) -> f64 {
        self.pockets.share(number as usize)
    }

    pub fn multiplier_for(&self, bet: &RouletteBet) -> Multiplier {
        match bet {
            RouletteBet::Number(_) => self.payouts.number,
            RouletteBet::Color(_) => self.payouts.color,
            RouletteBet::Parity(_) => self.payouts.parity,
            RouletteBet::Dozen(_) => self.payouts.dozen,
            RouletteBet::Column(_) => self.payouts.column,
        }
    }

    pub fn evaluate(&self, spin: &RouletteSpin, bet: &RouletteBet) -> Multiplier {
        if bet.wins(spin) {
            self.multiplier_for(bet)
        } else {
            Multiplier::ZERO
        }
    }

    /// Theoretical return of a unit stake on `bet`
    pub fn expected_return(&self, bet: &RouletteBet) -> f64 {
        let win_chance: f64 = (0..POCKETS)
            .filter(|n| bet.wins(&RouletteSpin::for_number(*n)))
            .map(|n| self.pocket_share(n))
            .sum();
        win_chance * self.multiplier_for(bet).as_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn wheel() -> RouletteWheel {
        RouletteWheel::from_config(&RouletteConfig::default()).unwrap()
    }

    #[test]
    fn test_number_seventeen_pays_thirty_one() {
        let wheel = wheel();
        let spin = RouletteSpin::for_number(17);
        assert_eq!(wheel.evaluate(&spin, &RouletteBet::Number(17)).apply(100), 3100);
        assert!(wheel.evaluate(&spin, &RouletteBet::Number(18)).is_zero());
    }

    #[test]
    fn test_attributes() {
        let s = RouletteSpin::for_number(17);
        assert_eq!(s.color, Color::Black);
        assert_eq!(s.parity, Some(Parity::Odd));
        assert_eq!(s.dozen, Some(2));
        assert_eq!(s.column, Some(2));

        let s = RouletteSpin::for_number(36);
        assert_eq!(s.color, Color::Red);
        assert_eq!(s.dozen, Some(3));
        assert_eq!(s.column, Some(3));

        let s = RouletteSpin::for_number(1);
        assert_eq!(s.column, Some(1));
        assert_eq!(s.dozen, Some(1));
    }

    #[test]
    fn test_zero_has_no_outside_attributes() {
        let zero = RouletteSpin::for_number(0);
        assert_eq!(zero.color, Color::Green);
        assert!(zero.parity.is_none() && zero.dozen.is_none() && zero.column.is_none());
        for bet in [
            RouletteBet::Color(Color::Red),
            RouletteBet::Color(Color::Black),
            RouletteBet::Parity(Parity::Even),
            RouletteBet::Dozen(1),
            RouletteBet::Column(3),
        ] {
            assert!(!bet.wins(&zero));
        }
        assert!(RouletteBet::Number(0).wins(&zero));
    }

    #[test]
    fn test_eighteen_reds() {
        let reds = (1..POCKETS)
            .filter(|n| RouletteSpin::for_number(*n).color == Color::Red)
            .count();
        assert_eq!(reds, 18);
    }

    #[test]
    fn test_zero_is_weighted_up() {
        let wheel = wheel();
        assert!(wheel.pocket_share(0) > wheel.pocket_share(1));
    }

    #[test]
    fn test_all_bets_favour_house() {
        let wheel = wheel();
        for bet in [
            RouletteBet::Number(7),
            RouletteBet::Color(Color::Red),
            RouletteBet::Parity(Parity::Odd),
            RouletteBet::Dozen(2),
            RouletteBet::Column(1),
        ] {
            let rtp = wheel.expected_return(&bet);
            assert!(rtp < 1.0, "{} returns {}", bet, rtp);
        }
    }

    #[test]
    fn test_invalid_bets() {
        assert!(RouletteBet::Number(37).validate().is_err());
        assert!(RouletteBet::Dozen(0).validate().is_err());
        assert!(RouletteBet::Column(4).validate().is_err());
        assert!(RouletteBet::Color(Color::Green).validate().is_err());
        assert!(RouletteBet::Number(0).validate().is_ok());
    }

    #[test]
    fn test_spin_covers_wheel() {
        let wheel = wheel();
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen = [false; POCKETS as usize];
        for _ in 0..20_000 {
            seen[wheel.spin(&mut rng).number as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }
}
