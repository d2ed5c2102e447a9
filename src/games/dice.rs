//! Two-dice sum game
//!
//! The player names a sum in `2..=12`; only an exact match pays. Multipliers are
//! inversely proportional to the true probability of each sum.

use crate::common::types::Multiplier;
use crate::config::DiceConfig;
use crate::errors::ConfigurationError;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const MIN_SUM: u8 = 2;
pub const MAX_SUM: u8 = 12;

/// A pair of dice and their sum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRoll {
    pub dice: [u8; 2],
    pub sum: u8,
}

impl DiceRoll {
    pub fn from_faces(a: u8, b: u8) -> Self {
        Self {
            dice: [a, b],
            sum: a + b,
        }
    }
}

/// Roll two independent fair dice
pub fn roll<R: Rng + ?Sized>(rng: &mut R) -> DiceRoll {
    DiceRoll::from_faces(rng.gen_range(1..=6), rng.gen_range(1..=6))
}

/// Number of the 36 face pairs that produce `sum`
pub fn ways_to_roll(sum: u8) -> u8 {
    if !(MIN_SUM..=MAX_SUM).contains(&sum) {
        return 0;
    }
    6 - (sum as i8 - 7).unsigned_abs()
}

/// Validated sum payout table
#[derive(Debug, Clone, PartialEq)]
pub struct DiceTable {
    multipliers: [Multiplier; 11],
}

impl DiceTable {
    pub fn from_config(config: &DiceConfig) -> Result<Self, ConfigurationError> {
        let multipliers: [Multiplier; 11] =
            config.sum_multipliers.clone().try_into().map_err(|v: Vec<Multiplier>| {
                ConfigurationError::ValidationFailed(format!(
                    "dice table needs 11 multipliers, got {}",
                    v.len()
                ))
            })?;
        Ok(Self { multipliers })
    }

    pub fn is_valid_target(target: u8) -> bool {
        (MIN_SUM..=MAX_SUM).contains(&target)
    }

    pub fn multiplier_for(&self, sum: u8) -> Multiplier {
        if Self::is_valid_target(sum) {
            self.multipliers[(sum - MIN_SUM) as usize]
        } else {
            Multiplier::ZERO
        }
    }

    /// Multiplier earned by a bet on `target` given `roll`
    pub fn evaluate(&self, roll: &DiceRoll, target: u8) -> Multiplier {
        if roll.sum == target {
            self.multiplier_for(target)
        } else {
            Multiplier::ZERO
        }
    }

    /// Theoretical return of a unit bet on `target`
    pub fn expected_return(&self, target: u8) -> f64 {
        ways_to_roll(target) as f64 / 36.0 * self.multiplier_for(target).as_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn table() -> DiceTable {
        DiceTable::from_config(&DiceConfig::default()).unwrap()
    }

    #[test]
    fn test_seven_pays_four() {
        let table = table();
        let roll = DiceRoll::from_faces(3, 4);
        assert_eq!(table.evaluate(&roll, 7).apply(50), 200);
        assert!(table.evaluate(&roll, 8).is_zero());
    }

    #[test]
    fn test_extremes_pay_most() {
        let table = table();
        let seven = table.multiplier_for(7);
        for sum in MIN_SUM..=MAX_SUM {
            assert!(table.multiplier_for(sum) >= seven);
        }
        assert_eq!(table.multiplier_for(2), table.multiplier_for(12));
        assert!(table.multiplier_for(13).is_zero());
    }

    #[test]
    fn test_every_target_favours_house() {
        let table = table();
        for target in MIN_SUM..=MAX_SUM {
            let rtp = table.expected_return(target);
            assert!(rtp < 1.0, "target {} returns {}", target, rtp);
        }
    }

    #[test]
    fn test_ways_sum_to_36() {
        let total: u32 = (MIN_SUM..=MAX_SUM).map(|s| ways_to_roll(s) as u32).sum();
        assert_eq!(total, 36);
        assert_eq!(ways_to_roll(7), 6);
        assert_eq!(ways_to_roll(1), 0);
    }

    #[test]
    fn test_rolls_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..10_000 {
            let r = roll(&mut rng);
            assert!((1..=6).contains(&r.dice[0]) && (1..=6).contains(&r.dice[1]));
            assert_eq!(r.sum, r.dice[0] + r.dice[1]);
        }
    }

    #[test]
    fn test_short_table_rejected() {
        let config = DiceConfig {
            sum_multipliers: vec![Multiplier::ONE; 5],
        };
        assert!(DiceTable::from_config(&config).is_err());
    }
}
