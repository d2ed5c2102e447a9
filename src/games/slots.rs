//! Three-reel slot machine
//!
//! Each reel draws independently from the weighted alphabet. Classification runs
//! in priority order: triple jackpot, triple rare, triple common, jackpot pair,
//! any other pair, then a lone jackpot symbol which pays the minimum multiplier
//! on a secondary roll.

use super::weighted::WeightedTable;
use crate::common::types::Multiplier;
use crate::config::SlotsConfig;
use crate::errors::ConfigurationError;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const REELS: usize = 3;

/// Win classes, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotsWin {
    Jackpot,
    Super,
    Big,
    Medium,
    Small,
    Minimum,
    NoWin,
}

/// Result of one spin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotsOutcome {
    /// Symbol indices into the machine's alphabet
    pub reels: [usize; REELS],
    pub symbols: [String; REELS],
    pub class: SlotsWin,
    pub multiplier: Multiplier,
}

/// Validated slot machine built from `SlotsConfig`
#[derive(Debug, Clone)]
pub struct SlotMachine {
    table: WeightedTable<usize>,
    names: Vec<String>,
    common_symbols: usize,
    minimum_win_chance: f64,
    payouts: SlotsConfig,
}

impl SlotMachine {
    pub fn from_config(config: &SlotsConfig) -> Result<Self, ConfigurationError> {
        let table = WeightedTable::new(
            "slots.symbols",
            config
                .symbols
                .iter()
                .enumerate()
                .map(|(i, s)| (i, s.weight))
                .collect(),
        )?;
        if config.common_symbols == 0 || config.common_symbols >= config.symbols.len() {
            return Err(ConfigurationError::ValidationFailed(
                "slots.common_symbols must leave the jackpot symbol outside the common set"
                    .to_string(),
            ));
        }

        Ok(Self {
            table,
            names: config.symbols.iter().map(|s| s.symbol.clone()).collect(),
            common_symbols: config.common_symbols,
            minimum_win_chance: config.minimum_win_chance,
            payouts: config.clone(),
        })
    }

    /// The rarest symbol
    pub fn jackpot_symbol(&self) -> usize {
        self.names.len() - 1
    }

    pub fn symbol_name(&self, index: usize) -> &str {
        self.names.get(index).map(String::as_str).unwrap_or("?")
    }

    pub fn symbol_count(&self) -> usize {
        self.names.len()
    }

    /// Configured share of draws for each symbol
    pub fn symbol_share(&self, index: usize) -> f64 {
        self.table.share(index)
    }

    pub fn multiplier_for(&self, class: SlotsWin) -> Multiplier {
        match class {
            SlotsWin::Jackpot => self.payouts.jackpot,
            SlotsWin::Super => self.payouts.super_win,
            SlotsWin::Big => self.payouts.big_win,
            SlotsWin::Medium => self.payouts.medium_win,
            SlotsWin::Small => self.payouts.small_win,
            SlotsWin::Minimum => self.payouts.minimum_win,
            SlotsWin::NoWin => Multiplier::ZERO,
        }
    }

    /// Draw a single reel symbol
    pub fn draw_symbol<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        *self.table.sample(rng)
    }

    /// Classify reels; `lone_jackpot_pays` is the outcome of the secondary roll
    pub fn classify(&self, reels: &[usize; REELS], lone_jackpot_pays: bool) -> SlotsWin {
        let jackpot = self.jackpot_symbol();
        let [a, b, c] = *reels;

        if a == b && b == c {
            return if a == jackpot {
                SlotsWin::Jackpot
            } else if a < self.common_symbols {
                SlotsWin::Big
            } else {
                SlotsWin::Super
            };
        }

        let pair = if a == b || a == c {
            Some(a)
        } else if b == c {
            Some(b)
        } else {
            None
        };
        if let Some(symbol) = pair {
            return if symbol == jackpot {
                SlotsWin::Medium
            } else {
                SlotsWin::Small
            };
        }

        if reels.contains(&jackpot) && lone_jackpot_pays {
            return SlotsWin::Minimum;
        }
        SlotsWin::NoWin
    }

    /// Spin all reels and classify the result
    pub fn spin<R: Rng + ?Sized>(&self, rng: &mut R) -> SlotsOutcome {
        let reels = [
            self.draw_symbol(rng),
            self.draw_symbol(rng),
            self.draw_symbol(rng),
        ];
        self.outcome_for(reels, rng)
    }

    /// Build the outcome for fixed reels, rolling the secondary chance only when needed
    pub fn outcome_for<R: Rng + ?Sized>(&self, reels: [usize; REELS], rng: &mut R) -> SlotsOutcome {
        let needs_roll = self.classify(&reels, true) == SlotsWin::Minimum;
        let lone_jackpot_pays = needs_roll && rng.gen_bool(self.minimum_win_chance);
        let class = self.classify(&reels, lone_jackpot_pays);

        SlotsOutcome {
            reels,
            symbols: reels.map(|i| self.symbol_name(i).to_string()),
            class,
            multiplier: self.multiplier_for(class),
        }
    }

    /// Theoretical return to player of one unit bet
    pub fn expected_return(&self) -> f64 {
        let n = self.symbol_count();
        let mut total = 0.0;
        for a in 0..n {
            for b in 0..n {
                for c in 0..n {
                    let p = self.symbol_share(a) * self.symbol_share(b) * self.symbol_share(c);
                    let reels = [a, b, c];
                    let class = self.classify(&reels, true);
                    let chance = if class == SlotsWin::Minimum {
                        self.minimum_win_chance
                    } else {
                        1.0
                    };
                    total += p * chance * self.multiplier_for(class).as_f64();
                }
            }
        }
        total
    }
}
