//! Configuration management with validation and defaults
//!
//! Payout tables, weight tables and limits are static per deployment. They load from
//! TOML, take `CHIPWAGER_*` environment overrides, and are validated once at startup;
//! a malformed table is a fatal configuration error, never a runtime one.

use crate::common::types::Multiplier;
use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Complete engine configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CasinoConfig {
    pub limits: LimitsConfig,
    pub slots: SlotsConfig,
    pub dice: DiceConfig,
    pub roulette: RouletteConfig,
    pub blackjack: BlackjackConfig,
    pub pity: PityConfig,
    pub exchange: ExchangeConfig,
}

/// Bet size limits shared by every game
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    pub min_bet: u64,
    pub max_bet: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            min_bet: 1,
            max_bet: 100_000,
        }
    }
}

/// One reel symbol and its draw weight
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SymbolWeight {
    pub symbol: String,
    pub weight: u32,
}

/// Slot machine alphabet and payout table
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SlotsConfig {
    /// Ordered from most common to rarest; the last symbol is the jackpot symbol
    pub symbols: Vec<SymbolWeight>,
    /// How many of the most common symbols count as "common" for the big-win class
    pub common_symbols: usize,
    pub jackpot: Multiplier,
    pub super_win: Multiplier,
    pub big_win: Multiplier,
    pub medium_win: Multiplier,
    pub small_win: Multiplier,
    pub minimum_win: Multiplier,
    /// Chance that a lone jackpot symbol pays the minimum multiplier
    pub minimum_win_chance: f64,
}

impl Default for SlotsConfig {
    fn default() -> Self {
        let symbols = [
            ("cherry", 30),
            ("lemon", 25),
            ("orange", 20),
            ("grape", 12),
            ("bell", 8),
            ("seven", 4),
            ("diamond", 1),
        ]
        .into_iter()
        .map(|(symbol, weight)| SymbolWeight {
            symbol: symbol.to_string(),
            weight,
        })
        .collect();

        Self {
            symbols,
            common_symbols: 3,
            jackpot: Multiplier::from_hundredths(2000),
            super_win: Multiplier::from_hundredths(1000),
            big_win: Multiplier::from_hundredths(500),
            medium_win: Multiplier::from_hundredths(300),
            small_win: Multiplier::from_hundredths(130),
            minimum_win: Multiplier::from_hundredths(110),
            minimum_win_chance: 0.8,
        }
    }
}

/// Two-dice sum payout table
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiceConfig {
    /// Multiplier for sums 2 through 12, in order
    pub sum_multipliers: Vec<Multiplier>,
}

impl Default for DiceConfig {
    fn default() -> Self {
        // Two thirds of the fair odds for each sum
        let hundredths = [2400, 1200, 800, 600, 480, 400, 480, 600, 800, 1200, 2400];
        Self {
            sum_multipliers: hundredths
                .into_iter()
                .map(Multiplier::from_hundredths)
                .collect(),
        }
    }
}

/// Roulette wheel weights and bet payouts
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RouletteConfig {
    /// Draw weight of each pocket 1..=36
    pub pocket_weight: u32,
    /// Draw weight of the zero pocket (slightly above `pocket_weight`)
    pub zero_weight: u32,
    pub number: Multiplier,
    pub color: Multiplier,
    pub parity: Multiplier,
    pub dozen: Multiplier,
    pub column: Multiplier,
}

impl Default for RouletteConfig {
    fn default() -> Self {
        Self {
            pocket_weight: 100,
            zero_weight: 120,
            number: Multiplier::from_hundredths(3100),
            color: Multiplier::from_hundredths(190),
            parity: Multiplier::from_hundredths(190),
            dozen: Multiplier::from_hundredths(280),
            column: Multiplier::from_hundredths(280),
        }
    }
}

/// Blackjack table rules
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BlackjackConfig {
    pub win: Multiplier,
    pub natural: Multiplier,
    pub push: Multiplier,
    pub surrender: Multiplier,
    /// Dealer keeps drawing below this score
    pub dealer_stand_on: u8,
    /// Player score above which the house dealer may chase
    pub chase_above: u8,
    /// Chance per draw that the house dealer chases a higher player score
    pub dealer_chase_probability: f64,
    pub action_timeout_secs: u64,
    pub reaper_interval_secs: u64,
}

impl Default for BlackjackConfig {
    fn default() -> Self {
        Self {
            win: Multiplier::from_hundredths(200),
            natural: Multiplier::from_hundredths(230),
            push: Multiplier::ONE,
            surrender: Multiplier::from_hundredths(50),
            dealer_stand_on: 17,
            chase_above: 17,
            dealer_chase_probability: 0.7,
            action_timeout_secs: 60,
            reaper_interval_secs: 5,
        }
    }
}

impl BlackjackConfig {
    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }
}

/// Progressive-odds bonus after losing streaks
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PityConfig {
    pub enabled: bool,
    /// Losses needed to reach the full bonus
    pub threshold: u32,
    pub max_bonus: Multiplier,
}

impl Default for PityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 10,
            max_bonus: Multiplier::from_hundredths(50),
        }
    }
}

/// Chip to currency conversion
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Currency units per chip
    pub chip_value: u64,
    /// Fee in basis points (1500 = 15%)
    pub fee_bps: u32,
    pub min_chips: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            chip_value: 10,
            fee_bps: 1500,
            min_chips: 1,
        }
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

impl CasinoConfig {
    /// Validate every table; called once by the loader and by the engine constructor
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.limits.min_bet == 0 {
            return Err(invalid("limits.min_bet", 0, "Minimum bet must be positive"));
        }
        if self.limits.max_bet < self.limits.min_bet {
            return Err(invalid(
                "limits.max_bet",
                self.limits.max_bet,
                "Maximum bet is below the minimum bet",
            ));
        }

        let slots = &self.slots;
        if slots.symbols.len() < 2 {
            return Err(invalid(
                "slots.symbols",
                slots.symbols.len(),
                "At least two symbols are required",
            ));
        }
        if slots.symbols.iter().map(|s| s.weight as u64).sum::<u64>() == 0 {
            return Err(invalid("slots.symbols", "0", "Weights sum to zero"));
        }
        if slots.symbols.windows(2).any(|w| w[1].weight >= w[0].weight) {
            return Err(invalid(
                "slots.symbols",
                "weights",
                "Weights must strictly decrease toward rarer symbols",
            ));
        }
        if slots.common_symbols == 0 || slots.common_symbols >= slots.symbols.len() {
            return Err(invalid(
                "slots.common_symbols",
                slots.common_symbols,
                "Must leave at least the jackpot symbol outside the common set",
            ));
        }
        if !(0.0..=1.0).contains(&slots.minimum_win_chance) {
            return Err(invalid(
                "slots.minimum_win_chance",
                slots.minimum_win_chance,
                "Probability must be within [0, 1]",
            ));
        }

        if self.dice.sum_multipliers.len() != 11 {
            return Err(invalid(
                "dice.sum_multipliers",
                self.dice.sum_multipliers.len(),
                "Exactly 11 entries (sums 2..=12) are required",
            ));
        }

        if self.roulette.pocket_weight == 0 {
            return Err(invalid("roulette.pocket_weight", 0, "Weight must be positive"));
        }
        if self.roulette.zero_weight < self.roulette.pocket_weight {
            return Err(invalid(
                "roulette.zero_weight",
                self.roulette.zero_weight,
                "Zero must weigh at least as much as any other pocket",
            ));
        }

        let bj = &self.blackjack;
        if !(0.0..=1.0).contains(&bj.dealer_chase_probability) {
            return Err(invalid(
                "blackjack.dealer_chase_probability",
                bj.dealer_chase_probability,
                "Probability must be within [0, 1]",
            ));
        }
        if bj.dealer_stand_on == 0 || bj.dealer_stand_on > 21 {
            return Err(invalid(
                "blackjack.dealer_stand_on",
                bj.dealer_stand_on,
                "Must be within 1..=21",
            ));
        }
        if bj.action_timeout_secs == 0 {
            return Err(invalid(
                "blackjack.action_timeout_secs",
                0,
                "Timeout must be positive",
            ));
        }
        if bj.reaper_interval_secs == 0 {
            return Err(invalid(
                "blackjack.reaper_interval_secs",
                0,
                "Interval must be positive",
            ));
        }

        if self.pity.enabled && self.pity.threshold == 0 {
            return Err(invalid("pity.threshold", 0, "Threshold must be positive"));
        }

        if self.exchange.chip_value == 0 {
            return Err(invalid("exchange.chip_value", 0, "Chip value must be positive"));
        }
        if self.exchange.fee_bps > 10_000 {
            return Err(invalid(
                "exchange.fee_bps",
                self.exchange.fee_bps,
                "Fee cannot exceed 100%",
            ));
        }

        Ok(())
    }
}

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> Result<CasinoConfig, ConfigurationError> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            CasinoConfig::default()
        };

        self.apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> Result<CasinoConfig, ConfigurationError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)))
    }

    fn apply_env_overrides(&self, config: &mut CasinoConfig) -> Result<(), ConfigurationError> {
        if let Some(value) = parse_env::<u64>("CHIPWAGER_MIN_BET")? {
            config.limits.min_bet = value;
        }
        if let Some(value) = parse_env::<u64>("CHIPWAGER_MAX_BET")? {
            config.limits.max_bet = value;
        }
        if let Some(value) = parse_env::<u64>("CHIPWAGER_CHIP_VALUE")? {
            config.exchange.chip_value = value;
        }
        if let Some(value) = parse_env::<u32>("CHIPWAGER_EXCHANGE_FEE_BPS")? {
            config.exchange.fee_bps = value;
        }
        if let Some(value) = parse_env::<u64>("CHIPWAGER_BLACKJACK_TIMEOUT_SECS")? {
            config.blackjack.action_timeout_secs = value;
        }
        if let Some(value) = parse_env::<bool>("CHIPWAGER_PITY_ENABLED")? {
            config.pity.enabled = value;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, config: &CasinoConfig, path: &str) -> Result<(), ConfigurationError> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigurationError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(name, raw, "Could not parse environment override")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = CasinoConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.roulette.number.hundredths(), 3100);
        assert_eq!(config.dice.sum_multipliers[5].hundredths(), 400);
        assert_eq!(config.blackjack.natural.hundredths(), 230);
    }

    #[test]
    fn test_zero_weight_table_is_fatal() {
        let mut config = CasinoConfig::default();
        for symbol in &mut config.slots.symbols {
            symbol.weight = 0;
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_decreasing_weights_rejected() {
        let mut config = CasinoConfig::default();
        config.slots.symbols[3].weight = config.slots.symbols[2].weight;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_limits_rejected() {
        let mut config = CasinoConfig::default();
        config.limits.max_bet = 0;
        assert!(config.validate().is_err());

        let mut config = CasinoConfig::default();
        config.exchange.fee_bps = 10_001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: CasinoConfig = toml::from_str(
            r#"
            [limits]
            max_bet = 500

            [blackjack]
            natural = 2.5
            "#,
        )
        .unwrap();
        assert_eq!(config.limits.max_bet, 500);
        assert_eq!(config.limits.min_bet, 1);
        assert_eq!(config.blackjack.natural.hundredths(), 250);
        assert_eq!(config.blackjack.win.hundredths(), 200);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let original = CasinoConfig::default();
        ConfigLoader::new().save(&original, path).unwrap();

        let loaded = ConfigLoader::new().with_path(path).load().unwrap();
        assert_eq!(loaded.slots, original.slots);
        assert_eq!(loaded.roulette, original.roulette);
        assert_eq!(loaded.exchange, original.exchange);
    }

    #[test]
    fn test_missing_file_fails_to_load() {
        let result = ConfigLoader::new()
            .with_path("/definitely/not/here.toml")
            .load();
        assert!(matches!(result, Err(ConfigurationError::LoadFailed(_))));
    }
}
