//! Shared type definitions for the wagering engine
//!
//! Canonical identifiers, the `Wager` record and the fixed-point `Multiplier`
//! used by every game's payout table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque user identifier supplied by the command layer
pub type UserId = String;

/// Unique wager identifier, the idempotency key for settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WagerId(pub Uuid);

impl WagerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WagerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque blackjack session handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supported game types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Slots,
    Dice,
    Roulette,
    Blackjack,
}

impl GameType {
    pub const ALL: [GameType; 4] = [
        GameType::Slots,
        GameType::Dice,
        GameType::Roulette,
        GameType::Blackjack,
    ];
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameType::Slots => write!(f, "slots"),
            GameType::Dice => write!(f, "dice"),
            GameType::Roulette => write!(f, "roulette"),
            GameType::Blackjack => write!(f, "blackjack"),
        }
    }
}

impl std::str::FromStr for GameType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "slots" | "slot" => Ok(GameType::Slots),
            "dice" => Ok(GameType::Dice),
            "roulette" => Ok(GameType::Roulette),
            "blackjack" | "bj" => Ok(GameType::Blackjack),
            other => Err(format!("unknown game '{}'", other)),
        }
    }
}

/// Wager lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WagerStatus {
    Pending,
    Settled,
}

/// A registered bet; chips are already debited when this exists
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Wager {
    pub id: WagerId,
    pub user: UserId,
    pub game: GameType,
    pub amount: u64,
    pub created_at: DateTime<Utc>,
    pub status: WagerStatus,
    /// Recorded together with the Settled transition for reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
}

impl Wager {
    pub fn new(user: impl Into<UserId>, game: GameType, amount: u64) -> Self {
        Self {
            id: WagerId::new(),
            user: user.into(),
            game,
            amount,
            created_at: Utc::now(),
            status: WagerStatus::Pending,
            payout: None,
            settled_at: None,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.status == WagerStatus::Settled
    }

    /// Store key for this wager's record
    pub fn record_key(id: &WagerId) -> String {
        format!("wager:{}", id)
    }
}

/// Payout multiplier in fixed-point hundredths (`2.30x` is `230`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Multiplier(u32);

impl Multiplier {
    pub const ZERO: Multiplier = Multiplier(0);
    pub const ONE: Multiplier = Multiplier(100);

    pub const fn from_hundredths(hundredths: u32) -> Self {
        Self(hundredths)
    }

    pub const fn hundredths(&self) -> u32 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// `floor(bet * multiplier)` computed without floating point
    pub fn apply(&self, bet: u64) -> u64 {
        let scaled = bet as u128 * self.0 as u128 / 100;
        scaled.min(u64::MAX as u128) as u64
    }

    pub fn saturating_add(self, other: Multiplier) -> Multiplier {
        Multiplier(self.0.saturating_add(other.0))
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl TryFrom<f64> for Multiplier {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("multiplier must be a non-negative number, got {}", value));
        }
        let hundredths = (value * 100.0).round();
        if hundredths > u32::MAX as f64 {
            return Err(format!("multiplier {} is too large", value));
        }
        Ok(Multiplier(hundredths as u32))
    }
}

impl From<Multiplier> for f64 {
    fn from(m: Multiplier) -> Self {
        m.as_f64()
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}x", self.0 / 100, self.0 % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplier_apply_is_exact() {
        let natural = Multiplier::try_from(2.3).unwrap();
        assert_eq!(natural.hundredths(), 230);
        assert_eq!(natural.apply(50), 115);
        assert_eq!(natural.apply(100), 230);
        assert_eq!(Multiplier::from_hundredths(50).apply(15), 7);
    }

    #[test]
    fn test_multiplier_rejects_negative() {
        assert!(Multiplier::try_from(-1.0).is_err());
        assert!(Multiplier::try_from(f64::NAN).is_err());
    }

    #[test]
    fn test_multiplier_display() {
        assert_eq!(Multiplier::from_hundredths(230).to_string(), "2.30x");
        assert_eq!(Multiplier::from_hundredths(3100).to_string(), "31.00x");
    }

    #[test]
    fn test_game_type_parse() {
        assert_eq!("Roulette".parse::<GameType>().unwrap(), GameType::Roulette);
        assert!("poker".parse::<GameType>().is_err());
    }

    #[test]
    fn test_wager_serialization() {
        let wager = Wager::new("user-1", GameType::Dice, 50);
        let json = serde_json::to_vec(&wager).unwrap();
        let decoded: Wager = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, wager);
        assert_eq!(decoded.status, WagerStatus::Pending);
    }
}
