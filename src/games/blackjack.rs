//! Blackjack cards, hands, dealer policy and the per-session state machine
//!
//! `BlackjackSession` is a plain serializable value. It never touches the ledger;
//! the table persists it between actions and settles the wager once it reaches
//! `SessionState::Settled`.

use crate::common::types::{Multiplier, SessionId, UserId, WagerId};
use crate::config::BlackjackConfig;
use crate::errors::{CasinoError, CasinoResult};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Clubs,
    Diamonds,
    Hearts,
    Spades,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Clubs, Suit::Diamonds, Suit::Hearts, Suit::Spades];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
    ];

    /// Face value with the ace counted high
    pub fn value(&self) -> u8 {
        match self {
            Rank::Two => 2,
            Rank::Three => 3,
            Rank::Four => 4,
            Rank::Five => 5,
            Rank::Six => 6,
            Rank::Seven => 7,
            Rank::Eight => 8,
            Rank::Nine => 9,
            Rank::Ten | Rank::Jack | Rank::Queen | Rank::King => 10,
            Rank::Ace => 11,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::Ace => "A",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    pub const fn new(rank: Rank, suit: Suit) -> Self {
        Self { rank, suit }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suit = match self.suit {
            Suit::Clubs => '♣',
            Suit::Diamonds => '♦',
            Suit::Hearts => '♥',
            Suit::Spades => '♠',
        };
        write!(f, "{}{}", self.rank.label(), suit)
    }
}

/// Ordered cards, drawn from the end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    /// Unshuffled 52-card deck
    pub fn standard() -> Self {
        let cards = Suit::ALL
            .iter()
            .flat_map(|suit| Rank::ALL.iter().map(move |rank| Card::new(*rank, *suit)))
            .collect();
        Self { cards }
    }

    /// Standard deck with a uniform Fisher-Yates shuffle
    pub fn shuffled<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut deck = Self::standard();
        deck.cards.shuffle(rng);
        deck
    }

    /// Deck that deals `draw_order` front to back
    pub fn stacked(mut draw_order: Vec<Card>) -> Self {
        draw_order.reverse();
        Self { cards: draw_order }
    }

    pub fn draw(&mut self) -> Option<Card> {
        self.cards.pop()
    }

    pub fn remaining(&self) -> usize {
        self.cards.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hand {
    cards: Vec<Card>,
}

impl Hand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cards(cards: Vec<Card>) -> Self {
        Self { cards }
    }

    pub fn push(&mut self, card: Card) {
        self.cards.push(card);
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Best total: aces count 11 and drop to 1 one at a time while over 21
    pub fn score(&self) -> u8 {
        let mut total: u32 = self.cards.iter().map(|c| c.rank.value() as u32).sum();
        let mut soft_aces = self.cards.iter().filter(|c| c.rank == Rank::Ace).count();
        while total > 21 && soft_aces > 0 {
            total -= 10;
            soft_aces -= 1;
        }
        total.min(u8::MAX as u32) as u8
    }

    pub fn is_bust(&self) -> bool {
        self.score() > 21
    }

    pub fn is_natural(&self) -> bool {
        self.cards.len() == 2 && self.score() == 21
    }
}

/// Decides whether the dealer takes another card
pub trait DealerPolicy: Send + Sync {
    fn should_draw(&self, dealer: &Hand, player_score: u8, rng: &mut dyn RngCore) -> bool;
}

/// Draw below `stand_on`, then stand
#[derive(Debug, Clone, Copy)]
pub struct StandardDealer {
    pub stand_on: u8,
}

impl Default for StandardDealer {
    fn default() -> Self {
        Self { stand_on: 17 }
    }
}

impl DealerPolicy for StandardDealer {
    fn should_draw(&self, dealer: &Hand, _player_score: u8, _rng: &mut dyn RngCore) -> bool {
        dealer.score() < self.stand_on
    }
}

/// Standard rules, plus a probabilistic chase of strong player hands
///
/// Once the dealer would normally stand, if the player holds more than
/// `chase_above` and is still ahead, each further draw happens with
/// `chase_probability`.
#[derive(Debug, Clone, Copy)]
pub struct HouseEdgeDealer {
    pub stand_on: u8,
    pub chase_above: u8,
    pub chase_probability: f64,
}

impl HouseEdgeDealer {
    pub fn from_config(config: &BlackjackConfig) -> Self {
        Self {
            stand_on: config.dealer_stand_on,
            chase_above: config.chase_above,
            chase_probability: config.dealer_chase_probability,
        }
    }
}

impl DealerPolicy for HouseEdgeDealer {
    fn should_draw(&self, dealer: &Hand, player_score: u8, rng: &mut dyn RngCore) -> bool {
        let score = dealer.score();
        if score < self.stand_on {
            return true;
        }
        let chasing = player_score > self.chase_above && score < player_score && score < 21;
        chasing && rng.gen_bool(self.chase_probability)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Dealing,
    PlayerTurn,
    DealerTurn,
    Settled,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Dealing => write!(f, "dealing"),
            SessionState::PlayerTurn => write!(f, "player_turn"),
            SessionState::DealerTurn => write!(f, "dealer_turn"),
            SessionState::Settled => write!(f, "settled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlackjackAction {
    Hit,
    Stand,
    Surrender,
}

impl fmt::Display for BlackjackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlackjackAction::Hit => write!(f, "hit"),
            BlackjackAction::Stand => write!(f, "stand"),
            BlackjackAction::Surrender => write!(f, "surrender"),
        }
    }
}

/// Terminal result of a hand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandResult {
    Natural,
    NaturalPush,
    Win,
    DealerBust,
    Push,
    Loss,
    PlayerBust,
    Surrender,
    Timeout,
}

impl HandResult {
    pub fn multiplier(&self, config: &BlackjackConfig) -> Multiplier {
        match self {
            HandResult::Natural => config.natural,
            HandResult::Win | HandResult::DealerBust => config.win,
            HandResult::Push | HandResult::NaturalPush => config.push,
            HandResult::Surrender => config.surrender,
            HandResult::Loss | HandResult::PlayerBust | HandResult::Timeout => Multiplier::ZERO,
        }
    }
}

/// Final hands handed to settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackjackOutcome {
    pub result: HandResult,
    pub player_cards: Vec<Card>,
    pub dealer_cards: Vec<Card>,
    pub player_score: u8,
    pub dealer_score: u8,
}

/// One user's hand against the dealer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlackjackSession {
    pub id: SessionId,
    pub user: UserId,
    pub wager_id: WagerId,
    pub bet: u64,
    pub state: SessionState,
    deck: Deck,
    player: Hand,
    dealer: Hand,
    pub result: Option<HandResult>,
    pub created_at: DateTime<Utc>,
    pub last_action_at: DateTime<Utc>,
}

impl BlackjackSession {
    /// Deal two cards each, alternating player then dealer
    ///
    /// A player natural settles immediately: push against a dealer natural,
    /// otherwise a natural win.
    pub fn deal(
        id: SessionId,
        user: impl Into<UserId>,
        wager_id: WagerId,
        bet: u64,
        deck: Deck,
        now: DateTime<Utc>,
    ) -> CasinoResult<Self> {
        let mut session = Self {
            id,
            user: user.into(),
            wager_id,
            bet,
            state: SessionState::Dealing,
            deck,
            player: Hand::new(),
            dealer: Hand::new(),
            result: None,
            created_at: now,
            last_action_at: now,
        };

        for _ in 0..2 {
            let card = session.draw()?;
            session.player.push(card);
            let card = session.draw()?;
            session.dealer.push(card);
        }

        if session.player.is_natural() {
            let result = if session.dealer.is_natural() {
                HandResult::NaturalPush
            } else {
                HandResult::Natural
            };
            session.finish(result);
        } else {
            session.state = SessionState::PlayerTurn;
        }
        Ok(session)
    }

    fn draw(&mut self) -> CasinoResult<Card> {
        self.deck.draw().ok_or_else(|| CasinoError::IllegalAction {
            action: "draw".to_string(),
            state: "deck exhausted".to_string(),
        })
    }

    fn finish(&mut self, result: HandResult) {
        self.result = Some(result);
        self.state = SessionState::Settled;
    }

    pub fn player_hand(&self) -> &Hand {
        &self.player
    }

    pub fn dealer_hand(&self) -> &Hand {
        &self.dealer
    }

    pub fn is_settled(&self) -> bool {
        self.state == SessionState::Settled
    }

    /// True once `timeout` has passed since the last action on a live hand
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: std::time::Duration) -> bool {
        if self.is_settled() {
            return false;
        }
        let timeout = chrono::Duration::from_std(timeout)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        now.signed_duration_since(self.last_action_at) >= timeout
    }

    /// Apply a player action during the player's turn
    pub fn apply(
        &mut self,
        action: BlackjackAction,
        dealer: &dyn DealerPolicy,
        rng: &mut dyn RngCore,
        now: DateTime<Utc>,
    ) -> CasinoResult<()> {
        if self.state != SessionState::PlayerTurn {
            return Err(CasinoError::IllegalAction {
                action: action.to_string(),
                state: self.state.to_string(),
            });
        }
        self.last_action_at = now;

        match action {
            BlackjackAction::Hit => {
                let card = self.draw()?;
                self.player.push(card);
                if self.player.is_bust() {
                    self.finish(HandResult::PlayerBust);
                }
            }
            BlackjackAction::Stand => {
                self.state = SessionState::DealerTurn;
                self.play_dealer(dealer, rng)?;
            }
            BlackjackAction::Surrender => self.finish(HandResult::Surrender),
        }
        Ok(())
    }

    fn play_dealer(&mut self, policy: &dyn DealerPolicy, rng: &mut dyn RngCore) -> CasinoResult<()> {
        let player_score = self.player.score();
        while self.dealer.score() < 21 && policy.should_draw(&self.dealer, player_score, rng) {
            let card = self.draw()?;
            self.dealer.push(card);
        }

        let dealer_score = self.dealer.score();
        let result = if dealer_score > 21 {
            HandResult::DealerBust
        } else if dealer_score > player_score {
            HandResult::Loss
        } else if dealer_score < player_score {
            HandResult::Win
        } else {
            HandResult::Push
        };
        self.finish(result);
        Ok(())
    }

    /// Force a live hand to a timeout loss; returns false if already settled
    pub fn expire(&mut self) -> bool {
        if self.is_settled() {
            return false;
        }
        self.finish(HandResult::Timeout);
        true
    }

    /// Final hands, available once settled
    pub fn outcome(&self) -> Option<BlackjackOutcome> {
        self.result.map(|result| BlackjackOutcome {
            result,
            player_cards: self.player.cards().to_vec(),
            dealer_cards: self.dealer.cards().to_vec(),
            player_score: self.player.score(),
            dealer_score: self.dealer.score(),
        })
    }

    /// Caller-facing snapshot; the dealer's hole card stays hidden until showdown
    pub fn view(&self) -> SessionView {
        let dealer_cards = if self.is_settled() {
            self.dealer.cards().to_vec()
        } else {
            self.dealer.cards().iter().take(1).copied().collect()
        };
        let dealer_score = Hand::from_cards(dealer_cards.clone()).score();

        SessionView {
            session_id: self.id,
            wager_id: self.wager_id,
            bet: self.bet,
            state: self.state,
            player_cards: self.player.cards().to_vec(),
            player_score: self.player.score(),
            dealer_cards,
            dealer_score,
            result: self.result,
            expired: self.result == Some(HandResult::Timeout),
            payout: None,
        }
    }

    pub fn record_key(id: &SessionId) -> String {
        format!("session:{}", id)
    }
}

/// What the caller sees after each transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub wager_id: WagerId,
    pub bet: u64,
    pub state: SessionState,
    pub player_cards: Vec<Card>,
    pub player_score: u8,
    pub dealer_cards: Vec<Card>,
    pub dealer_score: u8,
    pub result: Option<HandResult>,
    /// Set when the hand was force-settled by the action timeout
    pub expired: bool,
    /// Filled in by the table once the wager is settled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payout: Option<u64>,
}
