//! Shared types and the store interface
//!
//! Identifiers, the wager record, fixed-point multipliers and the `LedgerStore`
//! trait every service depends on.

pub mod traits;
pub mod types;
