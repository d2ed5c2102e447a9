//! Cumulative-weight selection
//!
//! Draw `r` uniformly from `[0, total)` and walk the buckets subtracting each weight
//! until `r` falls inside one. Tables are validated when built, so sampling is total.

use crate::errors::ConfigurationError;
use rand::Rng;

/// Immutable table of items with integer draw weights
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedTable<T> {
    entries: Vec<(T, u32)>,
    total: u64,
}

impl<T> WeightedTable<T> {
    /// Build a table; empty tables and tables whose weights sum to zero are rejected
    pub fn new(name: &str, entries: Vec<(T, u32)>) -> Result<Self, ConfigurationError> {
        if entries.is_empty() {
            return Err(ConfigurationError::ValidationFailed(format!(
                "weight table '{}' is empty",
                name
            )));
        }
        let total: u64 = entries.iter().map(|(_, w)| *w as u64).sum();
        if total == 0 {
            return Err(ConfigurationError::ValidationFailed(format!(
                "weight table '{}' sums to zero",
                name
            )));
        }
        Ok(Self { entries, total })
    }

    pub fn total_weight(&self) -> u64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured probability of the entry at `index`
    pub fn share(&self, index: usize) -> f64 {
        self.entries
            .get(index)
            .map(|(_, w)| *w as f64 / self.total as f64)
            .unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&T, u32)> {
        self.entries.iter().map(|(item, w)| (item, *w))
    }

    /// Index of the bucket that the offset `r` (in `[0, total)`) lands in
    pub fn index_for(&self, mut r: u64) -> usize {
        for (index, (_, weight)) in self.entries.iter().enumerate() {
            let weight = *weight as u64;
            if r < weight {
                return index;
            }
            r -= weight;
        }
        // Only reachable when r >= total
        self.entries.len() - 1
    }

    pub fn sample_index<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let r = rng.gen_range(0..self.total);
        self.index_for(r)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
        &self.entries[self.sample_index(rng)].0
    }
}
