//! Merging of per-agent overrides into the base protection config.
//!
//! An override never replaces the base: patterns are unioned level by level
//! (base patterns first, duplicates dropped) and an override's description
//! wins when both sides have one.

use tracing::{Level, instrument};

use crate::types::{LevelConfig, ProtectionConfig};

/// Trait for types that can be merged with precedence.
pub trait Merge {
    /// Merges self with another value, preferring values from `other` (higher precedence).
    fn merge(&self, other: &Self) -> Self;
}

impl Merge for ProtectionConfig {
    #[instrument(level = Level::TRACE, skip_all)]
    fn merge(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for (level, higher) in &other.protection_levels {
            let combined = self
                .protection_levels
                .get(level)
                .unwrap_or(&LevelConfig::default())
                .merge(higher);
            merged.protection_levels.insert(*level, combined);
        }
        merged
    }
}

impl Merge for LevelConfig {
    fn merge(&self, other: &Self) -> Self {
        LevelConfig {
            description: other
                .description
                .clone()
                .or_else(|| self.description.clone()),
            patterns: union_vecs(&self.patterns, &other.patterns),
        }
    }
}

/// Concatenates two lists, keeping the first occurrence of each item.
fn union_vecs<T: Clone + PartialEq>(lower: &[T], higher: &[T]) -> Vec<T> {
    let mut result: Vec<T> = Vec::with_capacity(lower.len() + higher.len());
    for item in lower.iter().chain(higher) {
        if !result.contains(item) {
            result.push(item.clone());
        }
    }
    result
}
