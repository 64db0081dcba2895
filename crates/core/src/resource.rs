// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Resource slot maps: `{slot-name -> decimal}` with arithmetic and
//! elementwise comparison.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{Add, Sub};

/// The well-known memory slot; always measured in bytes.
pub const MEM_SLOT: &str = "mem";

/// A `{slot-name -> decimal}` resource map.
///
/// Unknown slot names are silently dropped on read (`get` returns `0` for a
/// name the map doesn't carry, rather than an error), matching the
/// best-effort slot vocabulary of the source system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceSlots(BTreeMap<String, Decimal>);

impl ResourceSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Decimal)>,
        K: Into<String>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn get(&self, slot: &str) -> Decimal {
        self.0.get(slot).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn set(&mut self, slot: impl Into<String>, value: Decimal) {
        self.0.insert(slot.into(), value);
    }

    pub fn mem_bytes(&self) -> Decimal {
        self.get(MEM_SLOT)
    }

    pub fn slot_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// True if every slot in `self` is `<= other`'s value for that slot
    /// (slots absent from `other` are treated as `0`).
    pub fn le_elementwise(&self, other: &Self) -> bool {
        self.0.iter().all(|(k, v)| *v <= other.get(k))
    }

    /// Subset check used by `enqueue_session`'s resource-slot validation:
    /// every slot name in `self` must be a known slot name.
    pub fn names_subset_of(&self, known: &[&str]) -> bool {
        self.0.keys().all(|k| known.contains(&k.as_str()))
    }
}

impl Add for &ResourceSlots {
    type Output = ResourceSlots;

    fn add(self, rhs: &ResourceSlots) -> ResourceSlots {
        let mut out = self.clone();
        for (k, v) in rhs.iter() {
            let cur = out.get(k);
            out.set(k, cur + v);
        }
        out
    }
}

impl Sub for &ResourceSlots {
    type Output = ResourceSlots;

    fn sub(self, rhs: &ResourceSlots) -> ResourceSlots {
        let mut out = self.clone();
        for (k, v) in rhs.iter() {
            let cur = out.get(k);
            out.set(k, cur - v);
        }
        out
    }
}

impl FromIterator<(String, Decimal)> for ResourceSlots {
    fn from_iter<I: IntoIterator<Item = (String, Decimal)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;
