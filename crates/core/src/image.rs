// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Container image references.

use crate::resource::ResourceSlots;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A resolved image: canonical name, architecture, and the slot envelope
/// used to validate requested resources (§3, §8 boundary behaviors).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub canonical: String,
    pub architecture: String,
    pub registry: String,
    pub digest: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub min_slots: ResourceSlots,
    pub max_slots: ResourceSlots,
}

impl Image {
    /// A stable `(agent, image)` pull key used to correlate
    /// `ImagePullStarted/Finished/Failed` events (§4.4, §4.6).
    pub fn pull_key(&self, agent_id: &str) -> String {
        format!("{agent_id}:{}", self.canonical)
    }

    /// Whether `requested` falls within `[min_slots, max_slots]` per slot
    /// known to the image (§8: out-of-range requested slots fail
    /// `InvalidArgument`).
    pub fn slots_in_range(&self, requested: &ResourceSlots) -> bool {
        requested.le_elementwise(&self.max_slots) && self.min_slots.le_elementwise(requested)
    }

    /// Reads a customization owner label, if the image has been customized
    /// for a particular owner (scheduler §4.5 step 3: "check `owner` label
    /// for customized images").
    pub fn owner_label(&self) -> Option<&str> {
        self.labels.get("ai.backend.customized-image.owner").map(String::as_str)
    }
}

/// A canonical image reference as carried on a kernel/session row; may or
/// may not yet have been resolved to a full [`Image`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRef {
    pub canonical: String,
    pub architecture: String,
}

impl ImageRef {
    pub fn new(canonical: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self { canonical: canonical.into(), architecture: architecture.into() }
    }
}

#[cfg(test)]
#[path = "image_tests.rs"]
mod tests;
