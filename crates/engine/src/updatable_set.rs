// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! The status-updatable set (§4.3): a deduplicated set of session ids
//! registered by event handlers when they mutate a kernel, drained once
//! per event batch so aggregation runs at most once per (batch, session).

use bai_core::SessionId;
use parking_lot::Mutex;
use std::collections::BTreeSet;

#[derive(Default)]
pub struct UpdatableSet {
    sessions: Mutex<BTreeSet<SessionId>>,
}

impl UpdatableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session_id: SessionId) {
        self.sessions.lock().insert(session_id);
    }

    /// Empties the set and returns its members, one drain per event batch.
    pub fn drain(&self) -> Vec<SessionId> {
        std::mem::take(&mut *self.sessions.lock()).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(s: &str) -> SessionId {
        SessionId::from_string(s)
    }

    #[test]
    fn register_deduplicates() {
        let set = UpdatableSet::new();
        set.register(sid("sess-a"));
        set.register(sid("sess-a"));
        set.register(sid("sess-b"));
        assert_eq!(set.drain().len(), 2);
    }

    #[test]
    fn drain_empties_the_set() {
        let set = UpdatableSet::new();
        set.register(sid("sess-a"));
        set.drain();
        assert!(set.drain().is_empty());
    }
}
