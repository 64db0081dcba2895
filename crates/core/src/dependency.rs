// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Session dependency edges (§3 SessionDependency).

use crate::kernel::SessionId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// An edge `(session_id, depends_on)`. Must be acyclic per session's
/// transitive closure (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDependency {
    pub session_id: SessionId,
    pub depends_on: SessionId,
}

/// Detects whether adding `(session_id, depends_on)` to `existing` would
/// introduce a cycle in the dependency graph.
pub fn would_cycle(
    existing: &[SessionDependency],
    session_id: SessionId,
    depends_on: SessionId,
) -> bool {
    // A new edge session_id -> depends_on cycles iff depends_on already
    // (transitively) depends on session_id.
    let mut adjacency: HashMap<SessionId, Vec<SessionId>> = HashMap::new();
    for edge in existing {
        adjacency.entry(edge.session_id).or_default().push(edge.depends_on);
    }

    let mut stack = vec![depends_on];
    let mut visited = HashSet::new();
    while let Some(node) = stack.pop() {
        if node == session_id {
            return true;
        }
        if !visited.insert(node) {
            continue;
        }
        if let Some(next) = adjacency.get(&node) {
            stack.extend(next.iter().copied());
        }
    }
    false
}

#[cfg(test)]
#[path = "dependency_tests.rs"]
mod tests;
