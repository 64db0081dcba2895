// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

use super::*;

#[test]
fn direct_self_cycle_detected() {
    let a = SessionId::new();
    assert!(would_cycle(&[], a, a));
}

#[test]
fn transitive_cycle_detected() {
    let a = SessionId::new();
    let b = SessionId::new();
    let c = SessionId::new();
    // existing: b depends_on c, c depends_on a
    let existing = vec![
        SessionDependency { session_id: b, depends_on: c },
        SessionDependency { session_id: c, depends_on: a },
    ];
    // adding a depends_on b would close the cycle a -> b -> c -> a
    assert!(would_cycle(&existing, a, b));
}

#[test]
fn unrelated_dependency_is_not_a_cycle() {
    let a = SessionId::new();
    let b = SessionId::new();
    let c = SessionId::new();
    let existing = vec![SessionDependency { session_id: b, depends_on: c }];
    assert!(!would_cycle(&existing, a, b));
}
