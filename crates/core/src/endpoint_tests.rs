// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

use super::*;

#[test]
fn route_status_display_matches_wire_names() {
    assert_eq!(RouteStatus::Provisioning.to_string(), "PROVISIONING");
    assert_eq!(RouteStatus::FailedToStart.to_string(), "FAILED_TO_START");
}

#[test]
fn route_ids_are_distinct() {
    let a = RouteId::new();
    let b = RouteId::new();
    assert_ne!(a, b);
}
