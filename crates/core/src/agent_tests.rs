// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

use super::*;
use rust_decimal::Decimal;

fn slots(cpu: i64, mem: i64) -> ResourceSlots {
    ResourceSlots::from_pairs([("cpu", Decimal::from(cpu)), ("mem", Decimal::from(mem))])
}

#[test]
fn free_slots_is_available_minus_occupied() {
    let agent = Agent::builder(AgentId::new())
        .available_slots(slots(8, 32_000))
        .occupied_slots(slots(2, 4_000))
        .build();
    let free = agent.free_slots();
    assert_eq!(free.get("cpu"), Decimal::from(6));
    assert_eq!(free.get("mem"), Decimal::from(28_000));
}

#[test]
fn can_fit_requires_alive_and_enough_free_slots() {
    let agent = Agent::builder(AgentId::new())
        .available_slots(slots(8, 32_000))
        .occupied_slots(slots(6, 30_000))
        .build();
    assert!(agent.can_fit(&slots(2, 2_000)));
    assert!(!agent.can_fit(&slots(3, 0)));
}

#[test]
fn lost_agent_cannot_fit_anything() {
    let agent = Agent::builder(AgentId::new())
        .available_slots(slots(8, 32_000))
        .status(AgentStatus::Lost)
        .build();
    assert!(!agent.can_fit(&slots(1, 0)));
}
