// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

use super::*;

fn kernel(role: ClusterRole, idx: u32) -> Kernel {
    Kernel {
        id: KernelId::new(),
        session_id: SessionId::new(),
        cluster_role: role,
        cluster_idx: idx,
        agent_id: None,
        image: ImageRef::new("python:3.9", "x86_64"),
        requested_slots: ResourceSlots::new(),
        occupied_slots: ResourceSlots::new(),
        status: Status::Pending,
        status_history: StatusHistory::new(),
        exit_code: None,
        service_ports: Vec::new(),
        container_id: None,
        ports: KernelPorts::default(),
        startup_command: None,
        bootstrap_script: None,
        status_info: None,
        status_data: None,
    }
}

#[test]
fn apply_transition_updates_status_and_history() {
    let mut k = kernel(ClusterRole::Main, 0);
    k.apply_transition(Status::Scheduled, 1_000);
    assert_eq!(k.status, Status::Scheduled);
    assert_eq!(k.status_history.get("SCHEDULED"), Some(&1_000));
}

#[test]
fn sort_key_orders_main_first_then_by_index() {
    let mut kernels = vec![kernel(ClusterRole::Sub, 1), kernel(ClusterRole::Main, 0), kernel(ClusterRole::Sub, 0)];
    kernels.sort_by_key(kernel_sort_key);
    assert!(kernels[0].is_main());
    assert_eq!(kernels[1].cluster_idx, 0);
    assert_eq!(kernels[2].cluster_idx, 1);
}
