// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

use super::*;

fn session() -> Session {
    Session {
        id: SessionId::new(),
        name: "test-session".into(),
        access_key: AccessKey::from("AKIATEST"),
        domain: DomainName::from("default"),
        project: ProjectName::from("default"),
        scaling_group: Some("default".into()),
        session_type: SessionType::Interactive,
        cluster_mode: ClusterMode::SingleNode,
        cluster_size: 1,
        priority: 0,
        status: Status::Pending,
        status_history: StatusHistory::new(),
        images: vec![ImageRef::new("python:3.9", "x86_64")],
        vfolder_mounts: Vec::new(),
        environ: BTreeMap::new(),
        requested_slots: ResourceSlots::new(),
        occupied_slots: ResourceSlots::new(),
        starts_at_epoch_ms: None,
        batch_timeout_secs: None,
        callback_url: None,
        network_type: NetworkType::Volatile,
        network_id: None,
        creation_id: None,
    }
}

#[test]
fn cluster_size_matches_kernel_count() {
    let s = session();
    assert!(s.cluster_size_matches(1));
    assert!(!s.cluster_size_matches(2));
}

#[test]
fn main_image_is_first_in_ordered_list() {
    let mut s = session();
    s.images.push(ImageRef::new("cuda:12", "x86_64"));
    assert_eq!(s.main_image().unwrap().canonical, "python:3.9");
}
