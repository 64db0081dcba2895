// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Pure, unit-testable validation steps for `create_session` (§4.5 steps
//! 1, 2, 5; §8 boundary behaviors). Kept free of I/O so each rule can be
//! exercised directly without a database or RPC double.

use bai_core::{Image, RegistryError, ResourceSlots, SessionType, VFolderMount};

/// The well-known shared-memory slot; no counterpart constant exists in
/// `bai_core::resource` (only `MEM_SLOT` does), so it's defined locally.
pub const SHMEM_SLOT: &str = "shmem";

/// §4.5 step 1: mount_map keys must not duplicate; aliases must not target
/// a reserved path.
pub fn validate_alias_mounts(mounts: &[VFolderMount], reserved_paths: &[&str]) -> Result<(), RegistryError> {
    let mut seen_paths = std::collections::HashSet::new();
    for mount in mounts {
        if !seen_paths.insert(mount.mount_path.as_str()) {
            return Err(RegistryError::invalid_argument(format!(
                "duplicate mount path {:?}",
                mount.mount_path
            )));
        }
        if let Some(alias) = &mount.alias {
            if reserved_paths.contains(&alias.as_str()) {
                return Err(RegistryError::invalid_argument(format!("alias {alias:?} targets a reserved path")));
            }
        }
    }
    Ok(())
}

/// §4.5 step 2: requested slots must be a subset of known slot names.
pub fn validate_slot_names(requested: &ResourceSlots, known: &[&str]) -> Result<(), RegistryError> {
    if requested.names_subset_of(known) {
        Ok(())
    } else {
        Err(RegistryError::invalid_argument("requested resource slots include an unknown slot name"))
    }
}

/// §8 boundary: `priority` outside `[min, max]` fails `InvalidArgument`.
pub fn validate_priority(priority: i32, range: (i32, i32)) -> Result<(), RegistryError> {
    let (min, max) = range;
    if priority < min || priority > max {
        Err(RegistryError::invalid_argument(format!("priority {priority} outside [{min}, {max}]")))
    } else {
        Ok(())
    }
}

/// §4.5 step 5: BATCH requires a non-empty startup command; non-BATCH
/// forbids `starts_at`/`batch_timeout`.
pub fn validate_batch_fields(
    session_type: SessionType,
    startup_command: Option<&str>,
    starts_at_epoch_ms: Option<i64>,
    batch_timeout_secs: Option<u64>,
) -> Result<(), RegistryError> {
    match session_type {
        SessionType::Batch => {
            if startup_command.map(str::trim).unwrap_or("").is_empty() {
                return Err(RegistryError::invalid_argument("BATCH sessions require a non-empty startup command"));
            }
        }
        _ => {
            if starts_at_epoch_ms.is_some() || batch_timeout_secs.is_some() {
                return Err(RegistryError::invalid_argument(
                    "starts_at/batch_timeout are only valid for BATCH sessions",
                ));
            }
        }
    }
    Ok(())
}

/// §8 boundary: `shared_memory >= memory` fails `InvalidArgument`. Sessions
/// that don't request an explicit `shmem` slot are checked against the
/// configured default instead of a literal (§9 Open Question b).
pub fn validate_shared_memory(requested: &ResourceSlots, default_shared_memory_bytes: u64) -> Result<(), RegistryError> {
    let mem = requested.mem_bytes();
    let shmem = requested.get(SHMEM_SLOT);
    let shmem = if shmem.is_zero() {
        rust_decimal::Decimal::from(default_shared_memory_bytes)
    } else {
        shmem
    };
    if shmem >= mem {
        Err(RegistryError::invalid_argument(format!("shared memory {shmem} must be less than memory {mem}")))
    } else {
        Ok(())
    }
}

/// §8 boundary: a kernel's `requested_slots` outside `[image_min, image_max]`
/// fails `InvalidArgument`.
pub fn validate_image_slot_range(image: &Image, requested: &ResourceSlots) -> Result<(), RegistryError> {
    if image.slots_in_range(requested) {
        Ok(())
    } else {
        Err(RegistryError::invalid_argument(format!(
            "requested slots outside image {}'s allowed range",
            image.canonical
        )))
    }
}

/// §8 boundary: `cluster_size > resource_policy.max_containers_per_session`
/// fails `QuotaExceeded`.
pub fn validate_cluster_size_quota(cluster_size: u32, max_containers_per_session: i32) -> Result<(), RegistryError> {
    if max_containers_per_session >= 0 && cluster_size as i64 > max_containers_per_session as i64 {
        Err(RegistryError::quota_exceeded(format!(
            "cluster_size {cluster_size} exceeds max_containers_per_session {max_containers_per_session}"
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn mount(path: &str, alias: Option<&str>) -> VFolderMount {
        VFolderMount {
            vfolder_id: uuid::Uuid::nil(),
            mount_path: path.into(),
            alias: alias.map(String::from),
            read_only: false,
        }
    }

    #[test]
    fn duplicate_mount_paths_rejected() {
        let mounts = vec![mount("/home/work/a", None), mount("/home/work/a", None)];
        assert!(validate_alias_mounts(&mounts, &[]).is_err());
    }

    #[test]
    fn alias_targeting_reserved_path_rejected() {
        let mounts = vec![mount("/home/work/a", Some("/home/work"))];
        assert!(validate_alias_mounts(&mounts, &["/home/work"]).is_err());
    }

    #[test]
    fn distinct_mounts_accepted() {
        let mounts = vec![mount("/home/work/a", None), mount("/home/work/b", Some("data"))];
        assert!(validate_alias_mounts(&mounts, &["/home/work"]).is_ok());
    }

    #[test]
    fn unknown_slot_name_rejected() {
        let mut slots = ResourceSlots::new();
        slots.set("tpu", Decimal::from(1));
        assert!(validate_slot_names(&slots, &["cpu", "mem"]).is_err());
    }

    #[test]
    fn known_slot_names_accepted() {
        let mut slots = ResourceSlots::new();
        slots.set("cpu", Decimal::from(2));
        assert!(validate_slot_names(&slots, &["cpu", "mem"]).is_ok());
    }

    #[test]
    fn priority_out_of_range_rejected() {
        assert!(validate_priority(101, (0, 100)).is_err());
        assert!(validate_priority(-1, (0, 100)).is_err());
        assert!(validate_priority(50, (0, 100)).is_ok());
    }

    #[test]
    fn batch_requires_startup_command() {
        assert!(validate_batch_fields(SessionType::Batch, None, None, None).is_err());
        assert!(validate_batch_fields(SessionType::Batch, Some("  "), None, None).is_err());
        assert!(validate_batch_fields(SessionType::Batch, Some("python run.py"), None, None).is_ok());
    }

    #[test]
    fn interactive_forbids_batch_only_fields() {
        assert!(validate_batch_fields(SessionType::Interactive, None, Some(1), None).is_err());
        assert!(validate_batch_fields(SessionType::Interactive, None, None, Some(60)).is_err());
        assert!(validate_batch_fields(SessionType::Interactive, None, None, None).is_ok());
    }

    #[test]
    fn shared_memory_must_be_less_than_memory() {
        let mut slots = ResourceSlots::new();
        slots.set(bai_core::resource::MEM_SLOT, Decimal::from(1024));
        slots.set(SHMEM_SLOT, Decimal::from(2048));
        assert!(validate_shared_memory(&slots, 64).is_err());
    }

    #[test]
    fn shared_memory_falls_back_to_default_when_unset() {
        let mut slots = ResourceSlots::new();
        slots.set(bai_core::resource::MEM_SLOT, Decimal::from(32));
        assert!(validate_shared_memory(&slots, 64).is_err());

        let mut slots = ResourceSlots::new();
        slots.set(bai_core::resource::MEM_SLOT, Decimal::from(128));
        assert!(validate_shared_memory(&slots, 64).is_ok());
    }

    #[test]
    fn cluster_size_over_quota_rejected() {
        assert!(validate_cluster_size_quota(4, 2).is_err());
        assert!(validate_cluster_size_quota(2, 2).is_ok());
        assert!(validate_cluster_size_quota(2, -1).is_ok());
    }
}
