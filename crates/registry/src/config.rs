// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Registry-local configuration knobs (§9 Open Question b: the shared-memory
//! default is read from runtime config, not a literal).
//!
//! The full ambient `Config` (DB/Redis URLs, tracing, stream key, consumer
//! group) is owned by `bai-daemon`; this crate only needs the handful of
//! fields its commands read directly, so it carries its own narrow struct
//! rather than depending on the not-yet-built daemon crate.

use std::time::Duration;

use bai_wire::{DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_TIMEOUT};

/// Settings `create_session` and its siblings consult directly.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Enforced floor for `shared_memory < memory` validation when a
    /// session doesn't request an explicit `shmem` slot (§9 Open Question b).
    pub default_shared_memory_bytes: u64,
    /// Inclusive bound on `Session::priority` (§8 boundary behaviors).
    pub priority_range: (i32, i32),
    pub rpc_read_timeout: Duration,
    pub rpc_write_timeout: Duration,
    /// Transaction retry policy passed through to `bai_storage::tx::with_retry`.
    pub tx_max_attempts: u32,
    pub tx_base_delay: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_shared_memory_bytes: 64 * 1024 * 1024,
            priority_range: (0, 100),
            rpc_read_timeout: DEFAULT_READ_TIMEOUT,
            rpc_write_timeout: DEFAULT_WRITE_TIMEOUT,
            tx_max_attempts: 3,
            tx_base_delay: Duration::from_millis(50),
        }
    }
}
