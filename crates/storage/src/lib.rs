// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! The relational persistence layer (§3, §6): sqlx/Postgres repositories per
//! entity, retryable transactions, and Redis-backed counters / the
//! image→agents reverse index (§5).

#![cfg_attr(test, allow(clippy::panic, clippy::unwrap_used, clippy::expect_used))]

pub mod counters;
pub mod error;
pub mod pool;
pub mod repo;
pub mod tx;

pub use counters::RedisCounters;
pub use error::StorageError;
pub use pool::{connect_pool, migrate};
pub use repo::*;
pub use tx::with_retry;
