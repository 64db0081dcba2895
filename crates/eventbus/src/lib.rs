// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! The Redis-stream-backed event bus (§4.1): publish, consume (exactly one
//! worker per event), subscribe (broadcast to every worker), coalescing,
//! matchers, and a fake in-memory bus for tests.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod bus;
pub mod coalesce;
pub mod consumer_id;
pub mod error;
pub mod handler;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use bus::{EventBus, DEFAULT_GROUP_NAME, DEFAULT_STREAM_KEY};
pub use coalesce::{CoalesceOpts, Coalescer};
pub use consumer_id::consumer_id;
pub use error::EventBusError;
pub use handler::{EventHandler, FailureObserver, Matcher, Registration};
