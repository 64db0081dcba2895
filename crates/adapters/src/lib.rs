// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! The Agent Cache and RPC Context (§4.2): the process-local seam between
//! the engine/registry and a concrete agent RPC transport. The transport
//! itself is out of scope; production wiring supplies any `AgentRpc`
//! implementation, and `test-support` exposes an in-memory double.

#![cfg_attr(test, allow(clippy::panic, clippy::unwrap_used, clippy::expect_used))]

pub mod cache;
pub mod rpc_context;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use cache::{AgentCache, AgentEndpoint};
pub use rpc_context::{RpcContext, RpcContextFactory};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeAgentRpc, RecordedCall};
