// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Event wire format and the agent RPC surface the core depends on.
//!
//! Wire format: a stream entry is `{name, source, args}` (§6), encoded as a
//! 4-byte big-endian length prefix followed by the JSON payload — the same
//! framing convention used elsewhere in this codebase for inter-process
//! messages.
//!
//! The concrete RPC transport (the wire protocol actually spoken to an
//! agent process) is out of scope; this crate defines only the call
//! surface and the DTOs exchanged over it (§4.2, §6).

pub mod error;
pub mod rpc;
pub mod stream;

pub use error::{RemoteError, RpcError, TransportError, WireError};
pub use rpc::{
    AgentRpc, ClusterInfo, ClusterRoleAssignment, ExecutionResult, GpuAllocSpec, HwInfoReport,
    ImageConfig, KernelCreationConfig, KernelCreationInfo, PurgeImageResult, ResourceSpec,
    DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_TIMEOUT,
};
pub use stream::{decode_stream_entry, encode_stream_entry, StreamEntry};

#[cfg(test)]
#[path = "property_tests.rs"]
mod property_tests;
