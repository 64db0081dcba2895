// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Errors distinguishing wire (de)serialization failures from agent RPC
//! failures, and transport-level failures from remote business exceptions
//! (§4.2, §7 `BackendAgentError`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("stream entry truncated: expected at least {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("failed to decode stream entry payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A transport-level failure: the call never reached a remote business
/// handler, or no response came back in time.
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("rpc timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("connection to agent failed: {0}")]
    ConnectionFailed(String),
    #[error("agent cache has no address for this agent")]
    NoRoute,
}

/// A business-level exception raised by the agent's handler for the call.
#[derive(Debug, Error, Clone)]
#[error("remote error {code}: {message}")]
pub struct RemoteError {
    pub code: String,
    pub message: String,
}

/// The result of an agent RPC: either a transport failure or a remote
/// business exception, kept distinct per §4.2.
#[derive(Debug, Error, Clone)]
pub enum RpcError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}
