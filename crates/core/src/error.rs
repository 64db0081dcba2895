// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Error kinds surfaced by the session lifecycle core.

use std::fmt;

/// Whether a [`BackendAgentError`] is worth retrying by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentErrorKind {
    Timeout,
    Failure,
}

crate::simple_display! {
    AgentErrorKind {
        Timeout => "TIMEOUT",
        Failure => "FAILURE",
    }
}

/// One agent's failure inside a [`RegistryError::MultiAgentError`].
#[derive(Debug, Clone)]
pub struct AgentFailure {
    pub agent_id: String,
    pub error: String,
}

impl fmt::Display for AgentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.agent_id, self.error)
    }
}

/// The error surface of the registry, scheduler, and FSM.
///
/// Maps onto the kinds every caller (event handler, scheduler tick, RPC
/// wrapper) needs to distinguish: client-fault errors are never retried by
/// the core, [`RegistryError::RetryableTransactionError`] is retried
/// internally with backoff, and [`RegistryError::BackendAgentError`] carries
/// enough information for the caller to decide whether to retry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("rejected by hook: {0}")]
    RejectedByHook(String),

    #[error("backend agent error ({kind}): {message}")]
    BackendAgentError { kind: AgentErrorKind, message: String },

    #[error("multi-agent error: {0:?}")]
    MultiAgentError(Vec<AgentFailure>),

    #[error("integrity error: {0}")]
    IntegrityError(String),

    #[error("retryable transaction error: {0}")]
    RetryableTransactionError(String),
}

impl RegistryError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn quota_exceeded(msg: impl Into<String>) -> Self {
        Self::QuotaExceeded(msg.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::BackendAgentError { kind: AgentErrorKind::Timeout, message: message.into() }
    }

    pub fn agent_failure(message: impl Into<String>) -> Self {
        Self::BackendAgentError { kind: AgentErrorKind::Failure, message: message.into() }
    }

    /// Whether the core (not just the caller) should retry this error on its own.
    pub fn is_retryable_by_core(&self) -> bool {
        matches!(self, Self::RetryableTransactionError(_))
    }
}
