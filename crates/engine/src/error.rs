// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Maps storage and RPC failures onto [`RegistryError`], the single error
//! surface the FSM, scheduler, and registry commands return.

use bai_core::RegistryError;
use bai_storage::StorageError;
use bai_wire::RpcError;

pub fn from_storage(err: StorageError) -> RegistryError {
    match err {
        StorageError::RetriesExhausted { .. } => RegistryError::RetryableTransactionError(err.to_string()),
        StorageError::NotFound => RegistryError::not_found(err.to_string()),
        other => RegistryError::IntegrityError(other.to_string()),
    }
}

pub fn from_rpc(err: RpcError) -> RegistryError {
    match err {
        RpcError::Transport(bai_wire::TransportError::Timeout(_)) => RegistryError::timeout(err.to_string()),
        RpcError::Transport(_) => RegistryError::agent_failure(err.to_string()),
        RpcError::Remote(_) => RegistryError::agent_failure(err.to_string()),
    }
}
