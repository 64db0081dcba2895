// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("wire error: {0}")]
    Wire(#[from] bai_wire::WireError),

    #[error("event bus is shutting down")]
    ShuttingDown,
}
