// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

use thiserror::Error;

/// Errors surfaced by the persistence layer. Maps onto §7's `IntegrityError`
/// and `RetryableTransactionError` at the call site rather than here — this
/// enum stays close to the underlying driver.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("row not found")]
    NotFound,
    #[error("transaction exhausted {attempts} retries: {source}")]
    RetriesExhausted { attempts: u32, source: sqlx::Error },
}

impl StorageError {
    /// Postgres error codes that mark a transaction safe to retry:
    /// `40001` serialization_failure, `40P01` deadlock_detected.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Db(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => false,
        }
    }
}
