// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Retryable transactions (§4.3 "Concurrency", §7 `RetryableTransactionError`):
//! a transaction body is retried with exponential backoff on Postgres
//! serialization failures and deadlocks.

use futures_util::future::BoxFuture;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::warn;

use crate::error::StorageError;

/// Runs `body` inside a fresh transaction, retrying up to `max_attempts`
/// times (with exponential backoff starting at `base_delay`) when the
/// underlying error is a Postgres serialization failure or deadlock.
pub async fn with_retry<T, F>(
    pool: &PgPool,
    max_attempts: u32,
    base_delay: Duration,
    mut body: F,
) -> Result<T, StorageError>
where
    F: for<'c> FnMut(&'c mut Transaction<'_, Postgres>) -> BoxFuture<'c, Result<T, StorageError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut tx = pool.begin().await?;
        let result = body(&mut tx).await;
        match result {
            Ok(value) => {
                tx.commit().await?;
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tx.rollback().await.ok();
                let delay = base_delay * 2u32.pow(attempt - 1);
                warn!(attempt, ?delay, error = %e, "retrying transaction");
                tokio::time::sleep(delay).await;
                continue;
            }
            Err(e) if e.is_retryable() => {
                tx.rollback().await.ok();
                let source = match e {
                    StorageError::Db(sqlx::Error::Database(db)) => {
                        sqlx::Error::Database(db)
                    }
                    other => return Err(other),
                };
                return Err(StorageError::RetriesExhausted { attempts: attempt, source });
            }
            Err(e) => {
                tx.rollback().await.ok();
                return Err(e);
            }
        }
    }
}
