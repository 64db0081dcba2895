// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Connection pool setup and migration runner, mirroring the teacher's
//! `oj-storage` bootstrap (pool construction + migrate-on-start) but backed
//! by Postgres instead of a local WAL file.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::error::StorageError;

pub async fn connect_pool(database_url: &str, max_connections: u32) -> Result<PgPool, StorageError> {
    info!(max_connections, "connecting to postgres");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn migrate(pool: &PgPool) -> Result<(), StorageError> {
    info!("running storage migrations");
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        StorageError::Db(sqlx::Error::Configuration(e.to_string().into()))
    })
}
