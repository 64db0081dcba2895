// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Session dependency edges (§3 SessionDependency).

use bai_core::{SessionDependency, SessionId};
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::StorageError;

#[derive(sqlx::FromRow)]
struct DependencyRow {
    session_id: String,
    depends_on: String,
}

impl From<DependencyRow> for SessionDependency {
    fn from(row: DependencyRow) -> Self {
        SessionDependency {
            session_id: SessionId::from_string(row.session_id),
            depends_on: SessionId::from_string(row.depends_on),
        }
    }
}

pub struct SessionDependencyRepo {
    pool: PgPool,
}

impl SessionDependencyRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The full dependency graph for an owner (access key), used by
    /// `would_cycle` before inserting a new edge (§4.5 step 6).
    pub async fn list_for_owner(&self, access_key: &str) -> Result<Vec<SessionDependency>, StorageError> {
        let rows = sqlx::query_as::<_, DependencyRow>(
            "SELECT d.session_id, d.depends_on FROM session_dependencies d \
             JOIN sessions s ON s.id = d.session_id WHERE s.access_key = $1",
        )
        .bind(access_key)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SessionDependency::from).collect())
    }

    pub async fn insert<'c>(
        tx: &mut Transaction<'c, Postgres>,
        dependency: &SessionDependency,
    ) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO session_dependencies (session_id, depends_on) VALUES ($1, $2)")
            .bind(dependency.session_id.as_str())
            .bind(dependency.depends_on.as_str())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn exists(&self, session_id: &SessionId) -> Result<bool, StorageError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT id FROM sessions WHERE id = $1")
            .bind(session_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}
