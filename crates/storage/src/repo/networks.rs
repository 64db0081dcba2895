// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Per-session networks (§4.4 "create a per-session local network" /
//! "create an overlay network"). The concrete network plugin is out of
//! scope; this tracks only the id/kind/owning-agent triple the scheduler
//! and `SessionTerminated` teardown need.

use bai_core::AgentId;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
    Local,
    Overlay,
}

impl NetworkKind {
    fn as_str(&self) -> &'static str {
        match self {
            NetworkKind::Local => "local",
            NetworkKind::Overlay => "overlay",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "local" => Some(Self::Local),
            "overlay" => Some(Self::Overlay),
            _ => None,
        }
    }
}

pub struct NetworkRepo {
    pool: PgPool,
}

impl NetworkRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert<'c>(
        tx: &mut Transaction<'c, Postgres>,
        id: &str,
        kind: NetworkKind,
        agent_id: Option<&AgentId>,
    ) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO networks (id, kind, agent_id) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(kind.as_str())
            .bind(agent_id.map(|a| a.as_str()))
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn delete<'c>(tx: &mut Transaction<'c, Postgres>, id: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM networks WHERE id = $1").bind(id).execute(&mut **tx).await?;
        Ok(())
    }

    pub async fn exists(&self, id: &str) -> Result<bool, StorageError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT id FROM networks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// `SessionTerminated` handler (§4.6): read back a network row's kind
    /// and owning agent to decide whether teardown needs a `destroy_local_network`
    /// RPC before the row is deleted.
    pub async fn find(&self, id: &str) -> Result<Option<(NetworkKind, Option<AgentId>)>, StorageError> {
        let row: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT kind, agent_id FROM networks WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(match row {
            Some((kind, agent_id)) => {
                let kind = NetworkKind::from_str(&kind)
                    .ok_or_else(|| StorageError::Db(sqlx::Error::Decode(format!("unknown network kind {kind:?}").into())))?;
                Some((kind, agent_id.map(AgentId::from_string)))
            }
            None => None,
        })
    }
}
