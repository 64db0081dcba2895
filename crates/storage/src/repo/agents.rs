// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Agent repository (§3 Agent, §4.5 `handle_heartbeat`, `recalc_resource_usage`).

use bai_core::{Agent, AgentId, AgentStatus, ResourceSlots};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::StorageError;

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: String,
    address: String,
    public_key: String,
    scaling_group: String,
    status: String,
    available_slots: Json<ResourceSlots>,
    occupied_slots: Json<ResourceSlots>,
    architecture: String,
    version: String,
    last_seen_epoch_ms: i64,
    lost_at_epoch_ms: Option<i64>,
    cached_images: Vec<String>,
}

fn status_to_str(s: AgentStatus) -> &'static str {
    match s {
        AgentStatus::Alive => "ALIVE",
        AgentStatus::Lost => "LOST",
        AgentStatus::Restarting => "RESTARTING",
        AgentStatus::Terminated => "TERMINATED",
    }
}

fn status_from_str(s: &str) -> Result<AgentStatus, StorageError> {
    match s {
        "ALIVE" => Ok(AgentStatus::Alive),
        "LOST" => Ok(AgentStatus::Lost),
        "RESTARTING" => Ok(AgentStatus::Restarting),
        "TERMINATED" => Ok(AgentStatus::Terminated),
        other => Err(StorageError::Db(sqlx::Error::Decode(
            format!("unknown agent status {other}").into(),
        ))),
    }
}

impl TryFrom<AgentRow> for Agent {
    type Error = StorageError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        Ok(Agent {
            id: AgentId::from_string(&row.id),
            address: row.address,
            public_key: row.public_key,
            scaling_group: row.scaling_group,
            status: status_from_str(&row.status)?,
            available_slots: row.available_slots.0,
            occupied_slots: row.occupied_slots.0,
            architecture: row.architecture,
            version: row.version,
            last_seen_epoch_ms: row.last_seen_epoch_ms,
            lost_at_epoch_ms: row.lost_at_epoch_ms,
            cached_images: row.cached_images,
        })
    }
}

pub struct AgentRepo {
    pool: PgPool,
}

impl AgentRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>, StorageError> {
        let row = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Agent::try_from).transpose()
    }

    /// Agents in ALIVE within a scaling group, candidates for §4.4 agent selection.
    pub async fn list_alive_in_scaling_group(&self, scaling_group: &str) -> Result<Vec<Agent>, StorageError> {
        let rows = sqlx::query_as::<_, AgentRow>(
            "SELECT * FROM agents WHERE scaling_group = $1 AND status = 'ALIVE'",
        )
        .bind(scaling_group)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Agent::try_from).collect()
    }

    pub async fn list_all(&self) -> Result<Vec<Agent>, StorageError> {
        let rows = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents").fetch_all(&self.pool).await?;
        rows.into_iter().map(Agent::try_from).collect()
    }

    /// Row-level-locked fetch for `handle_heartbeat`'s transaction (§4.5).
    pub async fn find_for_update<'c>(
        tx: &mut Transaction<'c, Postgres>,
        id: &AgentId,
    ) -> Result<Option<Agent>, StorageError> {
        let row = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents WHERE id = $1 FOR UPDATE")
            .bind(id.as_str())
            .fetch_optional(&mut **tx)
            .await?;
        row.map(Agent::try_from).transpose()
    }

    pub async fn insert<'c>(tx: &mut Transaction<'c, Postgres>, agent: &Agent) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO agents (id, address, public_key, scaling_group, status, available_slots, \
             occupied_slots, architecture, version, last_seen_epoch_ms, lost_at_epoch_ms, cached_images) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
        )
        .bind(agent.id.as_str())
        .bind(&agent.address)
        .bind(&agent.public_key)
        .bind(&agent.scaling_group)
        .bind(status_to_str(agent.status))
        .bind(Json(&agent.available_slots))
        .bind(Json(&agent.occupied_slots))
        .bind(&agent.architecture)
        .bind(&agent.version)
        .bind(agent.last_seen_epoch_ms)
        .bind(agent.lost_at_epoch_ms)
        .bind(&agent.cached_images)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn update<'c>(tx: &mut Transaction<'c, Postgres>, agent: &Agent) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE agents SET address=$2, public_key=$3, scaling_group=$4, status=$5, \
             available_slots=$6, occupied_slots=$7, architecture=$8, version=$9, \
             last_seen_epoch_ms=$10, lost_at_epoch_ms=$11, cached_images=$12 WHERE id=$1",
        )
        .bind(agent.id.as_str())
        .bind(&agent.address)
        .bind(&agent.public_key)
        .bind(&agent.scaling_group)
        .bind(status_to_str(agent.status))
        .bind(Json(&agent.available_slots))
        .bind(Json(&agent.occupied_slots))
        .bind(&agent.architecture)
        .bind(&agent.version)
        .bind(agent.last_seen_epoch_ms)
        .bind(agent.lost_at_epoch_ms)
        .bind(&agent.cached_images)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// `recalc_resource_usage` (§4.5): overwrite an agent's occupied_slots
    /// wholesale, zeroing it if not represented among active sessions.
    pub async fn set_occupied_slots<'c>(
        tx: &mut Transaction<'c, Postgres>,
        id: &AgentId,
        occupied: &ResourceSlots,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE agents SET occupied_slots = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(Json(occupied))
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
