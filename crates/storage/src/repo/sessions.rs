// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Session repository (§3 Session, §4.5 `create_session`/`destroy_session`).

use bai_core::{
    AccessKey, ClusterMode, DomainName, ImageRef, ProjectName, ResourceSlots, Session,
    SessionId, SessionType, Status, StatusHistory, NetworkType,
};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::BTreeMap;

use crate::error::StorageError;

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    name: String,
    access_key: String,
    domain: String,
    project: String,
    scaling_group: Option<String>,
    session_type: String,
    cluster_mode: String,
    cluster_size: i32,
    priority: i32,
    status: String,
    status_history: Json<StatusHistory>,
    images: Json<Vec<ImageRef>>,
    environ: Json<BTreeMap<String, String>>,
    requested_slots: Json<ResourceSlots>,
    occupied_slots: Json<ResourceSlots>,
    starts_at_epoch_ms: Option<i64>,
    batch_timeout_secs: Option<i64>,
    callback_url: Option<String>,
    network_type: String,
    network_id: Option<String>,
    creation_id: Option<String>,
}

fn session_type_to_str(t: SessionType) -> &'static str {
    match t {
        SessionType::Interactive => "INTERACTIVE",
        SessionType::Batch => "BATCH",
        SessionType::Inference => "INFERENCE",
        SessionType::System => "SYSTEM",
    }
}

fn session_type_from_str(s: &str) -> Result<SessionType, StorageError> {
    match s {
        "INTERACTIVE" => Ok(SessionType::Interactive),
        "BATCH" => Ok(SessionType::Batch),
        "INFERENCE" => Ok(SessionType::Inference),
        "SYSTEM" => Ok(SessionType::System),
        other => Err(decode_err("session_type", other)),
    }
}

fn cluster_mode_to_str(m: ClusterMode) -> &'static str {
    match m {
        ClusterMode::SingleNode => "SINGLE_NODE",
        ClusterMode::MultiNode => "MULTI_NODE",
    }
}

fn cluster_mode_from_str(s: &str) -> Result<ClusterMode, StorageError> {
    match s {
        "SINGLE_NODE" => Ok(ClusterMode::SingleNode),
        "MULTI_NODE" => Ok(ClusterMode::MultiNode),
        other => Err(decode_err("cluster_mode", other)),
    }
}

fn network_type_to_str(n: NetworkType) -> &'static str {
    match n {
        NetworkType::Host => "HOST",
        NetworkType::Volatile => "VOLATILE",
        NetworkType::Persistent => "PERSISTENT",
    }
}

fn network_type_from_str(s: &str) -> Result<NetworkType, StorageError> {
    match s {
        "HOST" => Ok(NetworkType::Host),
        "VOLATILE" => Ok(NetworkType::Volatile),
        "PERSISTENT" => Ok(NetworkType::Persistent),
        other => Err(decode_err("network_type", other)),
    }
}

fn status_to_str(s: Status) -> String {
    s.to_string()
}

fn status_from_str(s: &str) -> Result<Status, StorageError> {
    use Status::*;
    Ok(match s {
        "PENDING" => Pending,
        "SCHEDULED" => Scheduled,
        "PREPARING" => Preparing,
        "PULLING" => Pulling,
        "PREPARED" => Prepared,
        "CREATING" => Creating,
        "RUNNING" => Running,
        "TERMINATING" => Terminating,
        "TERMINATED" => Terminated,
        "CANCELLED" => Cancelled,
        "ERROR" => Error,
        other => return Err(decode_err("status", other)),
    })
}

fn decode_err(column: &str, value: &str) -> StorageError {
    StorageError::Db(sqlx::Error::Decode(format!("unknown {column} value {value:?}").into()))
}

impl TryFrom<SessionRow> for Session {
    type Error = StorageError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Session {
            id: SessionId::from_string(&row.id),
            name: row.name,
            access_key: AccessKey(row.access_key),
            domain: DomainName(row.domain),
            project: ProjectName(row.project),
            scaling_group: row.scaling_group,
            session_type: session_type_from_str(&row.session_type)?,
            cluster_mode: cluster_mode_from_str(&row.cluster_mode)?,
            cluster_size: row.cluster_size as u32,
            priority: row.priority,
            status: status_from_str(&row.status)?,
            status_history: row.status_history.0,
            images: row.images.0,
            vfolder_mounts: Vec::new(), // joined in separately, see `load_vfolder_mounts`
            environ: row.environ.0,
            requested_slots: row.requested_slots.0,
            occupied_slots: row.occupied_slots.0,
            starts_at_epoch_ms: row.starts_at_epoch_ms,
            batch_timeout_secs: row.batch_timeout_secs.map(|s| s as u64),
            callback_url: row.callback_url,
            network_type: network_type_from_str(&row.network_type)?,
            network_id: row.network_id,
            creation_id: row.creation_id,
        })
    }
}

pub struct SessionRepo {
    pool: PgPool,
}

impl SessionRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, StorageError> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Session::try_from).transpose()
    }

    /// `create_session` step 4 reuse check: only non-TERMINATED sessions count.
    pub async fn find_live_by_name_and_access_key(
        &self,
        name: &str,
        access_key: &AccessKey,
    ) -> Result<Option<Session>, StorageError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM sessions WHERE name = $1 AND access_key = $2 AND status <> 'TERMINATED'",
        )
        .bind(name)
        .bind(&access_key.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Session::try_from).transpose()
    }

    /// Sessions the scheduler should consider on its next tick (§4.4).
    pub async fn list_pending(&self) -> Result<Vec<Session>, StorageError> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM sessions WHERE status = 'PENDING' ORDER BY priority DESC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Session::try_from).collect()
    }

    /// Sessions currently in `status` — used by the scheduler tick loop to
    /// find, e.g., PREPARED sessions ready for `try_create_kernels`.
    pub async fn list_by_status(&self, status: Status) -> Result<Vec<Session>, StorageError> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM sessions WHERE status = $1 ORDER BY priority DESC, id ASC",
        )
        .bind(status_to_str(status))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Session::try_from).collect()
    }

    /// Sessions in an occupancy-relevant status, for `recalc_resource_usage`.
    pub async fn list_occupying(&self) -> Result<Vec<Session>, StorageError> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM sessions WHERE status NOT IN ('TERMINATED', 'CANCELLED', 'PENDING')",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Session::try_from).collect()
    }

    pub async fn find_for_update<'c>(
        tx: &mut Transaction<'c, Postgres>,
        id: &SessionId,
    ) -> Result<Option<Session>, StorageError> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE id = $1 FOR UPDATE")
            .bind(id.as_str())
            .fetch_optional(&mut **tx)
            .await?;
        row.map(Session::try_from).transpose()
    }

    /// `enqueue_session` (§4.5 step 6): insert a PENDING session row.
    pub async fn insert<'c>(tx: &mut Transaction<'c, Postgres>, session: &Session) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO sessions (id, name, access_key, domain, project, scaling_group, \
             session_type, cluster_mode, cluster_size, priority, status, status_history, images, \
             environ, requested_slots, occupied_slots, starts_at_epoch_ms, batch_timeout_secs, \
             callback_url, network_type, network_id, creation_id) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22)",
        )
        .bind(session.id.as_str())
        .bind(&session.name)
        .bind(&session.access_key.0)
        .bind(&session.domain.0)
        .bind(&session.project.0)
        .bind(&session.scaling_group)
        .bind(session_type_to_str(session.session_type))
        .bind(cluster_mode_to_str(session.cluster_mode))
        .bind(session.cluster_size as i32)
        .bind(session.priority)
        .bind(status_to_str(session.status))
        .bind(Json(&session.status_history))
        .bind(Json(&session.images))
        .bind(Json(&session.environ))
        .bind(Json(&session.requested_slots))
        .bind(Json(&session.occupied_slots))
        .bind(session.starts_at_epoch_ms)
        .bind(session.batch_timeout_secs.map(|s| s as i64))
        .bind(&session.callback_url)
        .bind(network_type_to_str(session.network_type))
        .bind(&session.network_id)
        .bind(&session.creation_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Persist a status transition plus its history (§4.3).
    pub async fn update_status<'c>(
        tx: &mut Transaction<'c, Postgres>,
        id: &SessionId,
        status: Status,
        status_history: &StatusHistory,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE sessions SET status = $2, status_history = $3 WHERE id = $1")
            .bind(id.as_str())
            .bind(status_to_str(status))
            .bind(Json(status_history))
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn update_scaling_group<'c>(
        tx: &mut Transaction<'c, Postgres>,
        id: &SessionId,
        scaling_group: &str,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE sessions SET scaling_group = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(scaling_group)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn update_occupied_slots<'c>(
        tx: &mut Transaction<'c, Postgres>,
        id: &SessionId,
        occupied: &ResourceSlots,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE sessions SET occupied_slots = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(Json(occupied))
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
