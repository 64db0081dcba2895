// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Kernel repository (§3 Kernel, §4.4 scheduler, §4.6 event handlers).

use bai_core::{
    AgentId, ClusterRole, ImageRef, Kernel, KernelId, KernelPorts, ResourceSlots, ServicePort,
    SessionId, Status, StatusData, StatusHistory,
};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::StorageError;

#[derive(sqlx::FromRow)]
struct KernelRow {
    id: String,
    session_id: String,
    cluster_role: String,
    cluster_idx: i32,
    agent_id: Option<String>,
    image_canonical: String,
    image_architecture: String,
    requested_slots: Json<ResourceSlots>,
    occupied_slots: Json<ResourceSlots>,
    status: String,
    status_history: Json<StatusHistory>,
    exit_code: Option<i32>,
    service_ports: Json<Vec<ServicePort>>,
    container_id: Option<String>,
    repl_in_port: Option<i32>,
    repl_out_port: Option<i32>,
    stdin_port: Option<i32>,
    stdout_port: Option<i32>,
    startup_command: Option<String>,
    bootstrap_script: Option<String>,
    status_info: Option<String>,
    status_data: Option<Json<StatusData>>,
    #[allow(dead_code)]
    log: String,
}

fn role_to_str(r: ClusterRole) -> &'static str {
    match r {
        ClusterRole::Main => "main",
        ClusterRole::Sub => "sub",
    }
}

fn role_from_str(s: &str) -> Result<ClusterRole, StorageError> {
    match s {
        "main" => Ok(ClusterRole::Main),
        "sub" => Ok(ClusterRole::Sub),
        other => Err(decode_err("cluster_role", other)),
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

fn port_from_i32(p: Option<i32>) -> Option<u16> {
    p.and_then(|p| u16::try_from(p).ok())
}

impl TryFrom<KernelRow> for Kernel {
    type Error = StorageError;

    fn try_from(row: KernelRow) -> Result<Self, Self::Error> {
        Ok(Kernel {
            id: KernelId::from_string(&row.id),
            session_id: SessionId::from_string(&row.session_id),
            cluster_role: role_from_str(&row.cluster_role)?,
            cluster_idx: row.cluster_idx as u32,
            agent_id: row.agent_id.map(AgentId::from_string),
            image: ImageRef::new(row.image_canonical, row.image_architecture),
            requested_slots: row.requested_slots.0,
            occupied_slots: row.occupied_slots.0,
            status: status_from_str(&row.status)?,
            status_history: row.status_history.0,
            exit_code: row.exit_code,
            service_ports: row.service_ports.0,
            container_id: row.container_id,
            ports: KernelPorts {
                repl_in_port: port_from_i32(row.repl_in_port),
                repl_out_port: port_from_i32(row.repl_out_port),
                stdin_port: port_from_i32(row.stdin_port),
                stdout_port: port_from_i32(row.stdout_port),
            },
            startup_command: row.startup_command,
            bootstrap_script: row.bootstrap_script,
            status_info: row.status_info,
            status_data: row.status_data.map(|j| j.0),
        })
    }
}

pub struct KernelRepo {
    pool: PgPool,
}

impl KernelRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: &KernelId) -> Result<Option<Kernel>, StorageError> {
        let row = sqlx::query_as::<_, KernelRow>("SELECT * FROM kernels WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Kernel::try_from).transpose()
    }

    /// All kernels of a session, sorted `(cluster_role == main desc, cluster_idx asc)`
    /// per §4.4 tie-break ordering.
    pub async fn list_by_session(&self, session_id: &SessionId) -> Result<Vec<Kernel>, StorageError> {
        let rows = sqlx::query_as::<_, KernelRow>(
            "SELECT * FROM kernels WHERE session_id = $1 \
             ORDER BY (cluster_role = 'main') DESC, cluster_idx ASC",
        )
        .bind(session_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Kernel::try_from).collect()
    }

    pub async fn find_main_kernel(&self, session_id: &SessionId) -> Result<Option<Kernel>, StorageError> {
        let row = sqlx::query_as::<_, KernelRow>(
            "SELECT * FROM kernels WHERE session_id = $1 AND cluster_role = 'main'",
        )
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Kernel::try_from).transpose()
    }

    /// Kernels of a given agent in a given status — used by `ImagePullStarted`
    /// et al. to find the set that should transition (§4.6).
    pub async fn list_by_agent_status(
        &self,
        agent_id: &AgentId,
        status: Status,
    ) -> Result<Vec<Kernel>, StorageError> {
        let rows = sqlx::query_as::<_, KernelRow>(
            "SELECT * FROM kernels WHERE agent_id = $1 AND status = $2",
        )
        .bind(agent_id.as_str())
        .bind(status_to_str(status))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Kernel::try_from).collect()
    }

    pub async fn find_for_update<'c>(
        tx: &mut Transaction<'c, Postgres>,
        id: &KernelId,
    ) -> Result<Option<Kernel>, StorageError> {
        let row = sqlx::query_as::<_, KernelRow>("SELECT * FROM kernels WHERE id = $1 FOR UPDATE")
            .bind(id.as_str())
            .fetch_optional(&mut **tx)
            .await?;
        row.map(Kernel::try_from).transpose()
    }

    pub async fn list_for_update_by_session<'c>(
        tx: &mut Transaction<'c, Postgres>,
        session_id: &SessionId,
    ) -> Result<Vec<Kernel>, StorageError> {
        let rows = sqlx::query_as::<_, KernelRow>(
            "SELECT * FROM kernels WHERE session_id = $1 \
             ORDER BY (cluster_role = 'main') DESC, cluster_idx ASC FOR UPDATE",
        )
        .bind(session_id.as_str())
        .fetch_all(&mut **tx)
        .await?;
        rows.into_iter().map(Kernel::try_from).collect()
    }

    /// `enqueue_session` (§4.5 step 6): bulk-insert PENDING kernels.
    pub async fn insert<'c>(tx: &mut Transaction<'c, Postgres>, kernel: &Kernel) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO kernels (id, session_id, cluster_role, cluster_idx, agent_id, \
             image_canonical, image_architecture, requested_slots, occupied_slots, status, \
             status_history, exit_code, service_ports, container_id, repl_in_port, repl_out_port, \
             stdin_port, stdout_port, startup_command, bootstrap_script) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20)",
        )
        .bind(kernel.id.as_str())
        .bind(kernel.session_id.as_str())
        .bind(role_to_str(kernel.cluster_role))
        .bind(kernel.cluster_idx as i32)
        .bind(kernel.agent_id.as_ref().map(|a| a.as_str()))
        .bind(&kernel.image.canonical)
        .bind(&kernel.image.architecture)
        .bind(Json(&kernel.requested_slots))
        .bind(Json(&kernel.occupied_slots))
        .bind(status_to_str(kernel.status))
        .bind(Json(&kernel.status_history))
        .bind(kernel.exit_code)
        .bind(Json(&kernel.service_ports))
        .bind(&kernel.container_id)
        .bind(kernel.ports.repl_in_port.map(i32::from))
        .bind(kernel.ports.repl_out_port.map(i32::from))
        .bind(kernel.ports.stdin_port.map(i32::from))
        .bind(kernel.ports.stdout_port.map(i32::from))
        .bind(&kernel.startup_command)
        .bind(&kernel.bootstrap_script)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn update_status<'c>(
        tx: &mut Transaction<'c, Postgres>,
        id: &KernelId,
        status: Status,
        status_history: &StatusHistory,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE kernels SET status = $2, status_history = $3 WHERE id = $1")
            .bind(id.as_str())
            .bind(status_to_str(status))
            .bind(Json(status_history))
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Attaches a reason and structured error detail to a kernel, e.g. an
    /// image pull failure (§4.4, §9 supplemented feature 6). Separate from
    /// [`Self::update_status`] since most transitions carry no detail.
    pub async fn set_status_detail<'c>(
        tx: &mut Transaction<'c, Postgres>,
        id: &KernelId,
        status_info: Option<&str>,
        status_data: Option<StatusData>,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE kernels SET status_info = $2, status_data = $3 WHERE id = $1")
            .bind(id.as_str())
            .bind(status_info)
            .bind(status_data.map(Json))
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn assign_agent<'c>(
        tx: &mut Transaction<'c, Postgres>,
        id: &KernelId,
        agent_id: &AgentId,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE kernels SET agent_id = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(agent_id.as_str())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// `KernelStarted` handler (§4.6): persist actual allocated slots, ports,
    /// container id, and transition to RUNNING in one write.
    #[allow(clippy::too_many_arguments)]
    pub async fn mark_started<'c>(
        tx: &mut Transaction<'c, Postgres>,
        id: &KernelId,
        occupied_slots: &ResourceSlots,
        ports: &KernelPorts,
        service_ports: &[ServicePort],
        container_id: &str,
        status_history: &StatusHistory,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE kernels SET status = 'RUNNING', status_history = $2, occupied_slots = $3, \
             repl_in_port = $4, repl_out_port = $5, stdin_port = $6, stdout_port = $7, \
             service_ports = $8, container_id = $9 WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(Json(status_history))
        .bind(Json(occupied_slots))
        .bind(ports.repl_in_port.map(i32::from))
        .bind(ports.repl_out_port.map(i32::from))
        .bind(ports.stdin_port.map(i32::from))
        .bind(ports.stdout_port.map(i32::from))
        .bind(Json(service_ports))
        .bind(container_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// `DoSyncKernelLogs` handler (§4.6): append a drained chunk of
    /// container log to the kernel row.
    pub async fn append_log(&self, id: &KernelId, chunk: &str) -> Result<(), StorageError> {
        sqlx::query("UPDATE kernels SET log = log || $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(chunk)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_exit_code<'c>(
        tx: &mut Transaction<'c, Postgres>,
        id: &KernelId,
        exit_code: i32,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE kernels SET exit_code = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(exit_code)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
