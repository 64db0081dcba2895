// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! VFolder mounts (§3 Session.vfolder_mounts, §4.5 step 1 alias-folder
//! validation). The core only carries a vfolder's identifier and mount
//! options; ownership and on-disk layout belong to the storage proxy
//! (out of scope).

use bai_core::{SessionId, VFolderMount};
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::StorageError;

#[derive(sqlx::FromRow)]
struct MountRow {
    vfolder_id: uuid::Uuid,
    mount_path: String,
    alias: Option<String>,
    read_only: bool,
}

impl From<MountRow> for VFolderMount {
    fn from(row: MountRow) -> Self {
        VFolderMount {
            vfolder_id: row.vfolder_id,
            mount_path: row.mount_path,
            alias: row.alias,
            read_only: row.read_only,
        }
    }
}

pub struct VFolderRepo {
    pool: PgPool,
}

impl VFolderRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn mounts_for_session(&self, session_id: &SessionId) -> Result<Vec<VFolderMount>, StorageError> {
        let rows = sqlx::query_as::<_, MountRow>(
            "SELECT vfolder_id, mount_path, alias, read_only FROM session_vfolder_mounts \
             WHERE session_id = $1",
        )
        .bind(session_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(VFolderMount::from).collect())
    }

    pub async fn insert_mount<'c>(
        tx: &mut Transaction<'c, Postgres>,
        session_id: &SessionId,
        mount: &VFolderMount,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO session_vfolder_mounts (session_id, vfolder_id, mount_path, alias, read_only) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(session_id.as_str())
        .bind(mount.vfolder_id)
        .bind(&mount.mount_path)
        .bind(&mount.alias)
        .bind(mount.read_only)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn vfolder_belongs_to(&self, vfolder_id: uuid::Uuid, access_key: &str) -> Result<bool, StorageError> {
        let row: Option<(uuid::Uuid,)> =
            sqlx::query_as("SELECT id FROM vfolders WHERE id = $1 AND access_key = $2")
                .bind(vfolder_id)
                .bind(access_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }
}
