// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Owner-scope lookups: domains, projects, users, keypairs, keypair resource
//! policies, and scaling groups (§4.4 scaling-group choice, §4.4 quota
//! checks, §4.5 `create_session` owner resolution).

use bai_core::ResourceSlots;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::error::StorageError;

/// A scaling group candidate for §4.4's "From (domain, project, access-key)
/// derive the allowed scaling groups" rule.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ScalingGroupRow {
    pub name: String,
    pub domain: String,
    pub allowed_session_types: Vec<String>,
    pub is_active: bool,
}

/// The three quota bounds compared in §4.4's "smallest of the three bounds
/// each slot": keypair, project, and domain remaining capacity.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct KeypairResourcePolicyRow {
    pub access_key: String,
    pub total_resource_slots: Json<ResourceSlots>,
    pub max_concurrent_sessions: i32,
    pub max_concurrent_sftp_sessions: i32,
    pub max_containers_per_session: i32,
}

pub struct OwnerRepo {
    pool: PgPool,
}

impl OwnerRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Scaling groups available to a domain, ordered by name for
    /// deterministic "pick the first whose `allowed_session_types` contains
    /// the requested type" selection (§4.4).
    pub async fn scaling_groups_for_domain(&self, domain: &str) -> Result<Vec<ScalingGroupRow>, StorageError> {
        let rows = sqlx::query_as::<_, ScalingGroupRow>(
            "SELECT name, domain, allowed_session_types, is_active FROM scaling_groups \
             WHERE domain = $1 AND is_active = true ORDER BY name ASC",
        )
        .bind(domain)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn keypair_resource_policy(
        &self,
        access_key: &str,
    ) -> Result<Option<KeypairResourcePolicyRow>, StorageError> {
        let row = sqlx::query_as::<_, KeypairResourcePolicyRow>(
            "SELECT access_key, total_resource_slots, max_concurrent_sessions, \
             max_concurrent_sftp_sessions, max_containers_per_session \
             FROM keypair_resource_policies WHERE access_key = $1",
        )
        .bind(access_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn user_id_for_access_key(&self, access_key: &str) -> Result<Option<uuid::Uuid>, StorageError> {
        let row: Option<(uuid::Uuid,)> =
            sqlx::query_as("SELECT user_id FROM keypairs WHERE access_key = $1 AND is_active = true")
                .bind(access_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id,)| id))
    }

    pub async fn domain_exists(&self, domain: &str) -> Result<bool, StorageError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT name FROM domains WHERE name = $1")
            .bind(domain)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn project_exists(&self, domain: &str, project: &str) -> Result<bool, StorageError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT name FROM projects WHERE domain = $1 AND name = $2")
                .bind(domain)
                .bind(project)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// The domain bound of §4.4's "keypair, project, and domain remaining
    /// capacity" quota check.
    pub async fn domain_total_slots(&self, domain: &str) -> Result<Option<ResourceSlots>, StorageError> {
        let row: Option<(Json<ResourceSlots>,)> =
            sqlx::query_as("SELECT total_resource_slots FROM domains WHERE name = $1")
                .bind(domain)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(slots,)| slots.0))
    }

    /// The project bound of §4.4's quota check.
    pub async fn project_total_slots(
        &self,
        domain: &str,
        project: &str,
    ) -> Result<Option<ResourceSlots>, StorageError> {
        let row: Option<(Json<ResourceSlots>,)> = sqlx::query_as(
            "SELECT total_resource_slots FROM projects WHERE domain = $1 AND name = $2",
        )
        .bind(domain)
        .bind(project)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(slots,)| slots.0))
    }
}
