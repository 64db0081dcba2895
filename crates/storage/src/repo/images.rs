// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Image repository (§3 Image, §4.5 `create_session` step 3 image resolution).

use bai_core::{Image, ResourceSlots};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::BTreeMap;

use crate::error::StorageError;

#[derive(sqlx::FromRow)]
struct ImageRow {
    canonical: String,
    architecture: String,
    registry: String,
    digest: String,
    labels: Json<BTreeMap<String, String>>,
    min_slots: Json<ResourceSlots>,
    max_slots: Json<ResourceSlots>,
}

impl From<ImageRow> for Image {
    fn from(row: ImageRow) -> Self {
        Image {
            canonical: row.canonical,
            architecture: row.architecture,
            registry: row.registry,
            digest: row.digest,
            labels: row.labels.0,
            min_slots: row.min_slots.0,
            max_slots: row.max_slots.0,
        }
    }
}

pub struct ImageRepo {
    pool: PgPool,
}

impl ImageRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve a canonical + architecture pair to its full image record
    /// (§4.5 step 3).
    pub async fn find_by_canonical_and_arch(
        &self,
        canonical: &str,
        architecture: &str,
    ) -> Result<Option<Image>, StorageError> {
        let row = sqlx::query_as::<_, ImageRow>(
            "SELECT canonical, architecture, registry, digest, labels, min_slots, max_slots \
             FROM images WHERE canonical = $1 AND architecture = $2",
        )
        .bind(canonical)
        .bind(architecture)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Image::from))
    }

    /// Registries allowed for a domain, used to validate image resolution
    /// against "domain-allowed registries" (§4.5 step 3).
    pub async fn domain_allows_registry(&self, domain: &str, registry: &str) -> Result<bool, StorageError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT name FROM image_registries WHERE name = $1 AND (domain IS NULL OR domain = $2)",
        )
        .bind(registry)
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}
