// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Endpoint & Route repositories (§3 Endpoint & Route, §4.6 `RouteCreated`).

use bai_core::{Endpoint, EndpointId, ImageRef, ResourceSlots, Route, RouteId, RouteStatus, SessionId};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::StorageError;

#[derive(sqlx::FromRow)]
struct EndpointRow {
    id: String,
    name: String,
    model_name: String,
    image_canonical: String,
    image_architecture: String,
    resource_slots: Json<ResourceSlots>,
    retries: i32,
}

impl From<EndpointRow> for Endpoint {
    fn from(row: EndpointRow) -> Self {
        Endpoint {
            id: EndpointId::from_string(row.id),
            name: row.name,
            model_name: row.model_name,
            image: ImageRef::new(row.image_canonical, row.image_architecture),
            resource_slots: row.resource_slots.0,
            retries: row.retries as u32,
        }
    }
}

fn route_status_to_str(s: RouteStatus) -> &'static str {
    match s {
        RouteStatus::Provisioning => "PROVISIONING",
        RouteStatus::Healthy => "HEALTHY",
        RouteStatus::Unhealthy => "UNHEALTHY",
        RouteStatus::Terminating => "TERMINATING",
        RouteStatus::FailedToStart => "FAILED_TO_START",
    }
}

fn route_status_from_str(s: &str) -> Result<RouteStatus, StorageError> {
    Ok(match s {
        "PROVISIONING" => RouteStatus::Provisioning,
        "HEALTHY" => RouteStatus::Healthy,
        "UNHEALTHY" => RouteStatus::Unhealthy,
        "TERMINATING" => RouteStatus::Terminating,
        "FAILED_TO_START" => RouteStatus::FailedToStart,
        other => {
            return Err(StorageError::Db(sqlx::Error::Decode(
                format!("unknown route status {other}").into(),
            )))
        }
    })
}

#[derive(sqlx::FromRow)]
struct RouteRow {
    id: String,
    endpoint_id: String,
    session_id: Option<String>,
    status: String,
}

impl TryFrom<RouteRow> for Route {
    type Error = StorageError;

    fn try_from(row: RouteRow) -> Result<Self, Self::Error> {
        Ok(Route {
            id: RouteId::from_string(row.id),
            endpoint_id: EndpointId::from_string(row.endpoint_id),
            session_id: row.session_id.map(SessionId::from_string),
            status: route_status_from_str(&row.status)?,
        })
    }
}

pub struct EndpointRepo {
    pool: PgPool,
}

impl EndpointRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: &EndpointId) -> Result<Option<Endpoint>, StorageError> {
        let row = sqlx::query_as::<_, EndpointRow>("SELECT * FROM endpoints WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Endpoint::from))
    }

    pub async fn increment_retries<'c>(
        tx: &mut Transaction<'c, Postgres>,
        id: &EndpointId,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE endpoints SET retries = retries + 1 WHERE id = $1")
            .bind(id.as_str())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

pub struct RouteRepo {
    pool: PgPool,
}

impl RouteRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: &RouteId) -> Result<Option<Route>, StorageError> {
        let row = sqlx::query_as::<_, RouteRow>("SELECT * FROM routings WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Route::try_from).transpose()
    }

    pub async fn set_status<'c>(
        tx: &mut Transaction<'c, Postgres>,
        id: &RouteId,
        status: RouteStatus,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE routings SET status = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(route_status_to_str(status))
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn bind_session<'c>(
        tx: &mut Transaction<'c, Postgres>,
        id: &RouteId,
        session_id: &SessionId,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE routings SET session_id = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(session_id.as_str())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
