// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Inference endpoints and their routes (§3 Endpoint & Route).

use crate::kernel::SessionId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifies a long-lived inference endpoint.
    pub struct EndpointId("endp");
}

crate::define_id! {
    /// Identifies one route (worker replica) of an endpoint.
    pub struct RouteId("rout");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteStatus {
    Provisioning,
    Healthy,
    Unhealthy,
    Terminating,
    FailedToStart,
}

crate::simple_display! {
    RouteStatus {
        Provisioning => "PROVISIONING",
        Healthy => "HEALTHY",
        Unhealthy => "UNHEALTHY",
        Terminating => "TERMINATING",
        FailedToStart => "FAILED_TO_START",
    }
}

/// A long-lived endpoint owning N routes (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub name: String,
    pub model_name: String,
    pub image: crate::image::ImageRef,
    pub resource_slots: crate::resource::ResourceSlots,
    /// Incremented on every failed route creation (§4.6 `RouteCreated` handler).
    pub retries: u32,
}

/// One worker replica of an endpoint, mapped to exactly one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub endpoint_id: EndpointId,
    pub session_id: Option<SessionId>,
    pub status: RouteStatus,
}

#[cfg(test)]
#[path = "endpoint_tests.rs"]
mod tests;
