// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Redis-backed keypair concurrency counters and the image→agents reverse
//! index (§5 "Shared-resource discipline", SPEC_FULL supplemented feature 4).
//!
//! Counters are mutated with `INCR`/`DECR` on the hot path and recomputed
//! from scratch by `recalc_resource_usage` to recover from drift; the
//! reverse index is a Redis set per image, updated on heartbeat (add) and
//! agent termination (remove-all for that agent).

use bai_core::{AgentId, ConcurrencyKind};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::StorageError;

fn concurrency_key(access_key: &str, kind: ConcurrencyKind) -> String {
    match kind {
        ConcurrencyKind::Compute => format!("keypair:{access_key}:concurrency:compute"),
        ConcurrencyKind::System => format!("keypair:{access_key}:concurrency:system"),
    }
}

fn image_agents_key(image_canonical: &str) -> String {
    format!("image:{image_canonical}:agents")
}

fn agent_images_key(agent_id: &AgentId) -> String {
    format!("agent:{agent_id}:images")
}

#[derive(Clone)]
pub struct RedisCounters {
    conn: ConnectionManager,
}

impl RedisCounters {
    pub async fn connect(redis_url: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    pub async fn incr_concurrency(&self, access_key: &str, kind: ConcurrencyKind) -> Result<i64, StorageError> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.incr(concurrency_key(access_key, kind), 1).await?;
        Ok(value)
    }

    /// `destroy_session` decrements exactly one of the two counters per
    /// request (SPEC_FULL supplemented feature 4); never lets it go negative.
    pub async fn decr_concurrency(&self, access_key: &str, kind: ConcurrencyKind) -> Result<i64, StorageError> {
        let mut conn = self.conn.clone();
        let key = concurrency_key(access_key, kind);
        let value: i64 = conn.decr(&key, 1).await?;
        if value < 0 {
            let _: () = conn.set(&key, 0).await?;
            return Ok(0);
        }
        Ok(value)
    }

    pub async fn get_concurrency(&self, access_key: &str, kind: ConcurrencyKind) -> Result<i64, StorageError> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = conn.get(concurrency_key(access_key, kind)).await?;
        Ok(value.unwrap_or(0))
    }

    /// `recalc_resource_usage` (§4.5): overwrite both counters from a
    /// from-scratch count of session rows to recover from drift.
    pub async fn set_concurrency(
        &self,
        access_key: &str,
        kind: ConcurrencyKind,
        value: i64,
    ) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(concurrency_key(access_key, kind), value).await?;
        Ok(())
    }

    pub async fn image_agents_add(&self, image_canonical: &str, agent_id: &AgentId) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let _: () = conn.sadd(image_agents_key(image_canonical), agent_id.as_str()).await?;
        let _: () = conn.sadd(agent_images_key(agent_id), image_canonical).await?;
        Ok(())
    }

    pub async fn image_agents_members(&self, image_canonical: &str) -> Result<Vec<AgentId>, StorageError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(image_agents_key(image_canonical)).await?;
        Ok(members.into_iter().map(AgentId::from_string).collect())
    }

    /// `DoSyncKernelLogs` (§4.6): pop up to `max_chunks` entries from the
    /// Redis list `containerlog.<container_id>` and delete the list.
    pub async fn drain_log_chunks(
        &self,
        container_id: &str,
        max_chunks: isize,
    ) -> Result<Vec<String>, StorageError> {
        let mut conn = self.conn.clone();
        let key = format!("containerlog.{container_id}");
        let chunks: Vec<String> = conn.lrange(&key, 0, max_chunks - 1).await?;
        let _: () = conn.del(&key).await?;
        Ok(chunks)
    }

    /// Removes `agent_id` from every image's reverse-index set it had
    /// joined, then clears its own forward set.
    pub async fn remove_agent_from_all_images(&self, agent_id: &AgentId) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let images: Vec<String> = conn.smembers(agent_images_key(agent_id)).await?;
        for image in &images {
            let _: () = conn.srem(image_agents_key(image), agent_id.as_str()).await?;
        }
        let _: () = conn.del(agent_images_key(agent_id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_key_distinguishes_compute_and_system() {
        assert_eq!(
            concurrency_key("AKIA1", ConcurrencyKind::Compute),
            "keypair:AKIA1:concurrency:compute"
        );
        assert_eq!(
            concurrency_key("AKIA1", ConcurrencyKind::System),
            "keypair:AKIA1:concurrency:system"
        );
    }

    #[test]
    fn image_and_agent_key_formats() {
        assert_eq!(image_agents_key("python:3.9"), "image:python:3.9:agents");
        let agent_id = AgentId::from_string("agt-test0123456789abcd");
        assert_eq!(agent_images_key(&agent_id), format!("agent:{agent_id}:images"));
    }
}
