// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! Process configuration: a TOML file (`BACKENDAI_CONFIG` or
//! `./manager.toml`) with `BACKENDAI_*` environment overrides, following the
//! resolution idiom of the teacher's `env.rs`.

use std::time::Duration;

use bai_registry::RegistryConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
struct FileConfig {
    database_url: Option<String>,
    redis_url: Option<String>,
    stream_key: Option<String>,
    group_name: Option<String>,
    scheduler_tick_ms: Option<u64>,
    default_shared_memory_bytes: Option<u64>,
    priority_min: Option<i32>,
    priority_max: Option<i32>,
}

/// Everything `bai-daemon`'s bootstrap needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub stream_key: String,
    pub group_name: String,
    pub scheduler_tick: Duration,
    pub registry: RegistryConfig,
}

fn env_override(key: &str) -> Option<String> {
    std::env::var(format!("BACKENDAI_{key}")).ok().filter(|s| !s.is_empty())
}

/// Path to the TOML config file: `BACKENDAI_CONFIG` if set, else
/// `./manager.toml`.
pub fn config_path() -> std::path::PathBuf {
    std::env::var("BACKENDAI_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("manager.toml"))
}

impl Config {
    /// Loads the file at `path` if it exists (a missing file is not an
    /// error — every field has an environment or built-in default), then
    /// layers `BACKENDAI_*` environment overrides on top.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let file: FileConfig = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            toml::from_str(&text)?
        } else {
            FileConfig::default()
        };

        let database_url = env_override("DATABASE_URL")
            .or(file.database_url)
            .ok_or_else(|| anyhow::anyhow!("missing database_url (set BACKENDAI_DATABASE_URL or manager.toml)"))?;
        let redis_url = env_override("REDIS_URL")
            .or(file.redis_url)
            .ok_or_else(|| anyhow::anyhow!("missing redis_url (set BACKENDAI_REDIS_URL or manager.toml)"))?;
        let stream_key = env_override("STREAM_KEY").or(file.stream_key).unwrap_or_else(|| "events".into());
        let group_name = env_override("GROUP_NAME").or(file.group_name).unwrap_or_else(|| "manager".into());
        let scheduler_tick_ms = env_override("SCHEDULER_TICK_MS")
            .and_then(|s| s.parse().ok())
            .or(file.scheduler_tick_ms)
            .unwrap_or(1_000);

        let mut registry = RegistryConfig::default();
        if let Some(bytes) =
            env_override("DEFAULT_SHARED_MEMORY_BYTES").and_then(|s| s.parse().ok()).or(file.default_shared_memory_bytes)
        {
            registry.default_shared_memory_bytes = bytes;
        }
        let priority_min = env_override("PRIORITY_MIN").and_then(|s| s.parse().ok()).or(file.priority_min);
        let priority_max = env_override("PRIORITY_MAX").and_then(|s| s.parse().ok()).or(file.priority_max);
        if let (Some(min), Some(max)) = (priority_min, priority_max) {
            registry.priority_range = (min, max);
        }

        Ok(Self {
            database_url,
            redis_url,
            stream_key,
            group_name,
            scheduler_tick: Duration::from_millis(scheduler_tick_ms),
            registry,
        })
    }
}

/// Stable per-process consumer identity input: `OJ_*`-style resolution
/// shrunk to what `bai_eventbus::consumer_id` needs (hostname + an install
/// path standing in for deployment identity + a worker index).
pub fn worker_identity() -> (String, String, u32) {
    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".into());
    let install_path =
        std::env::current_exe().map(|p| p.display().to_string()).unwrap_or_else(|_| "bai-managerd".into());
    let process_index = env_override("WORKER_INDEX").and_then(|s| s.parse().ok()).unwrap_or(0);
    (hostname, install_path, process_index)
}
