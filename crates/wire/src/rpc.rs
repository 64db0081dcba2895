// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! The named-call agent RPC surface the core depends on (§4.2, §6).
//!
//! The concrete transport is out of scope (§1 Non-goals); [`AgentRpc`] is
//! the seam the scheduler, the registry, and the event handlers call
//! through. A test/mock implementation lives in `bai-adapters`.

use crate::error::RpcError;
use async_trait::async_trait;
use bai_core::{AgentId, KernelId, KernelPorts, ResourceSlots, ServicePort, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default RPC timeouts (§5: "defaults: 10 s for reads, 30 s for writes").
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    pub canonical: String,
    pub architecture: String,
    pub registry_url: String,
    pub digest: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ClusterRoleAssignment {
    Main,
    Sub,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub mode: String,
    pub size: u32,
    pub replicas: BTreeMap<String, u32>,
    pub ssh_keypair: Option<(String, String)>,
    pub ssh_port_map: BTreeMap<u32, u16>,
}

/// Everything `create_kernels`/`restart_kernel` need for one kernel (§4.4
/// "Kernel creation").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelCreationConfig {
    pub kernel_id: KernelId,
    pub image: ImageConfig,
    pub resource_slots: ResourceSlots,
    pub resource_opts: BTreeMap<String, String>,
    pub environ: BTreeMap<String, String>,
    pub vfolder_mounts: Vec<String>,
    pub cluster_role: ClusterRoleAssignment,
    pub cluster_idx: u32,
    pub startup_command: Option<String>,
    pub bootstrap_script: Option<String>,
    pub preopen_ports: Vec<u16>,
}

/// Per-kernel result of `create_kernels`/`restart_kernel` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub allocations: ResourceSlots,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelCreationInfo {
    pub kernel_id: KernelId,
    pub container_id: String,
    pub kernel_host: String,
    pub ports: KernelPorts,
    pub service_ports: Vec<ServicePort>,
    pub resource_spec: ResourceSpec,
    pub attached_devices: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: String,
    pub console: Vec<(String, String)>,
    pub exceptions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HwInfoReport {
    pub status: String,
    pub message: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuAllocSpec {
    pub device_id: String,
    pub detail: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeImageResult {
    pub image: String,
    pub error: Option<String>,
}

/// The named-call surface of an agent (§6). `order_key` ordering is a
/// property of the transport (FIFO per key), not of this trait's API
/// surface; callers obtain an already order-scoped handle from
/// `bai-adapters`'s RPC context.
#[async_trait]
pub trait AgentRpc: Send + Sync {
    async fn check_and_pull(
        &self,
        agent_id: &AgentId,
        image_configs: &[ImageConfig],
    ) -> Result<BTreeMap<String, uuid::Uuid>, RpcError>;

    async fn create_kernels(
        &self,
        agent_id: &AgentId,
        session_id: SessionId,
        kernel_ids: &[KernelId],
        configs: &[KernelCreationConfig],
        cluster_info: &ClusterInfo,
    ) -> Result<Vec<KernelCreationInfo>, RpcError>;

    async fn destroy_kernel(
        &self,
        agent_id: &AgentId,
        kernel_id: KernelId,
        session_id: SessionId,
        reason: &str,
        suppress_events: bool,
    ) -> Result<(), RpcError>;

    async fn restart_kernel(
        &self,
        agent_id: &AgentId,
        session_id: SessionId,
        kernel_id: KernelId,
        image_ref: &ImageConfig,
        updated_config: &KernelCreationConfig,
    ) -> Result<KernelCreationInfo, RpcError>;

    async fn execute(
        &self,
        agent_id: &AgentId,
        kernel_id: KernelId,
        api_major: u32,
        run_id: &str,
        mode: &str,
        code: &str,
        opts: &BTreeMap<String, String>,
        flush_timeout: Duration,
    ) -> Result<ExecutionResult, RpcError>;

    async fn interrupt_kernel(&self, agent_id: &AgentId, kernel_id: KernelId) -> Result<(), RpcError>;

    async fn get_completions(
        &self,
        agent_id: &AgentId,
        kernel_id: KernelId,
        text: &str,
        opts: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, RpcError>;

    async fn start_service(
        &self,
        agent_id: &AgentId,
        kernel_id: KernelId,
        service: &str,
        opts: &BTreeMap<String, String>,
    ) -> Result<(), RpcError>;

    async fn shutdown_service(&self, agent_id: &AgentId, kernel_id: KernelId, service: &str) -> Result<(), RpcError>;

    async fn upload_file(
        &self,
        agent_id: &AgentId,
        kernel_id: KernelId,
        filename: &str,
        bytes: &[u8],
    ) -> Result<(), RpcError>;

    async fn download_file(&self, agent_id: &AgentId, kernel_id: KernelId, path: &str) -> Result<Vec<u8>, RpcError>;

    async fn list_files(&self, agent_id: &AgentId, kernel_id: KernelId, path: &str) -> Result<Vec<String>, RpcError>;

    async fn get_logs(&self, agent_id: &AgentId, kernel_id: KernelId) -> Result<String, RpcError>;

    async fn commit(
        &self,
        agent_id: &AgentId,
        kernel_id: KernelId,
        email: &str,
        canonical_or_filename: &str,
        extra_labels: &BTreeMap<String, String>,
    ) -> Result<(), RpcError>;

    async fn push_image(&self, agent_id: &AgentId, image_ref: &ImageConfig, registry: &str) -> Result<(), RpcError>;

    async fn purge_images(&self, agent_id: &AgentId, canonicals: &[String]) -> Result<Vec<PurgeImageResult>, RpcError>;

    async fn gather_hwinfo(&self, agent_id: &AgentId) -> Result<BTreeMap<String, HwInfoReport>, RpcError>;

    async fn scan_gpu_alloc_map(&self, agent_id: &AgentId) -> Result<Vec<GpuAllocSpec>, RpcError>;

    async fn create_local_network(&self, agent_id: &AgentId, name: &str) -> Result<(), RpcError>;

    async fn destroy_local_network(&self, agent_id: &AgentId, name: &str) -> Result<(), RpcError>;

    async fn sync_kernel_registry(
        &self,
        agent_id: &AgentId,
        pairs: &[(KernelId, SessionId)],
    ) -> Result<(), RpcError>;
}
