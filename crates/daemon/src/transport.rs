// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! A placeholder [`AgentRpc`] transport.
//!
//! The manager-agent wire format is out of scope here; every call returns
//! `TransportError::ConnectionFailed` so a deployment notices immediately
//! if it runs this binary without swapping in a real transport (the
//! teacher's `adapters::agent::router::RuntimeRouter` is the equivalent
//! seam for pluggable docker/k8s/remote backends). A production build
//! supplies its own `Arc<dyn AgentRpc>` here.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bai_core::{AgentId, KernelId, KernelPorts, ResourceSlots, ServicePort, SessionId};
use bai_wire::{
    AgentRpc, ClusterInfo, ExecutionResult, GpuAllocSpec, HwInfoReport, ImageConfig,
    KernelCreationConfig, KernelCreationInfo, PurgeImageResult, RpcError, TransportError,
};

pub struct UnconfiguredTransport;

fn unconfigured() -> RpcError {
    RpcError::Transport(TransportError::ConnectionFailed(
        "no agent RPC transport configured for this deployment".into(),
    ))
}

#[async_trait]
impl AgentRpc for UnconfiguredTransport {
    async fn check_and_pull(
        &self,
        _agent_id: &AgentId,
        _image_configs: &[ImageConfig],
    ) -> Result<BTreeMap<String, uuid::Uuid>, RpcError> {
        Err(unconfigured())
    }

    async fn create_kernels(
        &self,
        _agent_id: &AgentId,
        _session_id: SessionId,
        _kernel_ids: &[KernelId],
        _configs: &[KernelCreationConfig],
        _cluster_info: &ClusterInfo,
    ) -> Result<Vec<KernelCreationInfo>, RpcError> {
        Err(unconfigured())
    }

    async fn destroy_kernel(
        &self,
        _agent_id: &AgentId,
        _kernel_id: KernelId,
        _session_id: SessionId,
        _reason: &str,
        _suppress_events: bool,
    ) -> Result<(), RpcError> {
        Err(unconfigured())
    }

    async fn restart_kernel(
        &self,
        _agent_id: &AgentId,
        _session_id: SessionId,
        _kernel_id: KernelId,
        _image_ref: &ImageConfig,
        _updated_config: &KernelCreationConfig,
    ) -> Result<KernelCreationInfo, RpcError> {
        Err(unconfigured())
    }

    async fn execute(
        &self,
        _agent_id: &AgentId,
        _kernel_id: KernelId,
        _api_major: u32,
        _run_id: &str,
        _mode: &str,
        _code: &str,
        _opts: &BTreeMap<String, String>,
        _flush_timeout: Duration,
    ) -> Result<ExecutionResult, RpcError> {
        Err(unconfigured())
    }

    async fn interrupt_kernel(&self, _agent_id: &AgentId, _kernel_id: KernelId) -> Result<(), RpcError> {
        Err(unconfigured())
    }

    async fn get_completions(
        &self,
        _agent_id: &AgentId,
        _kernel_id: KernelId,
        _text: &str,
        _opts: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, RpcError> {
        Err(unconfigured())
    }

    async fn start_service(
        &self,
        _agent_id: &AgentId,
        _kernel_id: KernelId,
        _service: &str,
        _opts: &BTreeMap<String, String>,
    ) -> Result<(), RpcError> {
        Err(unconfigured())
    }

    async fn shutdown_service(&self, _agent_id: &AgentId, _kernel_id: KernelId, _service: &str) -> Result<(), RpcError> {
        Err(unconfigured())
    }

    async fn upload_file(
        &self,
        _agent_id: &AgentId,
        _kernel_id: KernelId,
        _filename: &str,
        _bytes: &[u8],
    ) -> Result<(), RpcError> {
        Err(unconfigured())
    }

    async fn download_file(&self, _agent_id: &AgentId, _kernel_id: KernelId, _path: &str) -> Result<Vec<u8>, RpcError> {
        Err(unconfigured())
    }

    async fn list_files(&self, _agent_id: &AgentId, _kernel_id: KernelId, _path: &str) -> Result<Vec<String>, RpcError> {
        Err(unconfigured())
    }

    async fn get_logs(&self, _agent_id: &AgentId, _kernel_id: KernelId) -> Result<String, RpcError> {
        Err(unconfigured())
    }

    async fn commit(
        &self,
        _agent_id: &AgentId,
        _kernel_id: KernelId,
        _email: &str,
        _canonical_or_filename: &str,
        _extra_labels: &BTreeMap<String, String>,
    ) -> Result<(), RpcError> {
        Err(unconfigured())
    }

    async fn push_image(&self, _agent_id: &AgentId, _image_ref: &ImageConfig, _registry: &str) -> Result<(), RpcError> {
        Err(unconfigured())
    }

    async fn purge_images(&self, _agent_id: &AgentId, _canonicals: &[String]) -> Result<Vec<PurgeImageResult>, RpcError> {
        Err(unconfigured())
    }

    async fn gather_hwinfo(&self, _agent_id: &AgentId) -> Result<BTreeMap<String, HwInfoReport>, RpcError> {
        Err(unconfigured())
    }

    async fn scan_gpu_alloc_map(&self, _agent_id: &AgentId) -> Result<Vec<GpuAllocSpec>, RpcError> {
        Err(unconfigured())
    }

    async fn create_local_network(&self, _agent_id: &AgentId, _name: &str) -> Result<(), RpcError> {
        Err(unconfigured())
    }

    async fn destroy_local_network(&self, _agent_id: &AgentId, _name: &str) -> Result<(), RpcError> {
        Err(unconfigured())
    }

    async fn sync_kernel_registry(
        &self,
        _agent_id: &AgentId,
        _pairs: &[(KernelId, SessionId)],
    ) -> Result<(), RpcError> {
        Err(unconfigured())
    }
}
