// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! An in-memory [`AgentRpc`] double for engine/registry tests, gated behind
//! `test-support` the same way the teacher exposes its `FakeAdapter` only
//! to other crates' test builds.

use async_trait::async_trait;
use bai_core::{AgentId, KernelId, KernelPorts, ResourceSlots, ServicePort, SessionId};
use bai_wire::{
    AgentRpc, ClusterInfo, GpuAllocSpec, HwInfoReport, ImageConfig, KernelCreationConfig,
    KernelCreationInfo, PurgeImageResult, ResourceSpec, RpcError,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;

/// One logged call, recorded verbatim for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    CheckAndPull { agent_id: AgentId },
    CreateKernels { agent_id: AgentId, session_id: SessionId, kernel_ids: Vec<KernelId> },
    DestroyKernel { agent_id: AgentId, kernel_id: KernelId, reason: String },
    RestartKernel { agent_id: AgentId, kernel_id: KernelId },
    Execute { agent_id: AgentId, kernel_id: KernelId, run_id: String },
    InterruptKernel { agent_id: AgentId, kernel_id: KernelId },
    StartService { agent_id: AgentId, kernel_id: KernelId, service: String },
    ShutdownService { agent_id: AgentId, kernel_id: KernelId, service: String },
    Commit { agent_id: AgentId, kernel_id: KernelId },
    CreateLocalNetwork { agent_id: AgentId, name: String },
    DestroyLocalNetwork { agent_id: AgentId, name: String },
}

/// Records every call it receives and returns canned, overridable
/// responses. `create_kernels` synthesizes one [`KernelCreationInfo`] per
/// requested kernel id so tests don't need to hand-build the full struct.
#[derive(Default)]
pub struct FakeAgentRpc {
    calls: Mutex<Vec<RecordedCall>>,
    fail_next: Mutex<Option<RpcError>>,
}

impl FakeAgentRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Makes the next call into this adapter return `err` instead of its
    /// usual canned response.
    pub fn fail_next_call(&self, err: RpcError) {
        *self.fail_next.lock() = Some(err);
    }

    fn take_failure(&self) -> Option<RpcError> {
        self.fail_next.lock().take()
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl AgentRpc for FakeAgentRpc {
    async fn check_and_pull(
        &self,
        agent_id: &AgentId,
        image_configs: &[ImageConfig],
    ) -> Result<BTreeMap<String, uuid::Uuid>, RpcError> {
        self.record(RecordedCall::CheckAndPull { agent_id: agent_id.clone() });
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        Ok(image_configs.iter().map(|c| (c.canonical.clone(), uuid::Uuid::new_v4())).collect())
    }

    async fn create_kernels(
        &self,
        agent_id: &AgentId,
        session_id: SessionId,
        kernel_ids: &[KernelId],
        _configs: &[KernelCreationConfig],
        _cluster_info: &ClusterInfo,
    ) -> Result<Vec<KernelCreationInfo>, RpcError> {
        self.record(RecordedCall::CreateKernels {
            agent_id: agent_id.clone(),
            session_id,
            kernel_ids: kernel_ids.to_vec(),
        });
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        Ok(kernel_ids
            .iter()
            .map(|kernel_id| KernelCreationInfo {
                kernel_id: kernel_id.clone(),
                container_id: format!("container-{kernel_id}"),
                kernel_host: agent_id.to_string(),
                ports: KernelPorts::default(),
                service_ports: Vec::<ServicePort>::new(),
                resource_spec: ResourceSpec { allocations: ResourceSlots::new() },
                attached_devices: BTreeMap::new(),
            })
            .collect())
    }

    async fn destroy_kernel(
        &self,
        agent_id: &AgentId,
        kernel_id: KernelId,
        _session_id: SessionId,
        reason: &str,
        _suppress_events: bool,
    ) -> Result<(), RpcError> {
        self.record(RecordedCall::DestroyKernel {
            agent_id: agent_id.clone(),
            kernel_id,
            reason: reason.to_string(),
        });
        self.take_failure().map_or(Ok(()), Err)
    }

    async fn restart_kernel(
        &self,
        agent_id: &AgentId,
        _session_id: SessionId,
        kernel_id: KernelId,
        _image_ref: &ImageConfig,
        _updated_config: &KernelCreationConfig,
    ) -> Result<KernelCreationInfo, RpcError> {
        self.record(RecordedCall::RestartKernel { agent_id: agent_id.clone(), kernel_id });
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        Ok(KernelCreationInfo {
            kernel_id,
            container_id: format!("container-{kernel_id}"),
            kernel_host: agent_id.to_string(),
            ports: KernelPorts::default(),
            service_ports: Vec::new(),
            resource_spec: ResourceSpec { allocations: ResourceSlots::new() },
            attached_devices: BTreeMap::new(),
        })
    }

    async fn execute(
        &self,
        agent_id: &AgentId,
        kernel_id: KernelId,
        _api_major: u32,
        run_id: &str,
        _mode: &str,
        _code: &str,
        _opts: &BTreeMap<String, String>,
        _flush_timeout: Duration,
    ) -> Result<bai_wire::ExecutionResult, RpcError> {
        self.record(RecordedCall::Execute {
            agent_id: agent_id.clone(),
            kernel_id,
            run_id: run_id.to_string(),
        });
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        Ok(bai_wire::ExecutionResult { status: "finished".into(), console: Vec::new(), exceptions: Vec::new() })
    }

    async fn interrupt_kernel(&self, agent_id: &AgentId, kernel_id: KernelId) -> Result<(), RpcError> {
        self.record(RecordedCall::InterruptKernel { agent_id: agent_id.clone(), kernel_id });
        self.take_failure().map_or(Ok(()), Err)
    }

    async fn get_completions(
        &self,
        _agent_id: &AgentId,
        _kernel_id: KernelId,
        _text: &str,
        _opts: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, RpcError> {
        self.take_failure().map_or(Ok(Vec::new()), Err)
    }

    async fn start_service(
        &self,
        agent_id: &AgentId,
        kernel_id: KernelId,
        service: &str,
        _opts: &BTreeMap<String, String>,
    ) -> Result<(), RpcError> {
        self.record(RecordedCall::StartService {
            agent_id: agent_id.clone(),
            kernel_id,
            service: service.to_string(),
        });
        self.take_failure().map_or(Ok(()), Err)
    }

    async fn shutdown_service(&self, agent_id: &AgentId, kernel_id: KernelId, service: &str) -> Result<(), RpcError> {
        self.record(RecordedCall::ShutdownService {
            agent_id: agent_id.clone(),
            kernel_id,
            service: service.to_string(),
        });
        self.take_failure().map_or(Ok(()), Err)
    }

    async fn upload_file(
        &self,
        _agent_id: &AgentId,
        _kernel_id: KernelId,
        _filename: &str,
        _bytes: &[u8],
    ) -> Result<(), RpcError> {
        self.take_failure().map_or(Ok(()), Err)
    }

    async fn download_file(&self, _agent_id: &AgentId, _kernel_id: KernelId, _path: &str) -> Result<Vec<u8>, RpcError> {
        self.take_failure().map_or(Ok(Vec::new()), Err)
    }

    async fn list_files(&self, _agent_id: &AgentId, _kernel_id: KernelId, _path: &str) -> Result<Vec<String>, RpcError> {
        self.take_failure().map_or(Ok(Vec::new()), Err)
    }

    async fn get_logs(&self, _agent_id: &AgentId, _kernel_id: KernelId) -> Result<String, RpcError> {
        self.take_failure().map_or(Ok(String::new()), Err)
    }

    async fn commit(
        &self,
        agent_id: &AgentId,
        kernel_id: KernelId,
        _email: &str,
        _canonical_or_filename: &str,
        _extra_labels: &BTreeMap<String, String>,
    ) -> Result<(), RpcError> {
        self.record(RecordedCall::Commit { agent_id: agent_id.clone(), kernel_id });
        self.take_failure().map_or(Ok(()), Err)
    }

    async fn push_image(&self, _agent_id: &AgentId, _image_ref: &ImageConfig, _registry: &str) -> Result<(), RpcError> {
        self.take_failure().map_or(Ok(()), Err)
    }

    async fn purge_images(&self, _agent_id: &AgentId, canonicals: &[String]) -> Result<Vec<PurgeImageResult>, RpcError> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        Ok(canonicals.iter().map(|c| PurgeImageResult { image: c.clone(), error: None }).collect())
    }

    async fn gather_hwinfo(&self, _agent_id: &AgentId) -> Result<BTreeMap<String, HwInfoReport>, RpcError> {
        self.take_failure().map_or(Ok(BTreeMap::new()), Err)
    }

    async fn scan_gpu_alloc_map(&self, _agent_id: &AgentId) -> Result<Vec<GpuAllocSpec>, RpcError> {
        self.take_failure().map_or(Ok(Vec::new()), Err)
    }

    async fn create_local_network(&self, agent_id: &AgentId, name: &str) -> Result<(), RpcError> {
        self.record(RecordedCall::CreateLocalNetwork { agent_id: agent_id.clone(), name: name.to_string() });
        self.take_failure().map_or(Ok(()), Err)
    }

    async fn destroy_local_network(&self, agent_id: &AgentId, name: &str) -> Result<(), RpcError> {
        self.record(RecordedCall::DestroyLocalNetwork { agent_id: agent_id.clone(), name: name.to_string() });
        self.take_failure().map_or(Ok(()), Err)
    }

    async fn sync_kernel_registry(
        &self,
        _agent_id: &AgentId,
        _pairs: &[(KernelId, SessionId)],
    ) -> Result<(), RpcError> {
        self.take_failure().map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_id() -> AgentId {
        AgentId::from_string("agt-test0123456789abcd")
    }

    #[tokio::test]
    async fn records_calls_in_order() {
        let fake = FakeAgentRpc::new();
        fake.interrupt_kernel(&agent_id(), KernelId::new()).await.unwrap();
        fake.interrupt_kernel(&agent_id(), KernelId::new()).await.unwrap();
        assert_eq!(fake.calls().len(), 2);
    }

    #[tokio::test]
    async fn fail_next_call_returns_configured_error() {
        let fake = FakeAgentRpc::new();
        fake.fail_next_call(RpcError::Transport(bai_wire::TransportError::NoRoute));
        let err = fake.interrupt_kernel(&agent_id(), KernelId::new()).await.unwrap_err();
        assert!(matches!(err, RpcError::Transport(bai_wire::TransportError::NoRoute)));
        // only the next call fails
        fake.interrupt_kernel(&agent_id(), KernelId::new()).await.unwrap();
    }

    #[tokio::test]
    async fn create_kernels_synthesizes_one_info_per_kernel_id() {
        let fake = FakeAgentRpc::new();
        let ids = vec![KernelId::new(), KernelId::new(), KernelId::new()];
        let info = fake
            .create_kernels(
                &agent_id(),
                SessionId::new(),
                &ids,
                &[],
                &ClusterInfo {
                    mode: "single-node".into(),
                    size: 3,
                    replicas: BTreeMap::new(),
                    ssh_keypair: None,
                    ssh_port_map: BTreeMap::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(info.len(), 3);
    }
}
