//! Shared fixtures for the integration tests: a fake `VmApi` driven by an
//! in-memory state table, and a no-op `RegistryClient`.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use vers_fleet::domain::errors::VmApiError;
use vers_fleet::domain::models::vm::{PowerState, VmConfig, VmHandle, VmLifecycleState, VmListEntry};
use vers_fleet::domain::ports::registry::{RegistryClient, RegistryEntry, RegistryVm};
use vers_fleet::domain::ports::vm_api::VmApi;

/// Drives `get_status`/`update_state`/`delete` from an in-memory table keyed
/// by vm id, so tests can exercise manager logic without a real VM control
/// plane. `restore_from_commit`/`branch`/`create_root` allocate a fresh id
/// and register it as `Running`.
pub struct FakeVmApi {
    states: StdMutex<HashMap<String, VmLifecycleState>>,
    next_id: StdMutex<u64>,
}

impl FakeVmApi {
    pub fn new() -> Self {
        Self { states: StdMutex::new(HashMap::new()), next_id: StdMutex::new(0) }
    }

    pub fn seed(&self, vm_id: &str, state: &str) {
        self.states.lock().unwrap().insert(vm_id.to_string(), VmLifecycleState(state.to_string()));
    }

    fn alloc_id(&self) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("vm-fake-{next}")
    }
}

#[async_trait]
impl VmApi for FakeVmApi {
    async fn list(&self) -> Result<Vec<VmListEntry>, VmApiError> {
        Ok(self
            .states
            .lock()
            .unwrap()
            .iter()
            .map(|(id, state)| VmListEntry { vm_id: id.clone(), state: state.clone(), created_at: None })
            .collect())
    }

    async fn create_root(&self, _cfg: VmConfig, _wait_boot: bool) -> Result<String, VmApiError> {
        let id = self.alloc_id();
        self.states.lock().unwrap().insert(id.clone(), VmLifecycleState("Running".to_string()));
        Ok(id)
    }

    async fn delete(&self, vm_id: &str) -> Result<(), VmApiError> {
        self.states.lock().unwrap().remove(vm_id);
        Ok(())
    }

    async fn branch(&self, _vm_id: &str) -> Result<String, VmApiError> {
        let id = self.alloc_id();
        self.states.lock().unwrap().insert(id.clone(), VmLifecycleState("Running".to_string()));
        Ok(id)
    }

    async fn commit(&self, _vm_id: &str, _keep_paused: bool) -> Result<String, VmApiError> {
        Ok(format!("commit-{}", self.alloc_id()))
    }

    async fn restore_from_commit(&self, _commit_id: &str) -> Result<String, VmApiError> {
        let id = self.alloc_id();
        self.states.lock().unwrap().insert(id.clone(), VmLifecycleState("Running".to_string()));
        Ok(id)
    }

    async fn update_state(&self, vm_id: &str, state: PowerState) -> Result<(), VmApiError> {
        let label = match state {
            PowerState::Paused => "Paused",
            PowerState::Running => "Running",
        };
        self.states.lock().unwrap().insert(vm_id.to_string(), VmLifecycleState(label.to_string()));
        Ok(())
    }

    async fn get_status(&self, vm_id: &str) -> Result<VmLifecycleState, VmApiError> {
        self.states
            .lock()
            .unwrap()
            .get(vm_id)
            .cloned()
            .ok_or_else(|| VmApiError::Status { status: 404, body: format!("no such vm: {vm_id}") })
    }

    async fn get_ssh_key(&self, _vm_id: &str) -> Result<VmHandle, VmApiError> {
        Ok(VmHandle { ssh_port: 22, ssh_private_key: "fake-key".to_string() })
    }

    async fn evict_key_cache(&self, _vm_id: &str) {}
}

/// Never reaches a real endpoint; swallows every call per the port's
/// best-effort contract.
pub struct NoopRegistry;

#[async_trait]
impl RegistryClient for NoopRegistry {
    async fn post(&self, _entry: RegistryEntry) {}
    async fn delete(&self, _id: &str) {}
    async fn list(&self) -> Vec<RegistryVm> {
        Vec::new()
    }
}
