//! Port abstracting the VM control-plane HTTP API (§4.1), so the Swarm and
//! Lieutenant managers can be exercised against a mock implementation.

use async_trait::async_trait;

use crate::domain::errors::VmApiError;
use crate::domain::models::vm::{PowerState, VmConfig, VmHandle, VmLifecycleState, VmListEntry};

#[async_trait]
pub trait VmApi: Send + Sync {
    async fn list(&self) -> Result<Vec<VmListEntry>, VmApiError>;

    async fn create_root(&self, cfg: VmConfig, wait_boot: bool) -> Result<String, VmApiError>;

    async fn delete(&self, vm_id: &str) -> Result<(), VmApiError>;

    async fn branch(&self, vm_id: &str) -> Result<String, VmApiError>;

    async fn commit(&self, vm_id: &str, keep_paused: bool) -> Result<String, VmApiError>;

    async fn restore_from_commit(&self, commit_id: &str) -> Result<String, VmApiError>;

    async fn update_state(&self, vm_id: &str, state: PowerState) -> Result<(), VmApiError>;

    async fn get_status(&self, vm_id: &str) -> Result<VmLifecycleState, VmApiError>;

    async fn get_ssh_key(&self, vm_id: &str) -> Result<VmHandle, VmApiError>;

    /// Clears the cached SSH key (in-memory and on-disk) for `vm_id`, if
    /// any. Called by both managers' teardown/destroy paths so the key
    /// cache is empty once a VM is gone (§8 Property 5).
    async fn evict_key_cache(&self, vm_id: &str);
}
