//! Lieutenant Manager (§4.6): persistent, named, multi-turn workers with
//! mode-arbitrated messaging, pause/resume, atomic persistence, and
//! cross-session reconnection.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::domain::errors::LieutenantError;
use crate::domain::models::config::RpcConfig;
use crate::domain::models::vm::PowerState;
use crate::domain::models::worker::{local_vm_id, WorkerRecord, WorkerStatus};
use crate::domain::ports::registry::{RegistryClient, RegistryEntry};
use crate::domain::ports::transport::WorkerTransport;
use crate::domain::ports::vm_api::VmApi;
use crate::infrastructure::persistence::snapshot::{self, LieutenantSnapshot, LieutenantSnapshotEntry};
use crate::infrastructure::rpc::channel::{RpcChannel, StartOptions};
use crate::infrastructure::rpc::local::LocalTransport;
use crate::infrastructure::ssh::SshTransport;
use crate::infrastructure::vm_api::key_cache_path;
use crate::services::event_handler::apply_event;
use crate::services::send_mode::{decide_send_mode, SendMode};

const RESUME_POLL_ATTEMPTS: u32 = 15;
const RESUME_POLL_INTERVAL_SECS: u64 = 2;
const CREATE_POLL_ATTEMPTS: u32 = 30;
const CREATE_POLL_INTERVAL_SECS: u64 = 2;
const WORKSPACE_DIR: &str = "/root/workspace";
const SYSTEM_PROMPT_FILE: &str = "SYSTEM_PROMPT.md";
const REGISTRY_ROLE: &str = "lieutenant";
const REGISTERED_BY: &str = "vers-lieutenant";

struct LieutenantEntry {
    record: Arc<Mutex<WorkerRecord>>,
    /// `None` for a lieutenant reconstructed at start-up while its VM was
    /// paused: no RPC channel is attached until `resume` runs (§4.6).
    transport: Mutex<Option<Arc<dyn WorkerTransport>>>,
    commit_id: Mutex<Option<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LieutenantView {
    pub name: String,
    pub role: String,
    pub is_local: bool,
    pub status: String,
    pub task_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    /// Present when a `prompt` was silently downgraded to `followUp`
    /// because the lieutenant was already working (§4.6 table).
    pub note: Option<String>,
}

/// Persistent, named, multi-turn workers (§4.6).
pub struct LieutenantManager {
    vm_api: Arc<dyn VmApi>,
    ssh: Arc<SshTransport>,
    rpc_config: RpcConfig,
    worker_binary: String,
    local_worker_binary: String,
    local_session_root: PathBuf,
    provider_env_var: String,
    registry: Option<Arc<dyn RegistryClient>>,
    state_file: PathBuf,
    lieutenants: Mutex<HashMap<String, Arc<LieutenantEntry>>>,
}

impl LieutenantManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vm_api: Arc<dyn VmApi>,
        ssh: Arc<SshTransport>,
        rpc_config: RpcConfig,
        worker_binary: impl Into<String>,
        local_worker_binary: impl Into<String>,
        local_session_root: PathBuf,
        provider_env_var: impl Into<String>,
        registry: Option<Arc<dyn RegistryClient>>,
        state_file: PathBuf,
    ) -> Self {
        Self {
            vm_api,
            ssh,
            rpc_config,
            worker_binary: worker_binary.into(),
            local_worker_binary: local_worker_binary.into(),
            local_session_root,
            provider_env_var: provider_env_var.into(),
            registry,
            state_file,
            lieutenants: Mutex::new(HashMap::new()),
        }
    }

    fn build_system_prompt(name: &str, role: &str) -> String {
        format!(
            "You are {name}, a persistent lieutenant in an agent fleet.\n\
             Role: {role}\n\
             Respond to prompt/steer/follow-up messages from your orchestrator."
        )
    }

    /// §4.6 `create`: reject duplicates, bootstrap the worker (local child
    /// process or remote VM), run the readiness handshake, persist.
    pub async fn create(
        &self,
        name: &str,
        role: &str,
        commit_id: Option<&str>,
        api_key: &str,
        model: Option<&str>,
        local: bool,
    ) -> Result<(), LieutenantError> {
        if self.lieutenants.lock().await.contains_key(name) {
            return Err(LieutenantError::DuplicateName(name.to_string()));
        }

        let system_prompt = Self::build_system_prompt(name, role);

        let (record, transport): (WorkerRecord, Arc<dyn WorkerTransport>) = if local {
            let session_dir = self.local_session_root.join(name);
            tokio::fs::create_dir_all(&session_dir)
                .await
                .map_err(|e| LieutenantError::OperationFailed(name.to_string(), format!("session dir: {e}")))?;
            let prompt_path = session_dir.join("system_prompt.txt");
            tokio::fs::write(&prompt_path, &system_prompt)
                .await
                .map_err(|e| LieutenantError::OperationFailed(name.to_string(), format!("write prompt: {e}")))?;

            let transport = LocalTransport::spawn(&self.local_worker_binary, &session_dir, Some(&prompt_path), model)
                .await
                .map_err(|e| LieutenantError::OperationFailed(name.to_string(), e.to_string()))?;

            let mut record = WorkerRecord::new(name, local_vm_id(name), true, role);
            record.status = WorkerStatus::Idle;
            (record, Arc::new(transport))
        } else {
            let commit_id = commit_id.ok_or_else(|| LieutenantError::LocalUnsupported("commit_id required for remote lieutenants"))?;
            let vm_id = self
                .vm_api
                .restore_from_commit(commit_id)
                .await
                .map_err(|e| LieutenantError::OperationFailed(name.to_string(), e.to_string()))?;

            if let Err(e) = self.bootstrap_remote(&vm_id, &system_prompt, api_key, model).await {
                let _ = self.vm_api.delete(&vm_id).await;
                return Err(LieutenantError::OperationFailed(name.to_string(), e.to_string()));
            }

            let key_path = key_cache_path(&vm_id);
            let opts = StartOptions {
                provider_env_var: self.provider_env_var.clone(),
                provider_api_key: api_key.to_string(),
                extra_env: Vec::new(),
            };
            let channel = RpcChannel::start_rpc_agent(&vm_id, self.ssh.clone(), key_path, self.rpc_config.clone(), &self.worker_binary, &opts)
                .await
                .map_err(|e| LieutenantError::OperationFailed(name.to_string(), e.to_string()));
            let channel = match channel {
                Ok(c) => c,
                Err(e) => {
                    let _ = self.vm_api.delete(&vm_id).await;
                    return Err(e);
                }
            };
            let transport: Arc<dyn WorkerTransport> = Arc::new(channel);

            if let Some(model_id) = model {
                transport
                    .send(crate::domain::models::rpc_message::RpcCommand::SetModel {
                        provider: self.provider_env_var.clone(),
                        model_id: model_id.to_string(),
                    })
                    .await;
            }

            let mut record = WorkerRecord::new(name, vm_id, false, role);
            record.status = WorkerStatus::Idle;
            (record, transport)
        };

        let record = Arc::new(Mutex::new(record));
        self.install_handler(&record, &transport).await;

        if let Some(registry) = &self.registry {
            let record_guard = record.lock().await;
            registry
                .post(RegistryEntry {
                    id: record_guard.vm_id.clone(),
                    name: name.to_string(),
                    role: role.to_string(),
                    address: record_guard.vm_id.clone(),
                    registered_by: REGISTERED_BY.to_string(),
                    metadata: None,
                })
                .await;
        }

        self.lieutenants.lock().await.insert(
            name.to_string(),
            Arc::new(LieutenantEntry {
                record,
                transport: Mutex::new(Some(transport)),
                commit_id: Mutex::new(commit_id.map(str::to_string)),
            }),
        );

        self.persist().await;
        Ok(())
    }

    async fn bootstrap_remote(&self, vm_id: &str, system_prompt: &str, _api_key: &str, _model: Option<&str>) -> anyhow::Result<()> {
        self.vm_api.get_ssh_key(vm_id).await?;
        let key_path = key_cache_path(vm_id);

        let mut ready = false;
        for _ in 0..CREATE_POLL_ATTEMPTS {
            if let Ok(out) = self.ssh.exec_oneshot(&key_path, vm_id, "echo ready").await {
                if out.exit_code == 0 && String::from_utf8_lossy(&out.stdout).trim() == "ready" {
                    ready = true;
                    break;
                }
            }
            tokio::time::sleep(Duration::from_secs(CREATE_POLL_INTERVAL_SECS)).await;
        }
        if !ready {
            anyhow::bail!("vm {vm_id} did not become ssh-reachable");
        }

        let write_cmd = format!("mkdir -p {WORKSPACE_DIR} && cat > {WORKSPACE_DIR}/{SYSTEM_PROMPT_FILE}");
        self.ssh
            .exec_oneshot_with_stdin(&key_path, vm_id, &write_cmd, Some(system_prompt.as_bytes()))
            .await?;
        Ok(())
    }

    async fn install_handler(&self, record: &Arc<Mutex<WorkerRecord>>, transport: &Arc<dyn WorkerTransport>) {
        let record = record.clone();
        transport
            .on_event(Arc::new(move |event| {
                let record = record.clone();
                let raw = serde_json::to_string(&event).unwrap_or_default();
                tokio::spawn(async move {
                    let mut record = record.lock().await;
                    apply_event(&mut record, &event, &raw, false);
                });
            }))
            .await;
    }

    async fn get_entry(&self, name: &str) -> Result<Arc<LieutenantEntry>, LieutenantError> {
        self.lieutenants
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| LieutenantError::UnknownName(name.to_string()))
    }

    /// §4.6 `send`: arbitrate mode via `decide_send_mode`, dispatch, persist.
    pub async fn send(&self, name: &str, message: &str, mode: Option<SendMode>) -> Result<SendOutcome, LieutenantError> {
        let entry = self.get_entry(name).await?;
        let current_status = entry.record.lock().await.status;

        let effective = decide_send_mode(current_status, mode.unwrap_or_default(), message.to_string()).map_err(|e| match e {
            LieutenantError::Paused(_) => LieutenantError::Paused(name.to_string()),
            LieutenantError::NotReady(_, status) => LieutenantError::NotReady(name.to_string(), status),
            other => other,
        })?;

        {
            let mut record = entry.record.lock().await;
            if effective.increment_task_count {
                record.task_count += 1;
            }
            if effective.clear_last_output {
                record.last_output.clear();
            }
            record.task = Some(message.to_string());
            record.status = WorkerStatus::Working;
            record.touch();
        }

        if let Some(transport) = entry.transport.lock().await.as_ref() {
            transport.send(effective.command).await;
        }

        self.persist().await;

        Ok(SendOutcome {
            note: effective
                .auto_downgraded
                .then(|| format!("{name} was already working; message auto-queued as follow-up")),
        })
    }

    /// §4.6 `pause`: reject if local or working; otherwise transition the
    /// VM to `Paused` and disconnect the tail (no events can arrive).
    pub async fn pause(&self, name: &str) -> Result<String, LieutenantError> {
        let entry = self.get_entry(name).await?;
        let vm_id = {
            let record = entry.record.lock().await;
            if record.is_local {
                return Err(LieutenantError::LocalUnsupported("pause"));
            }
            if record.status == WorkerStatus::Paused {
                return Ok(format!("{name} is already paused"));
            }
            if record.status == WorkerStatus::Working {
                return Err(LieutenantError::StillWorking(name.to_string()));
            }
            record.vm_id.clone()
        };

        self.vm_api
            .update_state(&vm_id, PowerState::Paused)
            .await
            .map_err(|e| LieutenantError::OperationFailed(name.to_string(), e.to_string()))?;

        let mut record = entry.record.lock().await;
        record.status = WorkerStatus::Paused;
        record.touch();
        drop(record);
        self.persist().await;
        Ok(format!("{name} paused"))
    }

    /// §4.6 `resume`: reject if local or not paused; transition the VM to
    /// `Running`, poll for the `pi-rpc` session, then reconnect the tail.
    pub async fn resume(&self, name: &str) -> Result<(), LieutenantError> {
        let entry = self.get_entry(name).await?;
        let vm_id = {
            let record = entry.record.lock().await;
            if record.is_local {
                return Err(LieutenantError::LocalUnsupported("resume"));
            }
            if record.status != WorkerStatus::Paused {
                return Err(LieutenantError::NotReady(name.to_string(), record.status.as_str()));
            }
            record.vm_id.clone()
        };

        self.vm_api
            .update_state(&vm_id, PowerState::Running)
            .await
            .map_err(|e| LieutenantError::OperationFailed(name.to_string(), e.to_string()))?;

        let key_path = key_cache_path(&vm_id);
        let mut session_present = false;
        for _ in 0..RESUME_POLL_ATTEMPTS {
            let check = self.ssh.exec_oneshot(&key_path, &vm_id, "tmux has-session -t pi-rpc 2>/dev/null").await;
            if matches!(check, Ok(out) if out.exit_code == 0) {
                session_present = true;
                break;
            }
            tokio::time::sleep(Duration::from_secs(RESUME_POLL_INTERVAL_SECS)).await;
        }

        if !session_present {
            entry.record.lock().await.status = WorkerStatus::Error;
            self.persist().await;
            return Err(LieutenantError::ResumeVerificationFailed(name.to_string()));
        }

        let mut transport_guard = entry.transport.lock().await;
        match transport_guard.as_ref() {
            Some(transport) => {
                transport
                    .reconnect_tail()
                    .await
                    .map_err(|e| LieutenantError::OperationFailed(name.to_string(), e.to_string()))?;
            }
            None => {
                let channel = RpcChannel::reconnect_rpc_agent(&vm_id, self.ssh.clone(), key_path, self.rpc_config.clone())
                    .await
                    .map_err(|e| LieutenantError::OperationFailed(name.to_string(), e.to_string()))?;
                let transport: Arc<dyn WorkerTransport> = Arc::new(channel);
                self.install_handler(&entry.record, &transport).await;
                *transport_guard = Some(transport);
            }
        }
        drop(transport_guard);

        entry.record.lock().await.status = WorkerStatus::Idle;
        self.persist().await;
        Ok(())
    }

    /// §4.6 `destroy`: `"*"` targets every lieutenant. Remote workers that
    /// are paused are resumed first so deletion succeeds.
    pub async fn destroy(&self, name_or_wildcard: &str) -> Vec<(String, Result<(), String>)> {
        let targets: Vec<String> = if name_or_wildcard == "*" {
            self.lieutenants.lock().await.keys().cloned().collect()
        } else {
            vec![name_or_wildcard.to_string()]
        };

        let mut results = Vec::with_capacity(targets.len());
        for name in targets {
            let outcome = self.destroy_one(&name).await;
            results.push((name, outcome));
        }
        self.persist().await;
        results
    }

    async fn destroy_one(&self, name: &str) -> Result<(), String> {
        let entry = match self.lieutenants.lock().await.remove(name) {
            Some(e) => e,
            None => return Err(format!("unknown lieutenant: {name}")),
        };

        let (is_local, vm_id, was_paused) = {
            let record = entry.record.lock().await;
            (record.is_local, record.vm_id.clone(), record.status == WorkerStatus::Paused)
        };

        if let Some(transport) = entry.transport.lock().await.as_ref() {
            transport.kill().await;
        }

        if is_local {
            return Ok(());
        }

        if was_paused {
            let _ = self.vm_api.update_state(&vm_id, PowerState::Running).await;
        }

        if let Some(registry) = &self.registry {
            registry.delete(&vm_id).await;
        }

        let result = self.vm_api.delete(&vm_id).await.map_err(|e| e.to_string());
        self.vm_api.evict_key_cache(&vm_id).await;
        result
    }

    pub async fn list(&self) -> Vec<LieutenantView> {
        let lieutenants = self.lieutenants.lock().await;
        let mut out = Vec::with_capacity(lieutenants.len());
        for entry in lieutenants.values() {
            let record = entry.record.lock().await;
            out.push(LieutenantView {
                name: record.name.clone(),
                role: record.role.clone(),
                is_local: record.is_local,
                status: record.status.as_str().to_string(),
                task_count: record.task_count,
                created_at: record.created_at,
                last_activity_at: record.last_activity_at,
            });
        }
        out
    }

    /// Writes the current lieutenant set to `<home>/.pi/lieutenants.json`
    /// (§4.7), atomically. Local lieutenants are included for observability
    /// but pruned again on the next start-up (§9 "Local-lieutenant limits").
    async fn persist(&self) {
        let lieutenants = self.lieutenants.lock().await;
        let mut entries = Vec::with_capacity(lieutenants.len());
        for entry in lieutenants.values() {
            entries.push(LieutenantSnapshotEntry::from(&*entry.record.lock().await));
        }
        drop(lieutenants);

        let snapshot = LieutenantSnapshot { lieutenants: entries, saved_at: Utc::now() };
        if let Err(e) = snapshot::save_atomic(&self.state_file, &snapshot) {
            tracing::warn!(error = %e, "failed to persist lieutenant snapshot");
        }
    }

    /// §4.6 "Start-up reconnection": load the snapshot, drop local entries
    /// and dead VMs, reconnect paused/running remote lieutenants, and
    /// re-persist the pruned result.
    pub async fn reconnect_from_disk(&self) -> anyhow::Result<()> {
        let snapshot = snapshot::load(&self.state_file)?;
        for entry in snapshot.lieutenants {
            if entry.is_local {
                continue; // local lieutenants do not survive a restart (§9)
            }
            self.reconnect_one(&entry.vm_id, &entry.name, &entry.role, entry.task_count, entry.created_at)
                .await;
        }
        self.persist().await;
        Ok(())
    }

    /// Reconnects (or drops) a single remote lieutenant by querying its
    /// current VM state, shared by start-up reconnection and `discover`.
    async fn reconnect_one(&self, vm_id: &str, name: &str, role: &str, task_count: u32, created_at: DateTime<Utc>) {
        if self.lieutenants.lock().await.contains_key(name) {
            return; // already tracked locally
        }

        let state = match self.vm_api.get_status(vm_id).await {
            Ok(state) => state,
            Err(_) => return, // VM no longer exists: drop the entry (§8 property 7)
        };

        let mut record = WorkerRecord::new(name, vm_id, false, role);
        record.task_count = task_count;
        record.created_at = created_at;

        if state.is_paused() {
            record.status = WorkerStatus::Paused;
            self.lieutenants.lock().await.insert(
                name.to_string(),
                Arc::new(LieutenantEntry {
                    record: Arc::new(Mutex::new(record)),
                    transport: Mutex::new(None),
                    commit_id: Mutex::new(None),
                }),
            );
            return;
        }

        if !state.is_running() {
            tracing::info!(vm_id, state = %state, "lieutenant vm in unreconnectable state, skipping");
            return;
        }

        let key_path = key_cache_path(vm_id);
        match RpcChannel::reconnect_rpc_agent(vm_id, self.ssh.clone(), key_path, self.rpc_config.clone()).await {
            Ok(channel) => {
                record.status = WorkerStatus::Idle;
                let record = Arc::new(Mutex::new(record));
                let transport: Arc<dyn WorkerTransport> = Arc::new(channel);
                self.install_handler(&record, &transport).await;
                self.lieutenants.lock().await.insert(
                    name.to_string(),
                    Arc::new(LieutenantEntry {
                        record,
                        transport: Mutex::new(Some(transport)),
                        commit_id: Mutex::new(None),
                    }),
                );
            }
            Err(e) => {
                tracing::warn!(vm_id, error = %e, "failed to reconnect lieutenant rpc channel");
            }
        }
    }

    /// §4.6/§4.7 `discover`: fetch the external registry, filter to entries
    /// registered as lieutenants, and reconnect any not already tracked.
    pub async fn discover(&self) {
        let Some(registry) = &self.registry else { return };
        for vm in registry.list().await {
            let registered_by = vm.registered_by.as_deref().unwrap_or_default();
            let role = vm.role.as_deref().unwrap_or_default();
            if registered_by != REGISTERED_BY || role != REGISTRY_ROLE {
                continue;
            }
            let name = vm.name.clone().unwrap_or_else(|| vm.id.clone());
            self.reconnect_one(&vm.id, &name, role, 0, Utc::now()).await;
        }
        self.persist().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_system_prompt_embeds_name_and_role() {
        let prompt = LieutenantManager::build_system_prompt("infra", "own the deploy pipeline");
        assert!(prompt.contains("infra"));
        assert!(prompt.contains("own the deploy pipeline"));
    }
}
