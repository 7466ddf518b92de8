//! Swarm Manager (§4.5): batch-spawns ephemeral workers, dispatches tasks,
//! waits on completion, reports aggregate output, tears down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;
use tokio::sync::{watch, Mutex};

use crate::domain::errors::SwarmError;
use crate::domain::models::rpc_message::RpcCommand;
use crate::domain::models::worker::{WorkerRecord, WorkerStatus};
use crate::domain::ports::registry::{RegistryClient, RegistryEntry};
use crate::domain::ports::transport::WorkerTransport;
use crate::domain::ports::vm_api::VmApi;
use crate::infrastructure::rpc::channel::{RpcChannel, StartOptions};
use crate::infrastructure::ssh::SshTransport;
use crate::infrastructure::vm_api::key_cache_path;
use crate::services::event_handler::apply_event;

const READINESS_POLL_ATTEMPTS: u32 = 30;
const READINESS_POLL_INTERVAL_SECS: u64 = 2;
const WAIT_POLL_INTERVAL_SECS: u64 = 2;
const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_READ_TAIL_CHARS: usize = 5000;
const DEFAULT_WAIT_TRUNCATE_CHARS: usize = 500;
const WORKSPACE_DIR: &str = "/root/workspace";

struct SwarmAgent {
    record: Arc<Mutex<WorkerRecord>>,
    transport: Arc<dyn WorkerTransport>,
    vm_id: String,
}

/// Per-agent status line returned by `spawn`.
#[derive(Debug, Clone, Serialize)]
pub struct SpawnResult {
    pub label: String,
    pub vm_id: Option<String>,
    pub status: String,
    pub error: Option<String>,
}

/// Per-agent snapshot returned by `wait`/`status`.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub id: String,
    pub status: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaitReport {
    pub elapsed_secs: f64,
    pub timed_out: bool,
    pub agents: Vec<AgentSummary>,
}

/// Batch-spawns ephemeral workers, dispatches tasks, waits on completion,
/// and tears them all down (§4.5).
pub struct SwarmManager {
    vm_api: Arc<dyn VmApi>,
    ssh: Arc<SshTransport>,
    rpc_config: crate::domain::models::config::RpcConfig,
    worker_binary: String,
    provider_env_var: String,
    registry: Option<Arc<dyn RegistryClient>>,
    agents: Mutex<HashMap<String, Arc<SwarmAgent>>>,
    root_vm_id: Mutex<Option<String>>,
    /// How many trailing characters `wait`'s summary truncates output to
    /// (§8 Open Questions: "clients may make the suffix length configurable").
    pub wait_truncate_chars: usize,
}

impl SwarmManager {
    pub fn new(
        vm_api: Arc<dyn VmApi>,
        ssh: Arc<SshTransport>,
        rpc_config: crate::domain::models::config::RpcConfig,
        worker_binary: impl Into<String>,
        provider_env_var: impl Into<String>,
        registry: Option<Arc<dyn RegistryClient>>,
    ) -> Self {
        Self {
            vm_api,
            ssh,
            rpc_config,
            worker_binary: worker_binary.into(),
            provider_env_var: provider_env_var.into(),
            registry,
            agents: Mutex::new(HashMap::new()),
            root_vm_id: Mutex::new(None),
            wait_truncate_chars: DEFAULT_WAIT_TRUNCATE_CHARS,
        }
    }

    /// Branches `count` workers from `commit_id` (§4.5 step-by-step spawn).
    /// Spawns run sequentially, preserving a stable label-to-index mapping;
    /// individual failures are recorded per-agent, not propagated (§7
    /// "Partial spawn").
    pub async fn spawn(
        &self,
        commit_id: &str,
        count: usize,
        labels: Option<Vec<String>>,
        api_key: &str,
        model: Option<&str>,
    ) -> Vec<SpawnResult> {
        let mut results = Vec::with_capacity(count);
        for i in 0..count {
            let label = labels
                .as_ref()
                .and_then(|l| l.get(i).cloned())
                .unwrap_or_else(|| format!("agent-{}", i + 1));

            let is_first = i == 0 && self.root_vm_id.lock().await.is_none();
            match self.spawn_one(commit_id, &label, api_key, model, is_first).await {
                Ok(vm_id) => results.push(SpawnResult {
                    label,
                    vm_id: Some(vm_id),
                    status: WorkerStatus::Idle.as_str().to_string(),
                    error: None,
                }),
                Err(e) => {
                    tracing::warn!(label = %label, error = %e, "swarm spawn failed");
                    results.push(SpawnResult {
                        label,
                        vm_id: None,
                        status: WorkerStatus::Error.as_str().to_string(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        results
    }

    async fn spawn_one(
        &self,
        commit_id: &str,
        label: &str,
        api_key: &str,
        model: Option<&str>,
        is_first: bool,
    ) -> anyhow::Result<String> {
        let vm_id = self.vm_api.restore_from_commit(commit_id).await?;
        if is_first {
            *self.root_vm_id.lock().await = Some(vm_id.clone());
        }
        let root_vm_id = self.root_vm_id.lock().await.clone().unwrap_or_else(|| vm_id.clone());

        // Materialize the ssh key to disk (the client caches it at a
        // deterministic path, §4.1) and poll for SSH readiness.
        self.vm_api.get_ssh_key(&vm_id).await?;
        let key_path = key_cache_path(&vm_id);

        let mut ready = false;
        for _ in 0..READINESS_POLL_ATTEMPTS {
            if let Ok(out) = self.ssh.exec_oneshot(&key_path, &vm_id, "echo ready").await {
                if out.exit_code == 0 && String::from_utf8_lossy(&out.stdout).trim() == "ready" {
                    ready = true;
                    break;
                }
            }
            tokio::time::sleep(Duration::from_secs(READINESS_POLL_INTERVAL_SECS)).await;
        }
        if !ready {
            let _ = self.vm_api.delete(&vm_id).await;
            anyhow::bail!("vm {vm_id} did not become ssh-reachable");
        }

        let identity = json!({
            "vmId": vm_id,
            "agentId": label,
            "rootVmId": root_vm_id,
            "parentVmId": "local",
            "depth": 0,
            "maxDepth": 1,
            "maxVms": 1,
            "createdAt": chrono::Utc::now().to_rfc3339(),
        });
        let write_identity = format!("cat > {WORKSPACE_DIR}/identity.json");
        let _ = self
            .ssh
            .exec_oneshot_with_stdin(&key_path, &vm_id, &write_identity, Some(identity.to_string().as_bytes()))
            .await;

        if is_first {
            let init_cmd = format!("mkdir -p {WORKSPACE_DIR}/.vers-status && touch {WORKSPACE_DIR}/.vers-status/registry.json");
            let _ = self.ssh.exec_oneshot(&key_path, &vm_id, &init_cmd).await;
        }

        let opts = StartOptions {
            provider_env_var: self.provider_env_var.clone(),
            provider_api_key: api_key.to_string(),
            extra_env: Vec::new(),
        };
        let channel = RpcChannel::start_rpc_agent(
            &vm_id,
            self.ssh.clone(),
            key_path,
            self.rpc_config.clone(),
            &self.worker_binary,
            &opts,
        )
        .await
        .map_err(|e| {
            anyhow::anyhow!("rpc channel start failed: {e}")
        })?;
        let transport: Arc<dyn WorkerTransport> = Arc::new(channel);

        if let Some(model_id) = model {
            transport
                .send(RpcCommand::SetModel {
                    provider: self.provider_env_var.clone(),
                    model_id: model_id.to_string(),
                })
                .await;
        }

        let mut record = WorkerRecord::new(label, &vm_id, false, "");
        record.status = WorkerStatus::Idle;
        let record = Arc::new(Mutex::new(record));

        {
            let record = record.clone();
            transport
                .on_event(Arc::new(move |event| {
                    let record = record.clone();
                    let raw = serde_json::to_string(&event).unwrap_or_default();
                    tokio::spawn(async move {
                        let mut record = record.lock().await;
                        apply_event(&mut record, &event, &raw, true);
                    });
                }))
                .await;
        }

        if let Some(registry) = &self.registry {
            registry
                .post(RegistryEntry {
                    id: vm_id.clone(),
                    name: label.to_string(),
                    role: "swarm".to_string(),
                    address: vm_id.clone(),
                    registered_by: "vers-fleet-swarm".to_string(),
                    metadata: None,
                })
                .await;
        }

        self.agents.lock().await.insert(
            label.to_string(),
            Arc::new(SwarmAgent { record, transport, vm_id: vm_id.clone() }),
        );

        Ok(vm_id)
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Arc<SwarmAgent>, SwarmError> {
        self.agents
            .lock()
            .await
            .get(agent_id)
            .cloned()
            .ok_or_else(|| SwarmError::UnknownAgent(agent_id.to_string()))
    }

    /// Dispatch a task to an idle (or any) agent (§4.5 `sendTask`).
    pub async fn send_task(&self, agent_id: &str, task: &str) -> Result<(), SwarmError> {
        let agent = self.get_agent(agent_id).await?;
        {
            let mut record = agent.record.lock().await;
            record.status = WorkerStatus::Working;
            record.last_output.clear();
            record.task = Some(task.to_string());
            record.task_count += 1;
            record.touch();
        }
        agent.transport.send(RpcCommand::Prompt { message: task.to_string() }).await;
        Ok(())
    }

    /// Poll until every target agent reaches a terminal status, the
    /// timeout elapses, or `cancel` fires (§4.5 `wait`).
    pub async fn wait(
        &self,
        agent_ids: Option<Vec<String>>,
        timeout_secs: Option<u64>,
        mut cancel: Option<watch::Receiver<bool>>,
    ) -> WaitReport {
        let targets = match agent_ids {
            Some(ids) => ids,
            None => self.agents.lock().await.keys().cloned().collect(),
        };
        let timeout = Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_WAIT_TIMEOUT_SECS));
        let start = Instant::now();
        let mut interval = tokio::time::interval(Duration::from_secs(WAIT_POLL_INTERVAL_SECS));

        loop {
            if self.all_terminal(&targets).await {
                break;
            }
            if start.elapsed() >= timeout {
                break;
            }

            let cancelled = match &mut cancel {
                Some(rx) => tokio::select! {
                    _ = interval.tick() => false,
                    changed = rx.changed() => changed.is_ok() && *rx.borrow(),
                },
                None => {
                    interval.tick().await;
                    false
                }
            };
            if cancelled {
                break;
            }
        }

        let timed_out = self.any_working(&targets).await;
        let agents = self.summarize(&targets, self.wait_truncate_chars).await;
        WaitReport { elapsed_secs: start.elapsed().as_secs_f64(), timed_out, agents }
    }

    async fn all_terminal(&self, ids: &[String]) -> bool {
        let agents = self.agents.lock().await;
        for id in ids {
            match agents.get(id) {
                Some(agent) => {
                    if !agent.record.lock().await.status.is_wait_terminal() {
                        return false;
                    }
                }
                None => continue, // unknown counts as done (§4.5 "wait")
            }
        }
        true
    }

    async fn any_working(&self, ids: &[String]) -> bool {
        let agents = self.agents.lock().await;
        for id in ids {
            if let Some(agent) = agents.get(id) {
                if agent.record.lock().await.status == WorkerStatus::Working {
                    return true;
                }
            }
        }
        false
    }

    async fn summarize(&self, ids: &[String], truncate_chars: usize) -> Vec<AgentSummary> {
        let agents = self.agents.lock().await;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(agent) = agents.get(id) {
                let record = agent.record.lock().await;
                out.push(AgentSummary {
                    id: id.clone(),
                    status: record.status.as_str().to_string(),
                    output: truncate_tail(&record.last_output, truncate_chars),
                });
            }
        }
        out
    }

    /// Read an agent's accumulated output (§4.5 `read`). `tail = None`
    /// defaults to 5000 characters; `tail = Some(0)` returns the full output.
    pub async fn read(&self, agent_id: &str, tail: Option<usize>) -> Result<String, SwarmError> {
        let agent = self.get_agent(agent_id).await?;
        let record = agent.record.lock().await;
        Ok(truncate_tail(&record.last_output, tail.unwrap_or(DEFAULT_READ_TAIL_CHARS)))
    }

    /// Per-agent status summary (§4.5 `status`).
    pub async fn status(&self) -> Vec<AgentSummary> {
        let agents = self.agents.lock().await;
        let mut out = Vec::with_capacity(agents.len());
        for (id, agent) in agents.iter() {
            let record = agent.record.lock().await;
            out.push(AgentSummary {
                id: id.clone(),
                status: record.status.as_str().to_string(),
                output: record.last_output.clone(),
            });
        }
        out
    }

    /// Kill every channel, deregister, delete every VM, and clear all state
    /// (§4.5 `teardown`). Returns per-VM deletion failures; never fails itself.
    pub async fn teardown(&self) -> Vec<String> {
        let mut failures = Vec::new();
        let agents = std::mem::take(&mut *self.agents.lock().await);

        for (label, agent) in agents {
            agent.transport.kill().await;
            if let Some(registry) = &self.registry {
                registry.delete(&agent.vm_id).await;
            }
            if let Err(e) = self.vm_api.delete(&agent.vm_id).await {
                failures.push(format!("{label} ({}): {e}", agent.vm_id));
            }
            self.vm_api.evict_key_cache(&agent.vm_id).await;
        }

        *self.root_vm_id.lock().await = None;
        failures
    }
}

/// Truncates `s` to its last `tail_len` characters, annotating with the
/// `[...N chars truncated...]` marker the source's `wait` summary uses
/// (§4.5, §8 Open Questions). `tail_len = 0` returns `s` unchanged.
fn truncate_tail(s: &str, tail_len: usize) -> String {
    if tail_len == 0 {
        return s.to_string();
    }
    let total = s.chars().count();
    if total <= tail_len {
        return s.to_string();
    }
    let dropped = total - tail_len;
    let suffix: String = s.chars().skip(dropped).collect();
    format!("[...{dropped} chars truncated...]{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_tail_passes_short_strings_through() {
        assert_eq!(truncate_tail("hello", 500), "hello");
    }

    #[test]
    fn truncate_tail_annotates_long_strings() {
        let s = "a".repeat(600);
        let out = truncate_tail(&s, 500);
        assert!(out.starts_with("[...100 chars truncated...]"));
        assert_eq!(out.len() - "[...100 chars truncated...]".len(), 500);
    }

    #[test]
    fn truncate_tail_zero_means_full() {
        let s = "a".repeat(600);
        assert_eq!(truncate_tail(&s, 0), s);
    }
}
