//! THE CORE: a bidirectional JSON-line channel to a worker on a remote VM,
//! surviving orchestrator-side disconnects without losing events (§4.3).

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::domain::errors::RpcError;
use crate::domain::models::config::RpcConfig;
use crate::domain::models::rpc_message::{RpcCommand, WorkerEvent};
use crate::domain::ports::transport::{EventHandler, WorkerTransport};
use crate::infrastructure::ssh::SshTransport;

const REMOTE_DIR: &str = "/tmp/pi-rpc";
const KEEPER_SESSION: &str = "pi-keeper";
const WORKER_SESSION: &str = "pi-rpc";
const WORKSPACE_DIR: &str = "/root/workspace";
const TAIL_RECONNECT_DELAY_SECS: u64 = 3;
const READINESS_INTERVAL_SECS: u64 = 3;

/// Options forwarded to the remote worker process at install time.
pub struct StartOptions {
    pub provider_env_var: String,
    pub provider_api_key: String,
    pub extra_env: Vec<(String, String)>,
}

struct ChannelState {
    killed: AtomicBool,
    lines_processed: AtomicU64,
    event_handler: Mutex<Option<EventHandler>>,
    tail_task: Mutex<Option<JoinHandle<()>>>,
    tail_cancel: watch::Sender<bool>,
}

/// Owns the remote FIFO/tmux scaffolding and the inbound tail / outbound
/// send paths for one worker VM.
pub struct RpcChannel {
    vm_id: String,
    ssh: Arc<SshTransport>,
    key_path: PathBuf,
    cfg: RpcConfig,
    state: Arc<ChannelState>,
}

impl RpcChannel {
    /// Installs the remote FIFO/keeper/daemon scaffolding (§4.3, steps 1-4),
    /// then performs the readiness handshake.
    pub async fn start_rpc_agent(
        vm_id: &str,
        ssh: Arc<SshTransport>,
        key_path: PathBuf,
        cfg: RpcConfig,
        worker_binary: &str,
        opts: &StartOptions,
    ) -> Result<Self, RpcError> {
        let install_cmd = Self::install_command(worker_binary, opts);
        ssh.exec_oneshot(&key_path, vm_id, &install_cmd)
            .await
            .map_err(|e| RpcError::WorkerStartFailed(e.to_string()))?;

        let verify_cmd = format!(
            "tmux has-session -t {KEEPER_SESSION} 2>/dev/null && tmux has-session -t {WORKER_SESSION} 2>/dev/null"
        );
        let verify = ssh
            .exec_oneshot(&key_path, vm_id, &verify_cmd)
            .await
            .map_err(|e| RpcError::WorkerStartFailed(e.to_string()))?;
        if verify.exit_code != 0 {
            return Err(RpcError::WorkerStartFailed(
                "tmux sessions pi-keeper/pi-rpc not present after install".to_string(),
            ));
        }

        let channel = Self::new(vm_id.to_string(), ssh, key_path, cfg);
        channel.spawn_tail(1).await;
        channel.handshake().await?;
        Ok(channel)
    }

    /// Skips install; verifies the `pi-rpc` session, attaches `tail -f -n 0`
    /// (new lines only), then confirms liveness via the handshake (§4.3
    /// "Reconnection-only variant").
    pub async fn reconnect_rpc_agent(
        vm_id: &str,
        ssh: Arc<SshTransport>,
        key_path: PathBuf,
        cfg: RpcConfig,
    ) -> Result<Self, RpcError> {
        let verify_cmd = format!("tmux has-session -t {WORKER_SESSION} 2>/dev/null");
        let verify = ssh
            .exec_oneshot(&key_path, vm_id, &verify_cmd)
            .await
            .map_err(|e| RpcError::WorkerStartFailed(e.to_string()))?;
        if verify.exit_code != 0 {
            return Err(RpcError::WorkerStartFailed(
                "tmux session pi-rpc missing on reconnect".to_string(),
            ));
        }

        let channel = Self::new(vm_id.to_string(), ssh, key_path, cfg);
        // "new lines only" on reconnect: lines_processed is seeded to the
        // out-file's current absolute line count (construction of a fresh
        // channel instance, the one point §9 allows this), so a later
        // drop-reconnect inside tail_loop resumes from the right absolute
        // offset instead of replaying from near the start of the file.
        channel.spawn_tail_from_now().await;
        channel.handshake().await?;
        Ok(channel)
    }

    fn new(vm_id: String, ssh: Arc<SshTransport>, key_path: PathBuf, cfg: RpcConfig) -> Self {
        let (tail_cancel, _) = watch::channel(false);
        Self {
            vm_id,
            ssh,
            key_path,
            cfg,
            state: Arc::new(ChannelState {
                killed: AtomicBool::new(false),
                lines_processed: AtomicU64::new(0),
                event_handler: Mutex::new(None),
                tail_task: Mutex::new(None),
                tail_cancel,
            }),
        }
    }

    fn install_command(worker_binary: &str, opts: &StartOptions) -> String {
        let mut env_exports = format!("{}={}", opts.provider_env_var, opts.provider_api_key);
        for (k, v) in &opts.extra_env {
            env_exports.push_str(&format!(" {k}={v}"));
        }
        format!(
            "mkdir -p {REMOTE_DIR} && [ -p {REMOTE_DIR}/in ] || mkfifo {REMOTE_DIR}/in && \
             touch {REMOTE_DIR}/out {REMOTE_DIR}/err && \
             tmux new-session -d -s {KEEPER_SESSION} \"sleep infinity > {REMOTE_DIR}/in\" && \
             tmux new-session -d -s {WORKER_SESSION} -c {WORKSPACE_DIR} \
             \"{env_exports} {worker_binary} --mode rpc < {REMOTE_DIR}/in >> {REMOTE_DIR}/out 2>> {REMOTE_DIR}/err\""
        )
    }

    /// `-n +<K>` (1-based) per §4.3's tail formula.
    async fn spawn_tail(&self, from_line: u64) {
        self.state.lines_processed.store(from_line.saturating_sub(1), Ordering::SeqCst);
        self.spawn_tail_inner(from_line).await;
    }

    /// `-n 0`, i.e. new lines only (used on reconnect). `lines_processed` is
    /// seeded to the out-file's current absolute line count, not 0 — it is
    /// the sole coordination variable a later drop-reconnect uses to resume
    /// `tail -f -n +<K>` against the same absolute file (§9
    /// "tail-reconnect idempotence"). Seeding it to 0 here would make that
    /// later resume re-read from near the start of the file.
    async fn spawn_tail_from_now(&self) {
        let current = self.remote_out_line_count().await;
        self.state.lines_processed.store(current, Ordering::SeqCst);
        self.spawn_tail_inner_skip_existing().await;
    }

    /// Counts the lines already in `<REMOTE_DIR>/out` via `wc -l`, so a
    /// skip-existing tail attach can anchor `lines_processed` to the file's
    /// absolute offset instead of 0. Defaults to 0 if the probe fails (a
    /// fresh/missing file has no lines to skip).
    async fn remote_out_line_count(&self) -> u64 {
        let cmd = format!("wc -l < {REMOTE_DIR}/out 2>/dev/null");
        match self.ssh.exec_oneshot(&self.key_path, &self.vm_id, &cmd).await {
            Ok(out) if out.exit_code == 0 => String::from_utf8_lossy(&out.stdout).trim().parse().unwrap_or(0),
            _ => 0,
        }
    }

    async fn spawn_tail_inner(&self, from_line: u64) {
        self.spawn_tail_cmd(format!("tail -f -n +{from_line} {REMOTE_DIR}/out")).await;
    }

    async fn spawn_tail_inner_skip_existing(&self) {
        self.spawn_tail_cmd(format!("tail -f -n 0 {REMOTE_DIR}/out")).await;
    }

    async fn spawn_tail_cmd(&self, remote_cmd: String) {
        let ssh = self.ssh.clone();
        let key_path = self.key_path.clone();
        let vm_id = self.vm_id.clone();
        let state = self.state.clone();
        let cancel_rx = state.tail_cancel.subscribe();

        let handle = tokio::spawn(async move {
            tail_loop(ssh, key_path, vm_id, remote_cmd, state, cancel_rx).await;
        });

        *self.state.tail_task.lock().await = Some(handle);
    }

    async fn handshake(&self) -> Result<(), RpcError> {
        let ready = Arc::new(tokio::sync::Notify::new());
        let seen = Arc::new(AtomicBool::new(false));
        {
            let ready = ready.clone();
            let seen = seen.clone();
            self.on_event(Arc::new(move |event: WorkerEvent| {
                if event.is_startup_check_response() {
                    seen.store(true, Ordering::SeqCst);
                    ready.notify_one();
                }
            }))
            .await;
        }

        let interval = Duration::from_secs(READINESS_INTERVAL_SECS);
        let attempts = self.handshake_attempts();
        for _ in 0..attempts {
            self.send(RpcCommand::GetState { id: "startup-check".to_string() }).await;
            let _ = tokio::time::timeout(interval, ready.notified()).await;
            if seen.load(Ordering::SeqCst) {
                return Ok(());
            }
        }

        if seen.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RpcError::HandshakeTimeout)
        }
    }

    /// Number of `get_state` probes the handshake sends at
    /// `READINESS_INTERVAL_SECS` spacing before giving up, derived from
    /// `cfg.handshake_timeout_secs` (§4.3's ~45s/30s ceilings are callers'
    /// chosen `RpcConfig`, not a fixed constant here). Always at least 1.
    fn handshake_attempts(&self) -> u32 {
        let attempts = self.cfg.handshake_timeout_secs.div_ceil(READINESS_INTERVAL_SECS);
        u32::try_from(attempts).unwrap_or(u32::MAX).max(1)
    }
}

async fn tail_loop(
    ssh: Arc<SshTransport>,
    key_path: PathBuf,
    vm_id: String,
    mut remote_cmd: String,
    state: Arc<ChannelState>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    loop {
        if *cancel_rx.borrow() {
            return;
        }

        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(256);
        let reader_state = state.clone();
        let reader_task = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                let text = String::from_utf8_lossy(&line);
                reader_state.lines_processed.fetch_add(1, Ordering::SeqCst);
                if let Some((event, _raw)) = WorkerEvent::parse_line(&text) {
                    let handler = reader_state.event_handler.lock().await.clone();
                    if let Some(handler) = handler {
                        handler(event);
                    }
                }
            }
        });

        let result = ssh
            .exec_streaming(&key_path, &vm_id, &remote_cmd, tx, cancel_rx.clone(), None)
            .await;
        let _ = reader_task.await;

        if *cancel_rx.borrow() || state.killed.load(Ordering::SeqCst) {
            return;
        }

        match result {
            Ok(_) | Err(_) => {
                // SSH closed (not explicit kill): reset the partial-line
                // state and reconnect at the current lines_processed offset.
                tokio::time::sleep(Duration::from_secs(TAIL_RECONNECT_DELAY_SECS)).await;
                if *cancel_rx.borrow() {
                    return;
                }
                let resume_from = state.lines_processed.load(Ordering::SeqCst) + 1;
                remote_cmd = format!("tail -f -n +{resume_from} {REMOTE_DIR}/out");
            }
        }
    }
}

#[async_trait]
impl WorkerTransport for RpcChannel {
    async fn send(&self, cmd: RpcCommand) {
        let line = match cmd.to_json_line() {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(vm_id = %self.vm_id, error = %e, "failed to serialize rpc command");
                return;
            }
        };

        let remote_cmd = format!("cat > {REMOTE_DIR}/in");
        if let Err(e) = self
            .ssh
            .exec_oneshot_with_stdin(&self.key_path, &self.vm_id, &remote_cmd, Some(line.as_bytes()))
            .await
        {
            tracing::warn!(vm_id = %self.vm_id, error = %e, "rpc send failed");
        }
    }

    async fn on_event(&self, handler: EventHandler) {
        *self.state.event_handler.lock().await = Some(handler);
    }

    async fn reconnect_tail(&self) -> Result<(), RpcError> {
        if self.state.killed.load(Ordering::SeqCst) {
            return Err(RpcError::ChannelKilled);
        }
        self.spawn_tail_from_now().await;
        Ok(())
    }

    async fn kill(&self) {
        if self
            .state
            .killed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let _ = self.state.tail_cancel.send(true);
        if let Some(handle) = self.state.tail_task.lock().await.take() {
            handle.abort();
        }

        let cleanup_cmd = format!(
            "tmux kill-session -t {WORKER_SESSION} 2>/dev/null; \
             tmux kill-session -t {KEEPER_SESSION} 2>/dev/null; \
             rm -rf {REMOTE_DIR}"
        );
        let _ = self.ssh.exec_oneshot(&self.key_path, &self.vm_id, &cleanup_cmd).await;
    }

    fn is_killed(&self) -> bool {
        self.state.killed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_command_includes_fifo_and_sessions() {
        let opts = StartOptions {
            provider_env_var: "ANTHROPIC_API_KEY".to_string(),
            provider_api_key: "sk-test".to_string(),
            extra_env: vec![],
        };
        let cmd = RpcChannel::install_command("pi-worker", &opts);
        assert!(cmd.contains("mkfifo"));
        assert!(cmd.contains(KEEPER_SESSION));
        assert!(cmd.contains(WORKER_SESSION));
        assert!(cmd.contains("ANTHROPIC_API_KEY=sk-test"));
    }
}
