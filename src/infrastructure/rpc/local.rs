//! Local child-process transport for `isLocal` lieutenants: the same
//! `WorkerTransport` contract as `RpcChannel`, but stdin/stdout of a spawned
//! worker binary stand in for the remote FIFOs (§4.6 "create... local").

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::domain::errors::RpcError;
use crate::domain::models::rpc_message::{RpcCommand, WorkerEvent};
use crate::domain::ports::transport::{EventHandler, WorkerTransport};

const READINESS_ATTEMPTS: u32 = 10;
const READINESS_INTERVAL_SECS: u64 = 3;

struct LocalState {
    killed: AtomicBool,
    event_handler: Mutex<Option<EventHandler>>,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<tokio::process::ChildStdin>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

/// Wraps a spawned worker binary's stdin/stdout as a JSON-line channel.
pub struct LocalTransport {
    state: Arc<LocalState>,
}

impl LocalTransport {
    /// Spawns `worker_binary --mode rpc --session-dir <session_dir> [--system-prompt ...] [--model ...]`
    /// and performs the readiness handshake (30s ceiling per §4.6).
    pub async fn spawn(
        worker_binary: &str,
        session_dir: &PathBuf,
        system_prompt_path: Option<&PathBuf>,
        model: Option<&str>,
    ) -> Result<Self, RpcError> {
        let mut cmd = Command::new(worker_binary);
        cmd.arg("--mode")
            .arg("rpc")
            .arg("--session-dir")
            .arg(session_dir);
        if let Some(prompt) = system_prompt_path {
            cmd.arg("--system-prompt").arg(prompt);
        }
        if let Some(model) = model {
            cmd.arg("--model").arg(model);
        }
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| RpcError::WorkerStartFailed(format!("spawn failed: {e}")))?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");

        let state = Arc::new(LocalState {
            killed: AtomicBool::new(false),
            event_handler: Mutex::new(None),
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(Some(stdin)),
            reader_task: Mutex::new(None),
        });

        let reader_state = state.clone();
        let reader_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        if let Some((event, _raw)) = WorkerEvent::parse_line(&line) {
                            let handler = reader_state.event_handler.lock().await.clone();
                            if let Some(handler) = handler {
                                handler(event);
                            }
                        }
                    }
                    Err(_) => break,
                }
            }
        });
        *state.reader_task.lock().await = Some(reader_task);

        let transport = Self { state };
        transport.handshake().await?;
        Ok(transport)
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

        for _ in 0..READINESS_ATTEMPTS {
            self.send(RpcCommand::GetState { id: "startup-check".to_string() }).await;
            let interval = Duration::from_secs(READINESS_INTERVAL_SECS);
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
}

#[async_trait]
impl WorkerTransport for LocalTransport {
    async fn send(&self, cmd: RpcCommand) {
        let line = match cmd.to_json_line() {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize rpc command for local worker");
                return;
            }
        };

        let mut guard = self.state.stdin.lock().await;
        if let Some(stdin) = guard.as_mut() {
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                tracing::warn!(error = %e, "local worker stdin write failed");
            }
        }
    }

    async fn on_event(&self, handler: EventHandler) {
        *self.state.event_handler.lock().await = Some(handler);
    }

    async fn reconnect_tail(&self) -> Result<(), RpcError> {
        Err(RpcError::WorkerStartFailed(
            "local transports do not survive process restart".to_string(),
        ))
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

        self.state.stdin.lock().await.take();
        if let Some(mut child) = self.state.child.lock().await.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        if let Some(handle) = self.state.reader_task.lock().await.take() {
            handle.abort();
        }
    }

    fn is_killed(&self) -> bool {
        self.state.killed.load(Ordering::SeqCst)
    }
}
