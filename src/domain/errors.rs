//! Domain error taxonomy for the fleet orchestrator.
//!
//! One `thiserror` enum per external collaborator, matching the error
//! surfaces named in spec §7: transient I/O, worker lifecycle failure,
//! caller error, and partial-spawn reporting.

use thiserror::Error;

/// Errors from the VM control HTTP API.
#[derive(Debug, Error, Clone)]
pub enum VmApiError {
    #[error("vm api returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("vm api network error: {0}")]
    Network(String),

    #[error("vm api misconfigured: {0}")]
    InvalidConfig(String),
}

impl VmApiError {
    /// Transient statuses are retried by the caller's `RetryPolicy`; 4xx is not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VmApiError::Status { status, .. } if matches!(status, 429 | 500 | 502 | 503 | 504)
        ) || matches!(self, VmApiError::Network(_))
    }
}

/// Errors from SSH one-shot/streaming execution.
#[derive(Debug, Error, Clone)]
pub enum SshError {
    #[error("ssh command timed out after {0}s")]
    Timeout(u64),

    #[error("ssh command aborted by cancellation")]
    Aborted,

    #[error("ssh command exited with status {0}")]
    NonZeroExit(i32),

    #[error("ssh io error: {0}")]
    Io(String),
}

/// Errors from the RPC channel (§4.3).
#[derive(Debug, Error, Clone)]
pub enum RpcError {
    #[error("readiness handshake timed out")]
    HandshakeTimeout,

    #[error("failed to start worker: {0}")]
    WorkerStartFailed(String),

    #[error("channel already killed")]
    ChannelKilled,
}

/// Caller-facing errors from the Swarm Manager (§4.5).
#[derive(Debug, Error, Clone)]
pub enum SwarmError {
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("partial spawn failure: {0:?}")]
    PartialSpawnFailure(Vec<String>),
}

/// Caller-facing errors from the Lieutenant Manager (§4.6).
#[derive(Debug, Error, Clone)]
pub enum LieutenantError {
    #[error("unknown lieutenant: {0}")]
    UnknownName(String),

    #[error("lieutenant already exists: {0}")]
    DuplicateName(String),

    #[error("lieutenant {0} is paused")]
    Paused(String),

    #[error("operation unsupported for local lieutenant: {0}")]
    LocalUnsupported(&'static str),

    #[error("lieutenant {0} is currently working")]
    StillWorking(String),

    #[error("lieutenant {0} is not ready to receive messages (status: {1})")]
    NotReady(String, &'static str),

    #[error("tmux session pi-rpc missing after resume for {0}")]
    ResumeVerificationFailed(String),

    #[error("lieutenant {0}: {1}")]
    OperationFailed(String, String),
}
