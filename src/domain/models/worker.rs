//! Worker identity and the per-worker state record (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ring_buffer::RingBuffer;

/// Output history keeps the final `lastOutput` of up to this many completed tasks.
pub const OUTPUT_HISTORY_CAPACITY: usize = 20;
/// Raw event ring keeps up to this many serialized events for diagnostics.
pub const EVENTS_RING_CAPACITY: usize = 200;

/// Lifecycle status of a worker (§4.6 state machine; swarm workers use the
/// subset `Starting, Working, Done, Error`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Starting,
    Idle,
    Working,
    Paused,
    Done,
    Error,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Paused => "paused",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// A worker is considered "done" for `wait` purposes when it is terminal.
    pub fn is_wait_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Opaque handle to a VM, or the `local-<name>` sentinel for a local lieutenant.
pub fn local_vm_id(name: &str) -> String {
    format!("local-{name}")
}

/// In-memory state for one worker, owned exclusively by its manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub name: String,
    pub vm_id: String,
    pub is_local: bool,
    /// Lieutenants only; becomes system-prompt context. Empty for swarm workers.
    pub role: String,
    pub status: WorkerStatus,
    pub task: Option<String>,
    pub last_output: String,
    pub output_history: RingBuffer<String>,
    pub events_ring: RingBuffer<String>,
    pub task_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl WorkerRecord {
    pub fn new(name: impl Into<String>, vm_id: impl Into<String>, is_local: bool, role: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            vm_id: vm_id.into(),
            is_local,
            role: role.into(),
            status: WorkerStatus::Starting,
            task: None,
            last_output: String::new(),
            output_history: RingBuffer::new(OUTPUT_HISTORY_CAPACITY),
            events_ring: RingBuffer::new(EVENTS_RING_CAPACITY),
            task_count: 0,
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }
}
