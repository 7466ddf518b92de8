//! VM control-plane data shapes (§6): what the fleet orchestrator asks the
//! (treated as opaque) VM API for, and what it gets back.

use serde::{Deserialize, Serialize};

/// Optional sizing knobs for `POST /vm/new_root`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VmConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcpu_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_size_mib: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fs_size_mib: Option<u32>,
}

/// SSH key material returned by `GET /vm/{id}/ssh_key`. The orchestrator is
/// expected to persist `ssh_private_key` to disk at mode 0600.
#[derive(Debug, Clone, Deserialize)]
pub struct VmHandle {
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    pub ssh_private_key: String,
}

fn default_ssh_port() -> u16 {
    22
}

/// The VM control service's power/lifecycle state is treated as opaque: we
/// only ever compare it against the two values the orchestrator branches on
/// (`Running`, `Paused`). Anything else is retained verbatim for logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VmLifecycleState(pub String);

impl VmLifecycleState {
    pub fn is_running(&self) -> bool {
        self.0.eq_ignore_ascii_case("running")
    }

    pub fn is_paused(&self) -> bool {
        self.0.eq_ignore_ascii_case("paused")
    }
}

impl std::fmt::Display for VmLifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// VM power-state transition target for `PATCH /vm/{id}/state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum PowerState {
    Paused,
    Running,
}

/// `GET /vms` list entry.
#[derive(Debug, Clone, Deserialize)]
pub struct VmListEntry {
    pub vm_id: String,
    pub state: VmLifecycleState,
    #[serde(default)]
    pub created_at: Option<String>,
}
