//! Command definitions (clap derive), one variant per manager operation
//! named in spec §4.5 (swarm) / §4.6 (lieutenant).

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "vers-fleet", version, about = "Agent fleet orchestrator: branchable micro-VM workers over an SSH/FIFO RPC transport")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ephemeral swarm worker orchestration (§4.5)
    #[command(subcommand)]
    Swarm(SwarmCommands),

    /// Persistent, multi-turn lieutenant orchestration (§4.6)
    #[command(subcommand)]
    Lieutenant(LieutenantCommands),
}

#[derive(Subcommand)]
pub enum SwarmCommands {
    /// Spawn a batch of workers, dispatch one task to each, wait for
    /// completion, print the aggregate report, and tear everything down.
    /// A swarm is ephemeral and does not survive past one invocation
    /// (§1 "fire-and-forget"), so this single command models the
    /// spawn/sendTask/wait/teardown sequence of Scenario A end-to-end.
    Run {
        /// Golden snapshot / commit to restore each worker VM from
        #[arg(long)]
        commit_id: String,

        /// Number of workers to spawn
        #[arg(long)]
        count: usize,

        /// Task prompt sent to every worker. Repeat `--task` to assign a
        /// distinct prompt per worker (by spawn order); a single `--task`
        /// is broadcast to all.
        #[arg(long = "task", required = true)]
        tasks: Vec<String>,

        /// Optional explicit labels, one per worker (defaults to `agent-N`)
        #[arg(long, value_delimiter = ',')]
        labels: Option<Vec<String>>,

        /// VM-API bearer token (falls back to `VERS_API_KEY`/credentials file)
        #[arg(long)]
        api_key: Option<String>,

        /// LLM backend to select via `set_model` after spawn
        #[arg(long)]
        model: Option<String>,

        /// `wait` timeout in seconds
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,
    },
}

#[derive(Subcommand)]
pub enum LieutenantCommands {
    /// Create a new persistent lieutenant (§4.6 `create`)
    Create {
        name: String,

        #[arg(long)]
        role: String,

        /// Required unless `--local`
        #[arg(long)]
        commit_id: Option<String>,

        #[arg(long)]
        api_key: Option<String>,

        #[arg(long)]
        model: Option<String>,

        /// Spawn as a local child process instead of a remote VM
        #[arg(long)]
        local: bool,
    },

    /// Send a message to a lieutenant, mode-arbitrated per §4.6's table
    Send {
        name: String,
        message: String,

        #[arg(long, value_enum, default_value_t = SendModeArg::Prompt)]
        mode: SendModeArg,
    },

    /// Pause a lieutenant's VM (§4.6 `pause`)
    Pause { name: String },

    /// Resume a paused lieutenant (§4.6 `resume`)
    Resume { name: String },

    /// Destroy a lieutenant, or `*` for all of them (§4.6 `destroy`)
    Destroy { name: String },

    /// List all tracked lieutenants
    List,

    /// Re-fetch the external registry and reconnect any lieutenants not
    /// already tracked locally (§4.6/§4.7 `discover`)
    Discover,
}

/// CLI-facing mirror of `services::send_mode::SendMode` (clap's
/// `ValueEnum` derive needs a concrete type at the parsing boundary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SendModeArg {
    Prompt,
    Steer,
    FollowUp,
}

impl From<SendModeArg> for crate::services::SendMode {
    fn from(value: SendModeArg) -> Self {
        match value {
            SendModeArg::Prompt => Self::Prompt,
            SendModeArg::Steer => Self::Steer,
            SendModeArg::FollowUp => Self::FollowUp,
        }
    }
}
