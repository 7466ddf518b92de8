//! vers-fleet - agent fleet orchestrator
//!
//! A control process that manages branchable micro-VM coding-agent workers
//! over an SSH/FIFO RPC transport, split into two subsystems:
//! - the Swarm Manager (§4.5): ephemeral, fire-and-forget worker batches
//! - the Lieutenant Manager (§4.6): persistent, named, multi-turn workers
//!
//! Layered hexagonally: `domain` holds plain data, errors, and port traits;
//! `infrastructure` adapts those ports to reqwest/SSH/the filesystem;
//! `services` implements the two managers against the ports; `cli` is the
//! thin clap front end wiring it all together.

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::models::config::FleetConfig;
pub use services::{LieutenantManager, SwarmManager};
