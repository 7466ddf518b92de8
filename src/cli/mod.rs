//! CLI interface module: the thin `clap`-based front end standing in for
//! the out-of-scope "parent-process tool registration" (§1). Commands map
//! 1:1 onto `SwarmManager`/`LieutenantManager` operations (§4.5/§4.6).

pub mod commands;
pub mod service;
pub mod types;

pub use types::{Cli, Commands, LieutenantCommands, SendModeArg, SwarmCommands};
