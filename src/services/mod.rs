//! Application services: the Swarm Manager (§4.5) and Lieutenant Manager
//! (§4.6), the shared event handler they both install (§4.4), and the pure
//! send-mode arbitration function (§4.6 table) backing `LieutenantManager::send`.

pub mod event_handler;
pub mod lieutenant_manager;
pub mod send_mode;
pub mod swarm_manager;

pub use lieutenant_manager::{LieutenantManager, LieutenantView, SendOutcome};
pub use send_mode::SendMode;
pub use swarm_manager::{AgentSummary, SpawnResult, SwarmManager, WaitReport};
