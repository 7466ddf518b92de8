//! Plain data types shared across adapters and services.

pub mod config;
pub mod ring_buffer;
pub mod rpc_message;
pub mod vm;
pub mod worker;

pub use config::{FleetConfig, WorkerConfig};
pub use ring_buffer::RingBuffer;
pub use rpc_message::{AssistantMessageEvent, RpcCommand, WorkerEvent};
pub use vm::{PowerState, VmConfig, VmHandle, VmLifecycleState, VmListEntry};
pub use worker::{WorkerRecord, WorkerStatus};
