//! RPC transports: `channel` (remote SSH/FIFO, THE CORE) and `local` (child
//! process), both implementing `domain::ports::transport::WorkerTransport`.

pub mod channel;
pub mod local;

pub use channel::{RpcChannel, StartOptions};
pub use local::LocalTransport;
