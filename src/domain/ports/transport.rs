//! `WorkerTransport` unifies the remote `RpcChannel` (SSH/FIFO, §4.3) and a
//! local child-process lieutenant behind one abstraction, so
//! `LieutenantManager` does not special-case locality beyond the `is_local`
//! checks named in §3/§4.6.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::errors::RpcError;
use crate::domain::models::rpc_message::{RpcCommand, WorkerEvent};

/// Installed once per channel; replacing it drops the previous handler
/// (§9 "Event callback inversion" — a one-shot slot, not a listener list).
pub type EventHandler = Arc<dyn Fn(WorkerEvent) + Send + Sync>;

#[async_trait]
pub trait WorkerTransport: Send + Sync {
    /// Fire-and-forget outbound send; failures are logged, never surfaced
    /// (§4.3 "Outbound path").
    async fn send(&self, cmd: RpcCommand);

    /// Install (and replace) the event handler invoked for every inbound event.
    async fn on_event(&self, handler: EventHandler);

    /// Re-attach the inbound stream without replaying prior output
    /// (§4.3 "Reconnection-only variant"). Local transports ignore this.
    async fn reconnect_tail(&self) -> Result<(), RpcError>;

    /// Idempotent teardown of this transport's resources.
    async fn kill(&self);

    /// Whether this transport still considers itself live.
    fn is_killed(&self) -> bool;
}
