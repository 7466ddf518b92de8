//! Trait boundaries ("ports") between domain services and infrastructure
//! adapters, hexagonal-style: services depend only on these traits, never
//! on concrete `reqwest`/SSH/process types.

pub mod registry;
pub mod transport;
pub mod vm_api;

pub use registry::RegistryClient;
pub use transport::{EventHandler, WorkerTransport};
pub use vm_api::VmApi;
