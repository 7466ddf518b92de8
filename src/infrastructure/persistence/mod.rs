//! Persistence & discovery (§4.7): the atomic lieutenant snapshot file and
//! the optional best-effort external registry client.

pub mod registry_client;
pub mod snapshot;

pub use registry_client::HttpRegistryClient;
pub use snapshot::{LieutenantSnapshot, LieutenantSnapshotEntry};
