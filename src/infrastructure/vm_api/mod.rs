//! `reqwest`-backed adapter for the VM control-plane HTTP API.

pub mod client;
pub mod rate_limiter;
pub mod retry;

pub use client::{build_client, key_cache_path, VmApiClient};
