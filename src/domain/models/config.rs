//! Layered configuration shape (spec §6), loaded by
//! `infrastructure::config::ConfigLoader` from defaults, YAML, then env.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_vm_api_base_url() -> String {
    "https://vms.internal.example.com".to_string()
}
fn default_vm_api_timeout_secs() -> u64 {
    30
}
fn default_ssh_user() -> String {
    "root".to_string()
}
fn default_ssh_port() -> u16 {
    22
}
fn default_ssh_connect_timeout_secs() -> u64 {
    30
}
fn default_ssh_keepalive_interval_secs() -> u64 {
    15
}
fn default_ssh_keepalive_count_max() -> u32 {
    4
}
fn default_ssh_host_suffix() -> String {
    "vms.internal.example.com".to_string()
}
fn default_ssh_proxy_command_template() -> Option<String> {
    Some("vers-tls-proxy --connect {host}:443".to_string())
}
fn default_ssh_key_cache_dir() -> PathBuf {
    dirs_home_pi().join("keys")
}
fn default_handshake_timeout_secs() -> u64 {
    20
}
fn default_registry_url() -> Option<String> {
    None
}
fn default_state_file() -> PathBuf {
    dirs_home_pi().join("lieutenants.json")
}
fn default_retry_max_attempts() -> u32 {
    4
}
fn default_retry_base_delay_ms() -> u64 {
    250
}
fn default_retry_max_delay_ms() -> u64 {
    8_000
}
fn default_rate_limit_capacity() -> u32 {
    10
}
fn default_rate_limit_refill_per_sec() -> u32 {
    5
}

fn dirs_home_pi() -> PathBuf {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".pi")
}

/// Retry policy for transient VM API failures (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            base_delay_ms: default_retry_base_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

/// Token-bucket rate limit guarding outbound VM API calls (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_capacity")]
    pub capacity: u32,
    #[serde(default = "default_rate_limit_refill_per_sec")]
    pub refill_per_sec: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_rate_limit_capacity(),
            refill_per_sec: default_rate_limit_refill_per_sec(),
        }
    }
}

/// VM control-plane HTTP API (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmApiConfig {
    #[serde(default = "default_vm_api_base_url")]
    pub base_url: String,
    /// Bearer token; resolved at runtime from env/credentials file if absent here.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_vm_api_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for VmApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_vm_api_base_url(),
            api_key: None,
            timeout_secs: default_vm_api_timeout_secs(),
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// SSH transport defaults (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_ssh_user")]
    pub user: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_ssh_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_ssh_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_ssh_keepalive_count_max")]
    pub keepalive_count_max: u32,
    /// `<vmId>.<suffix>` forms the SSH host (§4.2).
    #[serde(default = "default_ssh_host_suffix")]
    pub host_suffix: String,
    /// Template with a `{host}` placeholder; `None` disables the TLS-tunnel
    /// proxy and connects directly (used by tests against a local sshd).
    #[serde(default = "default_ssh_proxy_command_template")]
    pub proxy_command_template: Option<String>,
    #[serde(default = "default_ssh_key_cache_dir")]
    pub key_cache_dir: PathBuf,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            port: default_ssh_port(),
            connect_timeout_secs: default_ssh_connect_timeout_secs(),
            keepalive_interval_secs: default_ssh_keepalive_interval_secs(),
            keepalive_count_max: default_ssh_keepalive_count_max(),
            host_suffix: default_ssh_host_suffix(),
            proxy_command_template: default_ssh_proxy_command_template(),
            key_cache_dir: default_ssh_key_cache_dir(),
        }
    }
}

/// RPC channel handshake/readiness (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: default_handshake_timeout_secs(),
        }
    }
}

/// Optional external lieutenant registry (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_url")]
    pub url: Option<String>,
}

/// On-disk snapshot location (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

fn default_worker_binary() -> String {
    "pi-worker".to_string()
}
fn default_local_worker_binary() -> String {
    "pi-worker".to_string()
}
fn default_local_session_root() -> PathBuf {
    dirs_home_pi().join("sessions")
}
fn default_provider_env_var() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

/// Worker process bootstrap (§4.3, §4.6, §6): the binary name installed on
/// the remote VM / spawned locally, and the env var its API key is
/// forwarded through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_binary")]
    pub worker_binary: String,
    #[serde(default = "default_local_worker_binary")]
    pub local_worker_binary: String,
    #[serde(default = "default_local_session_root")]
    pub local_session_root: PathBuf,
    #[serde(default = "default_provider_env_var")]
    pub provider_env_var: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_binary: default_worker_binary(),
            local_worker_binary: default_local_worker_binary(),
            local_session_root: default_local_session_root(),
            provider_env_var: default_provider_env_var(),
        }
    }
}

/// Root configuration, assembled by `ConfigLoader` from defaults, an
/// optional YAML file, then `VERS_FLEET_*` environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FleetConfig {
    #[serde(default)]
    pub vm_api: VmApiConfig,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub logging: crate::infrastructure::logging::config::LogConfig,
}

impl FleetConfig {
    /// Sanity checks beyond what serde/figment enforce structurally.
    pub fn validate(&self) -> Result<(), crate::domain::errors::VmApiError> {
        if self.vm_api.base_url.trim().is_empty() {
            return Err(crate::domain::errors::VmApiError::InvalidConfig(
                "vm_api.base_url must not be empty".to_string(),
            ));
        }
        if self.vm_api.retry.max_attempts == 0 {
            return Err(crate::domain::errors::VmApiError::InvalidConfig(
                "vm_api.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
