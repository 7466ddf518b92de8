//! Bootstraps the `SwarmManager`/`LieutenantManager` from `FleetConfig` for
//! one CLI invocation, following the teacher's `CliCommandDispatcher`
//! pattern of assembling the service layer once behind a single struct.

use std::sync::Arc;

use anyhow::Result;

use crate::domain::models::config::FleetConfig;
use crate::domain::ports::registry::RegistryClient;
use crate::infrastructure::persistence::registry_client::HttpRegistryClient;
use crate::infrastructure::ssh::SshTransport;
use crate::infrastructure::vm_api::build_client;
use crate::services::{LieutenantManager, SwarmManager};

/// Owns the shared adapters and the two managers for the lifetime of one
/// CLI invocation. Lieutenant state is reconstituted from
/// `<home>/.pi/lieutenants.json` via `reconnect()`; swarm state is
/// intentionally not reconstituted across invocations (§1 "fire-and-forget").
pub struct FleetServices {
    pub swarm: Arc<SwarmManager>,
    pub lieutenants: Arc<LieutenantManager>,
}

impl FleetServices {
    pub fn build(config: &FleetConfig, explicit_api_key: Option<&str>) -> Result<Self> {
        config.validate().map_err(anyhow::Error::from)?;

        let vm_api = build_client(&config.vm_api, explicit_api_key)?;
        let ssh = Arc::new(SshTransport::new(config.ssh.clone()));
        let registry: Option<Arc<dyn RegistryClient>> =
            HttpRegistryClient::from_env().map(|c| Arc::new(c) as Arc<dyn RegistryClient>);

        let swarm = Arc::new(SwarmManager::new(
            vm_api.clone(),
            ssh.clone(),
            config.rpc.clone(),
            config.worker.worker_binary.clone(),
            config.worker.provider_env_var.clone(),
            registry.clone(),
        ));

        let lieutenants = Arc::new(LieutenantManager::new(
            vm_api,
            ssh,
            config.rpc.clone(),
            config.worker.worker_binary.clone(),
            config.worker.local_worker_binary.clone(),
            config.worker.local_session_root.clone(),
            config.worker.provider_env_var.clone(),
            registry,
            config.persistence.state_file.clone(),
        ));

        Ok(Self { swarm, lieutenants })
    }

    /// Loads the on-disk snapshot and reconnects surviving remote
    /// lieutenants before any lieutenant subcommand runs (§4.6 "Start-up
    /// reconnection"); also runs external-registry discovery when configured.
    pub async fn reconnect(&self) -> Result<()> {
        self.lieutenants.reconnect_from_disk().await?;
        self.lieutenants.discover().await;
        Ok(())
    }
}
