//! `reqwest`-backed implementation of the `VmApi` port (§4.1, §6).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::rate_limiter::TokenBucketRateLimiter;
use super::retry::RetryPolicy;
use crate::domain::errors::VmApiError;
use crate::domain::models::config::VmApiConfig;
use crate::domain::models::vm::{PowerState, VmConfig, VmHandle, VmLifecycleState, VmListEntry};
use crate::domain::ports::vm_api::VmApi;
use crate::infrastructure::credentials;

pub struct VmApiClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    retry: RetryPolicy,
    rate_limiter: TokenBucketRateLimiter,
    key_cache: RwLock<HashMap<String, PathBuf>>,
}

#[derive(Deserialize)]
struct VmIdResponse {
    vm_id: String,
}

#[derive(Deserialize)]
struct CommitIdResponse {
    commit_id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    state: VmLifecycleState,
}

impl VmApiClient {
    pub fn new(cfg: &VmApiConfig, explicit_api_key: Option<&str>) -> Result<Self, VmApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| VmApiError::InvalidConfig(e.to_string()))?;

        let api_key = credentials::resolve_api_key(explicit_api_key.or(cfg.api_key.as_deref()));
        let base_url = credentials::resolve_base_url(None, &cfg.base_url);

        Ok(Self {
            http,
            base_url,
            api_key,
            retry: RetryPolicy::new(&cfg.retry),
            rate_limiter: TokenBucketRateLimiter::new(&cfg.rate_limit),
            key_cache: RwLock::new(HashMap::new()),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, VmApiError> {
        self.rate_limiter.acquire().await;
        self.retry
            .run(|| async {
                let mut req = self.request(method.clone(), path);
                if let Some(b) = &body {
                    req = req.json(b);
                }
                let resp = req.send().await.map_err(|e| VmApiError::Network(e.to_string()))?;
                let status = resp.status();
                if status.is_success() {
                    resp.json::<T>().await.map_err(|e| VmApiError::Network(e.to_string()))
                } else {
                    let body = resp.text().await.unwrap_or_default();
                    Err(VmApiError::Status { status: status.as_u16(), body })
                }
            })
            .await
    }

    async fn send_no_body(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<(), VmApiError> {
        self.rate_limiter.acquire().await;
        self.retry
            .run(|| async {
                let mut req = self.request(method.clone(), path);
                if let Some(b) = &body {
                    req = req.json(b);
                }
                let resp = req.send().await.map_err(|e| VmApiError::Network(e.to_string()))?;
                let status = resp.status();
                if status.is_success() || status == StatusCode::NO_CONTENT {
                    Ok(())
                } else {
                    let body = resp.text().await.unwrap_or_default();
                    Err(VmApiError::Status { status: status.as_u16(), body })
                }
            })
            .await
    }

    /// Writes the private key to a per-process tempdir at mode 0600 and
    /// caches the path in-memory, amortising repeated `getSshKey` calls.
    async fn cache_key_on_disk(&self, vm_id: &str, private_key: &str) -> Result<PathBuf, VmApiError> {
        if let Some(path) = self.key_cache.read().await.get(vm_id) {
            return Ok(path.clone());
        }

        let path = key_cache_path(vm_id);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| VmApiError::InvalidConfig(format!("failed to create key cache dir: {e}")))?;
        }

        tokio::fs::write(&path, private_key)
            .await
            .map_err(|e| VmApiError::InvalidConfig(format!("failed to write ssh key: {e}")))?;

        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&path, perms)
            .await
            .map_err(|e| VmApiError::InvalidConfig(format!("failed to chmod ssh key: {e}")))?;

        self.key_cache.write().await.insert(vm_id.to_string(), path.clone());
        Ok(path)
    }
}

#[async_trait]
impl VmApi for VmApiClient {
    async fn list(&self) -> Result<Vec<VmListEntry>, VmApiError> {
        self.send_json(reqwest::Method::GET, "/vms", None).await
    }

    async fn create_root(&self, cfg: VmConfig, wait_boot: bool) -> Result<String, VmApiError> {
        let resp: VmIdResponse = self
            .send_json(
                reqwest::Method::POST,
                &format!("/vm/new_root?wait_boot={wait_boot}"),
                Some(json!({ "vm_config": cfg })),
            )
            .await?;
        Ok(resp.vm_id)
    }

    async fn delete(&self, vm_id: &str) -> Result<(), VmApiError> {
        self.send_no_body(reqwest::Method::DELETE, &format!("/vm/{vm_id}"), None).await
    }

    async fn branch(&self, vm_id: &str) -> Result<String, VmApiError> {
        let resp: VmIdResponse = self
            .send_json(reqwest::Method::POST, &format!("/vm/{vm_id}/branch"), None)
            .await?;
        Ok(resp.vm_id)
    }

    async fn commit(&self, vm_id: &str, keep_paused: bool) -> Result<String, VmApiError> {
        let resp: CommitIdResponse = self
            .send_json(
                reqwest::Method::POST,
                &format!("/vm/{vm_id}/commit?keep_paused={keep_paused}"),
                None,
            )
            .await?;
        Ok(resp.commit_id)
    }

    async fn restore_from_commit(&self, commit_id: &str) -> Result<String, VmApiError> {
        let resp: VmIdResponse = self
            .send_json(
                reqwest::Method::POST,
                "/vm/from_commit",
                Some(json!({ "commit_id": commit_id })),
            )
            .await?;
        Ok(resp.vm_id)
    }

    async fn update_state(&self, vm_id: &str, state: PowerState) -> Result<(), VmApiError> {
        let state_str = match state {
            PowerState::Paused => "Paused",
            PowerState::Running => "Running",
        };
        self.send_no_body(
            reqwest::Method::PATCH,
            &format!("/vm/{vm_id}/state"),
            Some(json!({ "state": state_str })),
        )
        .await
    }

    async fn get_status(&self, vm_id: &str) -> Result<VmLifecycleState, VmApiError> {
        let resp: StatusResponse = self
            .send_json(reqwest::Method::GET, &format!("/vm/{vm_id}/status"), None)
            .await?;
        Ok(resp.state)
    }

    async fn get_ssh_key(&self, vm_id: &str) -> Result<VmHandle, VmApiError> {
        let handle: VmHandle = self
            .send_json(reqwest::Method::GET, &format!("/vm/{vm_id}/ssh_key"), None)
            .await?;
        self.cache_key_on_disk(vm_id, &handle.ssh_private_key).await?;
        Ok(handle)
    }

    /// Clears the in-memory key cache entry and best-effort removes the
    /// on-disk file (called from both managers' teardown/destroy paths,
    /// §8 Property 5).
    async fn evict_key_cache(&self, vm_id: &str) {
        if let Some(path) = self.key_cache.write().await.remove(vm_id) {
            let _ = tokio::fs::remove_file(path).await;
        }
    }
}

/// Convenience constructor bundling the shared `Arc<dyn VmApi>` the managers hold.
pub fn build_client(cfg: &VmApiConfig, explicit_api_key: Option<&str>) -> Result<Arc<dyn VmApi>, VmApiError> {
    Ok(Arc::new(VmApiClient::new(cfg, explicit_api_key)?))
}

/// The deterministic on-disk path `getSshKey` caches a VM's private key at
/// (§4.1): `<tempdir>/vers-rpc-<pid>/vers-<first-12-chars-of-vmId>.pem`.
/// Exposed standalone so managers can locate (and, on teardown, remove) the
/// cached key file without the `VmApi` port needing to expose cache
/// internals.
pub fn key_cache_path(vm_id: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("vers-rpc-{}", std::process::id()));
    let short_id: String = vm_id.chars().take(12).collect();
    dir.join(format!("vers-{short_id}.pem"))
}
