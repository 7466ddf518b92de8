//! `reqwest`-backed external registry client (§4.7), used for cross-session
//! lieutenant discovery. Every operation is best-effort: failures are
//! logged and swallowed, never surfaced to the caller (§4.7 "All three are
//! best-effort").

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::domain::ports::registry::{RegistryClient, RegistryEntry, RegistryVm};

pub struct HttpRegistryClient {
    http: Client,
    base_url: String,
    auth_token: String,
}

/// The registry's `GET /registry/vms` response is polymorphic: either a
/// bare array or `{vms: [...]}` (§4.7, §9 Open Questions). Untagged so
/// either shape deserializes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListResponse {
    Bare(Vec<RegistryVm>),
    Wrapped { vms: Vec<RegistryVm> },
}

impl HttpRegistryClient {
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            auth_token: auth_token.into(),
        }
    }

    /// Builds a client from `VERS_INFRA_URL`/`VERS_AUTH_TOKEN` (§6), or
    /// `None` if either is unset (discovery stays disabled, per §4.6
    /// "when an external registry URL/token is configured").
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("VERS_INFRA_URL").ok()?;
        let token = std::env::var("VERS_AUTH_TOKEN").ok()?;
        if url.trim().is_empty() || token.trim().is_empty() {
            return None;
        }
        Some(Self::new(url, token))
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn post(&self, entry: RegistryEntry) {
        let url = format!("{}/registry/vms", self.base_url);
        let result = self
            .http
            .post(&url)
            .bearer_auth(&self.auth_token)
            .json(&entry)
            .send()
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, id = %entry.id, "registry post failed (best-effort)");
        }
    }

    async fn delete(&self, id: &str) {
        let url = format!("{}/registry/vms/{id}", self.base_url);
        let result = self.http.delete(&url).bearer_auth(&self.auth_token).send().await;
        if let Err(e) = result {
            tracing::warn!(error = %e, %id, "registry delete failed (best-effort)");
        }
    }

    async fn list(&self) -> Vec<RegistryVm> {
        let url = format!("{}/registry/vms", self.base_url);
        let response = match self.http.get(&url).bearer_auth(&self.auth_token).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(error = %e, "registry list failed (best-effort)");
                return Vec::new();
            }
        };

        match response.json::<ListResponse>().await {
            Ok(ListResponse::Bare(vms)) => vms,
            Ok(ListResponse::Wrapped { vms }) => vms,
            Err(e) => {
                tracing::warn!(error = %e, "registry list response unparseable (best-effort)");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_requires_both_vars() {
        temp_env::with_vars(
            [("VERS_INFRA_URL", None::<&str>), ("VERS_AUTH_TOKEN", None::<&str>)],
            || {
                assert!(HttpRegistryClient::from_env().is_none());
            },
        );
    }

    #[test]
    fn from_env_builds_when_both_set() {
        temp_env::with_vars(
            [
                ("VERS_INFRA_URL", Some("https://registry.example.com")),
                ("VERS_AUTH_TOKEN", Some("tok")),
            ],
            || {
                assert!(HttpRegistryClient::from_env().is_some());
            },
        );
    }

    #[test]
    fn parses_bare_array_response() {
        let body = r#"[{"id":"v1","name":"infra","role":"lieutenant","address":"h","registeredBy":"vers-lieutenant"}]"#;
        let parsed: ListResponse = serde_json::from_str(body).unwrap();
        match parsed {
            ListResponse::Bare(vms) => assert_eq!(vms.len(), 1),
            ListResponse::Wrapped { .. } => panic!("expected bare array"),
        }
    }

    #[test]
    fn parses_wrapped_response() {
        let body = r#"{"vms":[{"id":"v1","registeredBy":"vers-lieutenant"}]}"#;
        let parsed: ListResponse = serde_json::from_str(body).unwrap();
        match parsed {
            ListResponse::Wrapped { vms } => assert_eq!(vms.len(), 1),
            ListResponse::Bare(_) => panic!("expected wrapped object"),
        }
    }
}
