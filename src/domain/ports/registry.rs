//! Port for the optional external lieutenant registry (§4.7), used for
//! cross-session discovery. Every operation is best-effort by contract:
//! adapter implementations must never fail the calling operation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct RegistryEntry {
    pub id: String,
    pub name: String,
    pub role: String,
    pub address: String,
    #[serde(rename = "registeredBy")]
    pub registered_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryVm {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(rename = "registeredBy", default)]
    pub registered_by: Option<String>,
}

#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn post(&self, entry: RegistryEntry);
    async fn delete(&self, id: &str);
    async fn list(&self) -> Vec<RegistryVm>;
}
