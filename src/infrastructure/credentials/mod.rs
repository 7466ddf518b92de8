//! Credentials management infrastructure
//!
//! Resolves the VM-control API bearer token and base URL override in the
//! priority order named in spec §4.1/§6: explicit constructor argument,
//! then environment variable, then a JSON credentials file at a known
//! user-config path.

use serde::Deserialize;
use std::path::PathBuf;

/// Shape of `<home>/.vers/keys.json`.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    keys: std::collections::HashMap<String, String>,
}

fn credentials_path() -> PathBuf {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".vers").join("keys.json")
}

fn read_credentials_file(key_name: &str) -> Option<String> {
    let path = credentials_path();
    let contents = std::fs::read_to_string(path).ok()?;
    let parsed: CredentialsFile = serde_json::from_str(&contents).ok()?;
    parsed.keys.get(key_name).cloned()
}

/// Resolve the VM API bearer token: explicit arg, then `VERS_API_KEY`, then
/// the credentials file. Returns `None` if no source provides a value.
pub fn resolve_api_key(explicit: Option<&str>) -> Option<String> {
    if let Some(key) = explicit {
        if !key.is_empty() {
            return Some(key.to_string());
        }
    }
    if let Ok(key) = std::env::var("VERS_API_KEY") {
        if !key.is_empty() {
            return Some(key);
        }
    }
    read_credentials_file("VERS_API_KEY")
}

/// Resolve the VM API base URL override: explicit arg, then `VERS_BASE_URL`.
pub fn resolve_base_url(explicit: Option<&str>, default: &str) -> String {
    if let Some(url) = explicit {
        if !url.is_empty() {
            return url.to_string();
        }
    }
    std::env::var("VERS_BASE_URL").unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_arg_wins_over_env() {
        temp_env::with_var("VERS_API_KEY", Some("env-key"), || {
            assert_eq!(resolve_api_key(Some("explicit-key")).as_deref(), Some("explicit-key"));
        });
    }

    #[test]
    fn falls_back_to_env_var() {
        temp_env::with_var("VERS_API_KEY", Some("env-key"), || {
            assert_eq!(resolve_api_key(None).as_deref(), Some("env-key"));
        });
    }

    #[test]
    fn base_url_default_when_unset() {
        temp_env::with_var_unset("VERS_BASE_URL", || {
            assert_eq!(resolve_base_url(None, "https://default.example.com"), "https://default.example.com");
        });
    }

    #[test]
    fn base_url_env_override() {
        temp_env::with_var("VERS_BASE_URL", Some("https://env.example.com"), || {
            assert_eq!(resolve_base_url(None, "https://default.example.com"), "https://env.example.com");
        });
    }
}
