//! Integration coverage for `LieutenantManager`'s caller-facing error paths
//! and the local (child-process) lifecycle, which needs neither a VM API
//! nor SSH (§4.6 "create... local").

mod common;

use std::sync::Arc;

use common::{FakeVmApi, NoopRegistry};
use tempfile::tempdir;
use vers_fleet::domain::errors::LieutenantError;
use vers_fleet::domain::models::config::RpcConfig;
use vers_fleet::infrastructure::ssh::SshTransport;
use vers_fleet::services::{LieutenantManager, SendMode};

fn make_manager(session_root: std::path::PathBuf, state_file: std::path::PathBuf) -> LieutenantManager {
    LieutenantManager::new(
        Arc::new(FakeVmApi::new()),
        Arc::new(SshTransport::new(Default::default())),
        RpcConfig::default(),
        "pi-worker",
        local_worker_script(),
        session_root,
        "ANTHROPIC_API_KEY",
        Some(Arc::new(NoopRegistry)),
        state_file,
    )
}

/// A minimal RPC worker stand-in: replies to `get_state` so the readiness
/// handshake succeeds, and to `prompt`/`steer`/`follow_up` with an
/// `agent_end` event, the same wire shape a real `pi-worker` would emit.
fn local_worker_script() -> String {
    static SCRIPT: std::sync::OnceLock<std::path::PathBuf> = std::sync::OnceLock::new();
    SCRIPT
        .get_or_init(|| {
            let dir = std::env::temp_dir().join(format!("vers-fleet-test-worker-{}", std::process::id()));
            std::fs::create_dir_all(&dir).unwrap();
            let path = dir.join("fake-pi-worker.sh");
            std::fs::write(
                &path,
                "#!/bin/sh\nwhile IFS= read -r line; do\n  case \"$line\" in\n    *'\"type\":\"get_state\"'*)\n      echo '{\"type\":\"response\",\"command\":\"get_state\",\"state\":\"idle\"}'\n      ;;\n    *'\"type\":\"prompt\"'*|*'\"type\":\"steer\"'*|*'\"type\":\"follow_up\"'*)\n      echo '{\"type\":\"agent_end\"}'\n      ;;\n  esac\ndone\n",
            )
            .unwrap();
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            }
            path
        })
        .to_string_lossy()
        .to_string()
}

#[tokio::test]
async fn unknown_lieutenant_operations_fail_cleanly() {
    let dir = tempdir().unwrap();
    let manager = make_manager(dir.path().join("sessions"), dir.path().join("lieutenants.json"));

    assert!(matches!(
        manager.send("nobody", "hi", None).await.unwrap_err(),
        LieutenantError::UnknownName(name) if name == "nobody"
    ));
    assert!(matches!(manager.pause("nobody").await.unwrap_err(), LieutenantError::UnknownName(_)));
    assert!(matches!(manager.resume("nobody").await.unwrap_err(), LieutenantError::UnknownName(_)));

    let destroy_results = manager.destroy("nobody").await;
    assert_eq!(destroy_results.len(), 1);
    assert!(destroy_results[0].1.is_err());
}

#[tokio::test]
async fn local_lieutenant_full_lifecycle() {
    let dir = tempdir().unwrap();
    let manager = make_manager(dir.path().join("sessions"), dir.path().join("lieutenants.json"));

    manager.create("infra", "own the deploy pipeline", None, "", None, true).await.unwrap();

    let views = manager.list().await;
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].name, "infra");
    assert!(views[0].is_local);
    assert_eq!(views[0].status, "idle");

    // A duplicate name is rejected outright.
    assert!(matches!(
        manager.create("infra", "own the deploy pipeline", None, "", None, true).await.unwrap_err(),
        LieutenantError::DuplicateName(_)
    ));

    // Pause/resume are unsupported for a local lieutenant (§4.6).
    assert!(matches!(manager.pause("infra").await.unwrap_err(), LieutenantError::LocalUnsupported(_)));
    assert!(matches!(manager.resume("infra").await.unwrap_err(), LieutenantError::LocalUnsupported(_)));

    let outcome = manager.send("infra", "deploy the canary", Some(SendMode::Prompt)).await.unwrap();
    assert!(outcome.note.is_none());

    let results = manager.destroy("infra").await;
    assert_eq!(results.len(), 1);
    assert!(results[0].1.is_ok());
    assert!(manager.list().await.is_empty());
}
