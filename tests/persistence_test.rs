//! Integration coverage for `LieutenantManager::reconnect_from_disk` (§4.6
//! "Start-up reconnection") against the on-disk snapshot format (§4.7),
//! exercising the paused-reconnect and dead-vm-pruning branches that need
//! no SSH dial.

mod common;

use std::sync::Arc;

use chrono::Utc;
use tempfile::tempdir;

use common::{FakeVmApi, NoopRegistry};
use vers_fleet::domain::models::config::RpcConfig;
use vers_fleet::infrastructure::persistence::snapshot::{self, LieutenantSnapshot, LieutenantSnapshotEntry};
use vers_fleet::domain::models::worker::WorkerStatus;
use vers_fleet::infrastructure::ssh::SshTransport;
use vers_fleet::services::LieutenantManager;

fn entry(name: &str, vm_id: &str) -> LieutenantSnapshotEntry {
    LieutenantSnapshotEntry {
        name: name.to_string(),
        role: "own the deploy pipeline".to_string(),
        vm_id: vm_id.to_string(),
        is_local: false,
        status: WorkerStatus::Idle,
        task_count: 2,
        created_at: Utc::now(),
        last_activity_at: Utc::now(),
    }
}

fn make_manager(vm_api: Arc<FakeVmApi>, state_file: std::path::PathBuf) -> LieutenantManager {
    LieutenantManager::new(
        vm_api,
        Arc::new(SshTransport::new(Default::default())),
        RpcConfig::default(),
        "pi-worker",
        "pi-worker",
        std::env::temp_dir(),
        "ANTHROPIC_API_KEY",
        Some(Arc::new(NoopRegistry)),
        state_file,
    )
}

#[tokio::test]
async fn paused_vm_reconnects_as_paused_with_no_transport() {
    let dir = tempdir().unwrap();
    let state_file = dir.path().join("lieutenants.json");

    let vm_api = Arc::new(FakeVmApi::new());
    vm_api.seed("vm-infra", "Paused");
    snapshot::save_atomic(&state_file, &LieutenantSnapshot { lieutenants: vec![entry("infra", "vm-infra")], saved_at: Utc::now() }).unwrap();

    let manager = make_manager(vm_api, state_file.clone());
    manager.reconnect_from_disk().await.unwrap();

    let views = manager.list().await;
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].name, "infra");
    assert_eq!(views[0].status, "paused");

    // Pausing an already-paused lieutenant is a no-op, not an error.
    let msg = manager.pause("infra").await.unwrap();
    assert!(msg.contains("already paused"));
}

#[tokio::test]
async fn dead_vm_is_dropped_on_reconnect() {
    let dir = tempdir().unwrap();
    let state_file = dir.path().join("lieutenants.json");

    // vm-gone is never seeded into the fake VM API, so get_status 404s.
    let vm_api = Arc::new(FakeVmApi::new());
    snapshot::save_atomic(&state_file, &LieutenantSnapshot { lieutenants: vec![entry("ghost", "vm-gone")], saved_at: Utc::now() }).unwrap();

    let manager = make_manager(vm_api, state_file);
    manager.reconnect_from_disk().await.unwrap();

    assert!(manager.list().await.is_empty());
}

#[tokio::test]
async fn local_entries_are_never_reconnected() {
    let dir = tempdir().unwrap();
    let state_file = dir.path().join("lieutenants.json");

    let vm_api = Arc::new(FakeVmApi::new());
    let mut local = entry("scratch", "local-scratch");
    local.is_local = true;
    snapshot::save_atomic(&state_file, &LieutenantSnapshot { lieutenants: vec![local], saved_at: Utc::now() }).unwrap();

    let manager = make_manager(vm_api, state_file.clone());
    manager.reconnect_from_disk().await.unwrap();

    assert!(manager.list().await.is_empty());

    // The pruned (empty) result is re-persisted, not left as the stale snapshot.
    let reloaded = snapshot::load(&state_file).unwrap();
    assert!(reloaded.lieutenants.is_empty());
}
