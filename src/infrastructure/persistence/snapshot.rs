//! Atomic JSON snapshot of lieutenant state (§4.7): write-temp-then-rename
//! so a crash mid-write never leaves a truncated `lieutenants.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::models::worker::{WorkerRecord, WorkerStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LieutenantSnapshotEntry {
    pub name: String,
    pub role: String,
    #[serde(rename = "vmId")]
    pub vm_id: String,
    #[serde(rename = "isLocal")]
    pub is_local: bool,
    pub status: WorkerStatus,
    #[serde(rename = "taskCount")]
    pub task_count: u32,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "lastActivityAt")]
    pub last_activity_at: DateTime<Utc>,
}

impl From<&WorkerRecord> for LieutenantSnapshotEntry {
    fn from(record: &WorkerRecord) -> Self {
        Self {
            name: record.name.clone(),
            role: record.role.clone(),
            vm_id: record.vm_id.clone(),
            is_local: record.is_local,
            status: record.status,
            task_count: record.task_count,
            created_at: record.created_at,
            last_activity_at: record.last_activity_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LieutenantSnapshot {
    pub lieutenants: Vec<LieutenantSnapshotEntry>,
    #[serde(rename = "savedAt")]
    pub saved_at: DateTime<Utc>,
}

/// Reads the snapshot file; a missing file is treated as an empty fleet
/// (first run), not an error.
pub fn load(path: &Path) -> anyhow::Result<LieutenantSnapshot> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LieutenantSnapshot {
            lieutenants: Vec::new(),
            saved_at: Utc::now(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Writes `snapshot` to a sibling temp file then renames it over `path`,
/// so readers never observe a partial write.
pub fn save_atomic(path: &Path, snapshot: &LieutenantSnapshot) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = tmp_path_for(path);
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    std::fs::write(&tmp_path, bytes)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "snapshot".to_string());
    path.with_file_name(format!(".{file_name}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_entry() -> LieutenantSnapshotEntry {
        LieutenantSnapshotEntry {
            name: "infra".to_string(),
            role: "infra work".to_string(),
            vm_id: "vm-abc".to_string(),
            is_local: false,
            status: WorkerStatus::Idle,
            task_count: 3,
            created_at: Utc::now(),
            last_activity_at: Utc::now(),
        }
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lieutenants.json");
        let snapshot = load(&path).unwrap();
        assert!(snapshot.lieutenants.is_empty());
    }

    #[test]
    fn round_trips_through_atomic_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lieutenants.json");
        let snapshot = LieutenantSnapshot {
            lieutenants: vec![sample_entry()],
            saved_at: Utc::now(),
        };
        save_atomic(&path, &snapshot).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.lieutenants.len(), 1);
        assert_eq!(loaded.lieutenants[0].name, "infra");
        assert!(!std::path::Path::new(&format!("{}.tmp", path.display())).exists());
    }

    #[test]
    fn overwrite_replaces_prior_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lieutenants.json");
        let first = LieutenantSnapshot { lieutenants: vec![sample_entry()], saved_at: Utc::now() };
        save_atomic(&path, &first).unwrap();

        let second = LieutenantSnapshot { lieutenants: vec![], saved_at: Utc::now() };
        save_atomic(&path, &second).unwrap();

        let loaded = load(&path).unwrap();
        assert!(loaded.lieutenants.is_empty());
    }
}
