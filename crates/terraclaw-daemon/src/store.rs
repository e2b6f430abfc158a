//! Durable runtime-state store — one JSON file per workspace.
//!
//! Writes go to a sibling `.tmp` file and are renamed into place, so a
//! reader never observes a partially written record and a crash mid-write
//! leaves the previous state intact.

use std::path::{Path, PathBuf};
use terraclaw_core::{Result, RuntimeState, TerraclawError};

/// File-backed store for per-workspace runtime state.
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self { dir: dir.to_path_buf() })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Persist one state record — atomic replace via tmp + rename.
    pub fn save(&self, state: &RuntimeState) -> Result<()> {
        let path = self.path_for(&state.name);
        let tmp = self.dir.join(format!("{}.json.tmp", state.name));
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            TerraclawError::Persistence(format!("replace {}: {e}", path.display()))
        })?;
        Ok(())
    }

    /// Load one state record, if present.
    pub fn load(&self, name: &str) -> Result<Option<RuntimeState>> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Load every persisted state record. Unreadable records are skipped
    /// with a warning rather than failing daemon startup.
    pub fn load_all(&self) -> Result<Vec<RuntimeState>> {
        let mut states = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_none_or(|e| e != "json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(TerraclawError::from)
                .and_then(|c| Ok(serde_json::from_str::<RuntimeState>(&c)?))
            {
                Ok(state) => states.push(state),
                Err(e) => {
                    tracing::warn!("⚠️ Skipping unreadable state file {}: {e}", path.display());
                }
            }
        }
        states.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(states)
    }

    /// Remove a workspace's state record.
    pub fn remove(&self, name: &str) -> Result<()> {
        let path = self.path_for(name);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terraclaw_core::WorkspaceStatus;

    fn scratch(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("terraclaw-test-store-{tag}"));
        std::fs::remove_dir_all(&dir).ok();
        dir
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = scratch("roundtrip");
        let store = StateStore::new(&dir).unwrap();

        let mut state = RuntimeState::new("w1");
        state.transition(WorkspaceStatus::Deployed);
        state.last_deploy_fired_minute = Some(123);
        store.save(&state).unwrap();

        let loaded = store.load("w1").unwrap().unwrap();
        assert_eq!(loaded.status, WorkspaceStatus::Deployed);
        assert_eq!(loaded.last_deploy_fired_minute, Some(123));
        assert!(store.load("w2").unwrap().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_replaces_no_tmp_left() {
        let dir = scratch("replace");
        let store = StateStore::new(&dir).unwrap();
        let mut state = RuntimeState::new("w1");
        store.save(&state).unwrap();
        state.transition(WorkspaceStatus::Failed);
        store.save(&state).unwrap();

        assert_eq!(store.load("w1").unwrap().unwrap().status, WorkspaceStatus::Failed);
        assert!(!dir.join("w1.json.tmp").exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_all_skips_garbage() {
        let dir = scratch("garbage");
        let store = StateStore::new(&dir).unwrap();
        store.save(&RuntimeState::new("a")).unwrap();
        store.save(&RuntimeState::new("b")).unwrap();
        std::fs::write(dir.join("broken.json"), "{nope").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let names: Vec<_> = store.load_all().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_remove() {
        let dir = scratch("remove");
        let store = StateStore::new(&dir).unwrap();
        store.save(&RuntimeState::new("w1")).unwrap();
        store.remove("w1").unwrap();
        assert!(store.load("w1").unwrap().is_none());
        // Removing a missing record is not an error.
        store.remove("w1").unwrap();
        std::fs::remove_dir_all(&dir).ok();
    }
}
