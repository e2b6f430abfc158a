//! Config source — where workspace definitions come from.
//!
//! The daemon re-reads the full definition list every poll; the source owns
//! the definitions and the daemon treats them as read-only input.

use serde::Deserialize;
use std::path::PathBuf;
use terraclaw_core::{Result, TerraclawError, WorkspaceDef};

/// Supplier of workspace definitions, re-read on every tick.
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<Vec<WorkspaceDef>>;
}

/// JSON file source: either a bare array of definitions or
/// `{ "workspaces": [...] }`.
pub struct FileSource {
    path: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FileFormat {
    Bare(Vec<WorkspaceDef>),
    Wrapped { workspaces: Vec<WorkspaceDef> },
}

impl FileSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<Vec<WorkspaceDef>> {
        if !self.path.exists() {
            // A missing file is indistinguishable from an unmounted volume;
            // treat it as unreadable, never as "all workspaces removed".
            // An empty daemon is expressed by an empty list, not absence.
            return Err(TerraclawError::Config(format!(
                "definitions file {} not found",
                self.path.display()
            )));
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            TerraclawError::Config(format!("failed to read {}: {e}", self.path.display()))
        })?;
        let parsed: FileFormat = serde_json::from_str(&content).map_err(|e| {
            TerraclawError::Config(format!("failed to parse {}: {e}", self.path.display()))
        })?;
        Ok(match parsed {
            FileFormat::Bare(v) => v,
            FileFormat::Wrapped { workspaces } => workspaces,
        })
    }
}
