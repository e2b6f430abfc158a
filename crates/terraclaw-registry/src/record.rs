//! Template records — the registry's persisted metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One registered template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRecord {
    /// Unique template name.
    pub name: String,
    /// Source location: local path, `file://`, git URL, or `http(s)://`.
    pub source: String,
    /// Sub-path inside the fetched source holding the configuration.
    #[serde(default)]
    pub sub_path: Option<String>,
    /// Branch/tag/commit selector, where the source scheme supports one.
    #[serde(default)]
    pub git_ref: Option<String>,
    /// Opaque resolved version recorded after each successful fetch
    /// (commit hash for git, content digest otherwise).
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
