//! Error kinds for TerraClaw.
//!
//! One enum for the whole daemon — manual operations surface these verbatim
//! to the CLI/API layer, scheduled operations record them on the workspace
//! runtime state.

use thiserror::Error;

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, TerraclawError>;

/// Main error type for TerraClaw.
#[derive(Debug, Error)]
pub enum TerraclawError {
    /// Unknown workspace or template name.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate template add.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Malformed schedule expression or failed template validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Template source unreachable or ref missing.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// An action is already in flight for the target workspace.
    #[error("workspace '{0}' is busy — an action is already in flight")]
    Busy(String),

    /// Scheduled deploy refused because the workspace is disabled.
    #[error("workspace '{0}' is disabled")]
    Disabled(String),

    /// Action exceeded its wall-clock bound.
    #[error("action timed out after {0}s")]
    Timeout(u64),

    /// External provisioning step returned non-success.
    #[error("execution failed: {0}")]
    Execution(String),

    /// Template removal blocked by a workspace reference.
    #[error("template '{0}' is in use by workspace '{1}'")]
    InUse(String, String),

    /// Restart recovered an action that was mid-flight.
    #[error("interrupted: daemon restarted while '{0}' was in flight")]
    Interrupted(String),

    /// Configuration problem.
    #[error("config error: {0}")]
    Config(String),

    /// State store read/write problem.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl TerraclawError {
    /// Short machine-readable kind tag, stable across message changes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::Validation(_) => "validation_error",
            Self::Fetch(_) => "fetch_error",
            Self::Busy(_) => "busy",
            Self::Disabled(_) => "disabled",
            Self::Timeout(_) => "timeout",
            Self::Execution(_) => "execution_failure",
            Self::InUse(..) => "in_use",
            Self::Interrupted(_) => "interrupted",
            Self::Config(_) => "config_error",
            Self::Persistence(_) => "persistence_error",
            Self::Io(_) => "io_error",
            Self::Serde(_) => "serde_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(TerraclawError::NotFound("w1".into()).kind(), "not_found");
        assert_eq!(TerraclawError::Busy("w1".into()).kind(), "busy");
        assert_eq!(TerraclawError::Timeout(30).kind(), "timeout");
    }

    #[test]
    fn test_display_carries_target() {
        let e = TerraclawError::InUse("t1".into(), "w1".into());
        let msg = e.to_string();
        assert!(msg.contains("t1"));
        assert!(msg.contains("w1"));
    }
}
