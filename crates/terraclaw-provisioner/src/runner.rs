//! Process runner — spawns provisioning steps with a wall-clock bound.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use terraclaw_core::{Result, TerraclawError};

use crate::action::Action;

/// Captured result of one provisioning step.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub success: bool,
    /// Combined stdout + stderr.
    pub output: String,
    pub exit_code: i32,
}

/// The call contract exposed to the lifecycle engine.
///
/// Implementations run one action to completion inside `working_dir`; the
/// default command for the action is used unless `command_override` is set.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn run(
        &self,
        action: Action,
        working_dir: &Path,
        command_override: Option<&str>,
        timeout: Duration,
    ) -> Result<RunOutput>;
}

/// Runs steps through `sh -c`, so custom overrides and the default terraform
/// command lines go through the same path.
#[derive(Debug, Default)]
pub struct ShellProvisioner;

impl ShellProvisioner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Provisioner for ShellProvisioner {
    async fn run(
        &self,
        action: Action,
        working_dir: &Path,
        command_override: Option<&str>,
        timeout: Duration,
    ) -> Result<RunOutput> {
        let command = command_override
            .map(str::to_string)
            .unwrap_or_else(|| action.default_command().to_string());

        tracing::debug!("🔧 {} in {}: {}", action, working_dir.display(), command);

        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(working_dir)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Ok(Ok(o)) => o,
            Ok(Err(e)) => {
                return Err(TerraclawError::Execution(format!(
                    "failed to spawn {action} ('{command}'): {e}"
                )));
            }
            // Dropping the output future kills the child (kill_on_drop).
            Err(_) => return Err(TerraclawError::Timeout(timeout.as_secs())),
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&stderr);
        }

        Ok(RunOutput {
            success: output.status.success(),
            output: text,
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("terraclaw-test-runner-{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_override_runs_and_captures_output() {
        let dir = scratch("echo");
        let p = ShellProvisioner::new();
        let out = p
            .run(Action::Apply, &dir, Some("echo applied"), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.exit_code, 0);
        assert!(out.output.contains("applied"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_captured_not_error() {
        let dir = scratch("fail");
        let p = ShellProvisioner::new();
        let out = p
            .run(Action::Plan, &dir, Some("echo broken >&2; exit 3"), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.exit_code, 3);
        assert!(out.output.contains("broken"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_timeout_kills_and_reports() {
        let dir = scratch("sleep");
        let p = ShellProvisioner::new();
        let err = p
            .run(Action::Apply, &dir, Some("sleep 30"), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "timeout");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let dir = scratch("cwd");
        std::fs::write(dir.join("marker.txt"), "here").unwrap();
        let p = ShellProvisioner::new();
        let out = p
            .run(Action::Init, &dir, Some("cat marker.txt"), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(out.success);
        assert!(out.output.contains("here"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
