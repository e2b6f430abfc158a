//! Manual operation surface — the facade handed to front ends.
//!
//! Everything here delegates to the engine; the handle exists so callers
//! hold a cheap cloneable value instead of the engine type itself.

use std::sync::Arc;

use terraclaw_core::{ActionOutcome, Result, RuntimeState};
use terraclaw_registry::{TemplateRecord, TemplateRegistry};

use crate::engine::DaemonEngine;
use crate::lifecycle::Trigger;

/// Cloneable handle for manual operations against a running daemon.
#[derive(Clone)]
pub struct DaemonHandle {
    engine: Arc<DaemonEngine>,
}

impl DaemonHandle {
    pub fn new(engine: Arc<DaemonEngine>) -> Self {
        Self { engine }
    }

    /// Deploy now, regardless of schedule. Blocks until the action finishes.
    pub async fn deploy(&self, name: &str) -> Result<ActionOutcome> {
        self.engine.deploy(name, Trigger::Manual).await
    }

    /// Destroy now, regardless of schedule. Blocks until the action finishes.
    pub async fn destroy(&self, name: &str) -> Result<ActionOutcome> {
        self.engine.destroy(name, Trigger::Manual).await
    }

    pub async fn status(&self, name: &str) -> Result<RuntimeState> {
        self.engine.status(name).await
    }

    pub async fn status_all(&self) -> Vec<RuntimeState> {
        self.engine.status_all().await
    }

    pub async fn logs(&self, name: &str) -> Result<String> {
        self.engine.logs(name).await
    }

    /// Ask the scheduler to re-read definitions before its next interval.
    pub fn reload(&self) {
        self.engine.request_reload();
    }

    // ─── Template registry passthrough ────────────────────────

    pub async fn template_add(
        &self,
        name: &str,
        source: &str,
        sub_path: Option<&str>,
        git_ref: Option<&str>,
        description: &str,
    ) -> Result<TemplateRecord> {
        self.registry().add(name, source, sub_path, git_ref, description).await
    }

    pub fn template_list(&self) -> Result<Vec<TemplateRecord>> {
        self.registry().list()
    }

    pub fn template_get(&self, name: &str) -> Result<TemplateRecord> {
        self.registry().get(name)
    }

    pub async fn template_update(&self, name: &str) -> Result<TemplateRecord> {
        self.registry().update(name).await
    }

    pub fn template_validate(&self, name: &str) -> Result<()> {
        self.registry().validate(name)
    }

    /// Remove a template; refuses while a live workspace definition
    /// references it unless `force` is set.
    pub async fn template_remove(&self, name: &str, force: bool) -> Result<()> {
        self.engine.remove_template(name, force).await
    }

    fn registry(&self) -> &TemplateRegistry {
        self.engine.registry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use terraclaw_core::{DaemonConfig, WorkspaceStatus};
    use terraclaw_provisioner::ShellProvisioner;
    use terraclaw_registry::{RegistryDb, TemplateRegistry};

    use crate::source::FileSource;

    fn scratch(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("terraclaw-test-ops-{tag}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_handle_drives_full_cycle() {
        let root = scratch("cycle");
        let src = root.join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("main.tf"), "# cfg").unwrap();

        let defs_path = root.join("workspaces.json");
        std::fs::write(
            &defs_path,
            serde_json::to_string(&serde_json::json!([{
                "name": "dev",
                "deploy_schedule": "0 8 * * *",
                "source_dir": src,
                "custom_deploy": { "init": "true", "apply": "echo applied" },
                "custom_destroy": { "init": "true", "destroy": "echo torn down" },
            }]))
            .unwrap(),
        )
        .unwrap();

        let config = DaemonConfig {
            home_dir: root.clone(),
            workspaces_file: defs_path,
            poll_interval_secs: 1,
            action_timeout_secs: 30,
            fetch_timeout_secs: 30,
            keep_logs_bytes: 64 * 1024,
        };
        let registry = Arc::new(TemplateRegistry::new(
            RegistryDb::open_in_memory().unwrap(),
            config.templates_dir(),
            Duration::from_secs(30),
        ));
        let engine = Arc::new(
            DaemonEngine::new(
                config,
                Box::new(FileSource::new(root.join("workspaces.json"))),
                registry,
                Arc::new(ShellProvisioner::new()),
            )
            .unwrap(),
        );
        // Fixed tick time, away from the definition's 08:00 match.
        engine.tick("2026-01-05T03:00:00Z".parse().unwrap()).await;

        let handle = DaemonHandle::new(engine);
        let outcome = handle.deploy("dev").await.unwrap();
        assert!(outcome.success);
        assert_eq!(handle.status("dev").await.unwrap().status, WorkspaceStatus::Deployed);
        assert!(handle.logs("dev").await.unwrap().contains("applied"));

        let outcome = handle.destroy("dev").await.unwrap();
        assert!(outcome.success);
        assert_eq!(
            handle.status_all().await[0].status,
            WorkspaceStatus::Destroyed
        );

        assert_eq!(handle.deploy("missing").await.unwrap_err().kind(), "not_found");
        assert!(handle.template_list().unwrap().is_empty());
        handle.reload();

        std::fs::remove_dir_all(&root).ok();
    }
}
