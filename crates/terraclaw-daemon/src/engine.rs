//! The scheduler engine — poll loop, reconciliation, and lifecycle actions.
//!
//! ## Design
//! - One tick per poll interval: re-read definitions, reconcile handles,
//!   evaluate every schedule against the current minute.
//! - Matched fires are recorded on persisted state *before* the action task
//!   is spawned, so a crash between match and completion never double-fires.
//! - Actions run in spawned tasks holding the workspace's try-lock; the
//!   tick itself never awaits external processes.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use terraclaw_core::{
    ActionKind, ActionOutcome, CommandSet, DaemonConfig, Result, RuntimeState, ScheduleSet,
    TerraclawError, WorkspaceDef, WorkspaceStatus,
};
use terraclaw_provisioner::{Provisioner, Step, deploy_steps, destroy_steps};
use terraclaw_registry::TemplateRegistry;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info, warn};

use crate::lifecycle::{Trigger, WorkspaceHandle, can_deploy, can_destroy};
use crate::source::ConfigSource;
use crate::store::StateStore;

/// The daemon engine. One instance per process, shared behind `Arc`.
pub struct DaemonEngine {
    config: DaemonConfig,
    source: Box<dyn ConfigSource>,
    registry: Arc<TemplateRegistry>,
    provisioner: Arc<dyn Provisioner>,
    store: StateStore,
    workspaces: RwLock<HashMap<String, Arc<WorkspaceHandle>>>,
    reload: Notify,
}

impl DaemonEngine {
    /// Build the engine and run restart recovery: any state left in an
    /// in-flight status by a previous process is marked failed/interrupted
    /// before scheduling starts.
    pub fn new(
        config: DaemonConfig,
        source: Box<dyn ConfigSource>,
        registry: Arc<TemplateRegistry>,
        provisioner: Arc<dyn Provisioner>,
    ) -> Result<Self> {
        let store = StateStore::new(&config.state_dir())?;

        for mut state in store.load_all()? {
            if state.status.is_in_flight() {
                let action = match state.status {
                    WorkspaceStatus::Destroying => ActionKind::Destroy,
                    _ => ActionKind::Deploy,
                };
                warn!(
                    "⚠️ Workspace '{}' was mid-{} at shutdown, marking failed",
                    state.name, action
                );
                state.finish(ActionOutcome {
                    action,
                    success: false,
                    message: TerraclawError::Interrupted(state.name.clone()).to_string(),
                    output: String::new(),
                    finished_at: Utc::now(),
                });
                store.save(&state)?;
            }
        }

        Ok(Self {
            config,
            source,
            registry,
            provisioner,
            store,
            workspaces: RwLock::new(HashMap::new()),
            reload: Notify::new(),
        })
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// The template registry, for registry operations surfaced by the CLI.
    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// Wake the poll loop before its next interval tick (definitions change).
    pub fn request_reload(&self) {
        self.reload.notify_one();
    }

    // ─── Poll loop ────────────────────────────────────────────

    /// Run until `shutdown` is notified. In-flight actions finish and
    /// persist their outcome; only the loop itself stops.
    pub async fn run(self: Arc<Self>, shutdown: Arc<Notify>) {
        info!(
            "⏰ Scheduler started (poll every {}s)",
            self.config.poll_interval_secs
        );
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.reload.notified() => {
                    debug!("🔄 Reload requested, re-reading definitions");
                }
                _ = shutdown.notified() => {
                    info!("✅ Scheduler stopping");
                    return;
                }
            }
            self.tick(Utc::now()).await;
        }
    }

    /// One scheduling pass at `now`: reconcile definitions, then fire every
    /// schedule whose minute matches and was not already fired.
    pub async fn tick(self: &Arc<Self>, now: DateTime<Utc>) {
        if let Err(e) = self.reconcile().await {
            // Keep running with the previous definition set.
            warn!("⚠️ Skipping reconcile this tick: {e}");
        }

        let handles: Vec<Arc<WorkspaceHandle>> =
            self.workspaces.read().await.values().cloned().collect();

        for handle in handles {
            if !handle.def.read().await.enabled {
                continue;
            }
            let (deploy_set, destroy_set) = handle.schedules.read().await.clone();

            let mut state = handle.state.write().await;
            if state.status.is_in_flight() {
                continue;
            }

            if can_deploy(state.status, Trigger::Scheduled) {
                if let Some(minute) = deploy_set.should_fire(now, state.last_deploy_fired_minute) {
                    state.last_deploy_fired_minute = Some(minute);
                    self.persist(&state);
                    info!("📅 Schedule matched: deploy '{}'", handle.name);
                    self.spawn_action(&handle.name, ActionKind::Deploy);
                    continue;
                }
            }
            if can_destroy(state.status, Trigger::Scheduled) {
                if let Some(minute) = destroy_set.should_fire(now, state.last_destroy_fired_minute)
                {
                    state.last_destroy_fired_minute = Some(minute);
                    self.persist(&state);
                    info!("📅 Schedule matched: destroy '{}'", handle.name);
                    self.spawn_action(&handle.name, ActionKind::Destroy);
                }
            }
        }
    }

    fn spawn_action(self: &Arc<Self>, name: &str, action: ActionKind) {
        let engine = Arc::clone(self);
        let name = name.to_string();
        tokio::spawn(async move {
            let result = match action {
                ActionKind::Deploy => engine.deploy(&name, Trigger::Scheduled).await,
                ActionKind::Destroy => engine.destroy(&name, Trigger::Scheduled).await,
            };
            match result {
                Ok(outcome) if outcome.success => {}
                Ok(outcome) => {
                    warn!("⚠️ Scheduled {} of '{}' failed: {}", action, name, outcome.message);
                }
                Err(e) if e.kind() == "busy" => {
                    debug!("Scheduled {} of '{}' dropped, workspace busy", action, name);
                }
                Err(e) => {
                    warn!("⚠️ Scheduled {} of '{}' refused: {e}", action, name);
                }
            }
        });
    }

    /// Re-read definitions and converge the handle map: add new workspaces
    /// (restoring persisted state), refresh changed definitions, and drop
    /// removed workspaces along with their state records.
    async fn reconcile(&self) -> Result<()> {
        let defs = self.source.load()?;
        let mut map = self.workspaces.write().await;
        let mut seen: HashSet<String> = HashSet::new();

        for def in defs {
            if def.name.is_empty() || seen.contains(&def.name) {
                warn!("⚠️ Ignoring duplicate or unnamed workspace definition");
                continue;
            }
            match def.validate() {
                Ok(schedules) => {
                    seen.insert(def.name.clone());
                    if let Some(handle) = map.get(&def.name) {
                        *handle.def.write().await = def;
                        *handle.schedules.write().await = schedules;
                    } else {
                        let state = match self.store.load(&def.name)? {
                            Some(state) => state,
                            None => {
                                let state = RuntimeState::new(&def.name);
                                self.store.save(&state)?;
                                state
                            }
                        };
                        info!("📦 Workspace registered: '{}'", def.name);
                        map.insert(
                            def.name.clone(),
                            Arc::new(WorkspaceHandle::new(def, schedules, state)),
                        );
                    }
                }
                Err(e) => {
                    warn!("⚠️ Workspace '{}' definition invalid, scheduling frozen: {e}", def.name);
                    // The definition still exists, so the workspace is not
                    // removed: keep handle and state, stop firing schedules
                    // until the definition is fixed.
                    seen.insert(def.name.clone());
                    if let Some(handle) = map.get(&def.name) {
                        *handle.schedules.write().await =
                            (ScheduleSet::default(), ScheduleSet::default());
                    } else if let Some(state) = self.store.load(&def.name)? {
                        // Restart with a broken definition: restore the
                        // persisted state under a frozen handle.
                        map.insert(
                            def.name.clone(),
                            Arc::new(WorkspaceHandle::new(
                                def,
                                (ScheduleSet::default(), ScheduleSet::default()),
                                state,
                            )),
                        );
                    }
                }
            }
        }

        // Removed definitions: drop the handle and its state record, but
        // never under a running action — retry on a later tick instead.
        let gone: Vec<String> = map.keys().filter(|n| !seen.contains(*n)).cloned().collect();
        for name in gone {
            let busy = match map.get(&name) {
                Some(handle) => handle.lock.try_lock().is_err(),
                None => continue,
            };
            if busy {
                debug!("Workspace '{}' removed from config but busy, keeping for now", name);
                continue;
            }
            map.remove(&name);
            self.store.remove(&name)?;
            info!("🧹 Workspace removed: '{}'", name);
        }

        // Orphaned state files (workspace deleted while daemon was down).
        // Anything still named in the definitions file stays, even when the
        // definition failed validation.
        for state in self.store.load_all()? {
            if !map.contains_key(&state.name) && !seen.contains(&state.name) {
                self.store.remove(&state.name)?;
            }
        }
        Ok(())
    }

    // ─── Actions ──────────────────────────────────────────────

    /// Deploy a workspace: materialize its configuration, then run the
    /// init/plan/apply sequence. Holds the workspace lock for the duration.
    pub async fn deploy(&self, name: &str, trigger: Trigger) -> Result<ActionOutcome> {
        let handle = self.handle(name).await?;
        let _guard = handle
            .lock
            .try_lock()
            .map_err(|_| TerraclawError::Busy(name.to_string()))?;

        let def = handle.def.read().await.clone();
        if !trigger.is_manual() && !def.enabled {
            return Err(TerraclawError::Disabled(name.to_string()));
        }
        let status = handle.state.read().await.status;
        if !can_deploy(status, trigger) {
            return Err(TerraclawError::Validation(format!(
                "workspace '{name}' is {status}, deploy not applicable"
            )));
        }

        info!("🔧 Deploying workspace '{}'", name);
        self.set_status(&handle, WorkspaceStatus::Deploying).await;

        let steps = deploy_steps(&CommandSet::for_deploy(&def));
        let outcome = self
            .run_sequence(&def, ActionKind::Deploy, steps)
            .await
            .unwrap_or_else(|e| failed_outcome(ActionKind::Deploy, e));

        self.finish(&handle, outcome.clone()).await;
        if outcome.success {
            info!("✅ Workspace '{}' deployed", name);
        }
        Ok(outcome)
    }

    /// Destroy a workspace: run init/destroy inside its working directory.
    pub async fn destroy(&self, name: &str, trigger: Trigger) -> Result<ActionOutcome> {
        let handle = self.handle(name).await?;
        let _guard = handle
            .lock
            .try_lock()
            .map_err(|_| TerraclawError::Busy(name.to_string()))?;

        let def = handle.def.read().await.clone();
        if !trigger.is_manual() && !def.enabled {
            return Err(TerraclawError::Disabled(name.to_string()));
        }
        let status = handle.state.read().await.status;
        if !can_destroy(status, trigger) {
            return Err(TerraclawError::Validation(format!(
                "workspace '{name}' is {status}, destroy not applicable"
            )));
        }

        info!("🧹 Destroying workspace '{}'", name);
        self.set_status(&handle, WorkspaceStatus::Destroying).await;

        let steps = destroy_steps(&CommandSet::for_destroy(&def));
        let outcome = self
            .run_sequence(&def, ActionKind::Destroy, steps)
            .await
            .unwrap_or_else(|e| failed_outcome(ActionKind::Destroy, e));

        self.finish(&handle, outcome.clone()).await;
        if outcome.success {
            info!("✅ Workspace '{}' destroyed", name);
        }
        Ok(outcome)
    }

    /// Resolve the working directory for `def` and run `steps` in order,
    /// stopping at the first non-success. Step failures become a failed
    /// outcome, not an `Err` — `Err` is reserved for refusals before any
    /// step runs.
    async fn run_sequence(
        &self,
        def: &WorkspaceDef,
        action: ActionKind,
        steps: Vec<Step>,
    ) -> Result<ActionOutcome> {
        let dir = self.materialize(def)?;
        let timeout = Duration::from_secs(self.config.action_timeout_secs);
        let mut output = String::new();

        for step in steps {
            let result = self
                .provisioner
                .run(step.action, &dir, step.command_override.as_deref(), timeout)
                .await;
            match result {
                Ok(run) => {
                    if !output.is_empty() {
                        output.push('\n');
                    }
                    output.push_str(&run.output);
                    if !run.success {
                        return Ok(ActionOutcome {
                            action,
                            success: false,
                            message: format!(
                                "{} failed at {} (exit {})",
                                action, step.action, run.exit_code
                            ),
                            output: tail(&output, self.config.keep_logs_bytes),
                            finished_at: Utc::now(),
                        });
                    }
                }
                Err(e) => {
                    return Ok(ActionOutcome {
                        action,
                        success: false,
                        message: format!("{} failed at {}: {e}", action, step.action),
                        output: tail(&output, self.config.keep_logs_bytes),
                        finished_at: Utc::now(),
                    });
                }
            }
        }

        Ok(ActionOutcome {
            action,
            success: true,
            message: format!("{action} complete"),
            output: tail(&output, self.config.keep_logs_bytes),
            finished_at: Utc::now(),
        })
    }

    /// Working directory for a workspace: a template materialized under the
    /// daemon's work dir, or the definition's inline source directory.
    fn materialize(&self, def: &WorkspaceDef) -> Result<PathBuf> {
        if let Some(template) = &def.template {
            let dest = self.config.work_dir().join(&def.name);
            self.registry.resolve(&template.name, &template.variables, &dest)?;
            return Ok(dest);
        }
        if let Some(source_dir) = &def.source_dir {
            if !source_dir.is_dir() {
                return Err(TerraclawError::Validation(format!(
                    "workspace '{}': source_dir {} does not exist",
                    def.name,
                    source_dir.display()
                )));
            }
            return Ok(source_dir.clone());
        }
        Err(TerraclawError::Validation(format!(
            "workspace '{}' has neither a template nor a source_dir",
            def.name
        )))
    }

    // ─── Queries ──────────────────────────────────────────────

    /// Runtime state of one workspace.
    pub async fn status(&self, name: &str) -> Result<RuntimeState> {
        let handle = self.handle(name).await?;
        let state = handle.state.read().await.clone();
        Ok(state)
    }

    /// Runtime state of every known workspace, ordered by name.
    pub async fn status_all(&self) -> Vec<RuntimeState> {
        let map = self.workspaces.read().await;
        let mut states = Vec::with_capacity(map.len());
        for handle in map.values() {
            states.push(handle.state.read().await.clone());
        }
        states.sort_by(|a, b| a.name.cmp(&b.name));
        states
    }

    /// Captured output of the workspace's most recent action.
    pub async fn logs(&self, name: &str) -> Result<String> {
        let state = self.status(name).await?;
        Ok(match state.last_outcome {
            Some(outcome) if !outcome.output.is_empty() => outcome.output,
            Some(outcome) => outcome.message,
            None => format!("workspace '{name}' has no recorded actions yet"),
        })
    }

    /// Remove a template, refusing while any workspace definition still
    /// references it (unless forced).
    pub async fn remove_template(&self, name: &str, force: bool) -> Result<()> {
        let used_by = {
            let map = self.workspaces.read().await;
            let mut found = None;
            for handle in map.values() {
                let def = handle.def.read().await;
                if def.template.as_ref().is_some_and(|t| t.name == name) {
                    found = Some(def.name.clone());
                    break;
                }
            }
            found
        };
        self.registry.remove(name, force, used_by.as_deref())
    }

    // ─── Internals ────────────────────────────────────────────

    async fn handle(&self, name: &str) -> Result<Arc<WorkspaceHandle>> {
        self.workspaces
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| TerraclawError::NotFound(format!("workspace '{name}'")))
    }

    async fn set_status(&self, handle: &WorkspaceHandle, status: WorkspaceStatus) {
        let mut state = handle.state.write().await;
        state.transition(status);
        self.persist(&state);
    }

    async fn finish(&self, handle: &WorkspaceHandle, outcome: ActionOutcome) {
        let mut state = handle.state.write().await;
        state.finish(outcome);
        self.persist(&state);
    }

    fn persist(&self, state: &RuntimeState) {
        if let Err(e) = self.store.save(state) {
            warn!("⚠️ Failed to persist state for '{}': {e}", state.name);
        }
    }
}

fn failed_outcome(action: ActionKind, e: TerraclawError) -> ActionOutcome {
    ActionOutcome {
        action,
        success: false,
        message: e.to_string(),
        output: String::new(),
        finished_at: Utc::now(),
    }
}

/// Keep the last `max` bytes of `s` (the end of the output is where the
/// failure usually is), respecting char boundaries.
fn tail(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    format!("[...truncated...]\n{}", &s[start..])
}
