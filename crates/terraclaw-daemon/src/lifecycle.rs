//! Workspace lifecycle — handles, triggers, and transition guards.
//!
//! One `WorkspaceHandle` exists per workspace name for the registry's
//! lifetime; its `lock` field is the serialization point — an action holds
//! it for the full init/plan/apply (or init/destroy) run, and acquisition
//! is always try-lock so schedule ticks never stall.

use terraclaw_core::{RuntimeState, ScheduleSet, WorkspaceDef, WorkspaceStatus};
use tokio::sync::{Mutex, RwLock};

/// Who requested an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Fired by the scheduler loop. Respects the enabled flag and is
    /// silently dropped when the workspace is busy.
    Scheduled,
    /// Requested through the CLI/API surface. Bypasses the enabled flag
    /// and reports `Busy` instead of being dropped.
    Manual,
}

impl Trigger {
    pub fn is_manual(&self) -> bool {
        matches!(self, Self::Manual)
    }
}

/// Per-workspace live state: definition, parsed schedules, runtime state,
/// and the action lock.
pub struct WorkspaceHandle {
    pub name: String,
    pub def: RwLock<WorkspaceDef>,
    /// Parsed (deploy, destroy) schedule sets, refreshed on reconcile.
    /// Frozen to empty sets when the current definition fails validation.
    pub schedules: RwLock<(ScheduleSet, ScheduleSet)>,
    pub state: RwLock<RuntimeState>,
    /// Held for the duration of one action. Never awaited — try-lock only.
    pub lock: Mutex<()>,
}

impl WorkspaceHandle {
    pub fn new(def: WorkspaceDef, schedules: (ScheduleSet, ScheduleSet), state: RuntimeState) -> Self {
        Self {
            name: def.name.clone(),
            def: RwLock::new(def),
            schedules: RwLock::new(schedules),
            state: RwLock::new(state),
            lock: Mutex::new(()),
        }
    }
}

/// Whether a deploy may start from `status`.
///
/// Scheduled deploys run only toward absent infrastructure
/// (`Idle`/`Destroyed`/`Failed`); a manual deploy may also re-apply over
/// `Deployed`. In-flight states never accept a new action.
pub fn can_deploy(status: WorkspaceStatus, trigger: Trigger) -> bool {
    match status {
        WorkspaceStatus::Idle | WorkspaceStatus::Destroyed | WorkspaceStatus::Failed => true,
        WorkspaceStatus::Deployed => trigger.is_manual(),
        WorkspaceStatus::Deploying | WorkspaceStatus::Destroying => false,
    }
}

/// Whether a destroy may start from `status`.
///
/// Scheduled destroys only tear down `Deployed` infrastructure; a manual
/// destroy is allowed from any settled state (explicit human intent, e.g.
/// cleaning up after a failed deploy).
pub fn can_destroy(status: WorkspaceStatus, trigger: Trigger) -> bool {
    match status {
        WorkspaceStatus::Deployed => true,
        WorkspaceStatus::Idle | WorkspaceStatus::Destroyed | WorkspaceStatus::Failed => {
            trigger.is_manual()
        }
        WorkspaceStatus::Deploying | WorkspaceStatus::Destroying => false,
    }
}
