//! Per-workspace runtime state — the persisted lifecycle record.
//!
//! Exactly one `RuntimeState` exists per workspace name; it is the
//! serialization point that prevents concurrent deploy/destroy of the same
//! workspace. Every transition is persisted by the daemon's state store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkspaceStatus {
    /// No infrastructure believed present.
    Idle,
    /// A deploy action is in flight.
    Deploying,
    /// Last deploy succeeded; infrastructure believed present.
    Deployed,
    /// A destroy action is in flight.
    Destroying,
    /// Last destroy succeeded. Equivalent to Idle for scheduling purposes.
    Destroyed,
    /// Last action errored; retained until the next successful action.
    Failed,
}

impl WorkspaceStatus {
    /// True while a deploy or destroy action is running.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Deploying | Self::Destroying)
    }
}

impl std::fmt::Display for WorkspaceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Deploying => "deploying",
            Self::Deployed => "deployed",
            Self::Destroying => "destroying",
            Self::Destroyed => "destroyed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Which lifecycle action produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Deploy,
    Destroy,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Deploy => "deploy",
            Self::Destroy => "destroy",
        })
    }
}

/// Result of the most recent action, kept for status and logs queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action: ActionKind,
    pub success: bool,
    /// Human-readable cause on failure, short summary on success.
    pub message: String,
    /// Captured provisioner output, truncated to the configured budget.
    #[serde(default)]
    pub output: String,
    pub finished_at: DateTime<Utc>,
}

/// The persisted lifecycle record for one workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeState {
    pub name: String,
    pub status: WorkspaceStatus,
    /// Matched epoch-minute of the last deploy fire, for de-duplication.
    #[serde(default)]
    pub last_deploy_fired_minute: Option<i64>,
    /// Matched epoch-minute of the last destroy fire.
    #[serde(default)]
    pub last_destroy_fired_minute: Option<i64>,
    /// Outcome of the most recent completed action.
    #[serde(default)]
    pub last_outcome: Option<ActionOutcome>,
    /// When the last successful deploy finished.
    #[serde(default)]
    pub last_deployed_at: Option<DateTime<Utc>>,
    /// When the last successful destroy finished.
    #[serde(default)]
    pub last_destroyed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl RuntimeState {
    /// Fresh state for a newly observed workspace.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: WorkspaceStatus::Idle,
            last_deploy_fired_minute: None,
            last_destroy_fired_minute: None,
            last_outcome: None,
            last_deployed_at: None,
            last_destroyed_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Record a status transition.
    pub fn transition(&mut self, status: WorkspaceStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Record a completed action outcome and the matching status.
    pub fn finish(&mut self, outcome: ActionOutcome) {
        let now = outcome.finished_at;
        self.status = match (outcome.action, outcome.success) {
            (ActionKind::Deploy, true) => {
                self.last_deployed_at = Some(now);
                WorkspaceStatus::Deployed
            }
            (ActionKind::Destroy, true) => {
                self.last_destroyed_at = Some(now);
                WorkspaceStatus::Destroyed
            }
            (_, false) => WorkspaceStatus::Failed,
        };
        self.last_outcome = Some(outcome);
        self.updated_at = Utc::now();
    }
}
