//! # TerraClaw Core
//!
//! Shared data model for the TerraClaw daemon: configuration, error kinds,
//! the cron schedule evaluator, workspace definitions, and per-workspace
//! runtime state.
//!
//! ## Architecture
//! ```text
//! Config Source (JSON) ──▶ WorkspaceDef ──▶ ScheduleSet.should_fire(now)
//!                                              │
//!                                              ▼
//!                          RuntimeState ◀── deploy/destroy action
//! ```
//!
//! Everything here is pure data + pure functions — no I/O except config
//! file loading. The daemon crate owns the loop, locks, and persistence.

pub mod config;
pub mod error;
pub mod schedule;
pub mod state;
pub mod workspace;

pub use config::DaemonConfig;
pub use error::{Result, TerraclawError};
pub use schedule::{CronExpr, ScheduleSet, epoch_minute};
pub use state::{ActionKind, ActionOutcome, RuntimeState, WorkspaceStatus};
pub use workspace::{CommandSet, ScheduleInput, TemplateRef, WorkspaceDef};
