//! # TerraClaw Daemon
//!
//! The process-wide engine: polls workspace definitions, evaluates cron
//! schedules, and drives per-workspace deploy/destroy actions through the
//! provisioner — one long-lived poll loop plus one spawned task per
//! in-flight action.
//!
//! ## Guarantees
//! - At most one action per workspace at a time (per-workspace try-lock).
//! - Every state transition is persisted before the next step runs.
//! - The poll loop never blocks on external process execution.
//! - A crash mid-action surfaces as `Failed`/interrupted on restart,
//!   never as a silently resumed action.

pub mod engine;
pub mod lifecycle;
pub mod ops;
pub mod source;
pub mod store;

pub use engine::DaemonEngine;
pub use ops::DaemonHandle;
pub use lifecycle::{Trigger, WorkspaceHandle};
pub use source::{ConfigSource, FileSource};
pub use store::StateStore;
