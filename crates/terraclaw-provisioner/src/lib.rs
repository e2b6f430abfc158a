//! # TerraClaw Provisioner
//!
//! The external-process boundary: runs one provisioning step at a time
//! (init/plan/apply/destroy) inside a materialized working directory and
//! reports success plus captured output. TerraClaw never parses tool output
//! beyond that — the configuration language is opaque content.
//!
//! Steps are bounded by a caller-supplied timeout; on timeout the child is
//! killed and the step reports `Timeout`.

pub mod action;
pub mod runner;

pub use action::{Action, Step, deploy_steps, destroy_steps};
pub use runner::{Provisioner, RunOutput, ShellProvisioner};
