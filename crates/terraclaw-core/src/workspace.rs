//! Workspace definitions — the read-only input contract from the config source.
//!
//! The daemon re-reads definitions every poll; nothing here is mutated by the
//! scheduling engine. Schedules accept a single cron string or an array of
//! strings, both meaning an OR set.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Result, TerraclawError};
use crate::schedule::ScheduleSet;

/// One or many cron expression strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScheduleInput {
    /// A single expression, equivalent to a one-element array.
    One(String),
    /// An ordered set of expressions with OR semantics.
    Many(Vec<String>),
}

impl Default for ScheduleInput {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl ScheduleInput {
    /// Normalize to a list of expression strings.
    pub fn as_list(&self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s.clone()],
            Self::Many(v) => v.clone(),
        }
    }

    /// Parse into a validated schedule set.
    pub fn parse(&self) -> Result<ScheduleSet> {
        ScheduleSet::parse(&self.as_list())
    }
}

/// Reference to a registered template plus per-workspace variable overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    /// Template name as registered in the template registry.
    pub name: String,
    /// Variable values bound into the materialized configuration.
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

/// Custom command lines replacing the default deploy sequence.
/// Run in the same order: init, then plan (if set), then apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomDeploy {
    pub init: String,
    #[serde(default)]
    pub plan: Option<String>,
    pub apply: String,
}

/// Custom command lines replacing the default destroy sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomDestroy {
    pub init: String,
    pub destroy: String,
}

/// A workspace definition, owned by the external config source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceDef {
    /// Unique, filesystem-safe name.
    pub name: String,
    /// Scheduled triggers only run while enabled; manual ops bypass this.
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Cron set that triggers deploys. Must be non-empty.
    pub deploy_schedule: ScheduleInput,
    /// Cron set that triggers destroys. May be empty.
    #[serde(default)]
    pub destroy_schedule: ScheduleInput,
    /// Free text, surfaced in status output.
    #[serde(default)]
    pub description: String,
    /// Instantiate from a registered template instead of an inline directory.
    #[serde(default)]
    pub template: Option<TemplateRef>,
    /// Inline configuration directory (used when no template is referenced).
    #[serde(default)]
    pub source_dir: Option<std::path::PathBuf>,
    /// Override for the deploy sequence.
    #[serde(default)]
    pub custom_deploy: Option<CustomDeploy>,
    /// Override for the destroy sequence.
    #[serde(default)]
    pub custom_destroy: Option<CustomDestroy>,
}

fn bool_true() -> bool {
    true
}

impl WorkspaceDef {
    /// Validate the definition: name shape and schedule syntax.
    ///
    /// Returns the parsed (deploy, destroy) schedule sets so load-time
    /// validation and evaluation share one parse.
    pub fn validate(&self) -> Result<(ScheduleSet, ScheduleSet)> {
        if self.name.is_empty() {
            return Err(TerraclawError::Validation("workspace name is empty".into()));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(TerraclawError::Validation(format!(
                "workspace name '{}' is not filesystem-safe (allowed: alphanumerics, '-', '_')",
                self.name
            )));
        }

        let deploy = self.deploy_schedule.parse()?;
        if deploy.is_empty() {
            return Err(TerraclawError::Validation(format!(
                "workspace '{}' has an empty deploy schedule",
                self.name
            )));
        }
        let destroy = self.destroy_schedule.parse()?;
        Ok((deploy, destroy))
    }
}

/// How an action's steps are sourced — selected once per action, then the
/// lifecycle engine runs the steps uniformly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSet {
    /// The provisioner's built-in sequence (terraform init/plan/apply/destroy).
    Default,
    /// Opaque command lines from the workspace definition.
    Custom {
        init: String,
        plan: Option<String>,
        apply: Option<String>,
        destroy: Option<String>,
    },
}

impl CommandSet {
    /// Command set for a deploy action of this workspace.
    pub fn for_deploy(def: &WorkspaceDef) -> Self {
        match &def.custom_deploy {
            Some(c) => Self::Custom {
                init: c.init.clone(),
                plan: c.plan.clone(),
                apply: Some(c.apply.clone()),
                destroy: None,
            },
            None => Self::Default,
        }
    }

    /// Command set for a destroy action of this workspace.
    pub fn for_destroy(def: &WorkspaceDef) -> Self {
        match &def.custom_destroy {
            Some(c) => Self::Custom {
                init: c.init.clone(),
                plan: None,
                apply: None,
                destroy: Some(c.destroy.clone()),
            },
            None => Self::Default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(name: &str) -> WorkspaceDef {
        WorkspaceDef {
            name: name.to_string(),
            enabled: true,
            deploy_schedule: ScheduleInput::One("0 8 * * 1-5".into()),
            destroy_schedule: ScheduleInput::default(),
            description: String::new(),
            template: None,
            source_dir: None,
            custom_deploy: None,
            custom_destroy: None,
        }
    }

    #[test]
    fn test_single_string_equals_one_element_array() {
        let one: ScheduleInput = serde_json::from_str("\"0 8 * * *\"").unwrap();
        let many: ScheduleInput = serde_json::from_str("[\"0 8 * * *\"]").unwrap();
        assert_eq!(one.as_list(), many.as_list());
    }

    #[test]
    fn test_deserialize_full_definition() {
        let json = r#"{
            "name": "dev-env",
            "enabled": true,
            "deploy_schedule": ["0 8 * * 1-5", "0 13 * * 6"],
            "destroy_schedule": "0 18 * * 1-5",
            "description": "weekday dev environment",
            "template": { "name": "vpc", "variables": { "region": "eu-west-1" } },
            "custom_destroy": { "init": "make init", "destroy": "make down" }
        }"#;
        let def: WorkspaceDef = serde_json::from_str(json).unwrap();
        let (deploy, destroy) = def.validate().unwrap();
        assert_eq!(deploy.len(), 2);
        assert_eq!(destroy.len(), 1);
        assert_eq!(def.template.unwrap().variables["region"], "eu-west-1");
        assert!(matches!(CommandSet::for_destroy(&serde_json::from_str(json).unwrap()),
            CommandSet::Custom { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        for bad in ["", "a/b", "a b", "née", "x!"] {
            assert!(minimal(bad).validate().is_err(), "should reject '{bad}'");
        }
        assert!(minimal("dev_env-2").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_deploy_schedule() {
        let mut def = minimal("w1");
        def.deploy_schedule = ScheduleInput::Many(vec![]);
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_cron() {
        let mut def = minimal("w1");
        def.destroy_schedule = ScheduleInput::One("99 * * * *".into());
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_command_set_selection() {
        let def = minimal("w1");
        assert_eq!(CommandSet::for_deploy(&def), CommandSet::Default);

        let mut def = minimal("w1");
        def.custom_deploy = Some(CustomDeploy {
            init: "make init".into(),
            plan: None,
            apply: "make up".into(),
        });
        match CommandSet::for_deploy(&def) {
            CommandSet::Custom { init, plan, apply, destroy } => {
                assert_eq!(init, "make init");
                assert!(plan.is_none());
                assert_eq!(apply.as_deref(), Some("make up"));
                assert!(destroy.is_none());
            }
            CommandSet::Default => panic!("expected custom set"),
        }
    }
}
