//! Provisioning actions and step sequences.

use terraclaw_core::CommandSet;

/// One provisioning action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Init,
    Plan,
    Apply,
    Destroy,
}

impl Action {
    /// Default terraform command line for this action.
    pub fn default_command(&self) -> &'static str {
        match self {
            Self::Init => "terraform init -input=false",
            Self::Plan => "terraform plan -input=false",
            Self::Apply => "terraform apply -auto-approve -input=false",
            Self::Destroy => "terraform destroy -auto-approve -input=false",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Init => "init",
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        })
    }
}

/// One step of a sequence: an action plus its optional command override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub action: Action,
    pub command_override: Option<String>,
}

impl Step {
    fn default_for(action: Action) -> Self {
        Self { action, command_override: None }
    }

    /// Effective command line for this step.
    pub fn command(&self) -> &str {
        self.command_override
            .as_deref()
            .unwrap_or_else(|| self.action.default_command())
    }
}

/// Steps for a deploy: init, then plan, then apply.
/// A failing plan aborts the sequence before apply runs.
pub fn deploy_steps(commands: &CommandSet) -> Vec<Step> {
    match commands {
        CommandSet::Default => vec![
            Step::default_for(Action::Init),
            Step::default_for(Action::Plan),
            Step::default_for(Action::Apply),
        ],
        CommandSet::Custom { init, plan, apply, .. } => {
            let mut steps = vec![Step {
                action: Action::Init,
                command_override: Some(init.clone()),
            }];
            if let Some(plan) = plan {
                steps.push(Step { action: Action::Plan, command_override: Some(plan.clone()) });
            }
            if let Some(apply) = apply {
                steps.push(Step { action: Action::Apply, command_override: Some(apply.clone()) });
            }
            steps
        }
    }
}

/// Steps for a destroy: init, then destroy.
pub fn destroy_steps(commands: &CommandSet) -> Vec<Step> {
    match commands {
        CommandSet::Default => vec![
            Step::default_for(Action::Init),
            Step::default_for(Action::Destroy),
        ],
        CommandSet::Custom { init, destroy, .. } => {
            let mut steps = vec![Step {
                action: Action::Init,
                command_override: Some(init.clone()),
            }];
            if let Some(destroy) = destroy {
                steps.push(Step {
                    action: Action::Destroy,
                    command_override: Some(destroy.clone()),
                });
            }
            steps
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_deploy_sequence_order() {
        let steps = deploy_steps(&CommandSet::Default);
        let actions: Vec<_> = steps.iter().map(|s| s.action).collect();
        assert_eq!(actions, vec![Action::Init, Action::Plan, Action::Apply]);
        assert!(steps[2].command().contains("apply"));
    }

    #[test]
    fn test_custom_deploy_without_plan() {
        let set = CommandSet::Custom {
            init: "make init".into(),
            plan: None,
            apply: Some("make up".into()),
            destroy: None,
        };
        let steps = deploy_steps(&set);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].command(), "make init");
        assert_eq!(steps[1].command(), "make up");
    }

    #[test]
    fn test_destroy_sequence() {
        let steps = destroy_steps(&CommandSet::Default);
        let actions: Vec<_> = steps.iter().map(|s| s.action).collect();
        assert_eq!(actions, vec![Action::Init, Action::Destroy]);

        let set = CommandSet::Custom {
            init: "make init".into(),
            plan: None,
            apply: None,
            destroy: Some("make down".into()),
        };
        assert_eq!(destroy_steps(&set)[1].command(), "make down");
    }
}
