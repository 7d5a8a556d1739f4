use std::sync::Arc;

use anyhow::Result;
use serde_json::{Map, Value};

use super::{take_bool, take_object, take_string};
use crate::action::{Action, ActionArgs, ActionContext, ArgDocs};
use crate::error::{ActionError, RunnerError};
use crate::runner::{RunRequest, StepRunner};

pub const ARG_DOCS: ArgDocs = &[
    ("steps_name", "The steps to perform, defined in the script"),
    (
        "push_meta",
        "Pass a dict of meta overrides for these steps. Useful for specialization.",
    ),
    (
        "complain_missing_step",
        "True if you would like the steps runner to complain about this step not existing.",
    ),
];

/// Runs another step list of the same script. The nested list continues the
/// caller's local meta.
#[derive(Debug, Clone)]
pub struct BuildStepsAction {
    pub steps_name: String,
    pub push_meta: Map<String, Value>,
    pub complain_missing_step: bool,
}

impl BuildStepsAction {
    pub fn from_args(mut args: ActionArgs) -> Result<Self> {
        Ok(Self {
            steps_name: take_string(&mut args, "steps_name").unwrap_or_default(),
            push_meta: take_object(&mut args, "push_meta")?,
            complain_missing_step: take_bool(&mut args, "complain_missing_step")?.unwrap_or(true),
        })
    }
}

impl Action for BuildStepsAction {
    fn name(&self) -> &'static str {
        "buildsteps"
    }

    fn verify(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        if self.steps_name.is_empty() {
            return Err(ActionError::invalid("Steps name is not set!"));
        }
        if self.complain_missing_step && !ctx.config.script.has_steps(&self.steps_name) {
            return Err(ActionError::invalid(format!(
                "Invalid build steps name {}",
                self.steps_name
            )));
        }
        Ok(())
    }

    fn run(&mut self, ctx: &mut ActionContext<'_>) -> Result<()> {
        let mut request = RunRequest::new(&self.steps_name)
            .with_push_meta(self.push_meta.clone())
            .with_parent_meta(ctx.meta.clone());
        if !self.complain_missing_step {
            request = request.optional();
        }

        let mut runner = StepRunner::new(ctx.registry, Arc::clone(ctx.config), ctx.meta_path)
            .with_metrics(ctx.metrics.clone());
        let result = runner.run(request);
        ctx.absorb_warnings(runner.warnings().to_vec());

        match result {
            Ok(_) => Ok(()),
            Err(err) => match err.downcast::<RunnerError>() {
                Ok(RunnerError::StepFailed { message, .. }) => {
                    Err(ActionError::failed(message).into())
                }
                Ok(other) => Err(other.into()),
                Err(unexpected) => Err(unexpected),
            },
        }
    }

    fn output(&self, field: &str) -> Option<Value> {
        match field {
            "steps_name" => Some(Value::from(self.steps_name.clone())),
            _ => None,
        }
    }
}
