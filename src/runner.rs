use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::action::{Action, ActionArgs, ActionContext, ActionInit, ActionRegistry};
use crate::condition::Condition;
use crate::config::ProjectConfig;
use crate::error::{ActionError, RunnerError};
use crate::meta::BuildMeta;
use crate::observability::MetricsCollector;
use crate::script::StepSpec;

/// One invocation of a named step list.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub steps_name: String,
    /// Seeds the local meta scope on top of the persisted meta.
    pub push_meta: Map<String, Value>,
    /// Local meta of an enclosing run, continued by nested step lists.
    pub parent_meta: Option<BuildMeta>,
    /// When false, a missing step list is a silent no-op.
    pub complain_missing: bool,
}

impl RunRequest {
    pub fn new(steps_name: impl Into<String>) -> Self {
        Self {
            steps_name: steps_name.into(),
            push_meta: Map::new(),
            parent_meta: None,
            complain_missing: true,
        }
    }

    pub fn with_push_meta(mut self, push_meta: Map<String, Value>) -> Self {
        self.push_meta = push_meta;
        self
    }

    pub fn with_parent_meta(mut self, parent_meta: BuildMeta) -> Self {
        self.parent_meta = Some(parent_meta);
        self
    }

    pub fn optional(mut self) -> Self {
        self.complain_missing = false;
        self
    }
}

/// Terminal state of a step. Every step starts pending and ends in exactly
/// one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StepOutcome {
    SkippedDisabled,
    SkippedCondition { clause: String },
    Succeeded,
    FailedTolerated { message: String },
    FailedFatal { message: String },
}

impl StepOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::SkippedDisabled | Self::SkippedCondition { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub index: usize,
    pub desc: Option<String>,
    pub module: String,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub steps_name: String,
    pub steps: Vec<StepRecord>,
    pub warnings: Vec<String>,
    /// Local meta as it stood after the last step.
    pub meta: BuildMeta,
}

impl RunReport {
    pub fn count(&self, predicate: impl Fn(&StepOutcome) -> bool) -> usize {
        self.steps.iter().filter(|record| predicate(&record.outcome)).count()
    }
}

/// Executes step lists from the project script.
///
/// Steps run strictly in order on the calling thread. A failing step aborts
/// the rest of the list unless it sets `allow_failure`; side effects of the
/// steps that already ran are left in place.
pub struct StepRunner<'a> {
    registry: &'a ActionRegistry,
    config: Arc<ProjectConfig>,
    meta_path: PathBuf,
    metrics: MetricsCollector,
    warnings: Vec<String>,
    records: Vec<StepRecord>,
}

impl<'a> StepRunner<'a> {
    pub fn new(
        registry: &'a ActionRegistry,
        config: Arc<ProjectConfig>,
        meta_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            config,
            meta_path: meta_path.into(),
            metrics: MetricsCollector::new(),
            warnings: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    /// Warnings raised by the latest run, still readable after a fatal error.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.clone()
    }

    #[instrument(name = "steps", skip(self, request), fields(steps = %request.steps_name))]
    pub fn run(&mut self, request: RunRequest) -> Result<RunReport> {
        let total_start = Instant::now();
        self.records.clear();
        self.warnings.clear();
        let steps = match self.config.script.steps(&request.steps_name)? {
            Some(steps) => steps,
            None if request.complain_missing => {
                return Err(RunnerError::MissingSteps(request.steps_name).into());
            }
            None => {
                debug!("Step list not present; nothing to run");
                Vec::new()
            }
        };

        let mut local_meta = BuildMeta::load(&self.meta_path);
        if let Some(parent) = &request.parent_meta {
            local_meta.extend(parent.as_map());
        }
        local_meta.extend(&request.push_meta);

        for (index, step) in steps.iter().enumerate() {
            let outcome = match self.run_step(index, step, &mut local_meta) {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.metrics.record_fatal_failure();
                    let message = match err.downcast_ref::<RunnerError>() {
                        Some(RunnerError::StepFailed { message, .. }) => message.clone(),
                        _ => format!("{err:#}"),
                    };
                    self.record(index, step, StepOutcome::FailedFatal { message });
                    return Err(err);
                }
            };
            match &outcome {
                StepOutcome::Succeeded => self.metrics.record_succeeded(),
                StepOutcome::FailedTolerated { .. } => self.metrics.record_tolerated_failure(),
                _ => self.metrics.record_skipped(),
            }
            self.record(index, step, outcome);
        }

        self.metrics.record_total_duration(total_start.elapsed());
        Ok(RunReport {
            steps_name: request.steps_name,
            steps: self.records.clone(),
            warnings: self.warnings.clone(),
            meta: local_meta,
        })
    }

    fn record(&mut self, index: usize, step: &StepSpec, outcome: StepOutcome) {
        self.records.push(StepRecord {
            index,
            desc: step.desc.clone(),
            module: step.action.module.clone(),
            outcome,
        });
    }

    fn run_step(
        &mut self,
        index: usize,
        step: &StepSpec,
        local_meta: &mut BuildMeta,
    ) -> Result<StepOutcome> {
        if step.is_disabled() {
            debug!(index, step = step.label(), "Step disabled");
            return Ok(StepOutcome::SkippedDisabled);
        }

        if let Some(expression) = &step.condition {
            let condition: Condition =
                expression
                    .parse()
                    .map_err(|source| RunnerError::MalformedCondition {
                        step: step.label().to_string(),
                        source,
                    })?;
            if let Some(clause) = condition.first_failure(local_meta, &self.config) {
                info!(
                    "Skipping ({}) step because condition ({}) was not met",
                    step.desc.as_deref().unwrap_or("unknown"),
                    clause
                );
                return Ok(StepOutcome::SkippedCondition {
                    clause: clause.to_string(),
                });
            }
        }

        let span = tracing::span!(tracing::Level::INFO, "step", index, step = step.label());
        let _guard = span.enter();
        info!(module = %step.action.module, "Performing {}", step.label());

        let key = self.registry.resolve(&step.action.module)?;
        let _timer = self.metrics.start_action(&key);

        let init = ActionInit {
            config: Arc::clone(&self.config),
            meta: local_meta,
        };
        let constructed = self
            .registry
            .create(&key, step.action.args.clone(), &init);
        let mut action = match constructed {
            Ok(action) => action,
            Err(err) => {
                let message = format!("{err:#}");
                return self.fail(step, message, "Verification");
            }
        };

        let verdict = {
            let mut ctx = ActionContext::new(
                &self.config,
                local_meta,
                self.registry,
                &self.meta_path,
                &self.metrics,
                &mut self.warnings,
            );
            match action.verify(&mut ctx) {
                Ok(()) => action.run(&mut ctx).map_err(|err| (err, "Running")),
                Err(err) => Err((err.into(), "Verification")),
            }
        };

        if let Err((err, phase)) = verdict {
            return match err.downcast::<ActionError>() {
                Ok(expected) => self.fail(step, expected.message().to_string(), phase),
                Err(unexpected) => Err(unexpected),
            };
        }

        if !step.action.persist_meta.is_empty() {
            // Nested step lists may have written the file since this run started.
            let mut persisted = BuildMeta::load(&self.meta_path);
            for (key, value) in collect_outputs(action.as_ref(), &step.action.persist_meta) {
                persisted.set(key.clone(), value.clone());
                local_meta.set(key, value);
            }
            persisted.save(&self.meta_path)?;
            debug!(path = %self.meta_path.display(), "Build meta persisted");
        }
        for (key, value) in collect_outputs(action.as_ref(), &step.action.push_meta) {
            local_meta.set(key, value);
        }

        Ok(StepOutcome::Succeeded)
    }

    fn fail(&mut self, step: &StepSpec, message: String, phase: &str) -> Result<StepOutcome> {
        if step.allow_failure {
            self.warn(message.clone());
            self.warn(format!(
                "{phase} of this action failed. Skipping because of allow_failure flag."
            ));
            Ok(StepOutcome::FailedTolerated { message })
        } else {
            Err(RunnerError::StepFailed {
                step: step.label().to_string(),
                message,
            }
            .into())
        }
    }

    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }
}

fn collect_outputs(action: &dyn Action, mapping: &BTreeMap<String, String>) -> Vec<(String, Value)> {
    mapping
        .iter()
        .filter_map(|(meta_key, field)| {
            action
                .output(field)
                .filter(|value| !value.is_null())
                .map(|value| (meta_key.clone(), value))
        })
        .collect()
}

/// Runs one action outside of any step list: construct, verify, run.
/// Every failure is returned as an error. The action is handed back so
/// callers can read its outputs.
pub fn invoke(
    registry: &ActionRegistry,
    module: &str,
    args: ActionArgs,
    config: Arc<ProjectConfig>,
    meta_path: &Path,
    metrics: &MetricsCollector,
) -> Result<Box<dyn Action>> {
    let key = registry.resolve(module)?;
    let meta = BuildMeta::load(meta_path);
    let mut action = registry.create(&key, args, &ActionInit {
        config: Arc::clone(&config),
        meta: &meta,
    })?;
    let _timer = metrics.start_action(&key);
    let mut warnings = Vec::new();
    let result = {
        let mut ctx =
            ActionContext::new(&config, &meta, registry, meta_path, metrics, &mut warnings);
        action
            .verify(&mut ctx)
            .map_err(anyhow::Error::from)
            .and_then(|()| action.run(&mut ctx))
    };
    metrics.record_warnings(&warnings);
    result.map(|()| action)
}
