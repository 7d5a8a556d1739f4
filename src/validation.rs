use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::action::ActionRegistry;
use crate::condition::Condition;
use crate::script::{ProjectScript, StepSpec};

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

const NESTED_ACTIONS: &[&str] = &["buildsteps", "runsteps"];

/// Static checks over a project script. Nothing is executed and no paths are
/// touched.
pub fn validate_script(script: &ProjectScript, registry: &ActionRegistry) -> ValidationReport {
    let mut report = ValidationReport::default();

    if !script.has_config() {
        report
            .errors
            .push("Script must contain a \"config\" object".into());
    } else if !script
        .config()
        .get("project_path")
        .and_then(|value| value.as_str())
        .is_some_and(|path| !path.trim().is_empty())
    {
        report
            .errors
            .push("config.project_path must be a non-empty string".into());
    }

    let lists = script.step_lists();
    if lists.is_empty() {
        report.warnings.push("Script defines no step lists".into());
    }

    let mut references: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for name in &lists {
        let steps = match script.steps(name) {
            Ok(Some(steps)) => steps,
            Ok(None) => continue,
            Err(err) => {
                report.errors.push(err.to_string());
                continue;
            }
        };
        if steps.is_empty() {
            report
                .warnings
                .push(format!("Step list '{name}' is empty"));
        }
        for (idx, step) in steps.iter().enumerate() {
            let location = format!("{name}[{idx}]");
            report.merge(validate_step(&location, step, script, registry));
            if let Some(target) = nested_target(step, registry) {
                references
                    .entry(name.clone())
                    .or_default()
                    .insert(target);
            }
        }
    }

    for name in find_cycles(&references) {
        report.warnings.push(format!(
            "Step list '{name}' can re-enter itself through buildsteps"
        ));
    }

    report
}

fn validate_step(
    location: &str,
    step: &StepSpec,
    script: &ProjectScript,
    registry: &ActionRegistry,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    if step.desc.is_none() {
        report
            .warnings
            .push(format!("{location}: step has no desc"));
    }

    if let Some(condition) = &step.condition
        && let Err(err) = condition.parse::<Condition>()
    {
        report.errors.push(format!(
            "{location}: invalid condition \"{condition}\": {err}"
        ));
    }

    let action = &step.action;
    let Some(docs) = registry.arg_docs(&action.module) else {
        if let Err(err) = registry.resolve(&action.module) {
            report.errors.push(format!("{location}: {err}"));
        }
        return report;
    };

    for arg in action.args.keys() {
        if !docs.iter().any(|(known, _)| known == arg) {
            report.warnings.push(format!(
                "{location}: argument '{arg}' is not used by {}",
                action.module
            ));
        }
    }

    if let Some(target) = nested_target(step, registry) {
        let complain = action
            .args
            .get("complain_missing_step")
            .and_then(|value| value.as_bool())
            .unwrap_or(true);
        if complain && !target.contains('{') && !script.has_steps(&target) {
            report.errors.push(format!(
                "{location}: steps_name references missing step list '{target}'"
            ));
        }
    }

    report
}

/// Target list of a nested step invocation, if `step` is one.
fn nested_target(step: &StepSpec, registry: &ActionRegistry) -> Option<String> {
    let resolved = registry.resolve(&step.action.module).ok()?;
    if !NESTED_ACTIONS.contains(&resolved.as_str()) {
        return None;
    }
    step.action
        .args
        .get("steps_name")
        .and_then(|value| value.as_str())
        .map(str::to_string)
}

/// Lists that can reach themselves through nested invocations.
fn find_cycles(references: &BTreeMap<String, BTreeSet<String>>) -> Vec<String> {
    references
        .keys()
        .filter(|start| {
            let mut seen = BTreeSet::new();
            let mut pending: Vec<&String> = references[*start].iter().collect();
            while let Some(next) = pending.pop() {
                if next == *start {
                    return true;
                }
                if seen.insert(next.clone())
                    && let Some(targets) = references.get(next)
                {
                    pending.extend(targets.iter());
                }
            }
            false
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_are_found_through_intermediate_lists() {
        let mut refs: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        refs.entry("a".into()).or_default().insert("b".into());
        refs.entry("b".into()).or_default().insert("a".into());
        refs.entry("c".into()).or_default().insert("a".into());
        assert_eq!(find_cycles(&refs), vec!["a", "b"]);
    }
}
