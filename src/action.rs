use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::ProjectConfig;
use crate::error::{ActionError, RunnerError};
use crate::meta::BuildMeta;
use crate::observability::MetricsCollector;
use crate::template::resolve_template;

pub type ActionArgs = Map<String, Value>;

/// Argument name and description pairs, for `list-actions`.
pub type ArgDocs = &'static [(&'static str, &'static str)];

/// One unit of pipeline work.
///
/// An action is constructed fresh for every step from the step's arguments,
/// verified once, run once, then dropped. Values a step wants to keep are
/// read back through [`Action::output`].
pub trait Action: Send {
    fn name(&self) -> &'static str;

    /// Pre-flight check. Must not change anything outside the action.
    fn verify(&mut self, _ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        Ok(())
    }

    /// Performs the work. Expected failures are returned as [`ActionError`];
    /// any other error aborts the whole run.
    fn run(&mut self, ctx: &mut ActionContext<'_>) -> Result<()>;

    /// Named result field, used by `persist_meta` and `push_meta`.
    fn output(&self, _field: &str) -> Option<Value> {
        None
    }
}

/// What a constructor gets to build an action from.
pub struct ActionInit<'a> {
    pub config: Arc<ProjectConfig>,
    pub meta: &'a BuildMeta,
}

impl ActionInit<'_> {
    /// Templates `{name}` placeholders against config, then meta.
    pub fn resolve(&self, input: &str) -> String {
        resolve_template(input, &self.config, Some(self.meta))
    }
}

/// Shared state visible to an action while it verifies and runs.
pub struct ActionContext<'a> {
    pub config: &'a Arc<ProjectConfig>,
    pub meta: &'a BuildMeta,
    pub registry: &'a ActionRegistry,
    pub meta_path: &'a Path,
    pub metrics: &'a MetricsCollector,
    warnings: &'a mut Vec<String>,
}

impl<'a> ActionContext<'a> {
    pub fn new(
        config: &'a Arc<ProjectConfig>,
        meta: &'a BuildMeta,
        registry: &'a ActionRegistry,
        meta_path: &'a Path,
        metrics: &'a MetricsCollector,
        warnings: &'a mut Vec<String>,
    ) -> Self {
        Self {
            config,
            meta,
            registry,
            meta_path,
            metrics,
            warnings,
        }
    }

    /// Records a non-fatal diagnostic and surfaces it right away.
    pub fn warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.warnings.push(message);
    }

    /// Records diagnostics that were already surfaced elsewhere.
    pub fn absorb_warnings(&mut self, messages: impl IntoIterator<Item = String>) {
        self.warnings.extend(messages);
    }
}

type ActionConstructor =
    Arc<dyn Fn(ActionArgs, &ActionInit<'_>) -> Result<Box<dyn Action>> + Send + Sync>;

#[derive(Clone)]
struct ActionEntry {
    docs: ArgDocs,
    constructor: ActionConstructor,
}

/// Maps action names to constructors.
///
/// A step's `module` (for example `actions.build`) resolves through its last
/// dotted segment, compared case-insensitively.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    factories: HashMap<String, ActionEntry>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: impl Into<String>, docs: ArgDocs, constructor: F)
    where
        F: Fn(ActionArgs, &ActionInit<'_>) -> Result<Box<dyn Action>> + Send + Sync + 'static,
    {
        self.factories.insert(
            name.into().to_lowercase(),
            ActionEntry {
                docs,
                constructor: Arc::new(constructor),
            },
        );
    }

    /// Registers `alias` as another name for an existing action.
    pub fn alias(&mut self, alias: impl Into<String>, target: &str) -> bool {
        match self.factories.get(&target.to_lowercase()).cloned() {
            Some(entry) => {
                self.factories.insert(alias.into().to_lowercase(), entry);
                true
            }
            None => false,
        }
    }

    /// Registered name for `module`, or the dispatch error a step runner
    /// reports when nothing matches.
    pub fn resolve(&self, module: &str) -> Result<String, RunnerError> {
        let segment = module.rsplit('.').next().unwrap_or(module).trim();
        let key = segment.to_lowercase();
        if self.factories.contains_key(&key) {
            Ok(key)
        } else {
            Err(RunnerError::UnknownAction {
                module: module.to_string(),
                class: class_name(segment),
                available: self.known_actions().join(", "),
            })
        }
    }

    pub fn contains(&self, module: &str) -> bool {
        self.resolve(module).is_ok()
    }

    pub fn create(
        &self,
        module: &str,
        args: ActionArgs,
        init: &ActionInit<'_>,
    ) -> Result<Box<dyn Action>> {
        let key = self.resolve(module)?;
        let entry = &self.factories[&key];
        (entry.constructor)(args, init)
    }

    pub fn arg_docs(&self, module: &str) -> Option<ArgDocs> {
        let key = self.resolve(module).ok()?;
        Some(self.factories[&key].docs)
    }

    pub fn known_actions(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

fn class_name(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.map(|c| c.to_ascii_lowercase())).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunnerError;

    struct Noop;

    impl Action for Noop {
        fn name(&self) -> &'static str {
            "noop"
        }

        fn run(&mut self, _ctx: &mut ActionContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn registry() -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        registry.register("noop", &[("quiet", "Say nothing")], |_, _| Ok(Box::new(Noop)));
        registry
    }

    #[test]
    fn resolves_last_module_segment() {
        let registry = registry();
        assert_eq!(registry.resolve("actions.noop").unwrap(), "noop");
        assert_eq!(registry.resolve("Noop").unwrap(), "noop");
        assert_eq!(registry.arg_docs("actions.noop").unwrap()[0].0, "quiet");
    }

    #[test]
    fn unknown_module_names_the_class() {
        let err = registry().resolve("actions.upload").unwrap_err();
        match &err {
            RunnerError::UnknownAction { class, available, .. } => {
                assert_eq!(class, "Upload");
                assert_eq!(available, "noop");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().contains("action class (Upload) could not be found!"));
    }

    #[test]
    fn alias_shares_constructor() {
        let mut registry = registry();
        assert!(registry.alias("nothing", "noop"));
        assert!(!registry.alias("ghost", "missing"));
        assert!(registry.contains("actions.nothing"));
    }
}
