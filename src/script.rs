use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::action::ActionArgs;
use crate::error::RunnerError;

pub const CONFIG_KEY: &str = "config";

/// The parsed project script: a `config` object plus any number of named
/// step lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectScript {
    document: Map<String, Value>,
}

impl ProjectScript {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read build script: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Build Script Syntax Error: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let document: Map<String, Value> =
            serde_json::from_str(content).context("Build script must be a JSON object")?;
        Ok(Self { document })
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(document) => Ok(Self { document }),
            other => anyhow::bail!("Build script must be a JSON object, found {other}"),
        }
    }

    pub fn has_config(&self) -> bool {
        matches!(self.document.get(CONFIG_KEY), Some(Value::Object(_)))
    }

    pub fn config(&self) -> Map<String, Value> {
        match self.document.get(CONFIG_KEY) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }

    /// Names of every top-level list other than `config`.
    pub fn step_lists(&self) -> Vec<String> {
        self.document
            .iter()
            .filter(|(key, value)| key.as_str() != CONFIG_KEY && value.is_array())
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn has_steps(&self, name: &str) -> bool {
        name != CONFIG_KEY && self.document.contains_key(name)
    }

    pub fn steps(&self, name: &str) -> Result<Option<Vec<StepSpec>>, RunnerError> {
        if !self.has_steps(name) {
            return Ok(None);
        }
        let raw = self.document[name].clone();
        serde_json::from_value(raw)
            .map(Some)
            .map_err(|err| RunnerError::InvalidSteps {
                name: name.to_string(),
                reason: err.to_string(),
            })
    }
}

/// One script-declared invocation of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub action: ActionSpec,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub allow_failure: bool,
}

impl StepSpec {
    pub fn label(&self) -> &str {
        self.desc.as_deref().unwrap_or("un-described step")
    }

    pub fn is_disabled(&self) -> bool {
        self.enabled == Some(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub module: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub args: ActionArgs,
    /// meta key -> action output field, written to local and persisted meta.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub persist_meta: BTreeMap<String, String>,
    /// meta key -> action output field, written to local meta only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub push_meta: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::ProjectScript;

    #[test]
    fn step_lists_exclude_config() {
        let script = ProjectScript::parse(
            r#"{
                "config": {"project_path": "Game/Game.uproject"},
                "editor_steps": [],
                "package_steps": [{"action": {"module": "actions.package"}}],
                "notes": "not a list"
            }"#,
        )
        .unwrap();
        let mut lists = script.step_lists();
        lists.sort();
        assert_eq!(lists, vec!["editor_steps", "package_steps"]);
        assert!(script.has_config());
        let steps = script.steps("package_steps").unwrap().unwrap();
        assert_eq!(steps[0].action.module, "actions.package");
        assert_eq!(steps[0].label(), "un-described step");
        assert!(script.steps("missing").unwrap().is_none());
    }

    #[test]
    fn malformed_step_list_is_reported() {
        let script = ProjectScript::parse(r#"{"steps": [{"desc": "no action"}]}"#).unwrap();
        assert!(script.steps("steps").is_err());
    }
}
