use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use super::{project_relative, take_string};
use crate::action::{Action, ActionArgs, ActionContext, ActionInit, ArgDocs};
use crate::error::ActionError;

pub const ARG_DOCS: ArgDocs = &[(
    "ini_path",
    "Ini file holding ProjectVersion=, relative to the project (default Config/DefaultGame.ini)",
)];

const DEFAULT_INI: &str = "Config/DefaultGame.ini";
const VERSION_KEY: &str = "ProjectVersion=";

/// Bumps the last component of the project version.
#[derive(Debug, Clone)]
pub struct VersionIncAction {
    ini_path: PathBuf,
    version: Option<String>,
}

impl VersionIncAction {
    pub fn from_args(mut args: ActionArgs, init: &ActionInit<'_>) -> Result<Self> {
        let ini = take_string(&mut args, "ini_path").unwrap_or_else(|| DEFAULT_INI.to_string());
        Ok(Self {
            ini_path: project_relative(&init.config.uproject_dir_path, &init.resolve(&ini)),
            version: None,
        })
    }
}

impl Action for VersionIncAction {
    fn name(&self) -> &'static str {
        "versioninc"
    }

    fn verify(&mut self, _ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        if !self.ini_path.is_file() {
            return Err(ActionError::invalid(format!(
                "Version ini ({}) does not exist!",
                self.ini_path.display()
            )));
        }
        Ok(())
    }

    fn run(&mut self, _ctx: &mut ActionContext<'_>) -> Result<()> {
        let content = fs::read_to_string(&self.ini_path)
            .with_context(|| format!("Failed to read {}", self.ini_path.display()))?;
        let Some((updated, version)) = increment_version(&content) else {
            return Err(ActionError::failed(format!(
                "No numeric ProjectVersion entry found in {}",
                self.ini_path.display()
            ))
            .into());
        };
        fs::write(&self.ini_path, updated)
            .with_context(|| format!("Failed to write {}", self.ini_path.display()))?;
        info!(version = %version, "Project version incremented");
        self.version = Some(version);
        Ok(())
    }

    fn output(&self, field: &str) -> Option<Value> {
        match field {
            "version" => self.version.clone().map(Value::from),
            _ => None,
        }
    }
}

/// Returns the updated ini text and the new version, or `None` when there is
/// no `ProjectVersion=` line ending in a number that can still be bumped.
/// Line endings are kept as found.
pub fn increment_version(content: &str) -> Option<(String, String)> {
    let mut version = None;
    let mut updated = String::with_capacity(content.len() + 1);
    for line in content.split_inclusive('\n') {
        let body = line.trim_end_matches(['\r', '\n']);
        if version.is_none()
            && let Some(current) = body.strip_prefix(VERSION_KEY)
        {
            let mut parts: Vec<String> = current.trim().split('.').map(str::to_string).collect();
            let last = parts.last_mut()?;
            let bumped = last.parse::<u64>().ok()?.checked_add(1)?;
            *last = bumped.to_string();
            let next = parts.join(".");
            updated.push_str(VERSION_KEY);
            updated.push_str(&next);
            updated.push_str(&line[body.len()..]);
            version = Some(next);
        } else {
            updated.push_str(line);
        }
    }
    version.map(|version| (updated, version))
}

#[cfg(test)]
mod tests {
    use super::increment_version;

    #[test]
    fn bumps_last_component_only() {
        let ini = "[/Script/EngineSettings.GeneralProjectSettings]\nProjectName=Shooter\nProjectVersion=1.4.0.9\n";
        let (updated, version) = increment_version(ini).unwrap();
        assert_eq!(version, "1.4.0.10");
        assert_eq!(
            updated,
            "[/Script/EngineSettings.GeneralProjectSettings]\nProjectName=Shooter\nProjectVersion=1.4.0.10\n"
        );
    }

    #[test]
    fn missing_or_non_numeric_versions_are_rejected() {
        assert!(increment_version("ProjectName=Shooter\n").is_none());
        assert!(increment_version("ProjectVersion=1.0.beta\n").is_none());
    }

    #[test]
    fn windows_line_endings_survive() {
        let ini = "[/Script/EngineSettings.GeneralProjectSettings]\r\nProjectVersion=2.0.1\r\nCompanyName=Studio\r\n";
        let (updated, version) = increment_version(ini).unwrap();
        assert_eq!(version, "2.0.2");
        assert_eq!(
            updated,
            "[/Script/EngineSettings.GeneralProjectSettings]\r\nProjectVersion=2.0.2\r\nCompanyName=Studio\r\n"
        );
    }

    #[test]
    fn last_line_without_newline_is_bumped() {
        let (updated, _) = increment_version("ProjectVersion=3").unwrap();
        assert_eq!(updated, "ProjectVersion=4");
    }

    #[test]
    fn overflowing_versions_are_rejected() {
        let ini = format!("ProjectVersion=1.{}\n", u64::MAX);
        assert!(increment_version(&ini).is_none());
    }
}
