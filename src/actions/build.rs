use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info};

use super::{remove_tree, run_tool, take_bool, take_string, take_strings};
use crate::action::{Action, ActionArgs, ActionContext, ArgDocs};
use crate::config::ProjectConfig;
use crate::error::ActionError;

pub const ARG_DOCS: ArgDocs = &[
    ("build_name", "The name of the project to build."),
    ("build_names", "Same as build_name but accepts a list of builds"),
    (
        "force_clean",
        "Force this build/s to be cleaned, regardless of the global clean flag",
    ),
];

/// Builds engine or project targets through the engine's Build.bat.
#[derive(Debug, Clone, Default)]
pub struct BuildAction {
    pub build_names: Vec<String>,
    pub force_clean: bool,
}

impl BuildAction {
    pub fn new(build_name: impl Into<String>) -> Self {
        Self {
            build_names: vec![build_name.into()],
            force_clean: false,
        }
    }

    pub fn from_args(mut args: ActionArgs) -> Result<Self> {
        let mut build_names: Vec<String> = take_string(&mut args, "build_name")
            .into_iter()
            .filter(|name| !name.is_empty())
            .collect();
        build_names.extend(take_strings(&mut args, "build_names")?);
        let force_clean = take_bool(&mut args, "force_clean")?.unwrap_or(false);
        Ok(Self {
            build_names,
            force_clean,
        })
    }

    fn build_one(&self, config: &ProjectConfig, build_name: &str) -> Result<()> {
        let game_project = is_game_target(config, build_name);
        let cleaning = config.clean || self.force_clean;
        info!(
            build = build_name,
            "{} {}",
            if cleaning { "Cleaning" } else { "Building" },
            build_name
        );

        let args = build_command_args(config, build_name);
        if cleaning {
            if game_project {
                clean_game_project(config, build_name)?;
            } else {
                run_tool(
                    &config.engine.clean_batch,
                    &args,
                    None,
                    format!("Failed to clean project {build_name}"),
                )?;
            }
        }

        run_tool(
            &config.engine.build_batch,
            &args,
            None,
            format!("Failed to build \"{build_name}\"!"),
        )
    }
}

impl Action for BuildAction {
    fn name(&self) -> &'static str {
        "build"
    }

    fn verify(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        let Some(first) = self.build_names.first() else {
            return Err(ActionError::invalid(
                "No valid build name supplied to this action!",
            ));
        };
        if ctx.config.editor_running {
            return Err(ActionError::invalid(format!(
                "Cannot build \"{first}\" because editor is running!"
            )));
        }
        Ok(())
    }

    fn run(&mut self, ctx: &mut ActionContext<'_>) -> Result<()> {
        for build_name in &self.build_names {
            self.build_one(ctx.config, build_name)?;
        }
        Ok(())
    }

    fn output(&self, field: &str) -> Option<Value> {
        match field {
            "build_names" => Some(Value::from(self.build_names.clone())),
            _ => None,
        }
    }
}

/// Targets named after the project are game targets and take the
/// `.uproject` path.
fn is_game_target(config: &ProjectConfig, build_name: &str) -> bool {
    !config.uproject_name.is_empty() && build_name.starts_with(&config.uproject_name)
}

pub fn build_command_args(config: &ProjectConfig, build_name: &str) -> Vec<String> {
    let mut args = vec![
        build_name.to_string(),
        config.platform.to_string(),
        config.configuration.to_string(),
    ];
    if is_game_target(config, build_name) {
        args.push(config.uproject_file_path.to_string_lossy().to_string());
    }
    args.push("-NoHotReload".into());
    args.push("-waitmutex".into());
    if config.engine_major_version == 4 && config.engine_minor_version <= 25 {
        if let Some(year) = config.visual_studio_version {
            args.push(format!("-VS{year}"));
        }
    } else {
        args.push("-FromMsBuild".into());
    }
    args
}

/// Intermediate folders removed when a game target is cleaned. The engine's
/// Clean.bat would also wipe the engine build, so game targets are cleaned by
/// hand.
pub fn game_clean_dirs(config: &ProjectConfig, build_name: &str) -> Vec<PathBuf> {
    let mut roots = vec![config.uproject_dir_path.clone()];
    if let Ok(entries) = fs::read_dir(config.uproject_dir_path.join("Plugins")) {
        let mut plugins: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        plugins.sort();
        roots.extend(plugins);
    }

    let platform = config.platform.as_str();
    let editor_dir = if config.engine_major_version >= 5 {
        "UnrealEditor"
    } else {
        "UE4Editor"
    };
    let mut dirs = Vec::new();
    for root in roots {
        let build_root = root.join("Intermediate").join("Build").join(platform);
        if build_name.ends_with("Editor") {
            dirs.push(build_root.join(editor_dir));
        }
        dirs.push(build_root.join(build_name));
    }
    dirs
}

fn clean_game_project(config: &ProjectConfig, build_name: &str) -> Result<()> {
    for dir in game_clean_dirs(config, build_name) {
        debug!(path = %dir.display(), "Removing intermediates");
        remove_tree(&dir).map_err(|err| {
            ActionError::failed(format!(
                "Failed to clean project {build_name}: {} ({err})",
                dir.display()
            ))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Configuration, Platform};
    use serde_json::json;

    fn config() -> ProjectConfig {
        let mut config = ProjectConfig::new(Configuration::Development, Platform::Win64);
        config.uproject_name = "Shooter".into();
        config.uproject_dir_path = PathBuf::from("/proj");
        config.uproject_file_path = PathBuf::from("/proj/Shooter.uproject");
        config
    }

    #[test]
    fn game_targets_take_the_project_file() {
        let args = build_command_args(&config(), "ShooterEditor");
        assert_eq!(
            args,
            vec![
                "ShooterEditor",
                "Win64",
                "Development",
                "/proj/Shooter.uproject",
                "-NoHotReload",
                "-waitmutex",
                "-FromMsBuild"
            ]
        );
        let engine = build_command_args(&config(), "ShaderCompileWorker");
        assert_eq!(engine[3], "-NoHotReload");
    }

    #[test]
    fn old_engines_name_the_visual_studio_version() {
        let mut config = config();
        config.engine_minor_version = 24;
        config.visual_studio_version = Some(2017);
        let args = build_command_args(&config, "UnrealHeaderTool");
        assert_eq!(args.last().unwrap(), "-VS2017");
    }

    #[test]
    fn args_merge_single_and_list_names() {
        let args = json!({"build_name": "A", "build_names": ["B", "C"], "force_clean": true});
        let action = BuildAction::from_args(args.as_object().cloned().unwrap()).unwrap();
        assert_eq!(action.build_names, vec!["A", "B", "C"]);
        assert!(action.force_clean);
    }

    #[test]
    fn editor_targets_clean_editor_intermediates() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Plugins/Weapons")).unwrap();
        let mut config = config();
        config.uproject_dir_path = dir.path().to_path_buf();
        let dirs = game_clean_dirs(&config, "ShooterEditor");
        assert_eq!(dirs.len(), 4);
        assert!(dirs[0].ends_with("Intermediate/Build/Win64/UE4Editor"));
        assert!(dirs[3].ends_with("Plugins/Weapons/Intermediate/Build/Win64/ShooterEditor"));
    }
}
