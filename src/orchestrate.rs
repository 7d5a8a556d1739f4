use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::action::{ActionArgs, ActionRegistry};
use crate::config::{BuildType, ProjectConfig, check_engine_dir_valid, normalize};
use crate::meta::DEFAULT_META_FILE;
use crate::observability::MetricsCollector;
use crate::process;
use crate::runner::{RunReport, RunRequest, StepRunner, invoke};
use crate::script::ProjectScript;

/// Top-level choices of one `build` invocation.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub build_type: BuildType,
    /// Run only this step list; engine preparation still happens unless
    /// `explicit` is set.
    pub steps: Option<String>,
    /// Build only what was asked for: no engine sync, no engine tools, no
    /// editor build ahead of packaging.
    pub explicit: bool,
    pub engine_override: Option<PathBuf>,
    pub meta_path: PathBuf,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            build_type: BuildType::Editor,
            steps: None,
            explicit: false,
            engine_override: None,
            meta_path: PathBuf::from(DEFAULT_META_FILE),
        }
    }
}

/// What runs when no step list is named on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultSteps {
    List(String),
    BuildTarget(String),
    Package,
}

#[derive(Debug, Default)]
pub struct BuildOutcome {
    pub engine_branch_switched: bool,
    pub report: Option<RunReport>,
}

pub fn default_steps(script: &ProjectScript, uproject_name: &str, build_type: BuildType) -> DefaultSteps {
    let candidates: &[&str] = match build_type {
        BuildType::Editor => &["game_editor_steps", "editor_steps"],
        BuildType::Package => &["package_steps"],
    };
    if let Some(name) = candidates.iter().find(|name| script.has_steps(name)) {
        return DefaultSteps::List(name.to_string());
    }
    match build_type {
        BuildType::Editor => DefaultSteps::BuildTarget(format!("{uproject_name}Editor")),
        BuildType::Package => DefaultSteps::Package,
    }
}

#[instrument(name = "build", skip_all, fields(project = %config.uproject_name))]
pub fn run_build(
    mut config: ProjectConfig,
    registry: &ActionRegistry,
    options: &BuildOptions,
    metrics: &MetricsCollector,
) -> Result<BuildOutcome> {
    let mut outcome = BuildOutcome::default();
    if config.automated {
        info!("Automated flag set");
    }

    if !options.explicit {
        outcome.engine_branch_switched = ensure_engine(&mut config, registry, options, metrics)?;
        if outcome.engine_branch_switched {
            info!("Engine branch switched, will clean and rebuild");
            config.clean = true;
        }
    }
    info!(
        project = %config.uproject_dir_path.display(),
        engine = %config.engine.root.display(),
        "Project resolved"
    );

    let config = Arc::new(config);
    if !options.explicit && !config.engine_at_least(5, 3) && !config.engine.header_tool.is_file() {
        build_targets(registry, &config, &["UnrealHeaderTool".to_string()], options, metrics)?;
    }

    if config.should_build_engine_tools && !options.explicit {
        let mut tools_config = Arc::clone(&config);
        if options.build_type == BuildType::Package && !outcome.engine_branch_switched {
            Arc::make_mut(&mut tools_config).clean = false;
        }
        build_targets(registry, &tools_config, &config.build_engine_tools, options, metrics)?;
    }

    if let Some(name) = &options.steps {
        outcome.report = Some(run_steps(registry, &config, name, options, metrics)?);
        return Ok(outcome);
    }

    match options.build_type {
        BuildType::Editor if config.editor_running => {
            bail!("Cannot build the Editor while the editor is running!");
        }
        BuildType::Package if !options.explicit => {
            let editor = format!("{}Editor", config.uproject_name);
            build_targets(registry, &config, &[editor], options, metrics)?;
        }
        _ => {}
    }

    match default_steps(&config.script, &config.uproject_name, options.build_type) {
        DefaultSteps::List(name) => {
            outcome.report = Some(run_steps(registry, &config, &name, options, metrics)?);
        }
        DefaultSteps::BuildTarget(target) => {
            build_targets(registry, &config, &[target], options, metrics)?;
        }
        DefaultSteps::Package => {
            invoke(
                registry,
                "package",
                ActionArgs::new(),
                Arc::clone(&config),
                &options.meta_path,
                metrics,
            )?;
        }
    }
    Ok(outcome)
}

fn run_steps(
    registry: &ActionRegistry,
    config: &Arc<ProjectConfig>,
    name: &str,
    options: &BuildOptions,
    metrics: &MetricsCollector,
) -> Result<RunReport> {
    let mut runner = StepRunner::new(registry, Arc::clone(config), &options.meta_path)
        .with_metrics(metrics.clone());
    let result = runner.run(RunRequest::new(name));
    metrics.record_warnings(runner.warnings());
    result
}

fn build_targets(
    registry: &ActionRegistry,
    config: &Arc<ProjectConfig>,
    targets: &[String],
    options: &BuildOptions,
    metrics: &MetricsCollector,
) -> Result<()> {
    if targets.is_empty() {
        return Ok(());
    }
    let mut args = ActionArgs::new();
    args.insert("build_names".into(), json!(targets));
    invoke(registry, "build", args, Arc::clone(config), &options.meta_path, metrics)?;
    Ok(())
}

/// Makes sure a usable engine is in place: syncs it from git when the script
/// names a repository, fetches its binary dependencies and builds the build
/// tool when it is missing. Returns whether the engine checkout switched
/// branches.
fn ensure_engine(
    config: &mut ProjectConfig,
    registry: &ActionRegistry,
    options: &BuildOptions,
    metrics: &MetricsCollector,
) -> Result<bool> {
    let can_pull = !config.git_engine_repo.is_empty() && !config.git_engine_branch.is_empty();
    let engine_path = engine_location(config, options)?;

    if !can_pull && !check_engine_dir_valid(&engine_path) {
        bail!(
            "Static engine placement required for non-git pulled engine. You can specify a path using the -e param, or specify git configuration."
        );
    }

    let mut branch_switched = false;
    if can_pull {
        let mut args = ActionArgs::new();
        args.insert("branch".into(), json!(config.git_engine_branch));
        args.insert("repo".into(), json!(config.git_engine_repo));
        args.insert("output_folder".into(), json!(engine_path.to_string_lossy()));
        args.insert("disable_strict_hostkey_check".into(), json!(true));
        let git = invoke(
            registry,
            "git",
            args,
            Arc::new(config.clone()),
            &options.meta_path,
            metrics,
        )?;
        branch_switched = git
            .output("branch_switched")
            .as_ref()
            .and_then(Value::as_bool)
            .unwrap_or(false);
    }

    if !config.setup_engine_paths(Some(&engine_path)) {
        bail!("Could not setup valid engine paths!");
    }

    if config.editor_running {
        warn!("Editor is running; skipping the engine dependency check");
        return Ok(branch_switched);
    }

    info!("Checking engine dependencies up-to-date");
    let code = process::launch(&config.engine.git_dependencies, &dependency_args(config))?;
    if code != 0 {
        bail!("Engine dependencies Failed to Sync!");
    }

    if !config.engine.ubt.is_file() {
        info!("Build tool doesn't exist yet, generating project and building...");
        let mut args = Vec::new();
        if config.engine_major_version == 4
            && config.engine_minor_version <= 25
            && let Some(year) = config.visual_studio_version
        {
            args.push(format!("-VS{year}"));
        }
        if process::launch(&config.engine.gen_proj_files, &args)? != 0 {
            bail!("Failed to build UnrealBuildTool.exe!");
        }
    }
    Ok(branch_switched)
}

/// Engine directory to use: the command-line override, then
/// `engine_path_name`, then `UnrealEngine_<Project>` next to the project.
fn engine_location(config: &ProjectConfig, options: &BuildOptions) -> Result<PathBuf> {
    if let Some(path) = &options.engine_override {
        if path.is_absolute() {
            return Ok(path.clone());
        }
        let cwd = std::env::current_dir().context("Failed to determine current directory")?;
        return Ok(normalize(&cwd.join(path)));
    }
    if config.engine_path_name.is_empty() {
        return Ok(normalize(
            &config
                .uproject_dir_path
                .join("..")
                .join(format!("UnrealEngine_{}", config.uproject_name)),
        ));
    }
    Ok(normalize(&config.uproject_dir_path.join(&config.engine_path_name)))
}

/// GitDependencies flags for the configured excludes.
pub fn dependency_args(config: &ProjectConfig) -> Vec<String> {
    let mut args = Vec::new();
    if config.force_dependencies {
        args.push("--force".to_string());
    }
    if config.exclude_samples {
        args.extend(["FeaturePacks", "Samples"].map(|pack| format!("-exclude={pack}")));
    }
    args.extend(
        config
            .extra_dependency_excludes
            .iter()
            .map(|path| format!("-exclude={path}")),
    );
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(json: &str) -> ProjectScript {
        ProjectScript::parse(json).unwrap()
    }

    #[test]
    fn editor_builds_prefer_game_editor_steps() {
        let both = script(r#"{"editor_steps": [], "game_editor_steps": []}"#);
        assert_eq!(
            default_steps(&both, "Shooter", BuildType::Editor),
            DefaultSteps::List("game_editor_steps".into())
        );
        let editor_only = script(r#"{"editor_steps": []}"#);
        assert_eq!(
            default_steps(&editor_only, "Shooter", BuildType::Editor),
            DefaultSteps::List("editor_steps".into())
        );
        assert_eq!(
            default_steps(&script("{}"), "Shooter", BuildType::Editor),
            DefaultSteps::BuildTarget("ShooterEditor".into())
        );
    }

    #[test]
    fn package_builds_fall_back_to_the_package_action() {
        assert_eq!(
            default_steps(&script(r#"{"package_steps": []}"#), "Shooter", BuildType::Package),
            DefaultSteps::List("package_steps".into())
        );
        assert_eq!(
            default_steps(&script(r#"{"editor_steps": []}"#), "Shooter", BuildType::Package),
            DefaultSteps::Package
        );
    }

    #[test]
    fn dependency_excludes() {
        let mut config = ProjectConfig::default();
        config.force_dependencies = true;
        config.exclude_samples = true;
        config.extra_dependency_excludes = vec!["Engine/Extras".into()];
        assert_eq!(
            dependency_args(&config),
            vec![
                "--force",
                "-exclude=FeaturePacks",
                "-exclude=Samples",
                "-exclude=Engine/Extras"
            ]
        );
    }
}
