use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::to_writer_pretty;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};
use ue_buildsteps::action::ActionRegistry;
use ue_buildsteps::actions;
use ue_buildsteps::config::{BuildType, ConfigOptions, Configuration, Platform, ProjectConfig};
use ue_buildsteps::meta::{BuildMeta, DEFAULT_META_FILE};
use ue_buildsteps::observability::{MetricsCollector, log_summary};
use ue_buildsteps::orchestrate::{BuildOptions, run_build};
use ue_buildsteps::presets::generate_preset;
use ue_buildsteps::script::ProjectScript;
use ue_buildsteps::tools;
use ue_buildsteps::validation::validate_script;

#[cfg(feature = "otel")]
use opentelemetry::KeyValue;
#[cfg(feature = "otel")]
use opentelemetry_otlp::WithExportConfig;
#[cfg(feature = "otel")]
use opentelemetry_sdk::{resource::Resource, trace as sdktrace};

fn main() -> Result<()> {
    let Cli { command } = Cli::parse();

    let otlp_endpoint_for_tracing = match &command {
        Commands::Build(args) => args.otlp_endpoint.clone(),
        _ => None,
    };

    configure_tracing(otlp_endpoint_for_tracing.as_deref())?;

    let command_result = match command {
        Commands::Build(args) => build_command(args),
        Commands::ListActions => {
            list_actions();
            Ok(())
        }
        Commands::Validate { script } => validate_script_cmd(&script),
        Commands::Script { action } => script_command(action),
        Commands::Meta { action } => meta_command(action),
        Commands::Tools(args) => tools_command(args),
    };

    #[cfg(feature = "otel")]
    if otlp_endpoint_for_tracing.is_some() {
        opentelemetry::global::shutdown_tracer_provider();
    }

    command_result
}

fn configure_tracing(otlp_endpoint: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(feature = "otel")]
    {
        if let Some(endpoint) = otlp_endpoint {
            let tracer =
                opentelemetry_otlp::new_pipeline()
                    .tracing()
                    .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(
                        vec![KeyValue::new("service.name", "ue-buildsteps")],
                    )))
                    .with_exporter(
                        opentelemetry_otlp::new_exporter()
                            .tonic()
                            .with_endpoint(endpoint),
                    )
                    .install_simple()?;

            tracing_subscriber::registry()
                .with(filter.clone())
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init()
                .map_err(|err| anyhow!(err.to_string()))?;
        } else {
            tracing_subscriber::registry()
                .with(filter.clone())
                .with(tracing_subscriber::fmt::layer())
                .try_init()
                .map_err(|err| anyhow!(err.to_string()))?;
        }
    }

    #[cfg(not(feature = "otel"))]
    {
        if let Some(endpoint) = otlp_endpoint {
            eprintln!(
                "warning: --otlp-endpoint '{}' requested but OpenTelemetry support is not enabled. Rebuild with --features otel.",
                endpoint
            );
        }

        tracing_subscriber::registry()
            .with(filter.clone())
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|err| anyhow!(err.to_string()))?;
    }

    Ok(())
}

fn build_command(args: BuildArgs) -> Result<()> {
    let started = Instant::now();
    let config = load_project(&args.project, args.clean, args.build_explicit)?;
    let registry = build_registry();
    let metrics = MetricsCollector::new();
    let options = BuildOptions {
        build_type: args.buildtype,
        steps: args.build.filter(|name| !name.is_empty()),
        explicit: args.build_explicit,
        engine_override: args.project.engine.clone(),
        meta_path: args.meta_file,
    };

    let result = run_build(config, &registry, &options, &metrics);
    metrics.record_total_duration(started.elapsed());

    let summary = metrics.snapshot();
    for warning in &summary.warnings {
        warn!("{warning}");
    }
    if args.print_summary {
        log_summary(&summary);
    }
    if let Some(path) = &args.summary_json {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create summary directory: {}", parent.display())
            })?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create summary file: {}", path.display()))?;
        to_writer_pretty(file, &summary)
            .with_context(|| format!("Failed to write summary JSON: {}", path.display()))?;
        info!(summary = %path.display(), "Summary JSON written");
    }

    let outcome = result?;
    if let Some(report) = outcome.report {
        info!(
            steps = %report.steps_name,
            ran = report.steps.len(),
            "Build steps complete"
        );
    }
    info!(
        duration_s = started.elapsed().as_secs_f64(),
        "Build completed"
    );
    Ok(())
}

fn load_project(args: &ProjectArgs, clean: bool, explicit: bool) -> Result<ProjectConfig> {
    let script = ProjectScript::load(&args.script)?;
    let script_dir = args
        .script
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let options = ConfigOptions {
        configuration: args.configuration,
        platform: args.platform,
        clean,
        debug: args.debug,
        automated: args.automated,
        engine_override: args.engine.clone(),
        ensure_engine: explicit,
    };
    ProjectConfig::load(script, script_dir, &options)
        .with_context(|| format!("Invalid Script file: {}", args.script.display()))
}

fn list_actions() {
    let registry = build_registry();
    println!("Available actions:");
    for name in registry.known_actions() {
        println!("- {name}");
        if let Some(docs) = registry.arg_docs(&name) {
            for (arg, doc) in docs {
                println!("    {arg}: {doc}");
            }
        }
    }
}

fn validate_script_cmd(script_path: &Path) -> Result<()> {
    let script = ProjectScript::load(script_path)?;
    let registry = build_registry();
    let report = validate_script(&script, &registry);

    for warning in &report.warnings {
        warn!(file = %script_path.display(), "{warning}");
    }

    if report.is_ok() {
        info!(file = %script_path.display(), "Script validation passed");
        Ok(())
    } else {
        for error_msg in &report.errors {
            error!(file = %script_path.display(), "{error_msg}");
        }
        Err(anyhow!(
            "Script validation failed with {} error(s)",
            report.errors.len()
        ))
    }
}

fn script_command(command: ScriptCommands) -> Result<()> {
    match command {
        ScriptCommands::New { preset, output } => {
            let destination =
                output.unwrap_or_else(|| PathBuf::from(format!("scripts/{preset}.json")));
            let generated = generate_preset(&preset, &destination)?;
            info!(
                preset = %preset,
                path = %generated.display(),
                "Preset script generated"
            );
            Ok(())
        }
        ScriptCommands::Lint { scripts } => lint_scripts(&scripts),
    }
}

fn lint_scripts(scripts: &[PathBuf]) -> Result<()> {
    if scripts.is_empty() {
        bail!("No script files supplied for linting");
    }

    let registry = build_registry();
    let mut failures = 0usize;

    for script_path in scripts {
        match ProjectScript::load(script_path) {
            Ok(script) => {
                let report = validate_script(&script, &registry);
                for warning in &report.warnings {
                    warn!(file = %script_path.display(), "{warning}");
                }
                if report.is_ok() {
                    info!(file = %script_path.display(), "Lint passed");
                } else {
                    failures += 1;
                    for error_msg in &report.errors {
                        error!(file = %script_path.display(), "{error_msg}");
                    }
                }
            }
            Err(err) => {
                failures += 1;
                error!(file = %script_path.display(), "Failed to load script: {err:#}");
            }
        }
    }

    if failures > 0 {
        bail!("Lint failed for {failures} script(s)");
    }

    info!("All script lint checks passed");
    Ok(())
}

fn meta_command(command: MetaCommands) -> Result<()> {
    match command {
        MetaCommands::Show { meta_file } => {
            let meta = BuildMeta::load(&meta_file);
            println!("{}", serde_json::to_string_pretty(meta.as_map())?);
            Ok(())
        }
    }
}

fn tools_command(args: ToolsArgs) -> Result<()> {
    let config = load_project(&args.project, false, true)?;
    match args.action {
        ToolCommands::Genproj => tools::generate_project_files(&config),
        ToolCommands::Genloc => tools::generate_localization(&config),
        ToolCommands::RunEditor => tools::run_editor(&config),
        ToolCommands::Standalone { launch } => tools::run_standalone(&config, &launch.into()),
        ToolCommands::Server { launch } => tools::run_server(&config, &launch.into()),
        ToolCommands::Client { launch } => tools::run_client(&config, &launch.into()),
    }
}

fn build_registry() -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    actions::register_defaults(&mut registry);
    registry
}

#[derive(Parser)]
#[command(
    name = "ue-buildsteps",
    version,
    about = "Scripted build, cook and package steps for Unreal Engine projects"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare the engine and run a project's build steps.
    Build(BuildArgs),
    ListActions,
    Validate {
        script: PathBuf,
    },
    Script {
        #[command(subcommand)]
        action: ScriptCommands,
    },
    Meta {
        #[command(subcommand)]
        action: MetaCommands,
    },
    Tools(ToolsArgs),
}

#[derive(Args)]
struct ProjectArgs {
    /// The project script which defines the project's paths, build steps and extra information.
    #[arg(long, short = 's')]
    script: PathBuf,
    /// Absolute or relative path to the engine.
    #[arg(long, short = 'e')]
    engine: Option<PathBuf>,
    #[arg(long, short = 'c', value_enum, default_value_t = Configuration::Development)]
    configuration: Configuration,
    #[arg(long, short = 'p', value_enum, default_value_t = Platform::Win64)]
    platform: Platform,
    #[arg(long)]
    automated: bool,
    #[arg(long)]
    debug: bool,
}

#[derive(Args)]
struct BuildArgs {
    #[command(flatten)]
    project: ProjectArgs,
    /// Step list to run instead of the default editor or package steps.
    #[arg(long, short = 'b')]
    build: Option<String>,
    #[arg(long, short = 't', value_enum, default_value_t = BuildType::Editor)]
    buildtype: BuildType,
    #[arg(long)]
    clean: bool,
    /// Skip engine preparation and prerequisite builds.
    #[arg(long = "build-explicit")]
    build_explicit: bool,
    #[arg(long = "meta-file", default_value = DEFAULT_META_FILE)]
    meta_file: PathBuf,
    #[arg(long = "print-summary")]
    print_summary: bool,
    #[arg(long = "summary-json")]
    summary_json: Option<PathBuf>,
    #[arg(long = "otlp-endpoint")]
    otlp_endpoint: Option<String>,
}

#[derive(Subcommand)]
enum ScriptCommands {
    New {
        #[arg(long)]
        preset: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    Lint {
        #[arg(required = true)]
        scripts: Vec<PathBuf>,
    },
}

#[derive(Subcommand)]
enum MetaCommands {
    Show {
        #[arg(long = "meta-file", default_value = DEFAULT_META_FILE)]
        meta_file: PathBuf,
    },
}

#[derive(Args)]
struct ToolsArgs {
    #[command(flatten)]
    project: ProjectArgs,
    #[command(subcommand)]
    action: ToolCommands,
}

#[derive(Subcommand)]
enum ToolCommands {
    /// Generate project files.
    Genproj,
    /// Gather localization text.
    Genloc,
    /// Open the project in the editor.
    RunEditor,
    /// Run the project as a standalone game through the editor.
    Standalone {
        #[command(flatten)]
        launch: LaunchArgs,
    },
    /// Run the packaged dedicated server.
    Server {
        #[command(flatten)]
        launch: LaunchArgs,
    },
    /// Run the packaged client.
    Client {
        #[command(flatten)]
        launch: LaunchArgs,
    },
}

#[derive(Args)]
struct LaunchArgs {
    /// The map to load.
    #[arg(long, short = 'm', default_value = "")]
    umap: String,
    /// IP to connect to as a client.
    #[arg(long, short = 'i', default_value = "")]
    ip: String,
    /// Seconds to wait before connecting to the server IP.
    #[arg(long, short = 'w', default_value_t = 0)]
    waittime: u64,
    /// Extra parameters to pass to the game, e.g. "-log -nosound".
    #[arg(long, short = 'x', default_value = "", allow_hyphen_values = true)]
    extra: String,
}

impl From<LaunchArgs> for tools::GameLaunch {
    fn from(args: LaunchArgs) -> Self {
        Self {
            umap: args.umap,
            ip: args.ip,
            wait: Duration::from_secs(args.waittime),
            extra: args.extra,
        }
    }
}
