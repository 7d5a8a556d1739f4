//! Auxiliary project commands that sit outside the step runner.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::info;

use crate::config::ProjectConfig;
use crate::process;

/// Regenerates the IDE project files through UnrealBuildTool.
pub fn generate_project_files(config: &ProjectConfig) -> Result<()> {
    info!("Generating Project Files");
    if process::launch(&config.engine.ubt, &genproj_args(config))? != 0 {
        bail!("Failed to generate project files, see errors...");
    }
    Ok(())
}

pub fn genproj_args(config: &ProjectConfig) -> Vec<String> {
    let mut args = vec![
        "-ProjectFiles".to_string(),
        format!("-project={}", config.uproject_file_path.display()),
        "-game".to_string(),
        "-engine".to_string(),
    ];
    if config.visual_studio_version == Some(2017) {
        args.push("-2017".to_string());
    }
    args
}

/// Gathers localization text with the project's localization config.
pub fn generate_localization(config: &ProjectConfig) -> Result<()> {
    info!("Generating Localization");
    if process::launch(&config.engine.editor, &genloc_args(config))? != 0 {
        bail!("Failed to generate localization, see errors...");
    }
    Ok(())
}

pub fn genloc_args(config: &ProjectConfig) -> Vec<String> {
    vec![
        config.uproject_file_path.to_string_lossy().to_string(),
        "-Run=GatherText".to_string(),
        format!("-config={}", config.proj_localization_script.display()),
        "-log".to_string(),
    ]
}

/// Opens the project in the editor and returns without waiting for it.
pub fn run_editor(config: &ProjectConfig) -> Result<()> {
    info!("Running Editor");
    let project = config.uproject_file_path.to_string_lossy();
    let pid = process::spawn(&config.engine.editor, &[project.as_ref()])?;
    info!(pid, "Editor started");
    Ok(())
}

const WINDOWED: [&str; 4] = ["-game", "-windowed", "-ResX=1280", "-ResY=720"];

/// Options shared by the game launchers. Empty strings mean "not given".
#[derive(Debug, Clone, Default)]
pub struct GameLaunch {
    pub umap: String,
    pub ip: String,
    /// Delay before a standalone client connects to `ip`.
    pub wait: Duration,
    /// Flags such as `-log -nosound`, passed through to the game.
    pub extra: String,
}

/// Starts the project through the editor in game mode.
pub fn run_standalone(config: &ProjectConfig, launch: &GameLaunch) -> Result<()> {
    info!("Running Standalone");
    if !launch.ip.is_empty() && !launch.wait.is_zero() {
        thread::sleep(launch.wait);
    }
    let pid = process::spawn(&config.engine.editor, &standalone_args(config, launch))?;
    info!(pid, "Standalone game started");
    Ok(())
}

pub fn standalone_args(config: &ProjectConfig, launch: &GameLaunch) -> Vec<String> {
    let mut args = vec![config.uproject_file_path.to_string_lossy().to_string()];
    if !launch.umap.is_empty() {
        args.push(launch.umap.clone());
    }
    if !launch.ip.is_empty() {
        args.push(launch.ip.clone());
    }
    args.extend(WINDOWED.iter().map(|arg| arg.to_string()));
    args.extend(extra_args(&launch.extra));
    args
}

/// Starts the packaged dedicated server.
pub fn run_server(config: &ProjectConfig, launch: &GameLaunch) -> Result<()> {
    info!("Running Server");
    let exe = server_exe(config);
    if !exe.is_file() {
        bail!("Server is not built!");
    }
    let pid = process::spawn(&exe, &server_args(launch))?;
    info!(pid, "Server started");
    Ok(())
}

pub fn server_exe(config: &ProjectConfig) -> PathBuf {
    let name = &config.uproject_name;
    packaged_binaries(config, "WindowsServer").join(format!("{name}Server.exe"))
}

pub fn server_args(launch: &GameLaunch) -> Vec<String> {
    let mut args = Vec::new();
    if !launch.umap.is_empty() {
        args.push(launch.umap.clone());
    }
    args.extend(extra_args(&launch.extra));
    args
}

/// Starts the packaged game client.
pub fn run_client(config: &ProjectConfig, launch: &GameLaunch) -> Result<()> {
    info!("Running Client");
    let exe = client_exe(config);
    if !exe.is_file() {
        bail!("Client is not built!");
    }
    let pid = process::spawn(&exe, &client_args(launch))?;
    info!(pid, "Client started");
    Ok(())
}

pub fn client_exe(config: &ProjectConfig) -> PathBuf {
    let name = &config.uproject_name;
    packaged_binaries(config, "WindowsNoEditor").join(format!("{name}.exe"))
}

pub fn client_args(launch: &GameLaunch) -> Vec<String> {
    let mut args = Vec::new();
    if !launch.ip.is_empty() {
        args.push(launch.ip.clone());
    }
    args.extend(WINDOWED.iter().map(|arg| arg.to_string()));
    args.extend(extra_args(&launch.extra));
    args
}

fn packaged_binaries(config: &ProjectConfig, flavor: &str) -> PathBuf {
    config
        .uproject_dir_path
        .join("builds")
        .join(flavor)
        .join(&config.uproject_name)
        .join("Binaries")
        .join("Win64")
}

/// Splits `-log -ExecCmds=stat fps` into `["-log", "-ExecCmds=stat fps"]`.
fn extra_args(extra: &str) -> Vec<String> {
    extra
        .split('-')
        .skip(1)
        .map(str::trim)
        .filter(|arg| !arg.is_empty())
        .map(|arg| format!("-{arg}"))
        .collect()
}
