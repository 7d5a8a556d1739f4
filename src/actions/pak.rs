use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use super::{project_relative, run_tool, take_string, take_strings};
use crate::action::{Action, ActionArgs, ActionContext, ActionInit, ArgDocs};
use crate::config::ProjectConfig;
use crate::error::ActionError;

pub const ARG_DOCS: ArgDocs = &[
    (
        "content_dir",
        "The cooked content directory which all content_paths are relative to.",
    ),
    (
        "content_paths",
        "Relative paths from content_dir to the asset folders you want included in the pak.",
    ),
    (
        "asset_root_path",
        "Mount root of the packed assets, commonly ../../../MyContent (default ../../../)",
    ),
    ("pak_name", "The name to assign to the pak file"),
    ("output_dir", "The output directory for the pak file"),
];

const DEFAULT_ASSET_ROOT: &str = "../../../";

/// Packs pre-cooked assets into a `.pak` file with UnrealPak.
#[derive(Debug, Clone)]
pub struct PakAction {
    pub content_dir: PathBuf,
    pub content_paths: Vec<String>,
    pub asset_root_path: String,
    pub pak_name: String,
    pub output_dir: String,
    pak_path: Option<PathBuf>,
}

impl PakAction {
    pub fn from_args(mut args: ActionArgs, init: &ActionInit<'_>) -> Result<Self> {
        let content_dir = take_string(&mut args, "content_dir")
            .map(|dir| project_relative(&init.config.uproject_dir_path, &init.resolve(&dir)))
            .unwrap_or_default();
        Ok(Self {
            content_dir,
            content_paths: take_strings(&mut args, "content_paths")?,
            asset_root_path: take_string(&mut args, "asset_root_path")
                .unwrap_or_else(|| DEFAULT_ASSET_ROOT.to_string()),
            pak_name: take_string(&mut args, "pak_name").unwrap_or_default(),
            output_dir: take_string(&mut args, "output_dir")
                .map(|dir| init.resolve(&dir))
                .unwrap_or_default(),
            pak_path: None,
        })
    }
}

impl Action for PakAction {
    fn name(&self) -> &'static str {
        "pak"
    }

    fn verify(&mut self, _ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        if self.content_dir.as_os_str().is_empty() {
            return Err(ActionError::invalid("Content path is invalid!"));
        }
        if !self.content_dir.is_dir() {
            return Err(ActionError::invalid(format!(
                "Invalid Content folder for pak action ({}). Set content_dir to an existing cooked content directory.",
                self.content_dir.display()
            )));
        }
        if self.pak_name.is_empty() {
            return Err(ActionError::invalid(
                "pak_name is not set. Set the argument pak_name to a valid output pak name.",
            ));
        }
        if self.output_dir.is_empty() {
            return Err(ActionError::invalid(
                "output_dir is not set. Set the argument output_dir to a valid output path relative to the project.",
            ));
        }
        Ok(())
    }

    fn run(&mut self, ctx: &mut ActionContext<'_>) -> Result<()> {
        let lines = pak_list_lines(&self.content_dir, &self.content_paths, &self.asset_root_path)?;
        let list_path = env::current_dir()
            .context("Failed to determine current directory")?
            .join(format!("{}_pak_list.txt", self.pak_name));
        fs::write(&list_path, lines.join("\n") + "\n")
            .with_context(|| format!("Failed to write pak list: {}", list_path.display()))?;
        info!(entries = lines.len(), list = %list_path.display(), "Pak list written");

        let unreal_pak = &ctx.config.engine.unreal_pak;
        if !unreal_pak.is_file() {
            return Err(
                ActionError::failed("Unable to find path to UnrealPak.exe. Is it compiled?").into(),
            );
        }

        let pak_path = project_relative(&ctx.config.uproject_dir_path, &self.output_dir)
            .join(format!("{}.pak", self.pak_name));
        let args = pak_command_args(ctx.config, &pak_path, &list_path);
        run_tool(unreal_pak, &args, None, "Unable to pak!")?;
        self.pak_path = Some(pak_path);
        Ok(())
    }

    fn output(&self, field: &str) -> Option<Value> {
        match field {
            "pak_path" => self
                .pak_path
                .as_ref()
                .map(|path| Value::from(path.to_string_lossy().to_string())),
            _ => None,
        }
    }
}

/// Response-file lines for UnrealPak: every file below each content path,
/// mapped onto `asset_root_path`.
pub fn pak_list_lines(
    content_dir: &Path,
    content_paths: &[String],
    asset_root_path: &str,
) -> Result<Vec<String>> {
    let escaped_root = glob::Pattern::escape(&content_dir.to_string_lossy());
    let mut lines = Vec::new();
    for content_path in content_paths {
        let pattern = format!("{escaped_root}/{content_path}/**/*");
        let entries =
            glob::glob(&pattern).with_context(|| format!("Invalid content path: {content_path}"))?;
        for entry in entries {
            let asset = entry.with_context(|| format!("Failed to scan {content_path}"))?;
            if asset.is_dir() {
                continue;
            }
            let relative = asset
                .strip_prefix(content_dir)
                .unwrap_or(&asset)
                .to_string_lossy()
                .replace('\\', "/");
            let mount = if asset_root_path.ends_with('/') || asset_root_path.ends_with('\\') {
                format!("{asset_root_path}{relative}")
            } else {
                format!("{asset_root_path}/{relative}")
            };
            lines.push(format!(
                "\"{}\" \"{}\" -compress",
                asset.display(),
                mount.replace('\\', "/")
            ));
        }
    }
    Ok(lines)
}

pub fn pak_command_args(config: &ProjectConfig, pak_path: &Path, list_path: &Path) -> Vec<String> {
    vec![
        pak_path.to_string_lossy().to_string(),
        format!("-create={}", list_path.display()),
        "-encryptionini".to_string(),
        format!("-enginedir={}", config.engine.root.display()),
        format!("-projectdir={}", config.uproject_dir_path.display()),
        format!("-platform={}", config.platform),
        "-UTF8Output".to_string(),
        "-multiprocess".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_maps_assets_onto_the_mount_root() {
        let dir = tempfile::tempdir().unwrap();
        let maps = dir.path().join("Maps/Arena");
        fs::create_dir_all(&maps).unwrap();
        fs::write(maps.join("Arena.umap"), "").unwrap();
        fs::write(dir.path().join("Maps/Lobby.umap"), "").unwrap();

        let mut lines =
            pak_list_lines(dir.path(), &["Maps".to_string()], "../../../DLC").unwrap();
        lines.sort();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("\"../../../DLC/Maps/Arena/Arena.umap\" -compress"));
        assert!(lines[1].ends_with("\"../../../DLC/Maps/Lobby.umap\" -compress"));
    }

    #[test]
    fn command_names_engine_and_project() {
        let mut config = ProjectConfig::default();
        config.uproject_dir_path = PathBuf::from("/proj");
        config.engine.root = PathBuf::from("/engine");
        let args = pak_command_args(
            &config,
            Path::new("/proj/paks/dlc.pak"),
            Path::new("/tmp/dlc_pak_list.txt"),
        );
        assert_eq!(args[0], "/proj/paks/dlc.pak");
        assert_eq!(args[1], "-create=/tmp/dlc_pak_list.txt");
        assert!(args.contains(&"-enginedir=/engine".to_string()));
        assert!(args.contains(&"-platform=Win64".to_string()));
    }
}
