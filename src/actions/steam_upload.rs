use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::{remove_file, run_tool, take_string};
use crate::action::{Action, ActionArgs, ActionContext, ActionInit, ArgDocs};
use crate::error::ActionError;

pub const STEAMWORKS_USER_ENV_VAR: &str = "STEAMWORKS_USER";
pub const STEAMWORKS_PASS_ENV_VAR: &str = "STEAMWORKS_PASS";

pub const ARG_DOCS: ArgDocs = &[
    ("build_name", "Packaged build folder under the builds path"),
    ("builder_exe_path", "steamcmd executable, relative to the project"),
    ("steam_app_dir", "ContentBuilder scripts folder, relative to the project"),
    ("steam_app_template", "App build VDF template, relative to the project"),
    (
        "install_script_rel_path",
        "Where the redist install script goes inside the builds path",
    ),
    ("set_live", "Branch to set the uploaded build live on"),
];

/// Uploads a packaged build with steamcmd.
#[derive(Debug, Clone, Default)]
pub struct SteamUploadAction {
    pub build_name: String,
    pub builder_exe_path: String,
    pub steam_app_dir: String,
    pub steam_app_template: String,
    pub install_script_rel_path: String,
    pub set_live: String,
}

impl SteamUploadAction {
    pub fn from_args(mut args: ActionArgs, init: &ActionInit<'_>) -> Result<Self> {
        let mut take = |key: &str| {
            take_string(&mut args, key)
                .map(|value| init.resolve(&value))
                .unwrap_or_default()
        };
        Ok(Self {
            build_name: take("build_name"),
            builder_exe_path: take("builder_exe_path"),
            steam_app_dir: take("steam_app_dir"),
            steam_app_template: take("steam_app_template"),
            install_script_rel_path: take("install_script_rel_path"),
            set_live: take("set_live"),
        })
    }
}

impl Action for SteamUploadAction {
    fn name(&self) -> &'static str {
        "steamupload"
    }

    fn verify(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        if env::var_os(STEAMWORKS_PASS_ENV_VAR).is_none() {
            return Err(ActionError::invalid("Steamworks password not on environment!"));
        }
        if env::var_os(STEAMWORKS_USER_ENV_VAR).is_none() {
            return Err(ActionError::invalid("Steamworks user not on environment!"));
        }
        if self.build_name.is_empty() || !ctx.config.builds_path.join(&self.build_name).is_dir() {
            return Err(ActionError::invalid(format!(
                "Invalid build name supplied \"{}\". Check name and ensure package folder exists!",
                self.build_name
            )));
        }
        Ok(())
    }

    fn run(&mut self, ctx: &mut ActionContext<'_>) -> Result<()> {
        let config = ctx.config;
        if config.clean {
            return Ok(());
        }

        let project_dir = &config.uproject_dir_path;
        let script_name = format!("{}_build.vdf", config.uproject_name.to_lowercase());
        let template_path = project_dir.join(&self.steam_app_template);
        let script_path = project_dir.join(&self.steam_app_dir).join(&script_name);
        let template = fs::read_to_string(&template_path).with_context(|| {
            format!("Failed to read app build template: {}", template_path.display())
        })?;
        let rendered = render_app_build(
            &template,
            &format!("..\\..\\..\\..\\..\\builds\\{}", self.build_name),
            &format!("{} Version {}", config.uproject_name, config.version_str),
            &self.set_live,
        );
        remove_file(&script_path)
            .with_context(|| format!("Failed to replace {}", script_path.display()))?;
        fs::write(&script_path, rendered)
            .with_context(|| format!("Failed to write {}", script_path.display()))?;

        let build_dir = config.builds_path.join(&self.build_name);
        let mut extras = vec![(project_dir.join("steam_appid.txt"), build_dir.join("steam_appid.txt"))];
        if !self.install_script_rel_path.is_empty() {
            extras.push((
                project_dir.join("steam_redist_installscript.vdf"),
                config.builds_path.join(&self.install_script_rel_path),
            ));
        }
        for (src, dst) in extras {
            copy_optional(&src, &dst);
        }

        info!("Uploading {} Build to Steam", config.uproject_name);
        let user = env::var(STEAMWORKS_USER_ENV_VAR).unwrap_or_default();
        let pass = env::var(STEAMWORKS_PASS_ENV_VAR).unwrap_or_default();
        let args = [
            "+login".to_string(),
            user,
            pass,
            "+run_app_build".to_string(),
            format!("..\\scripts\\{script_name}"),
            "+quit".to_string(),
        ];
        run_tool(
            &project_dir.join(&self.builder_exe_path),
            &args,
            None,
            format!("Unable to upload build {} to steam!", config.uproject_name),
        )
    }
}

fn copy_optional(src: &Path, dst: &Path) {
    match fs::copy(src, dst) {
        Ok(_) => debug!(file = %dst.display(), "Steam file inserted into build"),
        Err(err) => debug!(file = %src.display(), "Steam file not copied: {err}"),
    }
}

/// Rewrites the `desc`, `setlive` and `contentroot` lines of an app build
/// VDF template. Every other line is kept as-is.
pub fn render_app_build(template: &str, content_root: &str, desc: &str, set_live: &str) -> String {
    let mut out = String::with_capacity(template.len());
    for line in template.lines() {
        if line.contains("\"desc\"") {
            out.push_str(&format!("\t\"desc\" \"{desc}\""));
        } else if line.contains("\"setlive\"") {
            out.push_str(&format!("\t\"setlive\" \"{set_live}\""));
        } else if line.contains("\"contentroot\"") {
            out.push_str(&format!("\t\"contentroot\" \"{content_root}\""));
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}
