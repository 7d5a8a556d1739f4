use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use super::{project_relative, remove_file, remove_tree, run_tool, take_bool, take_string, take_strings};
use crate::action::{Action, ActionArgs, ActionContext, ActionInit, ArgDocs};
use crate::config::ProjectConfig;
use crate::error::ActionError;

pub const ARG_DOCS: ArgDocs = &[
    (
        "pak_assets",
        "Should all cooked assets be packaged into a single .pak file or left loose?",
    ),
    (
        "nativize_assets",
        "Should blueprint script assemblies be converted into c++ equivalent?",
    ),
    ("compressed_assets", "Compress cooked assets (default true)"),
    ("no_debug_info", "Strip debug info from the packaged build"),
    ("full_rebuild", "Clean cook instead of iterating on previous output"),
    ("no_editor_content", "Skip cooking editor-only content"),
    ("no_compile_editor", "Do not compile the editor before cooking (default true)"),
    ("ignore_cook_errors", "Keep packaging when the cook reports errors"),
    ("build_type", "standalone, client or server (default standalone)"),
    ("maps", "Maps to cook"),
    ("cook_dirs", "Directories to always cook, relative to the project"),
    ("cook_output_dir", "Cook output directory, relative to the project"),
    ("build", "Run the build phase (default true)"),
    ("cook", "Run the cook phase (default true)"),
    ("package", "Run the package phase (default true)"),
    ("stage", "Run the stage phase (default true)"),
    ("archive", "Archive into the builds folder (default true)"),
    (
        "content_black_list",
        "Pak blacklist file relative to the project, used for this package only",
    ),
];

const BUILD_TYPES: [&str; 3] = ["standalone", "client", "server"];

/// Builds, cooks and packages the project through RunUAT BuildCookRun.
#[derive(Debug, Clone)]
pub struct PackageAction {
    pub pak_assets: bool,
    pub nativize_assets: bool,
    pub compressed_assets: bool,
    pub no_debug_info: bool,
    pub full_rebuild: bool,
    pub no_editor_content: bool,
    pub no_compile_editor: bool,
    pub ignore_cook_errors: bool,
    pub build_type: String,
    pub maps: Vec<String>,
    pub cook_dirs: Vec<String>,
    pub cook_output_dir: String,
    pub build: bool,
    pub cook: bool,
    pub package: bool,
    pub stage: bool,
    pub archive: bool,
    pub content_black_list: String,
    build_path: Option<PathBuf>,
}

impl Default for PackageAction {
    fn default() -> Self {
        Self {
            pak_assets: true,
            nativize_assets: true,
            compressed_assets: true,
            no_debug_info: false,
            full_rebuild: false,
            no_editor_content: false,
            no_compile_editor: true,
            ignore_cook_errors: false,
            build_type: String::new(),
            maps: Vec::new(),
            cook_dirs: Vec::new(),
            cook_output_dir: String::new(),
            build: true,
            cook: true,
            package: true,
            stage: true,
            archive: true,
            content_black_list: String::new(),
            build_path: None,
        }
    }
}

impl PackageAction {
    pub fn from_args(mut args: ActionArgs, init: &ActionInit<'_>) -> Result<Self> {
        let defaults = Self::default();
        let mut flag = |key: &str, default: bool| -> Result<bool> {
            Ok(take_bool(&mut args, key)?.unwrap_or(default))
        };
        let pak_assets = flag("pak_assets", defaults.pak_assets)?;
        let nativize_assets = flag("nativize_assets", defaults.nativize_assets)?;
        let compressed_assets = flag("compressed_assets", defaults.compressed_assets)?;
        let no_debug_info = flag("no_debug_info", defaults.no_debug_info)?;
        let full_rebuild = flag("full_rebuild", defaults.full_rebuild)?;
        let no_editor_content = flag("no_editor_content", defaults.no_editor_content)?;
        let no_compile_editor = flag("no_compile_editor", defaults.no_compile_editor)?;
        let ignore_cook_errors = flag("ignore_cook_errors", defaults.ignore_cook_errors)?;
        let build = flag("build", defaults.build)?;
        let cook = flag("cook", defaults.cook)?;
        let package = flag("package", defaults.package)?;
        let stage = flag("stage", defaults.stage)?;
        let archive = flag("archive", defaults.archive)?;

        Ok(Self {
            pak_assets,
            nativize_assets,
            compressed_assets,
            no_debug_info,
            full_rebuild,
            no_editor_content,
            no_compile_editor,
            ignore_cook_errors,
            build,
            cook,
            package,
            stage,
            archive,
            build_type: take_string(&mut args, "build_type").unwrap_or_default(),
            maps: take_strings(&mut args, "maps")?,
            cook_dirs: take_strings(&mut args, "cook_dirs")?,
            cook_output_dir: take_string(&mut args, "cook_output_dir")
                .map(|dir| init.resolve(&dir))
                .unwrap_or_default(),
            content_black_list: take_string(&mut args, "content_black_list")
                .map(|path| init.resolve(&path))
                .unwrap_or_default(),
            build_path: None,
        })
    }

    /// Folder under the builds path that the archive step produces.
    pub fn build_folder_name(&self, config: &ProjectConfig) -> String {
        let platform = config.platform.long_name();
        match self.build_type.as_str() {
            "client" => format!("{platform}Client"),
            "server" => format!("{platform}Server"),
            _ if self.no_compile_editor => format!("{platform}NoEditor"),
            _ => platform.to_string(),
        }
    }

    pub fn command_args(&self, config: &ProjectConfig) -> Vec<String> {
        let uproject = config.uproject_file_path.display();
        let platform = config.platform;
        let configuration = config.configuration;
        let editor_flag = if config.engine_major_version >= 5 {
            "-unrealexe"
        } else {
            "-ue4exe"
        };
        let mut args = vec![
            format!("-ScriptsForProject={uproject}"),
            "BuildCookRun".to_string(),
            "-NoHotReload".to_string(),
            "-nop4".to_string(),
            format!("-project={uproject}"),
            format!("-archivedirectory={}", config.builds_path.display()),
            format!("-clientconfig={configuration}"),
            format!("-serverconfig={configuration}"),
            format!("{editor_flag}={}", config.engine.editor_cmd_name(config.debug)),
            "-prereqs".to_string(),
            format!("-targetplatform={platform}"),
            format!("-platform={platform}"),
            format!("-servertargetplatform={platform}"),
            format!("-serverplatform={platform}"),
            "-CrashReporter".to_string(),
            "-utf8output".to_string(),
        ];

        let mut push_if = |enabled: bool, flag: &str| {
            if enabled {
                args.push(flag.to_string());
            }
        };
        push_if(self.no_compile_editor, "-nocompileeditor");
        push_if(self.build, "-build");
        push_if(self.cook, "-cook");
        push_if(self.package, "-package");
        push_if(self.stage, "-stage");
        push_if(!self.stage, "-skipstage");
        push_if(self.archive, "-archive");
        push_if(self.build_type == "client", "-client");
        push_if(self.build_type == "server", "-server");
        push_if(self.build_type == "server", "-noclient");
        push_if(self.nativize_assets, "-nativizeAssets");
        push_if(self.pak_assets && self.stage, "-pak");
        push_if(self.compressed_assets, "-compressed");
        push_if(self.no_debug_info, "-nodebuginfo");
        push_if(self.no_editor_content, "-SkipCookingEditorContent");
        push_if(self.ignore_cook_errors, "-IgnoreCookErrors");

        if !self.cook_output_dir.is_empty() {
            args.push(format!(
                "-CookOutputDir={}",
                project_relative(&config.uproject_dir_path, &self.cook_output_dir).display()
            ));
        }
        if !self.maps.is_empty() {
            args.push(format!("-map={}", self.maps.join("+")));
        }
        if !self.cook_dirs.is_empty() {
            args.push(format!("-cookdir={}", self.cook_dirs.join("+")));
        }

        if self.cook_output_dir.is_empty() && (config.clean || self.full_rebuild) {
            args.push("-clean".into());
        } else {
            args.push("-iterate".into());
            args.push("-iterativecooking".into());
        }
        args.push("-compile".into());
        args
    }

    fn blacklist_path(&self, config: &ProjectConfig) -> PathBuf {
        config
            .uproject_dir_path
            .join("Build")
            .join(config.platform.as_str())
            .join(format!("PakBlacklist-{}.txt", config.configuration))
    }
}

impl Action for PackageAction {
    fn name(&self) -> &'static str {
        "package"
    }

    fn verify(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        if !ctx.config.check_environment() {
            return Err(ActionError::invalid(
                "Environment is not ready for building or packaging!",
            ));
        }

        if !BUILD_TYPES.contains(&self.build_type.as_str()) {
            ctx.warning(format!(
                "Unrecognized build type ({}) for package. Defaulting to \"standalone\".\nValid types={BUILD_TYPES:?}",
                self.build_type
            ));
            self.build_type = "standalone".to_string();
        }

        let mut resolved = Vec::with_capacity(self.cook_dirs.len());
        for dir in &self.cook_dirs {
            let path = project_relative(&ctx.config.uproject_dir_path, dir);
            if !path.is_dir() {
                return Err(ActionError::invalid(format!(
                    "{} invalid cook dir!",
                    path.display()
                )));
            }
            resolved.push(path.to_string_lossy().to_string());
        }
        self.cook_dirs = resolved;
        Ok(())
    }

    fn run(&mut self, ctx: &mut ActionContext<'_>) -> Result<()> {
        let config = Arc::clone(ctx.config);
        let config = config.as_ref();
        if config.editor_running {
            ctx.warning(
                "You are packaging while also running the editor. This could fail because of memory contraints.",
            );
        }

        let build_path = config.builds_path.join(self.build_folder_name(config));
        if config.clean {
            info!(path = %build_path.display(), "Removing previous build");
            remove_tree(&build_path)
                .with_context(|| format!("Failed to remove {}", build_path.display()))?;
        }

        let blacklist = self.blacklist_path(config);
        if !self.content_black_list.is_empty() {
            info!(
                "Setting up content blacklist for configuration {}",
                config.configuration
            );
            if let Some(parent) = blacklist.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let source = project_relative(&config.uproject_dir_path, &self.content_black_list);
            remove_file(&blacklist)
                .with_context(|| format!("Failed to replace {}", blacklist.display()))?;
            fs::copy(&source, &blacklist).with_context(|| {
                format!("Failed to copy content blacklist {}", source.display())
            })?;
        }

        if !self.cook_output_dir.is_empty() {
            // Iterative cooks into a custom output dir fail on stale content.
            let cook_output = project_relative(&config.uproject_dir_path, &self.cook_output_dir);
            remove_tree(&cook_output)
                .with_context(|| format!("Failed to clear {}", cook_output.display()))?;
        }

        let args = self.command_args(config);
        let result = run_tool(
            &config.engine.run_uat,
            &args,
            None,
            format!("Unable to build {}!", config.uproject_name),
        );

        if blacklist.is_file()
            && let Err(err) = remove_file(&blacklist)
        {
            warn!(path = %blacklist.display(), "Failed to remove content blacklist: {err}");
        }
        result?;
        self.build_path = Some(build_path);
        Ok(())
    }

    fn output(&self, field: &str) -> Option<Value> {
        match field {
            "build_path" => self
                .build_path
                .as_ref()
                .map(|path| Value::from(path.to_string_lossy().to_string())),
            "build_type" => Some(Value::from(self.build_type.clone())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Configuration, EnginePaths, Platform};
    use std::path::Path;

    fn config() -> ProjectConfig {
        let mut config = ProjectConfig::new(Configuration::Shipping, Platform::Win64);
        config.uproject_name = "Shooter".into();
        config.uproject_dir_path = PathBuf::from("/proj");
        config.uproject_file_path = PathBuf::from("/proj/Shooter.uproject");
        config.builds_path = PathBuf::from("/proj/builds");
        config.engine = EnginePaths::new(Path::new("/engine"), 4);
        config
    }

    #[test]
    fn default_package_is_an_iterative_standalone_cook() {
        let action = PackageAction {
            build_type: "standalone".into(),
            ..PackageAction::default()
        };
        let args = action.command_args(&config());
        assert_eq!(args[0], "-ScriptsForProject=/proj/Shooter.uproject");
        assert_eq!(args[1], "BuildCookRun");
        assert!(args.contains(&"-ue4exe=UE4Editor-Cmd.exe".to_string()));
        assert!(args.contains(&"-pak".to_string()));
        assert!(args.contains(&"-iterativecooking".to_string()));
        assert!(!args.contains(&"-clean".to_string()));
        assert_eq!(args.last().unwrap(), "-compile");
        assert_eq!(action.build_folder_name(&config()), "WindowsNoEditor");
    }

    #[test]
    fn server_packages_skip_the_client() {
        let action = PackageAction {
            build_type: "server".into(),
            stage: false,
            maps: vec!["Arena".into(), "Lobby".into()],
            ..PackageAction::default()
        };
        let mut config = config();
        config.clean = true;
        let args = action.command_args(&config);
        assert!(args.contains(&"-server".to_string()));
        assert!(args.contains(&"-noclient".to_string()));
        assert!(args.contains(&"-skipstage".to_string()));
        assert!(!args.contains(&"-pak".to_string()));
        assert!(args.contains(&"-map=Arena+Lobby".to_string()));
        assert!(args.contains(&"-clean".to_string()));
        assert_eq!(action.build_folder_name(&config), "WindowsServer");
    }
}
