use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Result, bail};
use clap::ValueEnum;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::script::ProjectScript;

pub const AUTOMATED_ENV_VAR: &str = "UE_BUILDSTEPS_AUTOMATED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Configuration {
    #[value(name = "Shipping")]
    Shipping,
    #[default]
    #[value(name = "Development")]
    Development,
    #[value(name = "Debug")]
    Debug,
}

impl Configuration {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shipping => "Shipping",
            Self::Development => "Development",
            Self::Debug => "Debug",
        }
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform names as the engine toolchain spells them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Platform {
    #[value(name = "Win32")]
    Win32,
    #[default]
    #[value(name = "Win64")]
    Win64,
    #[value(name = "Linux")]
    Linux,
    #[value(name = "Android")]
    Android,
    #[value(name = "IOS")]
    Ios,
    #[value(name = "TVOS")]
    Tvos,
    #[value(name = "Mac")]
    Mac,
    #[value(name = "PS4")]
    Ps4,
    #[value(name = "XboxOne")]
    XboxOne,
    #[value(name = "Switch")]
    Switch,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Win32 => "Win32",
            Self::Win64 => "Win64",
            Self::Linux => "Linux",
            Self::Android => "Android",
            Self::Ios => "IOS",
            Self::Tvos => "TVOS",
            Self::Mac => "Mac",
            Self::Ps4 => "PS4",
            Self::XboxOne => "XboxOne",
            Self::Switch => "Switch",
        }
    }

    /// Prefix of the packaged build folder for this platform.
    pub fn long_name(&self) -> &'static str {
        match self {
            Self::Win32 | Self::Win64 => "Windows",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BuildType {
    #[default]
    #[value(name = "Editor", alias = "Game")]
    Editor,
    #[value(name = "Package")]
    Package,
}

/// Absolute paths of the engine tools, derived from the engine root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnginePaths {
    pub root: PathBuf,
    pub gen_proj_files: PathBuf,
    pub git_dependencies: PathBuf,
    pub prereq_setup: PathBuf,
    pub ubt: PathBuf,
    pub run_uat: PathBuf,
    pub build_batch: PathBuf,
    pub clean_batch: PathBuf,
    pub editor: PathBuf,
    pub version_selector: PathBuf,
    pub header_tool: PathBuf,
    pub unreal_pak: PathBuf,
    binaries: PathBuf,
    editor_stem: &'static str,
}

impl EnginePaths {
    pub fn new(root: &Path, engine_major_version: u32) -> Self {
        let binaries = root.join("Engine/Binaries/Win64");
        let batch = root.join("Engine/Build/BatchFiles");
        let editor_stem = if engine_major_version >= 5 {
            "UnrealEditor"
        } else {
            "UE4Editor"
        };
        Self {
            root: root.to_path_buf(),
            gen_proj_files: batch.join("GenerateProjectFiles.bat"),
            git_dependencies: root.join("Engine/Binaries/DotNET/GitDependencies.exe"),
            prereq_setup: root.join("Engine/Extras/Redist/en-us/UE4PrereqSetup_x64.exe"),
            ubt: root.join("Engine/Binaries/DotNET/UnrealBuildTool.exe"),
            run_uat: batch.join("RunUAT.bat"),
            build_batch: batch.join("Build.bat"),
            clean_batch: batch.join("Clean.bat"),
            editor: binaries.join(format!("{editor_stem}.exe")),
            version_selector: binaries.join("UnrealVersionSelector-Win64-Shipping.exe"),
            header_tool: binaries.join("UnrealHeaderTool.exe"),
            unreal_pak: binaries.join("UnrealPak.exe"),
            binaries,
            editor_stem,
        }
    }

    /// File name of the command-line editor used for commandlets.
    pub fn editor_cmd_name(&self, debug: bool) -> String {
        if debug {
            format!("{}-Win64-Debug-Cmd.exe", self.editor_stem)
        } else {
            format!("{}-Cmd.exe", self.editor_stem)
        }
    }

    pub fn editor_cmd(&self, debug: bool) -> PathBuf {
        self.binaries.join(self.editor_cmd_name(debug))
    }
}

/// Options chosen on the command line before the script overlay is applied.
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub configuration: Configuration,
    pub platform: Platform,
    pub clean: bool,
    pub debug: bool,
    pub automated: bool,
    pub engine_override: Option<PathBuf>,
    pub ensure_engine: bool,
}

/// Resolved project configuration.
///
/// Built once per CLI invocation and shared with actions behind an `Arc`;
/// an action that needs a tweaked copy goes through `Arc::make_mut`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectConfig {
    pub configuration: Configuration,
    pub platform: Platform,
    pub clean: bool,
    pub debug: bool,
    pub automated: bool,
    pub editor_running: bool,
    pub script: ProjectScript,
    pub project_path: String,
    pub uproject_name: String,
    pub uproject_dir_path: PathBuf,
    pub uproject_file_path: PathBuf,
    pub proj_localization_script: PathBuf,
    pub builds_path: PathBuf,
    pub version_str: String,
    pub engine_path_name: String,
    pub engine_major_version: u32,
    pub engine_minor_version: u32,
    pub visual_studio_version: Option<u32>,
    pub exclude_samples: bool,
    pub extra_dependency_excludes: Vec<String>,
    pub build_engine_tools: Vec<String>,
    pub should_build_engine_tools: bool,
    pub force_dependencies: bool,
    pub git_engine_repo: String,
    pub git_engine_branch: String,
    pub engine_key_name: String,
    pub engine: EnginePaths,
    /// Every key of the script's `config` object, as written.
    pub settings: Map<String, Value>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self::new(Configuration::default(), Platform::default())
    }
}

impl ProjectConfig {
    pub fn new(configuration: Configuration, platform: Platform) -> Self {
        Self {
            configuration,
            platform,
            clean: false,
            debug: false,
            automated: automated_from_env(),
            editor_running: false,
            script: ProjectScript::default(),
            project_path: String::new(),
            uproject_name: String::new(),
            uproject_dir_path: PathBuf::new(),
            uproject_file_path: PathBuf::new(),
            proj_localization_script: PathBuf::new(),
            builds_path: PathBuf::new(),
            version_str: "1.0.0.0".to_string(),
            engine_path_name: String::new(),
            engine_major_version: 4,
            engine_minor_version: 27,
            visual_studio_version: None,
            exclude_samples: false,
            extra_dependency_excludes: Vec::new(),
            build_engine_tools: [
                "UnrealFrontend",
                "ShaderCompileWorker",
                "UnrealLightmass",
                "CrashReportClient",
                "UE4Editor",
            ]
            .iter()
            .map(|name| name.to_string())
            .collect(),
            should_build_engine_tools: true,
            force_dependencies: false,
            git_engine_repo: String::new(),
            git_engine_branch: String::new(),
            engine_key_name: String::new(),
            engine: EnginePaths::default(),
            settings: Map::new(),
        }
    }

    /// Resolves a configuration from a loaded script. Relative project paths
    /// are taken relative to `script_dir`.
    pub fn load(script: ProjectScript, script_dir: &Path, options: &ConfigOptions) -> Result<Self> {
        let mut config = Self::new(options.configuration, options.platform);
        config.clean = options.clean;
        config.debug = options.debug;
        config.automated = options.automated || config.automated;

        let overrides = script.config();
        config.apply_overrides(&overrides);
        config.script = script;

        if config.project_path.is_empty() {
            bail!("The build script config does not set project_path");
        }
        let project_path = Path::new(&config.project_path);
        config.uproject_name = project_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        let project_dir = project_path.parent().unwrap_or_else(|| Path::new(""));
        config.uproject_dir_path = normalize(&script_dir.join(project_dir));
        config.uproject_file_path = config
            .uproject_dir_path
            .join(format!("{}.uproject", config.uproject_name));
        if !config.uproject_file_path.is_file() {
            bail!(
                "Invalid uproject path ({})! Check your project_path configuration.",
                config.uproject_file_path.display()
            );
        }
        config.proj_localization_script = config
            .uproject_dir_path
            .join("Config/Localization/Game.ini");

        let ini = config.uproject_dir_path.join("Config/DefaultGame.ini");
        if let Some(version) = read_project_version(&ini) {
            config.version_str = version;
        }

        config.builds_path = config.uproject_dir_path.join("builds");

        let engine_found = config.setup_engine_paths(options.engine_override.as_deref());
        if !engine_found && options.ensure_engine {
            bail!("No engine could be found!");
        }
        Ok(config)
    }

    /// Applies the script's `config` object onto the typed fields. Unknown
    /// keys are only kept in `settings`.
    pub fn apply_overrides(&mut self, overrides: &Map<String, Value>) {
        for (key, value) in overrides {
            self.settings.insert(key.clone(), value.clone());
            match key.as_str() {
                "clean" => assign_bool(&mut self.clean, value),
                "debug" => assign_bool(&mut self.debug, value),
                "automated" => assign_bool(&mut self.automated, value),
                "exclude_samples" => assign_bool(&mut self.exclude_samples, value),
                "should_build_engine_tools" => {
                    assign_bool(&mut self.should_build_engine_tools, value)
                }
                "force_dependencies" => assign_bool(&mut self.force_dependencies, value),
                "project_path" => assign_string(&mut self.project_path, value),
                "engine_path_name" => assign_string(&mut self.engine_path_name, value),
                "version_str" => assign_string(&mut self.version_str, value),
                "git_engine_repo" => assign_string(&mut self.git_engine_repo, value),
                "git_engine_branch" => assign_string(&mut self.git_engine_branch, value),
                "engine_key_name" | "UE4EngineKeyName" => {
                    assign_string(&mut self.engine_key_name, value)
                }
                "engine_major_version" => assign_u32(&mut self.engine_major_version, value),
                "engine_minor_version" => assign_u32(&mut self.engine_minor_version, value),
                "visual_studio_version" => {
                    self.visual_studio_version =
                        value.as_u64().and_then(|v| u32::try_from(v).ok())
                }
                "build_engine_tools" => assign_strings(&mut self.build_engine_tools, value),
                "extra_dependency_excludes" => {
                    assign_strings(&mut self.extra_dependency_excludes, value)
                }
                _ => {}
            }
        }
    }

    /// Points the engine paths at `custom_engine_path`, or at
    /// `engine_path_name` relative to the project. Returns whether the
    /// directory looks like a usable engine.
    pub fn setup_engine_paths(&mut self, custom_engine_path: Option<&Path>) -> bool {
        let root = match custom_engine_path {
            Some(path) => path.to_path_buf(),
            None => normalize(&self.uproject_dir_path.join(&self.engine_path_name)),
        };

        let found = if !self.engine_key_name.is_empty() && !root.is_dir() {
            warn!(
                key = %self.engine_key_name,
                "Engine registry lookup is not supported; set the engine path explicitly"
            );
            false
        } else {
            check_engine_dir_valid(&root)
        };

        if found {
            self.editor_running = is_editor_running(&root);
        }
        self.engine = EnginePaths::new(&root, self.engine_major_version);
        debug!(engine = %root.display(), found, "Engine paths configured");
        found
    }

    /// True when the engine tools needed for building and packaging exist.
    pub fn check_environment(&self) -> bool {
        self.engine.root.is_dir()
            && self.engine.editor.is_file()
            && self.engine.ubt.is_file()
            && self.engine.run_uat.is_file()
    }

    pub fn engine_at_least(&self, major: u32, minor: u32) -> bool {
        (self.engine_major_version, self.engine_minor_version) >= (major, minor)
    }

    /// Looks up a configuration attribute by name for templating and step
    /// conditions. Typed fields win over raw `settings` entries.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        let path = |p: &Path| Some(Value::String(p.to_string_lossy().to_string()));
        match name {
            "configuration" => Some(json!(self.configuration.as_str())),
            "platform" => Some(json!(self.platform.as_str())),
            "clean" => Some(json!(self.clean)),
            "debug" => Some(json!(self.debug)),
            "automated" => Some(json!(self.automated)),
            "editor_running" => Some(json!(self.editor_running)),
            "exclude_samples" => Some(json!(self.exclude_samples)),
            "should_build_engine_tools" => Some(json!(self.should_build_engine_tools)),
            "force_dependencies" => Some(json!(self.force_dependencies)),
            "project_path" => Some(json!(self.project_path)),
            "uproject_name" => Some(json!(self.uproject_name)),
            "version_str" => Some(json!(self.version_str)),
            "engine_path_name" => Some(json!(self.engine_path_name)),
            "engine_major_version" => Some(json!(self.engine_major_version)),
            "engine_minor_version" => Some(json!(self.engine_minor_version)),
            "git_engine_repo" => Some(json!(self.git_engine_repo)),
            "git_engine_branch" => Some(json!(self.git_engine_branch)),
            "uproject_dir_path" => path(&self.uproject_dir_path),
            "uproject_file_path" => path(&self.uproject_file_path),
            "proj_localization_script" => path(&self.proj_localization_script),
            "builds_path" => path(&self.builds_path),
            "engine_path" | "UE4EnginePath" => path(&self.engine.root),
            "UE4UBTPath" => path(&self.engine.ubt),
            "UE4RunUATBatPath" => path(&self.engine.run_uat),
            "UE4BuildBatchPath" => path(&self.engine.build_batch),
            "UE4CleanBatchPath" => path(&self.engine.clean_batch),
            "UE4EditorPath" => path(&self.engine.editor),
            _ => self.settings.get(name).cloned(),
        }
    }
}

fn automated_from_env() -> bool {
    std::env::var(AUTOMATED_ENV_VAR)
        .map(|value| value == "1")
        .unwrap_or(false)
}

fn assign_bool(target: &mut bool, value: &Value) {
    if let Some(flag) = value.as_bool() {
        *target = flag;
    }
}

fn assign_string(target: &mut String, value: &Value) {
    if let Some(text) = value.as_str() {
        *target = text.to_string();
    }
}

fn assign_u32(target: &mut u32, value: &Value) {
    if let Some(number) = value.as_u64().and_then(|n| u32::try_from(n).ok()) {
        *target = number;
    }
}

fn assign_strings(target: &mut Vec<String>, value: &Value) {
    if let Some(items) = value.as_array() {
        *target = items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect();
    }
}

/// Lexically collapses `.` and `..` components without touching the
/// filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub fn check_engine_dir_valid(dir: &Path) -> bool {
    dir.is_dir() && dir.join("Engine/Binaries/DotNET/GitDependencies.exe").is_file()
}

/// Reads `ProjectVersion=<version>` from an engine ini file.
pub fn read_project_version(ini: &Path) -> Option<String> {
    let content = fs::read_to_string(ini).ok()?;
    parse_project_version(&content)
}

pub fn parse_project_version(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let rest = line.strip_prefix("ProjectVersion")?;
        let value = rest.trim_start().strip_prefix('=')?;
        value.split_whitespace().next().map(str::to_string)
    })
}

#[cfg(windows)]
fn is_editor_running(engine_root: &Path) -> bool {
    let Ok(listing) = crate::process::capture("tasklist", &[], None) else {
        return false;
    };
    let running = listing.lines().any(|line| {
        line.split_whitespace().next().is_some_and(|exe| {
            let exe = exe.to_lowercase();
            exe.contains("ue4editor") || exe.contains("unrealeditor")
        })
    });
    debug!(engine = %engine_root.display(), running, "Editor process probe");
    running
}

#[cfg(not(windows))]
fn is_editor_running(_engine_root: &Path) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overrides_update_typed_fields_and_settings() {
        let mut config = ProjectConfig::default();
        let overrides = json!({
            "clean": true,
            "engine_major_version": 5,
            "build_engine_tools": ["ShaderCompileWorker"],
            "custom_flag": false
        });
        config.apply_overrides(overrides.as_object().unwrap());
        assert!(config.clean);
        assert_eq!(config.engine_major_version, 5);
        assert_eq!(config.build_engine_tools, vec!["ShaderCompileWorker"]);
        assert_eq!(config.attribute("custom_flag"), Some(json!(false)));
        assert_eq!(config.attribute("clean"), Some(json!(true)));
        assert_eq!(config.attribute("nope"), None);
    }

    #[test]
    fn project_version_parsing() {
        let ini = "[/Script/EngineSettings.GeneralProjectSettings]\nProjectVersion = 1.2.3.4\n";
        assert_eq!(parse_project_version(ini), Some("1.2.3.4".to_string()));
        assert_eq!(parse_project_version("ProjectName=Game"), None);
    }

    #[test]
    fn normalize_collapses_parent_components() {
        assert_eq!(
            normalize(Path::new("/work/scripts/../Game/./Content")),
            PathBuf::from("/work/Game/Content")
        );
    }

    #[test]
    fn engine_paths_follow_major_version() {
        let ue4 = EnginePaths::new(Path::new("/engine"), 4);
        assert!(ue4.editor.ends_with("UE4Editor.exe"));
        assert_eq!(ue4.editor_cmd_name(true), "UE4Editor-Win64-Debug-Cmd.exe");
        let ue5 = EnginePaths::new(Path::new("/engine"), 5);
        assert!(ue5.editor.ends_with("UnrealEditor.exe"));
        assert_eq!(ue5.editor_cmd_name(false), "UnrealEditor-Cmd.exe");
    }

    #[test]
    fn platform_long_names() {
        assert_eq!(Platform::Win64.long_name(), "Windows");
        assert_eq!(Platform::Linux.long_name(), "Linux");
    }
}
