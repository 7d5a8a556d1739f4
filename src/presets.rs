use anyhow::{Context, Result};
use serde_json::{Map, Value, json};
use std::fs;
use std::path::{Path, PathBuf};

use crate::script::{ActionSpec, StepSpec};

pub const PRESET_NAMES: &[&str] = &["editor", "package", "ci"];

/// Writes a starter project script for `name` to `destination`.
pub fn generate_preset(name: &str, destination: &Path) -> Result<PathBuf> {
    let preset = match name {
        "editor" => editor_preset(),
        "package" => package_preset(),
        "ci" => ci_preset(),
        other => anyhow::bail!(
            "Unknown preset '{other}' (expected one of: {})",
            PRESET_NAMES.join(", ")
        ),
    };

    let mut rendered = serde_json::to_string_pretty(&preset)?;
    rendered.push('\n');
    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(destination, rendered)
        .with_context(|| format!("Failed to write preset script: {}", destination.display()))?;

    Ok(destination.to_path_buf())
}

fn base_config() -> Map<String, Value> {
    let mut config = Map::new();
    config.insert("project_path".into(), json!("../Game/Game.uproject"));
    config.insert("engine_path_name".into(), json!("../UnrealEngine"));
    config.insert("engine_major_version".into(), json!(4));
    config.insert("engine_minor_version".into(), json!(27));
    config
}

fn document(config: Map<String, Value>, lists: Vec<(&str, Vec<StepSpec>)>) -> Value {
    let mut document = Map::new();
    document.insert("config".into(), Value::Object(config));
    for (name, steps) in lists {
        document.insert(name.into(), json!(steps));
    }
    Value::Object(document)
}

fn editor_preset() -> Value {
    document(
        base_config(),
        vec![(
            "editor_steps",
            vec![step(
                "Build the game editor",
                action("actions.build", &[("build_name", json!("GameEditor"))]),
            )],
        )],
    )
}

fn package_preset() -> Value {
    document(
        base_config(),
        vec![(
            "package_steps",
            vec![
                step(
                    "Bump the project version",
                    action("actions.versioninc", &[]),
                ),
                step(
                    "Package the game",
                    persisting(
                        action(
                            "actions.package",
                            &[
                                ("build_type", json!("standalone")),
                                ("maps", json!([])),
                                ("cook_dirs", json!([])),
                            ],
                        ),
                        "last_build_path",
                        "build_path",
                    ),
                ),
            ],
        )],
    )
}

fn ci_preset() -> Value {
    let mut config = base_config();
    config.insert("git_engine_repo".into(), json!("git@example.com:studio/UnrealEngine.git"));
    config.insert("git_engine_branch".into(), json!("release"));
    config.insert("exclude_samples".into(), json!(true));
    config.insert("automated".into(), json!(true));

    let mut upload = step(
        "Upload to steam",
        action(
            "actions.steamupload",
            &[
                ("build_name", json!("WindowsNoEditor")),
                ("builder_exe_path", json!("steam/builder/steamcmd.exe")),
                ("steam_app_dir", json!("steam/scripts")),
                ("steam_app_template", json!("steam/app_build_template.vdf")),
                ("set_live", json!("beta")),
            ],
        ),
    );
    upload.condition = Some("not clean".into());
    upload.allow_failure = true;

    document(
        config,
        vec![
            (
                "package_steps",
                vec![
                    step(
                        "Package the game",
                        action("actions.buildsteps", &[("steps_name", json!("package_game"))]),
                    ),
                    upload,
                ],
            ),
            (
                "package_game",
                vec![step(
                    "Package a shipping build",
                    action("actions.package", &[("build_type", json!("standalone"))]),
                )],
            ),
        ],
    )
}

fn step(desc: &str, action: ActionSpec) -> StepSpec {
    StepSpec {
        desc: Some(desc.into()),
        enabled: None,
        condition: None,
        action,
        allow_failure: false,
    }
}

fn action(module: &str, args: &[(&str, Value)]) -> ActionSpec {
    ActionSpec {
        module: module.into(),
        args: args
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect(),
        persist_meta: Default::default(),
        push_meta: Default::default(),
    }
}

fn persisting(mut spec: ActionSpec, meta_key: &str, field: &str) -> ActionSpec {
    spec.persist_meta.insert(meta_key.into(), field.into());
    spec
}
