use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Value, json};
use tempfile::tempdir;
use ue_buildsteps::action::ActionRegistry;
use ue_buildsteps::actions;
use ue_buildsteps::config::ProjectConfig;
use ue_buildsteps::error::RunnerError;
use ue_buildsteps::meta::BuildMeta;
use ue_buildsteps::runner::{RunRequest, StepOutcome, StepRunner};
use ue_buildsteps::script::ProjectScript;

fn build_registry() -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    actions::register_defaults(&mut registry);
    registry
}

fn project(dir: &Path, script: Value) -> Arc<ProjectConfig> {
    let mut config = ProjectConfig::default();
    config.uproject_name = "Shooter".into();
    config.uproject_dir_path = dir.to_path_buf();
    let overrides = json!({"work": dir.to_string_lossy()});
    config.apply_overrides(overrides.as_object().unwrap());
    config.script = ProjectScript::from_value(script).unwrap();
    Arc::new(config)
}

#[test]
fn default_registry_knows_every_builtin() {
    let registry = build_registry();
    let known = registry.known_actions();
    for name in [
        "build",
        "buildsteps",
        "cook",
        "copy",
        "delete",
        "git",
        "package",
        "pak",
        "runsteps",
        "steamupload",
        "versioninc",
    ] {
        assert!(known.iter().any(|k| k == name), "missing action {name}");
    }
    assert_eq!(registry.resolve("actions.RunSteps").unwrap(), "runsteps");
}

#[test]
fn copy_then_delete_through_step_lists() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("a.txt"), "payload").unwrap();
    let config = project(
        temp.path(),
        json!({
            "stage": [{
                "desc": "Stage file",
                "action": {
                    "module": "actions.copy",
                    "args": {"copy": [["{work}/a.txt", "{work}/out/nested/b.txt"]]}
                }
            }],
            "clean": [{
                "desc": "Remove staging",
                "action": {
                    "module": "actions.delete",
                    "args": {"paths": ["{work}/out"], "verify_exist": true}
                }
            }]
        }),
    );
    let registry = build_registry();
    let meta_path = temp.path().join("meta.json");

    let mut runner = StepRunner::new(&registry, Arc::clone(&config), &meta_path);
    runner.run(RunRequest::new("stage")).unwrap();
    let copied = temp.path().join("out/nested/b.txt");
    assert_eq!(fs::read_to_string(&copied).unwrap(), "payload");

    let mut runner = StepRunner::new(&registry, config, &meta_path);
    runner.run(RunRequest::new("clean")).unwrap();
    assert!(!temp.path().join("out").exists());
}

#[test]
fn missing_copy_source_is_tolerated_when_allowed() {
    let temp = tempdir().unwrap();
    let config = project(
        temp.path(),
        json!({
            "steps": [{
                "desc": "Copy optional file",
                "allow_failure": true,
                "action": {
                    "module": "actions.copy",
                    "args": {"copy": [["{work}/absent.txt", "{work}/b.txt"]]}
                }
            }]
        }),
    );
    let registry = build_registry();
    let mut runner = StepRunner::new(&registry, config, temp.path().join("meta.json"));
    let report = runner.run(RunRequest::new("steps")).unwrap();

    let expected = format!(
        "Copy item ({}) does not exist!",
        temp.path().join("absent.txt").display()
    );
    assert_eq!(report.warnings[0], expected);
    assert!(matches!(
        report.steps[0].outcome,
        StepOutcome::FailedTolerated { .. }
    ));
}

#[test]
fn delete_with_verify_exist_rejects_missing_paths() {
    let temp = tempdir().unwrap();
    let config = project(
        temp.path(),
        json!({
            "steps": [{
                "desc": "Delete",
                "action": {
                    "module": "actions.delete",
                    "args": {"paths": "{work}/nothing-here", "verify_exist": true}
                }
            }]
        }),
    );
    let registry = build_registry();
    let mut runner = StepRunner::new(&registry, config, temp.path().join("meta.json"));
    let err = runner.run(RunRequest::new("steps")).unwrap_err();
    match err.downcast_ref::<RunnerError>() {
        Some(RunnerError::StepFailed { message, .. }) => {
            assert!(message.starts_with("Invalid deletion path specified"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn version_increment_is_persisted_to_meta() {
    let temp = tempdir().unwrap();
    fs::create_dir_all(temp.path().join("Config")).unwrap();
    fs::write(
        temp.path().join("Config/DefaultGame.ini"),
        "[/Script/EngineSettings.GeneralProjectSettings]\nProjectVersion=1.0.0.3\n",
    )
    .unwrap();
    let config = project(
        temp.path(),
        json!({
            "steps": [{
                "desc": "Bump version",
                "action": {
                    "module": "actions.versioninc",
                    "persist_meta": {"last_version": "version"}
                }
            }]
        }),
    );
    let registry = build_registry();
    let meta_path = temp.path().join("meta.json");
    let mut runner = StepRunner::new(&registry, config, &meta_path);
    runner.run(RunRequest::new("steps")).unwrap();

    let ini = fs::read_to_string(temp.path().join("Config/DefaultGame.ini")).unwrap();
    assert!(ini.contains("ProjectVersion=1.0.0.4"));
    assert_eq!(
        BuildMeta::load(&meta_path).get_str("last_version"),
        Some("1.0.0.4")
    );
}

#[test]
fn clean_builds_skip_conditional_steps_without_touching_meta() {
    let temp = tempdir().unwrap();
    fs::create_dir_all(temp.path().join("x/sub")).unwrap();
    fs::write(temp.path().join("x/sub/file.txt"), "stale").unwrap();
    let meta_path = temp.path().join("meta.json");
    fs::write(&meta_path, "{\"last_build\": \"7\"}").unwrap();

    let mut config = ProjectConfig::default();
    config.uproject_name = "Shooter".into();
    config.uproject_dir_path = temp.path().to_path_buf();
    config.clean = true;
    let overrides = json!({"tmp": temp.path().to_string_lossy()});
    config.apply_overrides(overrides.as_object().unwrap());
    config.script = ProjectScript::from_value(json!({
        "steps": [
            {
                "desc": "Wipe scratch",
                "action": {"module": "actions.delete", "args": {"paths": ["{tmp}/x"]}}
            },
            {
                "desc": "Restore cache",
                "condition": "not clean",
                "allow_failure": true,
                "action": {
                    "module": "actions.copy",
                    "args": {"copy": [["{tmp}/cache", "{tmp}/x"]]}
                }
            }
        ]
    }))
    .unwrap();

    let registry = build_registry();
    let mut runner = StepRunner::new(&registry, Arc::new(config), &meta_path);
    let report = runner.run(RunRequest::new("steps")).unwrap();

    assert!(!temp.path().join("x").exists());
    assert_eq!(report.steps[0].outcome, StepOutcome::Succeeded);
    assert_eq!(
        report.steps[1].outcome,
        StepOutcome::SkippedCondition {
            clause: "not clean".into()
        }
    );
    assert!(report.warnings.is_empty());
    assert_eq!(
        fs::read_to_string(&meta_path).unwrap(),
        "{\"last_build\": \"7\"}"
    );
}
