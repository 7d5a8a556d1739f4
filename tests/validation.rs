use std::fs;

use serde_json::json;
use tempfile::tempdir;
use ue_buildsteps::action::ActionRegistry;
use ue_buildsteps::actions;
use ue_buildsteps::script::ProjectScript;
use ue_buildsteps::validation::validate_script;

fn build_registry() -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    actions::register_defaults(&mut registry);
    registry
}

fn script(value: serde_json::Value) -> ProjectScript {
    ProjectScript::from_value(value).unwrap()
}

#[test]
fn a_clean_script_passes() {
    let script = script(json!({
        "config": {"project_path": "Game/Game.uproject"},
        "editor_steps": [{
            "desc": "Build editor",
            "condition": "not clean",
            "action": {"module": "actions.build", "args": {"build_name": "GameEditor"}}
        }]
    }));
    let report = validate_script(&script, &build_registry());
    assert!(report.is_ok(), "unexpected errors: {:?}", report.errors);
    assert!(report.warnings.is_empty(), "unexpected warnings: {:?}", report.warnings);
}

#[test]
fn validation_catches_structural_errors() {
    let script = script(json!({
        "editor_steps": [
            {"desc": "Upload", "action": {"module": "actions.ftpupload"}},
            {"desc": "Odd", "condition": "not", "action": {"module": "actions.versioninc"}},
            {"desc": "Nested", "action": {"module": "actions.buildsteps", "args": {"steps_name": "nowhere"}}}
        ]
    }));
    let report = validate_script(&script, &build_registry());

    assert!(!report.is_ok());
    assert_eq!(report.errors.len(), 4, "errors: {:?}", report.errors);
    assert!(report.errors[0].contains("\"config\""));
    assert!(report.errors.iter().any(|e| e.contains("action class (Ftpupload)")));
    assert!(report.errors.iter().any(|e| e.contains("invalid condition")));
    assert!(report.errors.iter().any(|e| e.contains("missing step list 'nowhere'")));
}

#[test]
fn validation_warns_about_soft_problems() {
    let script = script(json!({
        "config": {"project_path": "Game/Game.uproject"},
        "empty_steps": [],
        "loop_a": [{"action": {"module": "actions.runsteps", "args": {"steps_name": "loop_b"}}}],
        "loop_b": [{
            "desc": "Back again",
            "action": {"module": "actions.buildsteps", "args": {"steps_name": "loop_a", "colour": "red"}}
        }]
    }));
    let report = validate_script(&script, &build_registry());

    assert!(report.is_ok(), "unexpected errors: {:?}", report.errors);
    let warnings = report.warnings.join("\n");
    assert!(warnings.contains("Step list 'empty_steps' is empty"));
    assert!(warnings.contains("loop_a[0]: step has no desc"));
    assert!(warnings.contains("argument 'colour' is not used"));
    assert!(warnings.contains("Step list 'loop_a' can re-enter itself"));
    assert!(warnings.contains("Step list 'loop_b' can re-enter itself"));
}

#[test]
fn optional_nested_lists_may_be_absent() {
    let script = script(json!({
        "config": {"project_path": "Game/Game.uproject"},
        "steps": [{
            "desc": "Maybe",
            "action": {
                "module": "actions.buildsteps",
                "args": {"steps_name": "platform_extras", "complain_missing_step": false}
            }
        }]
    }));
    assert!(validate_script(&script, &build_registry()).is_ok());
}

#[test]
fn scripts_load_from_disk() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("project.json");
    fs::write(&path, "{\"config\": {\"project_path\": \"G/G.uproject\"}, \"steps\": [").unwrap();
    let err = ProjectScript::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("Build Script Syntax Error"));
}
