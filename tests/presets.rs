use std::fs;

use tempfile::tempdir;
use ue_buildsteps::action::ActionRegistry;
use ue_buildsteps::actions;
use ue_buildsteps::presets::{PRESET_NAMES, generate_preset};
use ue_buildsteps::script::ProjectScript;
use ue_buildsteps::validation::validate_script;

#[test]
fn generate_package_preset_writes_file() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("scripts/package.json");
    let generated = generate_preset("package", &path).expect("preset generation");
    assert!(generated.exists());
    let contents = fs::read_to_string(&generated).expect("read preset");
    assert!(contents.contains("\"package_steps\""));
    assert!(contents.contains("\"module\": \"actions.package\""));
    assert!(contents.contains("\"last_build_path\": \"build_path\""));
}

#[test]
fn every_preset_validates() {
    let temp = tempdir().unwrap();
    let mut registry = ActionRegistry::new();
    actions::register_defaults(&mut registry);
    for name in PRESET_NAMES {
        let path = temp.path().join(format!("{name}.json"));
        generate_preset(name, &path).unwrap();
        let script = ProjectScript::load(&path).unwrap();
        let report = validate_script(&script, &registry);
        assert!(report.is_ok(), "{name}: {:?}", report.errors);
        assert!(report.warnings.is_empty(), "{name}: {:?}", report.warnings);
    }
}

#[test]
fn unknown_preset_is_rejected() {
    let temp = tempdir().unwrap();
    let err = generate_preset("mobile", &temp.path().join("x.json")).unwrap_err();
    assert!(err.to_string().contains("Unknown preset 'mobile'"));
}
