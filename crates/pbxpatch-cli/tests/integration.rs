#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

const FIXTURE: &str = include_str!("../../pbxpatch-core/tests/fixtures/minimal.pbxproj");

fn pbxpatch(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pbxpatch").unwrap();
    cmd.current_dir(dir.path()).env_remove("PBXPATCH_CONFIG");
    cmd
}

/// Lay out `Soramoyou.xcodeproj/project.pbxproj` with the given text.
fn project_with(text: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let bundle = dir.path().join("Soramoyou.xcodeproj");
    std::fs::create_dir_all(&bundle).unwrap();
    let descriptor = bundle.join("project.pbxproj");
    std::fs::write(&descriptor, text).unwrap();
    (dir, descriptor)
}

fn init(dir: &TempDir) {
    pbxpatch(dir)
        .args(["init", "Soramoyou.xcodeproj", "--main-target", "Soramoyou"])
        .assert()
        .success();
}

fn without_region(text: &str, name: &str) -> String {
    let begin = text.find(&format!("/* Begin {name} section */")).unwrap();
    let end_marker = format!("/* End {name} section */\n\n");
    let end = text.find(&end_marker).unwrap() + end_marker.len();
    format!("{}{}", &text[..begin], &text[end..])
}

// ---------------------------------------------------------------------------
// pbxpatch init
// ---------------------------------------------------------------------------

#[test]
fn init_writes_config_next_to_bundle() {
    let (dir, _) = project_with(FIXTURE);
    pbxpatch(&dir)
        .args(["init", "Soramoyou.xcodeproj", "--main-target", "Soramoyou"])
        .assert()
        .success()
        .stdout(predicate::str::contains("created: pbxpatch.yaml"))
        .stdout(predicate::str::contains("unit_tests.proxy"));

    let config = std::fs::read_to_string(dir.path().join("pbxpatch.yaml")).unwrap();
    assert!(config.contains("main_target: Soramoyou"));
    assert!(config.contains("unit_tests:"));
    assert!(config.contains("ui_tests:"));
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let (dir, _) = project_with(FIXTURE);
    init(&dir);
    let first = std::fs::read_to_string(dir.path().join("pbxpatch.yaml")).unwrap();

    pbxpatch(&dir)
        .args(["init", "Soramoyou.xcodeproj", "--main-target", "Soramoyou"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("pbxpatch.yaml")).unwrap(),
        first
    );

    pbxpatch(&dir)
        .args(["init", "Soramoyou.xcodeproj", "--main-target", "Soramoyou", "--force"])
        .assert()
        .success();
    assert_ne!(
        std::fs::read_to_string(dir.path().join("pbxpatch.yaml")).unwrap(),
        first
    );
}

#[test]
fn init_rejects_unknown_main_target() {
    let (dir, _) = project_with(FIXTURE);
    pbxpatch(&dir)
        .args(["init", "Soramoyou.xcodeproj", "--main-target", "Nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("main target not found: Nope"));
    assert!(!dir.path().join("pbxpatch.yaml").exists());
}

#[test]
fn init_accepts_descriptor_path_and_explicit_config() {
    let (dir, _) = project_with(FIXTURE);
    pbxpatch(&dir)
        .args([
            "init",
            "Soramoyou.xcodeproj/project.pbxproj",
            "--main-target",
            "Soramoyou",
            "--config",
            "tests.yaml",
        ])
        .assert()
        .success();
    assert!(dir.path().join("tests.yaml").exists());
}

#[test]
fn missing_descriptor_is_reported() {
    let dir = TempDir::new().unwrap();
    pbxpatch(&dir)
        .args(["init", "Missing.xcodeproj", "--main-target", "App"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("descriptor not found"));
}

// ---------------------------------------------------------------------------
// pbxpatch apply
// ---------------------------------------------------------------------------

#[test]
fn apply_patches_and_keeps_backup() {
    let (dir, descriptor) = project_with(FIXTURE);
    init(&dir);

    pbxpatch(&dir)
        .args(["apply", "Soramoyou.xcodeproj"])
        .assert()
        .success()
        .stdout(predicate::str::contains("target_dependencies"))
        .stdout(predicate::str::contains("Patched"));

    let patched = std::fs::read_to_string(&descriptor).unwrap();
    assert!(patched.contains("SoramoyouTests"));
    assert!(patched.contains("SoramoyouUITests"));
    assert!(patched.contains("/* Begin PBXTargetDependency section */"));

    let backup = descriptor.with_file_name("project.pbxproj.backup");
    assert_eq!(std::fs::read_to_string(backup).unwrap(), FIXTURE);
}

#[test]
fn apply_twice_reports_already_present() {
    let (dir, descriptor) = project_with(FIXTURE);
    init(&dir);
    pbxpatch(&dir).args(["apply", "Soramoyou.xcodeproj"]).assert().success();
    let first = std::fs::read_to_string(&descriptor).unwrap();

    pbxpatch(&dir)
        .args(["apply", "Soramoyou.xcodeproj"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already present"));
    assert_eq!(std::fs::read_to_string(&descriptor).unwrap(), first);
}

#[test]
fn apply_dry_run_leaves_descriptor_untouched() {
    let (dir, descriptor) = project_with(FIXTURE);
    init(&dir);

    pbxpatch(&dir)
        .args(["apply", "Soramoyou.xcodeproj", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run"));
    assert_eq!(std::fs::read_to_string(&descriptor).unwrap(), FIXTURE);
    assert!(!descriptor.with_file_name("project.pbxproj.backup").exists());
}

#[test]
fn apply_without_config_points_at_init() {
    let (dir, _) = project_with(FIXTURE);
    pbxpatch(&dir)
        .args(["apply", "Soramoyou.xcodeproj"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("pbxpatch init"));
}

#[test]
fn apply_fails_on_missing_anchor_unless_partial() {
    let text = without_region(FIXTURE, "PBXFileReference");
    let (dir, descriptor) = project_with(&text);
    init(&dir);

    pbxpatch(&dir)
        .args(["apply", "Soramoyou.xcodeproj"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("file_references (PBXFileReference)"))
        .stderr(predicate::str::contains("nothing written"));
    assert_eq!(std::fs::read_to_string(&descriptor).unwrap(), text);

    pbxpatch(&dir)
        .args(["apply", "Soramoyou.xcodeproj", "--allow-partial"])
        .assert()
        .success()
        .stdout(predicate::str::contains("anchor missing: PBXFileReference"));
    assert!(std::fs::read_to_string(&descriptor)
        .unwrap()
        .contains("SoramoyouUITests"));
}

#[test]
fn apply_json_lists_step_outcomes() {
    let (dir, _) = project_with(FIXTURE);
    init(&dir);

    let output = pbxpatch(&dir)
        .args(["--json", "apply", "Soramoyou.xcodeproj"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["status"], "patched");
    let steps = value["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 11);
    assert_eq!(steps[0]["step"], "file_references");
    assert_eq!(steps[0]["status"], "inserted");
}

#[test]
fn apply_rejects_colliding_identifiers() {
    let (dir, _) = project_with(FIXTURE);
    init(&dir);
    let path = dir.path().join("pbxpatch.yaml");
    let config = std::fs::read_to_string(&path).unwrap();
    // Point the first generated identifier at an existing record.
    let start = config.find("\n    target: ").unwrap() + "\n    target: ".len();
    let end = start + config[start..].find('\n').unwrap();
    let collided = format!(
        "{}E051C9D52EE497CA00CC78AB{}",
        &config[..start],
        &config[end..]
    );
    std::fs::write(&path, collided).unwrap();

    pbxpatch(&dir)
        .args(["apply", "Soramoyou.xcodeproj"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already used in the descriptor"));
}

// ---------------------------------------------------------------------------
// pbxpatch verify
// ---------------------------------------------------------------------------

#[test]
fn verify_accepts_fixture_and_patched_output() {
    let (dir, _) = project_with(FIXTURE);
    pbxpatch(&dir)
        .args(["verify", "Soramoyou.xcodeproj"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PBXNativeTarget: 1"));

    init(&dir);
    pbxpatch(&dir).args(["apply", "Soramoyou.xcodeproj"]).assert().success();
    pbxpatch(&dir)
        .args(["verify", "Soramoyou.xcodeproj"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PBXNativeTarget: 3"))
        .stdout(predicate::str::contains("PBXTargetDependency: 2"));
}

#[test]
fn verify_reports_dangling_reference() {
    let text = FIXTURE.replace(
        "\t\t\tdependencies = (\n\t\t\t);",
        "\t\t\tdependencies = (\n\t\t\t\t0123456789ABCDEF01234567,\n\t\t\t);",
    );
    let (dir, _) = project_with(&text);
    pbxpatch(&dir)
        .args(["verify", "Soramoyou.xcodeproj"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("0123456789ABCDEF01234567"));
}

#[test]
fn verify_reports_unterminated_region() {
    let text = FIXTURE.replace("/* End PBXGroup section */\n", "");
    let (dir, _) = project_with(&text);
    pbxpatch(&dir)
        .args(["verify", "Soramoyou.xcodeproj"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("region 'PBXGroup'"));
}

// ---------------------------------------------------------------------------
// pbxpatch config validate
// ---------------------------------------------------------------------------

#[test]
fn config_validate_passes_for_generated_config() {
    let (dir, _) = project_with(FIXTURE);
    init(&dir);
    pbxpatch(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_rejects_identical_test_names() {
    let (dir, _) = project_with(FIXTURE);
    init(&dir);
    let path = dir.path().join("pbxpatch.yaml");
    let mut config = std::fs::read_to_string(&path).unwrap();
    config.push_str("unit_test_target: Checks\nui_test_target: Checks\n");
    std::fs::write(&path, config).unwrap();

    pbxpatch(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("share the name 'Checks'"));
}
