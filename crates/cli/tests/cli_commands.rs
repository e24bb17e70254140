use std::fs;
use std::path::Path;

use predicates::prelude::*;
use romscope_core::db::ProjectLayout;
use tempfile::tempdir;

/// 32 KiB LoROM image: CLC; SEI; JSR $1234; RTS at $8000, reset vector pointing there.
fn write_rom(path: &Path) {
    let mut bytes = vec![0u8; 0x8000];
    bytes[..6].copy_from_slice(&[0x18, 0x78, 0x20, 0x34, 0x12, 0x60]);
    bytes[0x7FFC..0x7FFE].copy_from_slice(&[0x00, 0x80]);
    fs::write(path, bytes).expect("write rom");
}

fn romscope() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("romscope")
}

fn init_with_rom(root: &Path) {
    romscope().arg("init-project").arg("--root").arg(root).arg("--name").arg("Demo").assert().success();
    write_rom(&root.join("game.sfc"));
    romscope()
        .arg("add-rom")
        .arg("--root")
        .arg(root)
        .arg("--path")
        .arg("game.sfc")
        .assert()
        .success()
        .stdout(predicate::str::contains("Added ROM:"))
        .stdout(predicate::str::contains("Name: game"));
}

fn stdout_json(cmd: &mut assert_cmd::Command) -> serde_json::Value {
    let output = cmd.output().expect("run romscope");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).expect("json output")
}

#[test]
fn init_project_creates_layout() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();

    romscope()
        .current_dir(root)
        .arg("init-project")
        .arg("--name")
        .arg("TestProject")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized romscope project:"));

    let layout = ProjectLayout::new(root);
    assert!(layout.project_config_path.exists());
    assert!(layout.db_path.exists());
    assert!(layout.profiles_dir.is_dir());
    assert!(layout.outputs_roms_dir.is_dir());
    assert!(layout.profiles_dir.join("default.yaml").is_file());
}

#[test]
fn project_info_fails_without_a_project() {
    let dir = tempdir().expect("tempdir");
    romscope()
        .arg("project-info")
        .arg("--root")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("init-project"));
}

#[test]
fn registered_rom_flows_through_analysis() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    init_with_rom(root);

    let roms = stdout_json(romscope().arg("list-roms").arg("--root").arg(root).arg("--json"));
    let roms = roms.as_array().expect("array");
    assert_eq!(roms.len(), 1);
    assert_eq!(roms[0]["name"], "game");
    assert_eq!(roms[0]["path"], "game.sfc");
    assert_eq!(roms[0]["mapping"], "lorom");
    assert_eq!(roms[0]["size"], 0x8000);
    assert_eq!(roms[0]["sha256"].as_str().map(str::len), Some(64));

    romscope()
        .arg("analyze")
        .arg("--root")
        .arg(root)
        .arg("--rom")
        .arg("game")
        .assert()
        .success()
        .stdout(predicate::str::contains("Run 1 recorded for 'game'"))
        .stdout(predicate::str::contains("Functions: 1 (0 partial)"));
    assert!(ProjectLayout::new(root).rom_output_root("game").join("run-1.json").exists());

    let runs = stdout_json(romscope().arg("list-runs").arg("--root").arg(root).arg("--json"));
    let runs = runs.as_array().expect("array");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["id"], 1);
    assert_eq!(runs[0]["rom"], "game");
    assert_eq!(runs[0]["status"], "succeeded");
    assert_eq!(runs[0]["function_count"], 1);

    let regions = stdout_json(romscope().arg("regions").arg("--root").arg(root).arg("--rom").arg("game").arg("--json"));
    let regions = regions.as_array().expect("array");
    assert_eq!(regions[0]["kind"], "code");
    assert_eq!(regions[0]["start"], 0);
    assert_eq!(regions[0]["end"], 6);

    romscope()
        .arg("disasm")
        .arg("--root")
        .arg(root)
        .arg("--rom")
        .arg("game")
        .arg("--function")
        .arg("vec_reset")
        .assert()
        .success()
        .stdout(predicate::str::contains("vec_reset:"))
        .stdout(predicate::str::contains("JSR $1234"))
        .stdout(predicate::str::contains("RTS"));

    let info = stdout_json(romscope().arg("project-info").arg("--root").arg(root).arg("--json"));
    assert_eq!(info["config"]["name"], "Demo");
    assert_eq!(info["run_count"], 1);
    assert_eq!(info["roms"].as_array().map(Vec::len), Some(1));
}

#[test]
fn standalone_analysis_emits_the_model() {
    let dir = tempdir().expect("tempdir");
    let rom = dir.path().join("loose.sfc");
    write_rom(&rom);
    let out = dir.path().join("model.json");

    let model = stdout_json(romscope().arg("analyze").arg("--path").arg(&rom).arg("--json").arg("--out").arg(&out));
    assert_eq!(model["image"]["mode"], "lorom");
    assert_eq!(model["functions"].as_array().map(Vec::len), Some(1));

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).expect("read out")).expect("parse out");
    assert_eq!(written, model);
}

#[test]
fn header_reports_mapping_and_vectors() {
    let dir = tempdir().expect("tempdir");
    let rom = dir.path().join("loose.sfc");
    write_rom(&rom);

    let report = stdout_json(romscope().arg("header").arg("--path").arg(&rom).arg("--json"));
    assert_eq!(report["mode"], "lorom");
    assert_eq!(report["size"], 0x8000);
    assert_eq!(report["mapping_confidence"], 0.5);
    assert_eq!(report["vectors"].as_array().map(Vec::len), Some(1));
    assert_eq!(report["vectors"][0]["target"], "$00:8000");

    romscope()
        .arg("header")
        .arg("--path")
        .arg(&rom)
        .arg("--mode")
        .arg("hirom")
        .assert()
        .success()
        .stdout(predicate::str::contains("Mapping: hirom"));
}

#[test]
fn duplicate_rom_names_are_rejected() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    init_with_rom(root);

    romscope()
        .arg("add-rom")
        .arg("--root")
        .arg(root)
        .arg("--path")
        .arg("game.sfc")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already registered"));
}

#[test]
fn add_rom_fails_for_missing_file() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    romscope().arg("init-project").arg("--root").arg(root).assert().success();

    romscope()
        .arg("add-rom")
        .arg("--root")
        .arg(root)
        .arg("--path")
        .arg("nope.sfc")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ROM file does not exist"));
}

#[test]
fn analysis_argument_errors_are_reported() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    init_with_rom(root);

    romscope()
        .arg("analyze")
        .arg("--root")
        .arg(root)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Pass --path <file> or --rom <name>"));

    romscope()
        .arg("analyze")
        .arg("--root")
        .arg(root)
        .arg("--rom")
        .arg("game")
        .arg("--mode")
        .arg("midrom")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid --mode 'midrom'"));

    romscope()
        .arg("analyze")
        .arg("--root")
        .arg(root)
        .arg("--rom")
        .arg("unknown")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ROM 'unknown' is not registered"));

    romscope()
        .arg("regions")
        .arg("--root")
        .arg(root)
        .arg("--rom")
        .arg("game")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No successful analysis run recorded for 'game'"));

    romscope()
        .arg("disasm")
        .arg("--root")
        .arg(root)
        .arg("--rom")
        .arg("game")
        .arg("--function")
        .arg("$00:9000")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No function starts at $00:9000"));
}

#[test]
fn profile_with_unknown_detector_fails() {
    let dir = tempdir().expect("tempdir");
    let rom = dir.path().join("loose.sfc");
    write_rom(&rom);
    let profile = dir.path().join("profile.yaml");
    fs::write(&profile, "detectors:\n  - stride_table\n  - sprite_sheet\n").expect("write profile");

    romscope()
        .arg("analyze")
        .arg("--path")
        .arg(&rom)
        .arg("--profile")
        .arg(&profile)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown detector 'sprite_sheet'"));
}
