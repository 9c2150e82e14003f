//! Configuration layering: defaults < XDG config < project config < CLI flags.

#![allow(clippy::unwrap_used, deprecated)]

mod common;

use common::{json_lines, sharp, Sandbox};
use predicates::prelude::*;

#[test]
fn test_project_config_sets_batch_size() {
    let sb = Sandbox::new();
    for i in 0..3 {
        sb.write_png(&format!("p{i}.png"), &sharp());
    }
    let folder = sb.import("Small batches");
    sb.write_project_config("[pass]\nbatch_size = 2\n");

    let out = sb
        .cmd()
        .args(["run", "--folder", &folder.to_string()])
        .assert()
        .code(3);
    assert_eq!(json_lines(&out.get_output().stdout)[0]["processed"], 2);
}

#[test]
fn test_project_config_overrides_xdg_config() {
    let sb = Sandbox::new();
    for i in 0..4 {
        sb.write_png(&format!("p{i}.png"), &sharp());
    }
    let folder = sb.import("Layers");
    let xdg = sb.path("config").join("tech-sort");
    std::fs::create_dir_all(&xdg).unwrap();
    std::fs::write(xdg.join("config.toml"), "[pass]\nbatch_size = 1\n").unwrap();
    sb.write_project_config("[pass]\nbatch_size = 3\n");

    let out = sb
        .cmd()
        .args(["run", "--folder", &folder.to_string()])
        .assert()
        .code(3);
    assert_eq!(json_lines(&out.get_output().stdout)[0]["processed"], 3);
}

#[test]
fn test_config_threshold_changes_verdicts() {
    let sb = Sandbox::new();
    sb.write_png("sharp.png", &sharp());
    let folder = sb.import("Strict");
    // Nothing in a 64px checkerboard reaches this much edge energy.
    sb.write_project_config("[blur]\nlaplacian_threshold = 1000000.0\n");

    let out = sb
        .cmd()
        .args(["run", "--folder", &folder.to_string()])
        .assert()
        .success();
    assert_eq!(json_lines(&out.get_output().stdout)[0]["rejected"], 1);
}

#[test]
fn test_invalid_config_value_warns_and_falls_back() {
    let sb = Sandbox::new();
    for i in 0..6 {
        sb.write_png(&format!("p{i}.png"), &sharp());
    }
    let folder = sb.import("Fallback");
    sb.write_project_config("[pass]\nbatch_size = 0\n");

    let out = sb
        .cmd()
        .args(["run", "--folder", &folder.to_string()])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("pass.batch_size"));
    assert_eq!(json_lines(&out.get_output().stdout)[0]["processed"], 5);
}

#[test]
fn test_cli_pretty_overrides_config() {
    let sb = Sandbox::new();
    sb.write_png("a.png", &sharp());
    let folder = sb.import("Output");
    sb.write_project_config("[output]\npretty = false\n");

    sb.cmd()
        .args(["--pretty", "status", "--folder", &folder.to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\n  \"folder_id\""));
}

#[test]
fn test_config_storage_paths_used_without_flags() {
    let sb = Sandbox::new();
    sb.write_project_config(&format!(
        "[storage]\ndb = '{}'\nblobs = '{}'\n",
        sb.path("cfg.db").display(),
        sb.path("cfg-blobs").display()
    ));
    sb.write_png("a.png", &sharp());

    let mut cmd = assert_cmd::Command::cargo_bin("tech-sort").unwrap();
    cmd.current_dir(sb.work())
        .env("HOME", sb.path("home"))
        .env("XDG_CONFIG_HOME", sb.path("config"))
        .env("XDG_DATA_HOME", sb.path("data"))
        .env_remove("TECH_SORT_DB")
        .env_remove("TECH_SORT_BLOBS")
        .args(["import", "--folder-name", "Configured"])
        .arg(sb.photos())
        .assert()
        .success();

    assert!(sb.path("cfg.db").is_file());
    assert!(sb.path("cfg-blobs").is_dir());
}

#[test]
fn test_eyes_disabled_without_models() {
    let sb = Sandbox::new();
    sb.write_png("a.png", &sharp());
    let folder = sb.import("Faces");

    sb.cmd()
        .args(["-v", "run", "--folder", &folder.to_string()])
        .assert()
        .success()
        .stderr(predicate::str::contains("Closed-eyes detection disabled"));
}

#[test]
fn test_configured_raw_extensions_are_imported() {
    let sb = Sandbox::new();
    std::fs::write(sb.photos().join("IMG_0001.CR3"), b"not really a raw").unwrap();

    let out = sb
        .cmd()
        .args(["import", "--folder-name", "Defaults"])
        .arg(sb.photos())
        .assert()
        .success();
    assert_eq!(json_lines(&out.get_output().stdout)[0]["imported"], 0);

    sb.write_project_config("[loader]\nraw_extensions = ['cr3']\n");
    let out = sb
        .cmd()
        .args(["import", "--folder-name", "Configured"])
        .arg(sb.photos())
        .assert()
        .success();
    assert_eq!(json_lines(&out.get_output().stdout)[0]["imported"], 1);
}
