//! CLI argument validation and error reporting.

#![allow(clippy::unwrap_used, deprecated)]

mod common;

use common::{json_lines, sharp, Sandbox};
use predicates::prelude::*;

#[test]
fn test_subcommand_required() {
    Sandbox::new()
        .cmd()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_run_requires_folder() {
    Sandbox::new()
        .cmd()
        .arg("run")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--folder"));
}

#[test]
fn test_import_requires_a_folder_choice() {
    let sb = Sandbox::new();
    sb.cmd()
        .arg("import")
        .arg(sb.photos())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--folder-name"));
}

#[test]
fn test_folder_name_and_folder_conflict() {
    let sb = Sandbox::new();
    sb.cmd()
        .args(["import", "--folder-name", "x", "--folder", "1"])
        .arg(sb.photos())
        .assert()
        .code(2);
}

#[test]
fn test_missing_folder_is_an_error() {
    Sandbox::new()
        .cmd()
        .args(["run", "--folder", "999"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error: folder 999 not found"));
}

#[test]
fn test_foreign_owner_is_denied() {
    let sb = Sandbox::new();
    sb.write_png("a.png", &sharp());
    let folder = sb.import("Mine");

    sb.cmd()
        .args(["--owner", "2", "run", "--folder", &folder.to_string()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("does not belong to user 2"));
}

#[test]
fn test_rejects_folder_cannot_be_run() {
    let sb = Sandbox::new();
    sb.write_png("flat.png", &common::blurry());
    let folder = sb.import("Source");
    let out = sb
        .cmd()
        .args(["run", "--folder", &folder.to_string()])
        .assert()
        .success();
    let rejects = json_lines(&out.get_output().stdout)[0]["rejects_folder_id"]
        .as_i64()
        .unwrap();

    sb.cmd()
        .args(["status", "--folder", &rejects.to_string()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("is a rejects folder"));
}

#[test]
fn test_import_into_existing_folder() {
    let sb = Sandbox::new();
    sb.write_png("a.png", &sharp());
    let folder = sb.import("Grow");

    let out = sb
        .cmd()
        .args(["import", "--folder", &folder.to_string()])
        .arg(sb.photos().join("a.png"))
        .assert()
        .success();
    let report = &json_lines(&out.get_output().stdout)[0];
    assert_eq!(report["folder_id"].as_i64(), Some(folder));
    assert_eq!(report["imported"], 1);

    let status = sb
        .cmd()
        .args(["status", "--folder", &folder.to_string()])
        .assert()
        .success();
    assert_eq!(json_lines(&status.get_output().stdout)[0]["unanalyzed"], 2);
}

#[test]
fn test_nonexistent_import_path_warns() {
    let sb = Sandbox::new();
    let out = sb
        .cmd()
        .args(["import", "--folder-name", "Empty", "/nonexistent/photo.jpg"])
        .assert()
        .success()
        .stderr(predicate::str::contains("does not exist"));
    assert_eq!(json_lines(&out.get_output().stdout)[0]["imported"], 0);
}

#[test]
fn test_models_path_and_fetch_without_url() {
    let sb = Sandbox::new();
    sb.cmd()
        .args(["models", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tech-sort/models"));

    sb.cmd()
        .args(["models", "fetch"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No download location"));
}

#[test]
fn test_models_list_reports_missing_models() {
    Sandbox::new()
        .cmd()
        .args(["models", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0/3 models installed"));
}
