//! Shared sandbox for CLI integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::missing_panics_doc, deprecated)]

use std::path::PathBuf;

use assert_cmd::Command;
use image::GrayImage;
use serde_json::Value;
use tech_sort_test_support::SyntheticImageBuilder;
use tempfile::TempDir;

/// An isolated home, config, data and photo directory.
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["home", "config", "data", "photos", "work"] {
            std::fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        Self { dir }
    }

    pub fn path(&self, sub: &str) -> PathBuf {
        self.dir.path().join(sub)
    }

    pub fn photos(&self) -> PathBuf {
        self.path("photos")
    }

    /// Working directory of every command; project config goes here.
    pub fn work(&self) -> PathBuf {
        self.path("work")
    }

    /// `tech-sort` with isolated XDG directories, database and blob store.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("tech-sort").unwrap();
        cmd.current_dir(self.work())
            .env("HOME", self.path("home"))
            .env("XDG_CONFIG_HOME", self.path("config"))
            .env("XDG_DATA_HOME", self.path("data"))
            .env_remove("TECH_SORT_DB")
            .env_remove("TECH_SORT_BLOBS")
            .arg("--db")
            .arg(self.path("library.db"))
            .arg("--blobs")
            .arg(self.path("blobs"));
        cmd
    }

    pub fn write_png(&self, name: &str, gray: &GrayImage) -> PathBuf {
        let path = self.photos().join(name);
        std::fs::write(&path, SyntheticImageBuilder::png(gray)).unwrap();
        path
    }

    pub fn write_project_config(&self, toml: &str) {
        std::fs::write(self.work().join(".tech-sort.toml"), toml).unwrap();
    }

    /// Imports the photo directory into a new folder and returns its id.
    pub fn import(&self, name: &str) -> i64 {
        let out = self
            .cmd()
            .arg("import")
            .arg(self.photos())
            .arg("--folder-name")
            .arg(name)
            .assert()
            .success();
        let report = &json_lines(&out.get_output().stdout)[0];
        report["folder_id"].as_i64().unwrap()
    }
}

/// Parses stdout as JSON Lines.
pub fn json_lines(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

pub fn sharp() -> GrayImage {
    SyntheticImageBuilder::well_exposed_sharp(64, 64)
}

pub fn blurry() -> GrayImage {
    SyntheticImageBuilder::uniform_gray(64, 64, 128)
}
