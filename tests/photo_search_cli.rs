// SPDX-License-Identifier: MIT OR Apache-2.0

use assert_cmd::Command;
use image::{Rgb, RgbImage};
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_photo(path: &Path, color: [u8; 3]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    RgbImage::from_pixel(48, 32, Rgb(color))
        .save(path)
        .expect("write photo");
}

fn write_dummy_config(root: &Path) {
    fs::write(
        root.join(".photogreprc.toml"),
        r#"
[encoder]
provider = "dummy"
dimension = 16
image_size = 32
"#,
    )
    .expect("write config");
}

fn library() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    write_dummy_config(dir.path());
    write_photo(&dir.path().join("red.png"), [220, 20, 20]);
    write_photo(&dir.path().join("trip/green.png"), [20, 220, 20]);
    write_photo(&dir.path().join("trip/blue.png"), [20, 20, 220]);
    fs::write(dir.path().join("notes.txt"), "not a photo\n").expect("write notes");
    dir
}

fn photogrep() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("photogrep"));
    cmd.env("NO_COLOR", "1").env_remove("PHOTOGREP_LOG");
    cmd
}

fn json_output(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("valid json")
}

#[test]
fn index_reports_every_photo() {
    let dir = library();

    let report = json_output(
        photogrep()
            .args(["--format", "json", "index", "--path"])
            .arg(dir.path()),
    );

    assert_eq!(report["model"], "MobileCLIP-S2");
    assert_eq!(report["total_assets"], 3);
    assert_eq!(report["indexed"], 3);
    assert_eq!(report["unavailable"], 0);
    assert_eq!(report["failed"], 0);
}

#[test]
fn index_text_output_summarizes_pass() {
    let dir = library();

    photogrep()
        .args(["index", "--path"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Indexed 3 photos"));
}

#[test]
fn unreadable_photo_is_skipped() {
    let dir = library();
    fs::write(dir.path().join("broken.jpg"), b"definitely not a jpeg").expect("write broken");

    let report = json_output(
        photogrep()
            .args(["--format", "json", "index", "--path"])
            .arg(dir.path()),
    );

    assert_eq!(report["total_assets"], 4);
    assert_eq!(report["indexed"], 3);
    assert_eq!(report["unavailable"], 1);
}

#[test]
fn search_json_ranks_all_photos() {
    let dir = library();

    let output = json_output(
        photogrep()
            .args(["--format", "json", "search", "a red photo", "--path"])
            .arg(dir.path()),
    );

    assert_eq!(output["query"], "a red photo");
    assert_eq!(output["indexed"], 3);
    let results = output["results"].as_array().expect("results array");
    assert_eq!(results.len(), 3);

    let scores: Vec<f64> = results
        .iter()
        .map(|r| r["score"].as_f64().expect("score"))
        .collect();
    assert!(scores.iter().all(|s| (-1.0001..=1.0001).contains(s)));
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));

    let mut ids: Vec<&str> = results
        .iter()
        .map(|r| r["asset_id"].as_str().expect("asset id"))
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["red.png", "trip/blue.png", "trip/green.png"]);
}

#[test]
fn search_limit_truncates_results() {
    let dir = library();

    let output = json_output(
        photogrep()
            .args(["--format", "json", "search", "mountains", "-m", "2", "--path"])
            .arg(dir.path()),
    );

    assert_eq!(output["results"].as_array().expect("results").len(), 2);
    assert_eq!(output["indexed"], 3);
}

#[test]
fn empty_query_lists_everything_unranked() {
    let dir = library();

    let output = json_output(
        photogrep()
            .args(["--format", "json", "search", "", "--path"])
            .arg(dir.path()),
    );

    let results = output["results"].as_array().expect("results");
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r["score"].as_f64() == Some(0.0)));
}

#[test]
fn search_text_output_lists_paths() {
    let dir = library();

    photogrep()
        .args(["search", "green leaves", "--path"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("trip/green.png"))
        .stdout(predicate::str::contains("of 3 photos"));
}

#[test]
fn failing_translator_falls_back_to_query() {
    let dir = library();
    fs::write(
        dir.path().join(".photogreprc.toml"),
        r#"
[encoder]
provider = "dummy"
dimension = 16

[translator]
command = "exit 3"
"#,
    )
    .expect("write config");

    let output = json_output(
        photogrep()
            .args(["--format", "json", "search", "빨간 사과", "--path"])
            .arg(dir.path()),
    );
    assert_eq!(output["results"].as_array().expect("results").len(), 3);
}

#[test]
fn missing_library_fails() {
    let dir = TempDir::new().expect("tempdir");

    photogrep()
        .args(["index", "--path"])
        .arg(dir.path().join("nope"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Photo library not found"));
}

#[test]
fn missing_encoder_command_fails() {
    let dir = TempDir::new().expect("tempdir");
    fs::write(
        dir.path().join(".photogreprc.toml"),
        "[encoder]\ncommand = \"photogrep-missing-encoder-xyz\"\n",
    )
    .expect("write config");
    write_photo(&dir.path().join("a.png"), [1, 2, 3]);

    photogrep()
        .args(["index", "--path"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to index"));
}

#[test]
fn completions_generate() {
    photogrep()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("photogrep"));
}
