//! End-to-end CLI tests for the fwdl binary.

// `Command::cargo_bin` is deprecated in assert_cmd >=2.0.17 in favor of
// `cargo::cargo_bin_cmd!` macro. Suppressed until migration to the new API.
#![allow(deprecated)]

mod support;
use support::socket_guard::start_mock_server_or_skip;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

/// A command isolated from any user config file.
fn fwdl(config_home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("fwdl").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home).env_remove("RUST_LOG");
    cmd
}

fn write_fwdl_config(config_home: &std::path::Path, contents: &str) {
    let config_dir = config_home.join("fwdl");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), contents).unwrap();
}

#[test]
fn test_binary_help_displays_usage() {
    let tempdir = TempDir::new().unwrap();
    fwdl(tempdir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Download firmware images"));
}

#[test]
fn test_binary_version_displays_version() {
    let tempdir = TempDir::new().unwrap();
    fwdl(tempdir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fwdl"));
}

#[test]
fn test_binary_without_subcommand_fails() {
    let tempdir = TempDir::new().unwrap();
    fwdl(tempdir.path()).assert().failure();
}

#[test]
fn test_binary_invalid_flag_returns_error() {
    let tempdir = TempDir::new().unwrap();
    fwdl(tempdir.path())
        .arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_encode_prints_percent_encoded_text() {
    let tempdir = TempDir::new().unwrap();
    fwdl(tempdir.path())
        .args(["encode", "a b&c"])
        .assert()
        .success()
        .stdout("a%20b%26c\n");
}

#[test]
fn test_fetch_rejects_zero_rate() {
    let tempdir = TempDir::new().unwrap();
    fwdl(tempdir.path())
        .args(["fetch", "http://127.0.0.1:9/fw.bin", "--max-rate", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--max-rate"));
}

#[test]
fn test_invalid_config_file_is_reported() {
    let tempdir = TempDir::new().unwrap();
    write_fwdl_config(tempdir.path(), "retry_budget = 99\n");
    fwdl(tempdir.path())
        .args(["encode", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("retry_budget"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_to_file_prints_json_summary() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/fw.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 2_048]))
        .mount(&mock_server)
        .await;

    let tempdir = TempDir::new().unwrap();
    let dest = tempdir.path().join("fw.bin");
    let assert = fwdl(tempdir.path())
        .arg("-q")
        .arg("fetch")
        .arg(format!("{}/fw.bin", mock_server.uri()))
        .arg("-o")
        .arg(&dest)
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let summary: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(summary["http_status"], 200);
    assert_eq!(summary["bytes_received"], 2_048);
    assert_eq!(std::fs::read(&dest).unwrap().len(), 2_048);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_without_output_writes_body_to_stdout() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(header("Authorization", "Bearer abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("manifest v3"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let tempdir = TempDir::new().unwrap();
    fwdl(tempdir.path())
        .arg("-q")
        .arg("fetch")
        .arg(format!("{}/manifest", mock_server.uri()))
        .args(["--bearer", "abc"])
        .assert()
        .success()
        .stdout("manifest v3");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_not_found_succeeds_unless_fail_flag() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
        .mount(&mock_server)
        .await;

    let tempdir = TempDir::new().unwrap();
    let url = format!("{}/missing", mock_server.uri());
    fwdl(tempdir.path())
        .args(["-q", "fetch", &url])
        .assert()
        .success()
        .stdout("gone");
    fwdl(tempdir.path())
        .args(["-q", "fetch", &url, "--fail"])
        .assert()
        .code(1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_head_writes_header_file_and_prints_status() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).insert_header("X-Firmware-Version", "4.0"))
        .mount(&mock_server)
        .await;

    let tempdir = TempDir::new().unwrap();
    let headers = tempdir.path().join("headers.txt");
    fwdl(tempdir.path())
        .arg("-q")
        .arg("head")
        .arg(format!("{}/fw.bin", mock_server.uri()))
        .arg("-o")
        .arg(&headers)
        .assert()
        .success()
        .stdout("200\n");
    let saved = std::fs::read_to_string(&headers).unwrap();
    assert!(saved.contains("x-firmware-version: 4.0"), "got: {saved}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rpc_rejects_malformed_json() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let tempdir = TempDir::new().unwrap();
    fwdl(tempdir.path())
        .arg("-q")
        .arg("rpc")
        .arg(format!("{}/rpc", mock_server.uri()))
        .args(["-d", "{not json"])
        .assert()
        .failure();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_check_reports_online() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let tempdir = TempDir::new().unwrap();
    fwdl(tempdir.path())
        .arg("-q")
        .arg("check")
        .arg("--url")
        .arg(format!("{}/generate_204", mock_server.uri()))
        .assert()
        .success()
        .stdout("online\n");
}
