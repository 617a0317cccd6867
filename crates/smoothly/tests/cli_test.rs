//! Integration tests for the `smoothly` CLI binary.
//!
//! Argument parsing, help output, shell completions, config management
//! and error exit codes. Board traffic goes to a wiremock server.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{body_string, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VERSION_LINE: &str = "Build version: edge-9ab4538, Build date: Oct 10 2016 04:09:42, MCU: LPC1769, System Clock: 120MHz\r\n";

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `smoothly` binary with env isolation.
///
/// Clears all `SMOOTHLY_*` env vars and points the config file into
/// `dir` so tests never touch the user's real configuration.
fn smoothly_cmd(dir: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("smoothly");
    cmd.env("SMOOTHLY_CONFIG", dir.join("config.toml"))
        .env("HOME", dir)
        .env("NO_COLOR", "1")
        .env_remove("SMOOTHLY_OUTPUT")
        .env_remove("SMOOTHLY_COLOR")
        .env_remove("SMOOTHLY_TIMEOUT")
        .env_remove("SMOOTHLY_DEFAULT_BOARD")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Run the binary off the async runtime so the mock server keeps serving.
async fn run_blocking(dir: &Path, args: Vec<String>) -> std::process::Output {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || smoothly_cmd(&dir).args(args).output().unwrap())
        .await
        .unwrap()
}

async fn version_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/command"))
        .and(body_string("version\n"))
        .respond_with(ResponseTemplate::new(200).set_body_string(VERSION_LINE))
        .mount(&server)
        .await;
    server
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let dir = TempDir::new().unwrap();
    let output = smoothly_cmd(dir.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let dir = TempDir::new().unwrap();
    smoothly_cmd(dir.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("Smoothieboard")
            .and(predicate::str::contains("scan"))
            .and(predicate::str::contains("send"))
            .and(predicate::str::contains("watch")),
    );
}

#[test]
fn test_version_flag() {
    let dir = TempDir::new().unwrap();
    smoothly_cmd(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("smoothly"));
}

#[test]
fn test_unknown_subcommand() {
    let dir = TempDir::new().unwrap();
    smoothly_cmd(dir.path())
        .arg("frobnicate")
        .assert()
        .code(2);
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    let dir = TempDir::new().unwrap();
    smoothly_cmd(dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_invalid_shell() {
    let dir = TempDir::new().unwrap();
    smoothly_cmd(dir.path())
        .args(["completions", "tcsh"])
        .assert()
        .code(2);
}

// ── Config management ───────────────────────────────────────────────

#[test]
fn test_config_path_honours_env() {
    let dir = TempDir::new().unwrap();
    smoothly_cmd(dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_board_lifecycle() {
    let dir = TempDir::new().unwrap();

    smoothly_cmd(dir.path())
        .args(["config", "add-board", "bench", "192.168.1.102"])
        .assert()
        .success();
    smoothly_cmd(dir.path())
        .args(["config", "add-board", "spare", "192.168.1.103:8080"])
        .assert()
        .success();

    let written = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
    assert!(written.contains("default_board = \"bench\""), "{written}");
    assert!(written.contains("192.168.1.103:8080"), "{written}");

    smoothly_cmd(dir.path())
        .args(["config", "use", "spare"])
        .assert()
        .success();

    let output = smoothly_cmd(dir.path())
        .args(["-o", "json", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let shown: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown["default_board"], "spare");
    assert_eq!(shown["boards"]["bench"]["address"], "192.168.1.102");

    smoothly_cmd(dir.path())
        .args(["config", "remove-board", "spare"])
        .assert()
        .success();
    let written = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
    assert!(!written.contains("spare"), "{written}");
    assert!(!written.contains("default_board"), "{written}");
}

#[test]
fn test_config_use_unknown_board() {
    let dir = TempDir::new().unwrap();
    let output = smoothly_cmd(dir.path())
        .args(["config", "use", "ghost"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(10));
    assert!(combined_output(&output).contains("ghost"));
}

#[test]
fn test_config_rejects_bad_address() {
    let dir = TempDir::new().unwrap();
    smoothly_cmd(dir.path())
        .args(["config", "add-board", "bench", "http://10.0.0.2/"])
        .assert()
        .code(10);
}

#[test]
fn test_malformed_config_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.toml"), "[command\ntimeout = ").unwrap();
    let output = smoothly_cmd(dir.path())
        .args(["config", "show"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(10));
    assert!(combined_output(&output).contains("config.toml"));
}

// ── Validation errors ───────────────────────────────────────────────

#[test]
fn test_scan_rejects_invalid_input() {
    let dir = TempDir::new().unwrap();
    let output = smoothly_cmd(dir.path())
        .args(["scan", "192.168.1.20-10"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("192.168.1.20-10"));
}

#[test]
fn test_scan_rejects_probe_timeout_out_of_range() {
    let dir = TempDir::new().unwrap();
    smoothly_cmd(dir.path())
        .args(["scan", "10.0.0.1", "--probe-timeout", "50"])
        .assert()
        .code(2);
}

#[test]
fn test_scan_without_targets() {
    let dir = TempDir::new().unwrap();
    smoothly_cmd(dir.path()).arg("scan").assert().code(2);
}

#[test]
fn test_version_without_board() {
    let dir = TempDir::new().unwrap();
    let output = smoothly_cmd(dir.path()).arg("version").output().unwrap();
    assert_eq!(output.status.code(), Some(10));
    assert!(combined_output(&output).contains("No board given"));
}

#[test]
fn test_send_conflicting_retry_flags() {
    let dir = TempDir::new().unwrap();
    smoothly_cmd(dir.path())
        .args(["send", "--no-retry", "--retry-limit", "2", "10.0.0.2", "version"])
        .assert()
        .code(2);
}

// ── Board traffic ───────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_send_prints_raw_reply() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/command"))
        .and(body_string("ls -s /sd\n"))
        .respond_with(ResponseTemplate::new(200).set_body_string("config.txt 1234\r\nfirmware.cur 400\r\n"))
        .expect(1)
        .mount(&server)
        .await;

    let address = server.address().to_string();
    let args = ["send", address.as_str(), "ls", "-s", "/sd"]
        .map(String::from)
        .to_vec();
    let output = run_blocking(dir.path(), args).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("config.txt 1234"));
    assert!(stdout.contains("firmware.cur 400"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_send_parsed_version_as_json() {
    let dir = TempDir::new().unwrap();
    let server = version_server().await;

    let address = server.address().to_string();
    let args = ["-o", "json", "send", "--parse", address.as_str(), "version"]
        .map(String::from)
        .to_vec();
    let output = run_blocking(dir.path(), args).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let reply: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(reply["command"], "version");
    assert_eq!(reply["attempts"], 1);
    assert_eq!(reply["parsed"]["type"], "version");
    assert_eq!(reply["parsed"]["data"]["mcu"], "LPC1769");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_send_unsupported_command() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/command"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("error:Unsupported command - frob\r\n"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let address = server.address().to_string();
    let args = ["send", address.as_str(), "frob"]
        .map(String::from)
        .to_vec();
    let output = run_blocking(dir.path(), args).await;

    assert_eq!(output.status.code(), Some(9));
    assert!(combined_output(&output).contains("frob"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_version_uses_default_board() {
    let dir = TempDir::new().unwrap();
    let server = version_server().await;

    let address = server.address().to_string();
    smoothly_cmd(dir.path())
        .args(["config", "add-board", "bench", address.as_str()])
        .assert()
        .success();

    let args = ["-o", "plain", "version"].map(String::from).to_vec();
    let output = run_blocking(dir.path(), args).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "edge-9ab4538");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_send_server_error_exhausts_retries() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/command"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let address = server.address().to_string();
    let args = [
        "send",
        "--retry-limit",
        "2",
        "--retry-interval",
        "10",
        address.as_str(),
        "M114",
    ]
    .map(String::from)
    .to_vec();
    let output = run_blocking(dir.path(), args).await;

    assert_eq!(output.status.code(), Some(7));
    assert!(combined_output(&output).contains("3 attempt(s)"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_watch_stops_after_cycles() {
    let dir = TempDir::new().unwrap();
    let server = version_server().await;

    let address = server.address().to_string();
    let args = [
        "-o",
        "json-compact",
        "watch",
        address.as_str(),
        "--interval",
        "100",
        "--cycles",
        "2",
    ]
    .map(String::from)
    .to_vec();
    let output = run_blocking(dir.path(), args).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let kinds: Vec<String> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| {
            let event: serde_json::Value = serde_json::from_str(line).unwrap();
            event["kind"].as_str().unwrap().to_owned()
        })
        .collect();
    assert_eq!(kinds, ["connect", "watch", "watch"]);
}
