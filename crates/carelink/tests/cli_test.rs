//! Integration tests for the `carelink` CLI binary.
//!
//! These tests validate argument parsing, help output, shell completions,
//! config handling and error exit codes. The listener test runs against a
//! loopback WebSocket server, so nothing here needs a live backend.
#![allow(clippy::unwrap_used)]

use std::net::SocketAddr;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use futures_util::{SinkExt, StreamExt};
use predicates::prelude::*;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `carelink` binary with env isolation.
///
/// Clears all `CARELINK_*` env vars and points config directories at
/// `home` so tests never touch the user's real configuration.
fn carelink_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("carelink");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("RUST_LOG")
        .env_remove("CARELINK_PROFILE")
        .env_remove("CARELINK_ENDPOINT")
        .env_remove("CARELINK_TENANT")
        .env_remove("CARELINK_USER")
        .env_remove("CARELINK_TOKEN")
        .env_remove("CARELINK_OUTPUT");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// One-shot messaging server on a background thread: acknowledges, waits
/// for the `subscribe_thread` replay, pushes one message, then refuses the
/// token with close code 4001.
fn spawn_rejecting_server() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            ws.send(Message::text(r#"{"type":"connected","message":"ok"}"#))
                .await
                .unwrap();

            while let Some(Ok(frame)) = ws.next().await {
                if frame.to_text().is_ok_and(|t| t.contains("subscribe_thread")) {
                    break;
                }
            }

            let _ = ws
                .send(Message::text(
                    r#"{"type":"new_message","message":{"id":500,"thread_id":7,"content":"Lab results ready"}}"#,
                ))
                .await;
            let _ = ws
                .close(Some(CloseFrame {
                    code: CloseCode::Library(4001),
                    reason: "token expired".into(),
                }))
                .await;
            // Drain until the client acknowledges the close.
            while let Some(Ok(_)) = ws.next().await {}
        });
    });

    addr
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = tempfile::tempdir().unwrap();
    let output = carelink_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let home = tempfile::tempdir().unwrap();
    carelink_cmd(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("realtime messaging")
                .and(predicate::str::contains("listen"))
                .and(predicate::str::contains("config"))
                .and(predicate::str::contains("completions")),
        );
}

#[test]
fn test_version_flag() {
    let home = tempfile::tempdir().unwrap();
    carelink_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("carelink"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    let home = tempfile::tempdir().unwrap();
    carelink_cmd(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    let home = tempfile::tempdir().unwrap();
    carelink_cmd(home.path())
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let home = tempfile::tempdir().unwrap();
    let output = carelink_cmd(home.path()).arg("foobar").output().unwrap();
    assert!(!output.status.success(), "Expected failure for invalid subcommand");
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_listen_without_config_is_usage_error() {
    let home = tempfile::tempdir().unwrap();
    carelink_cmd(home.path())
        .args(["listen", "--thread", "7"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No endpoint configured"));
}

#[test]
fn test_listen_rejects_http_endpoint() {
    let home = tempfile::tempdir().unwrap();
    carelink_cmd(home.path())
        .args([
            "--endpoint",
            "https://clinic.example.com/ws/",
            "--tenant",
            "clinic-1",
            "--user",
            "42",
            "--token",
            "t",
            "listen",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("'https'"));
}

#[test]
fn test_listen_without_token_is_auth_error() {
    let home = tempfile::tempdir().unwrap();
    carelink_cmd(home.path())
        .args([
            "--endpoint",
            "ws://127.0.0.1:9/ws/",
            "--tenant",
            "clinic-1",
            "--user",
            "42",
            "listen",
        ])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No token configured"));
}

#[test]
fn test_unknown_profile_lists_available() {
    let home = tempfile::tempdir().unwrap();
    carelink_cmd(home.path())
        .args(["--profile", "nope", "listen"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Profile 'nope' not found"));
}

#[test]
fn test_invalid_thread_id() {
    let home = tempfile::tempdir().unwrap();
    let output = carelink_cmd(home.path())
        .args(["listen", "--thread", "seven"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("invalid value"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_show_no_config() {
    // `config show` falls back to the default config when no file exists.
    let home = tempfile::tempdir().unwrap();
    carelink_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("default_profile"));
}

#[test]
fn test_config_init_then_show() {
    let home = tempfile::tempdir().unwrap();
    carelink_cmd(home.path())
        .args([
            "--profile",
            "ward",
            "--endpoint",
            "wss://clinic.example.com/ws/messaging/",
            "--tenant",
            "clinic-1",
            "--user",
            "42",
            "config",
            "init",
            "--token-env",
            "WARD_TOKEN",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("Profile 'ward' written"));

    carelink_cmd(home.path())
        .args(["--output", "json", "config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"ward\"")
                .and(predicate::str::contains("wss://clinic.example.com/ws/messaging/"))
                .and(predicate::str::contains("WARD_TOKEN")),
        );

    // A second init without --force refuses to overwrite.
    carelink_cmd(home.path())
        .args([
            "-p",
            "ward",
            "-e",
            "wss://other.example.com/ws/",
            "--tenant",
            "t",
            "--user",
            "u",
            "config",
            "init",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_config_init_requires_endpoint() {
    let home = tempfile::tempdir().unwrap();
    carelink_cmd(home.path())
        .args(["--tenant", "clinic-1", "--user", "42", "config", "init"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--endpoint"));
}

#[test]
fn test_config_path_points_into_config_dir() {
    let home = tempfile::tempdir().unwrap();
    carelink_cmd(home.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

// ── Listener ────────────────────────────────────────────────────────

#[test]
fn test_listen_prints_events_and_exits_on_auth_rejection() {
    let home = tempfile::tempdir().unwrap();
    let addr = spawn_rejecting_server();

    let output = carelink_cmd(home.path())
        .args([
            "--endpoint",
            &format!("ws://{addr}/ws/messaging/"),
            "--tenant",
            "clinic-1",
            "--user",
            "42",
            "--token",
            "expired",
            "--color",
            "never",
            "listen",
            "--thread",
            "7",
            "--open-timeout",
            "10",
        ])
        .timeout(std::time::Duration::from_secs(30))
        .output()
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(3), "stdout:\n{stdout}\nstderr:\n{stderr}");
    assert!(stdout.contains("thread=7 id=500 Lab results ready"), "{stdout}");
    assert!(stderr.contains("closed with code 4001"), "{stderr}");
}
