//! waf-sender binary smoke tests

use std::process::Command;

fn sender(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .args(["run", "-q", "-p", "waf-sender", "--"])
        .args(args)
        .env_remove("WAF_SENDER_WAF_HOST")
        .env_remove("WAF_SENDER_TOKEN")
        .env_remove("WAF_SENDER_ZABBIX_SERVER")
        .env_remove("WAF_SENDER_ZABBIX_HOST")
        .env_remove("WAF_SENDER_CONFIG")
        .output()
        .expect("Failed to execute command")
}

/// Test that the sender shows help
#[test]
fn test_sender_help() {
    let output = sender(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Help should succeed");
    assert!(stdout.contains("--waf-host"), "Should show waf-host flag");
    assert!(stdout.contains("--zabbix-server"), "Should show zabbix-server flag");
    assert!(stdout.contains("--data-type"), "Should show data-type flag");
    assert!(stdout.contains("--metrics-file"), "Should show metrics-file flag");
}

/// Missing required settings is a usage error reported as `1`
#[test]
fn test_missing_arguments() {
    let output = sender(&["--waf-host", "https://127.0.0.1:1"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout.trim(), "1");
    assert!(stderr.contains("token"), "Should name the missing setting");
}

/// An unreachable appliance fails the run without touching state
#[test]
fn test_unreachable_appliance() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().to_string_lossy().into_owned();
    let output = sender(&[
        "--waf-host",
        "https://127.0.0.1:1",
        "--token",
        "t",
        "--zabbix-server",
        "127.0.0.1",
        "--zabbix-host",
        "web-01",
        "--state-dir",
        &state_dir,
        "--sender-program",
        "/nonexistent/zabbix_sender",
        "--timeout",
        "2",
        "--quiet",
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout.trim(), "1");
    assert!(!dir
        .path()
        .join("waf_sender_last_run_web-01.json")
        .exists());
}
