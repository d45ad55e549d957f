/*
[INPUT]:  Compiled monitor binary and YAML configuration files
[OUTPUT]: Exit status checks for dry-run startup
[POS]:    Integration tests - CLI entry point
[UPDATE]: When changing CLI flags or startup validation
*/

use std::path::PathBuf;
use std::process::{Command, Output};

use tokio_test::assert_ok;
use wirebook_monitor::MonitorConfig;

fn run_dry(config_path: &str) -> Output {
    Command::new(env!("CARGO_BIN_EXE_wirebook-monitor"))
        .arg("--config")
        .arg(config_path)
        .arg("--dry-run")
        .env("RUST_LOG", "error")
        .output()
        .expect("Failed to start wirebook-monitor binary")
}

fn write_temp_config(name: &str, content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("wirebook-monitor-{}-{name}.yaml", std::process::id()));
    std::fs::write(&path, content).expect("write temp config");
    path
}

#[test]
fn bundled_config_parses_and_validates() {
    let path = format!("{}/configs/public_watches.yaml", env!("CARGO_MANIFEST_DIR"));
    let config = assert_ok!(MonitorConfig::from_file(&path));
    assert_ok!(config.validate());
    assert_eq!(config.watches.len(), 4);
}

#[test]
fn cli_mode_with_config_and_dry_run_works() {
    let config_path = format!("{}/configs/public_watches.yaml", env!("CARGO_MANIFEST_DIR"));
    let output = run_dry(&config_path);

    assert!(
        output.status.success(),
        "Process exited with non-zero status: {}\nStdout: {}\nStderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn dry_run_rejects_non_websocket_url() {
    let path = write_temp_config(
        "bad-url",
        "public_url: https://api.example.com\nwatches:\n  - channel: ticker\n    symbol: BTC/USDT\n",
    );
    let output = run_dry(path.to_str().expect("utf-8 temp path"));
    let _ = std::fs::remove_file(&path);

    assert!(!output.status.success());
}

#[test]
fn dry_run_rejects_missing_credential_env() {
    let path = write_temp_config(
        "missing-env",
        "public_url: wss://stream.example.com/ws\ncredentials:\n  api_key_env: WIREBOOK_TEST_UNSET_KEY\n  secret_env: WIREBOOK_TEST_UNSET_SECRET\nwatches:\n  - channel: balance\n",
    );
    let output = Command::new(env!("CARGO_BIN_EXE_wirebook-monitor"))
        .arg("--config")
        .arg(&path)
        .arg("--dry-run")
        .env_remove("WIREBOOK_TEST_UNSET_KEY")
        .env_remove("WIREBOOK_TEST_UNSET_SECRET")
        .output()
        .expect("Failed to start wirebook-monitor binary");
    let _ = std::fs::remove_file(&path);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("WIREBOOK_TEST_UNSET_KEY"));
}

#[test]
fn dry_run_with_credentials_from_env_works() {
    let path = write_temp_config(
        "private",
        "public_url: wss://stream.example.com/ws\nprivate_url: wss://stream.example.com/private\ncredentials: {}\nwatches:\n  - channel: orders\n  - channel: balance\n",
    );
    let output = Command::new(env!("CARGO_BIN_EXE_wirebook-monitor"))
        .arg("--config")
        .arg(&path)
        .arg("--dry-run")
        .env("WIREBOOK_API_KEY", "key")
        .env("WIREBOOK_API_SECRET", "secret")
        .output()
        .expect("Failed to start wirebook-monitor binary");
    let _ = std::fs::remove_file(&path);

    assert!(
        output.status.success(),
        "Stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}
