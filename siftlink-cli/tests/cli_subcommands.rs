use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_dir(label: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "siftlink_cli_{label}_{}_{}",
        std::process::id(),
        nanos
    ));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn siftlink() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_siftlink"));
    cmd.env_remove("SIFTLINK_MODULE").env("NO_COLOR", "1");
    cmd
}

fn parse_json_line(stdout: &[u8]) -> serde_json::Value {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .rev()
        .find(|l| l.trim_start().starts_with('{'))
        .unwrap_or_else(|| panic!("no JSON line in stdout: {text}"));
    serde_json::from_str(line).expect("parse JSON line")
}

fn assert_error_shape(value: &serde_json::Value, command: &str) {
    assert_eq!(
        value.get("schema_version").and_then(|v| v.as_u64()),
        Some(1),
        "missing schema_version=1 field"
    );
    assert_eq!(value.get("command").and_then(|v| v.as_str()), Some(command));
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert!(
        value.get("error").and_then(|v| v.as_str()).is_some(),
        "missing error string"
    );
}

#[test]
fn help_lists_subcommands() {
    let output = siftlink().arg("help").output().expect("run siftlink help");
    assert!(
        output.status.success(),
        "siftlink help failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("probe"), "missing probe in help output");
    assert!(stdout.contains("detect"), "missing detect in help output");
    assert!(stdout.contains("match"), "missing match in help output");
}

#[test]
fn detect_help_lists_session_flags() {
    let output = siftlink()
        .args(["detect", "--help"])
        .output()
        .expect("run siftlink detect --help");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in [
        "--image",
        "--config",
        "--module",
        "--max-features",
        "--octave-layers",
        "--contrast-threshold",
        "--edge-threshold",
        "--no-match",
        "--json",
        "--keypoints",
    ] {
        assert!(stdout.contains(flag), "missing {flag} in detect help");
    }
}

#[test]
fn match_help_lists_thresholds() {
    let output = siftlink()
        .args(["match", "--help"])
        .output()
        .expect("run siftlink match --help");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--left"));
    assert!(stdout.contains("--right"));
    assert!(stdout.contains("--distance-max"));
    assert!(stdout.contains("--ratio-max"));
}

#[test]
fn probe_with_missing_module_reports_load_error_json() {
    let dir = unique_temp_dir("probe_missing_module");
    let module = dir.join("libsiftgpu_missing.so");
    let output = siftlink()
        .args(["probe", "--json", "--module"])
        .arg(&module)
        .output()
        .expect("run siftlink probe");

    assert_eq!(output.status.code(), Some(1), "loader errors exit with category 1");
    let value = parse_json_line(&output.stdout);
    assert_error_shape(&value, "probe");
    assert_eq!(value.get("code").and_then(|v| v.as_u64()), Some(100));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn invalid_threshold_is_rejected_before_loading() {
    let output = siftlink()
        .args([
            "probe",
            "--json",
            "--edge-threshold=-1",
            "--module",
            "/nonexistent/libsiftgpu.so",
        ])
        .output()
        .expect("run siftlink probe");
    assert_eq!(output.status.code(), Some(6));
    let value = parse_json_line(&output.stdout);
    assert_error_shape(&value, "probe");
    assert_eq!(value.get("code").and_then(|v| v.as_u64()), Some(600));
}

#[test]
fn detect_with_unreadable_config_reports_io_error() {
    let dir = unique_temp_dir("detect_missing_config");
    let output = siftlink()
        .args(["detect", "--json", "--image"])
        .arg(dir.join("frame.png"))
        .arg("--config")
        .arg(dir.join("missing.json"))
        .output()
        .expect("run siftlink detect");
    assert_eq!(output.status.code(), Some(6));
    let value = parse_json_line(&output.stdout);
    assert_error_shape(&value, "detect");
    assert_eq!(value.get("code").and_then(|v| v.as_u64()), Some(601));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn match_with_no_match_flag_is_matcher_unavailable() {
    let dir = unique_temp_dir("match_no_match");
    let output = siftlink()
        .args(["match", "--json", "--no-match", "--left"])
        .arg(dir.join("a.png"))
        .arg("--right")
        .arg(dir.join("b.png"))
        .output()
        .expect("run siftlink match");
    assert_eq!(output.status.code(), Some(3));
    let value = parse_json_line(&output.stdout);
    assert_error_shape(&value, "match");
    assert_eq!(value.get("code").and_then(|v| v.as_u64()), Some(301));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn missing_module_without_json_logs_to_stderr() {
    let output = siftlink()
        .args(["probe", "--module", "/nonexistent/libsiftgpu.so"])
        .output()
        .expect("run siftlink probe");
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty(), "stdout stays clean without --json");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Command failed"), "stderr: {stderr}");
}
