use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[actuator]
name = "turret"
software_pid = true

[pid.position]
kp = 0.2
tolerance = 0.5

[odometry]
enabled = true

[scheduler]
control_hz = 200
odometry_hz = 100

[simulation]
profile = "servo"
max_velocity = 100.0
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn stdout_json(args: &[&str]) -> serde_json::Value {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let out = Command::cargo_bin("actuator")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--json")
        .args(args)
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let s = String::from_utf8(out.stdout).unwrap();
    serde_json::from_str(s.trim()).expect("stdout must be a single JSON line")
}

#[test]
fn self_check_schema() {
    let v = stdout_json(&["self-check"]);
    assert_eq!(v["command"], "self-check");
    assert_eq!(v["name"], "turret");
    assert_eq!(v["software_pid"], true);
    assert_eq!(v["capabilities"], serde_json::json!(["BusVoltage"]));
    assert_eq!(v["native_loops"], serde_json::json!([]));
    assert_eq!(v["odometry"], 1);
    assert!(v["position"].is_number());
}

#[rstest]
#[case(15.0)]
#[case(-8.0)]
fn software_position_loop_on_servo(#[case] target: f64) {
    let t = target.to_string();
    let v = stdout_json(&["position", "--target", &t]);
    assert_eq!(v["command"], "position");
    assert_eq!(v["on_target"], true);
    let pos = v["position"].as_f64().unwrap();
    assert!((pos - target).abs() <= 0.5, "position {pos}");
}

#[test]
fn errors_are_structured_in_json_mode() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let out = Command::cargo_bin("actuator")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--json")
        .args(["preset", "--up"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8(out.stderr).unwrap();
    let err = stderr
        .lines()
        .filter_map(|l| serde_json::from_str::<serde_json::Value>(l).ok())
        .find(|v| v.get("reason").is_some())
        .expect("structured error line");
    assert_eq!(err["reason"], "Error");
    assert!(err["message"].as_str().unwrap().contains("no presets configured"));
}
