use actuator_config::{SimProfile, load_toml};
use rstest::rstest;

const BASE: &str = r#"
[actuator]
name = "lift"
"#;

fn with(extra: &str) -> String {
    format!("{BASE}\n{extra}")
}

#[test]
fn minimal_config_uses_defaults() {
    let cfg = load_toml(BASE).expect("parse TOML");
    cfg.validate().expect("defaults are valid");
    assert_eq!(cfg.scheduler.control_hz, 50);
    assert_eq!(cfg.scheduler.odometry_hz, None);
    assert_eq!(cfg.sensor.scale, 1.0);
    assert_eq!(cfg.simulation.profile, SimProfile::Full);
    assert!(cfg.presets.is_none());
    assert!(!cfg.odometry.enabled);
}

#[test]
fn actuator_section_is_required() {
    assert!(load_toml("[stall]\nmin_power = 0.1\n").is_err());
}

#[test]
fn servo_profile_parses_lowercase() {
    let cfg = load_toml(&with("[simulation]\nprofile = \"servo\"\n")).unwrap();
    assert_eq!(cfg.simulation.profile, SimProfile::Servo);
    assert!(load_toml(&with("[simulation]\nprofile = \"Servo\"\n")).is_err());
}

#[rstest]
#[case("[actuator]\nname = \" \"\n", "actuator.name must not be empty")]
#[case(
    "[actuator]\nname = \"m\"\nnominal_voltage = 0.0\n",
    "actuator.nominal_voltage must be > 0"
)]
#[case(
    "[actuator]\nname = \"m\"\n[stall]\nmin_power = 1.5\n",
    "stall.min_power must be in [0.0, 1.0]"
)]
#[case(
    "[actuator]\nname = \"m\"\n[stall]\ntolerance = -1.0\n",
    "stall.tolerance must be >= 0"
)]
#[case(
    "[actuator]\nname = \"m\"\n[soft_limits]\nlower = 2.0\nupper = 2.0\n",
    "soft_limits.lower must be < soft_limits.upper"
)]
#[case(
    "[actuator]\nname = \"m\"\n[sensor]\nscale = 0.0\n",
    "sensor.scale must be finite and non-zero"
)]
#[case(
    "[actuator]\nname = \"m\"\n[pid.position]\nkp = 1.0\ntolerance = -0.1\n",
    "pid.position.tolerance must be >= 0"
)]
#[case(
    "[actuator]\nname = \"m\"\n[pid.velocity]\ni_zone = 0.0\n",
    "pid.velocity.i_zone must be > 0"
)]
#[case(
    "[actuator]\nname = \"m\"\nsoftware_pid = true\n",
    "actuator.software_pid requires at least [pid.position] or [pid.velocity]"
)]
#[case(
    "[actuator]\nname = \"m\"\n[presets]\ntolerance = 1.0\n",
    "presets needs either positions or file"
)]
#[case(
    "[actuator]\nname = \"m\"\n[presets]\npositions = [0.0, 5.0, 5.0]\n",
    "strictly ascending"
)]
#[case(
    "[actuator]\nname = \"m\"\n[scheduler]\ncontrol_hz = 0\n",
    "scheduler.control_hz must be > 0"
)]
#[case(
    "[actuator]\nname = \"m\"\n[scheduler]\nodometry_hz = 0\n",
    "scheduler.odometry_hz must be > 0"
)]
#[case(
    "[actuator]\nname = \"m\"\n[simulation]\nmax_velocity = 0.0\n",
    "simulation.max_velocity must be > 0"
)]
#[case(
    "[actuator]\nname = \"m\"\n[simulation]\nlower_switch_at = 3.0\nupper_switch_at = 1.0\n",
    "simulation.lower_switch_at must be < simulation.upper_switch_at"
)]
#[case(
    "[actuator]\nname = \"m\"\n[pins]\nlower_switch = 17\nupper_switch = 17\n",
    "must be different pins"
)]
fn rejects_invalid_values(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("config should be rejected");
    assert!(
        format!("{err}").contains(needle),
        "expected {needle:?} in {err}"
    );
}

#[test]
fn full_config_round_trips_through_validation() {
    let toml = r#"
[actuator]
name = "elevator"
software_pid = true
nominal_voltage = 12.0
limit_switches_swapped = true

[stall]
min_power = 0.2
tolerance = 0.5
timeout_ms = 400
reset_timeout_ms = 100

[soft_limits]
lower = 0.0
upper = 120.0

[sensor]
scale = 0.25
offset = -3.0

[pid.position]
kp = 0.05
ki = 0.001
i_zone = 5.0
tolerance = 0.5

[presets]
tolerance = 0.75
positions = [0.0, 40.0, 80.0, 120.0]

[odometry]
enabled = true

[scheduler]
control_hz = 100
odometry_hz = 200

[logging]
level = "debug"
rotation = "daily"
"#;
    let cfg = load_toml(toml).unwrap();
    cfg.validate().unwrap();
    assert_eq!(cfg.actuator.nominal_voltage, Some(12.0));
    assert!(cfg.actuator.limit_switches_swapped);
    assert_eq!(cfg.stall.timeout_ms, 400);
    assert_eq!(cfg.pid.position.map(|g| g.i_zone), Some(Some(5.0)));
    assert_eq!(cfg.presets.as_ref().map(|p| p.positions.len()), Some(4));
    assert_eq!(cfg.scheduler.odometry_hz, Some(200));
    assert_eq!(cfg.logging.rotation.as_deref(), Some("daily"));
}

#[test]
fn pins_default_to_unset() {
    let cfg = load_toml(BASE).unwrap();
    assert_eq!(cfg.pins.lower_switch, None);
    assert_eq!(cfg.pins.upper_switch, None);
    let cfg = load_toml(&with("[pins]\nlower_switch = 5\n")).unwrap();
    assert_eq!(cfg.pins.lower_switch, Some(5));
    cfg.validate().unwrap();
}

#[test]
fn shipped_sample_config_is_valid() {
    let cfg = load_toml(include_str!("../../etc/actuator.toml")).expect("parse sample");
    cfg.validate().expect("sample validates");
    assert_eq!(cfg.actuator.name, "lift");
    assert_eq!(cfg.presets.map(|p| p.positions.len()), Some(4));
}
