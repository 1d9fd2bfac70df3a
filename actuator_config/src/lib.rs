#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for one actuator and its simulated plant.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Preset tables can be given inline or loaded from a CSV file with a
//!   single `position` column.
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ActuatorSection {
    pub name: String,
    /// Use the core's software PID instead of the driver's native closed loop.
    #[serde(default)]
    pub software_pid: bool,
    /// Battery nominal voltage for power compensation; absent disables it.
    #[serde(default)]
    pub nominal_voltage: Option<f64>,
    /// Lower switch is wired to the forward input and upper to reverse.
    #[serde(default)]
    pub limit_switches_swapped: bool,
    #[serde(default)]
    pub inverted: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StallSection {
    pub min_power: f64,
    pub tolerance: f64,
    pub timeout_ms: u64,
    pub reset_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
#[serde(default)]
pub struct SoftLimits {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SensorSection {
    pub scale: f64,
    pub offset: f64,
    pub inverted: bool,
}

impl Default for SensorSection {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
            inverted: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
#[serde(default)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub kf: f64,
    pub i_zone: Option<f64>,
    pub tolerance: f64,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PidSection {
    pub velocity: Option<PidGains>,
    pub position: Option<PidGains>,
    pub current: Option<PidGains>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PresetsSection {
    pub tolerance: f64,
    /// Ascending preset positions.
    pub positions: Vec<f64>,
    /// CSV file with a `position` header; used when `positions` is empty.
    pub file: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
#[serde(default)]
pub struct OdometrySection {
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SchedulerSection {
    /// Rate of the per-actuator control task.
    pub control_hz: u32,
    /// Rate of the shared odometry sampler; absent runs it with the control task.
    pub odometry_hz: Option<u32>,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            control_hz: 50,
            odometry_hz: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SimProfile {
    /// Power, velocity, position and current in hardware, plus sensors.
    #[default]
    Full,
    /// Continuous servo: power and bus voltage only.
    Servo,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Simulation {
    pub profile: SimProfile,
    /// Position units per second at full power.
    pub max_velocity: f64,
    pub bus_voltage: f64,
    pub start_position: f64,
    /// Lower limit switch closes at or below this position.
    pub lower_switch_at: Option<f64>,
    /// Upper limit switch closes at or above this position.
    pub upper_switch_at: Option<f64>,
    /// On-target band of the simulated native closed loop.
    pub position_tolerance: f64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            profile: SimProfile::Full,
            max_velocity: 100.0,
            bus_voltage: 12.0,
            start_position: 0.0,
            lower_switch_at: None,
            upper_switch_at: None,
            position_tolerance: 0.5,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// BCM pin numbers of real limit switches. Only honored by builds with the
/// `hardware` feature; when set they replace the simulated switches.
#[derive(Debug, Deserialize, Default, Clone, Copy)]
#[serde(default)]
pub struct Pins {
    pub lower_switch: Option<u8>,
    pub upper_switch: Option<u8>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub actuator: ActuatorSection,
    #[serde(default)]
    pub stall: StallSection,
    #[serde(default)]
    pub soft_limits: SoftLimits,
    #[serde(default)]
    pub sensor: SensorSection,
    #[serde(default)]
    pub pid: PidSection,
    #[serde(default)]
    pub presets: Option<PresetsSection>,
    #[serde(default)]
    pub odometry: OdometrySection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub simulation: Simulation,
    #[serde(default)]
    pub pins: Pins,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

#[derive(Debug, Deserialize, Clone, Copy)]
struct PresetRow {
    position: f64,
}

/// Load preset positions from a CSV file with exactly one `position` column.
pub fn load_presets_csv(path: &std::path::Path) -> eyre::Result<Vec<f64>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open presets CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<String> = headers.iter().map(|s| s.trim().to_string()).collect();
    if actual != ["position"] {
        eyre::bail!(
            "presets CSV must have the single header 'position', got: {}",
            actual.join(",")
        );
    }

    let mut positions = Vec::new();
    for (idx, rec) in rdr.deserialize::<PresetRow>().enumerate() {
        match rec {
            Ok(row) => positions.push(row.position),
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        }
    }
    check_ascending(&positions)?;
    Ok(positions)
}

fn check_ascending(positions: &[f64]) -> eyre::Result<()> {
    if let Some(i) = positions.iter().position(|p| !p.is_finite()) {
        eyre::bail!("preset position {} is not finite", i);
    }
    if let Some(i) = positions.windows(2).position(|w| w[1] <= w[0]) {
        eyre::bail!(
            "preset positions must be strictly ascending (index {} and {})",
            i,
            i + 1
        );
    }
    Ok(())
}

fn check_pid(mode: &str, g: &PidGains) -> eyre::Result<()> {
    let all = [g.kp, g.ki, g.kd, g.kf, g.tolerance];
    if all.iter().any(|v| !v.is_finite()) {
        eyre::bail!("pid.{mode} gains must be finite");
    }
    if g.tolerance < 0.0 {
        eyre::bail!("pid.{mode}.tolerance must be >= 0");
    }
    if let Some(z) = g.i_zone
        && !(z.is_finite() && z > 0.0)
    {
        eyre::bail!("pid.{mode}.i_zone must be > 0");
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Actuator
        if self.actuator.name.trim().is_empty() {
            eyre::bail!("actuator.name must not be empty");
        }
        if let Some(v) = self.actuator.nominal_voltage
            && !(v.is_finite() && v > 0.0)
        {
            eyre::bail!("actuator.nominal_voltage must be > 0");
        }

        // Stall
        if !(0.0..=1.0).contains(&self.stall.min_power) {
            eyre::bail!("stall.min_power must be in [0.0, 1.0]");
        }
        if self.stall.tolerance < 0.0 {
            eyre::bail!("stall.tolerance must be >= 0");
        }
        if self.stall.timeout_ms > 60 * 60 * 1000 {
            eyre::bail!("stall.timeout_ms is unreasonably large (>1h)");
        }

        // Soft limits
        if let (Some(lo), Some(hi)) = (self.soft_limits.lower, self.soft_limits.upper)
            && lo >= hi
        {
            eyre::bail!("soft_limits.lower must be < soft_limits.upper");
        }

        // Pins
        if let (Some(lo), Some(hi)) = (self.pins.lower_switch, self.pins.upper_switch)
            && lo == hi
        {
            eyre::bail!("pins.lower_switch and pins.upper_switch must be different pins");
        }

        // Sensor
        if !self.sensor.scale.is_finite() || self.sensor.scale == 0.0 {
            eyre::bail!("sensor.scale must be finite and non-zero");
        }
        if !self.sensor.offset.is_finite() {
            eyre::bail!("sensor.offset must be finite");
        }

        // PID
        for (mode, gains) in [
            ("velocity", &self.pid.velocity),
            ("position", &self.pid.position),
            ("current", &self.pid.current),
        ] {
            if let Some(g) = gains {
                check_pid(mode, g)?;
            }
        }
        if self.actuator.software_pid && self.pid.position.is_none() && self.pid.velocity.is_none()
        {
            eyre::bail!("actuator.software_pid requires at least [pid.position] or [pid.velocity]");
        }

        // Presets
        if let Some(p) = &self.presets {
            if p.tolerance < 0.0 {
                eyre::bail!("presets.tolerance must be >= 0");
            }
            if p.positions.is_empty() && p.file.is_none() {
                eyre::bail!("presets needs either positions or file");
            }
            check_ascending(&p.positions)?;
        }

        // Scheduler
        if self.scheduler.control_hz == 0 {
            eyre::bail!("scheduler.control_hz must be > 0");
        }
        if self.scheduler.odometry_hz == Some(0) {
            eyre::bail!("scheduler.odometry_hz must be > 0");
        }

        // Simulation
        if !(self.simulation.max_velocity.is_finite() && self.simulation.max_velocity > 0.0) {
            eyre::bail!("simulation.max_velocity must be > 0");
        }
        if !(self.simulation.bus_voltage.is_finite() && self.simulation.bus_voltage > 0.0) {
            eyre::bail!("simulation.bus_voltage must be > 0");
        }
        if self.simulation.position_tolerance < 0.0 {
            eyre::bail!("simulation.position_tolerance must be >= 0");
        }
        if let (Some(lo), Some(hi)) = (
            self.simulation.lower_switch_at,
            self.simulation.upper_switch_at,
        ) && lo >= hi
        {
            eyre::bail!("simulation.lower_switch_at must be < simulation.upper_switch_at");
        }

        Ok(())
    }
}
