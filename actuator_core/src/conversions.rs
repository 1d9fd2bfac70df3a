//! `From` implementations bridging `actuator_config` types to core types.

use crate::config::{MotorSettings, PidCfg, SensorCfg};
use crate::presets::PresetTable;
use crate::stall::StallCfg;
use actuator_traits::controller::PidCoefficients;
use std::time::Duration;

// ── StallCfg ─────────────────────────────────────────────────────────────────

impl From<&actuator_config::StallSection> for StallCfg {
    fn from(c: &actuator_config::StallSection) -> Self {
        Self {
            min_power: c.min_power,
            tolerance: c.tolerance,
            timeout: Duration::from_millis(c.timeout_ms),
            reset_timeout: Duration::from_millis(c.reset_timeout_ms),
        }
    }
}

// ── PidCfg ───────────────────────────────────────────────────────────────────

impl From<&actuator_config::PidGains> for PidCfg {
    fn from(c: &actuator_config::PidGains) -> Self {
        let mut coefficients = PidCoefficients::new(c.kp, c.ki, c.kd, c.kf);
        if let Some(z) = c.i_zone {
            coefficients = coefficients.with_i_zone(z);
        }
        Self {
            coefficients,
            tolerance: c.tolerance,
        }
    }
}

// ── SensorCfg ────────────────────────────────────────────────────────────────

impl From<&actuator_config::SensorSection> for SensorCfg {
    fn from(c: &actuator_config::SensorSection) -> Self {
        Self {
            scale: c.scale,
            offset: c.offset,
            inverted: c.inverted,
        }
    }
}

// ── PresetTable ──────────────────────────────────────────────────────────────

/// Inline positions only; tables kept in a CSV file are loaded by the caller
/// with `actuator_config::load_presets_csv`.
impl From<&actuator_config::PresetsSection> for PresetTable {
    fn from(c: &actuator_config::PresetsSection) -> Self {
        PresetTable::new(c.tolerance, c.positions.clone())
    }
}

// ── MotorSettings ────────────────────────────────────────────────────────────

impl From<&actuator_config::Config> for MotorSettings {
    fn from(c: &actuator_config::Config) -> Self {
        let sensor = SensorCfg::from(&c.sensor);
        let default_sensor = SensorCfg::from(&actuator_config::SensorSection::default());
        Self {
            software_pid: c.actuator.software_pid,
            inverted: c.actuator.inverted,
            nominal_voltage: c.actuator.nominal_voltage,
            limit_switches_swapped: c.actuator.limit_switches_swapped,
            sensor: (sensor != default_sensor).then_some(sensor),
            soft_lower: c.soft_limits.lower,
            soft_upper: c.soft_limits.upper,
            stall: StallCfg::from(&c.stall),
            velocity_pid: c.pid.velocity.as_ref().map(PidCfg::from),
            position_pid: c.pid.position.as_ref().map(PidCfg::from),
            current_pid: c.pid.current.as_ref().map(PidCfg::from),
            presets: c
                .presets
                .as_ref()
                .filter(|p| !p.positions.is_empty())
                .map(PresetTable::from),
        }
    }
}
