//! Static per-actuator settings applied by the builder.
use crate::presets::PresetTable;
use crate::stall::StallCfg;
use actuator_traits::ClosedLoop;
use actuator_traits::controller::PidCoefficients;

/// Gains plus on-target tolerance for one closed-loop mode.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidCfg {
    pub coefficients: PidCoefficients,
    pub tolerance: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorCfg {
    pub scale: f64,
    pub offset: f64,
    pub inverted: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotorSettings {
    pub software_pid: bool,
    pub inverted: bool,
    pub nominal_voltage: Option<f64>,
    pub limit_switches_swapped: bool,
    /// `None` keeps the unit scale, zero offset and the driver's sensor direction.
    pub sensor: Option<SensorCfg>,
    pub soft_lower: Option<f64>,
    pub soft_upper: Option<f64>,
    pub stall: StallCfg,
    pub velocity_pid: Option<PidCfg>,
    pub position_pid: Option<PidCfg>,
    pub current_pid: Option<PidCfg>,
    pub presets: Option<PresetTable>,
}

impl MotorSettings {
    pub fn pid(&self, l: ClosedLoop) -> Option<PidCfg> {
        match l {
            ClosedLoop::Velocity => self.velocity_pid,
            ClosedLoop::Position => self.position_pid,
            ClosedLoop::Current => self.current_pid,
        }
    }

    pub fn set_pid(&mut self, l: ClosedLoop, pid: PidCfg) {
        let slot = match l {
            ClosedLoop::Velocity => &mut self.velocity_pid,
            ClosedLoop::Position => &mut self.position_pid,
            ClosedLoop::Current => &mut self.current_pid,
        };
        *slot = Some(pid);
    }
}
