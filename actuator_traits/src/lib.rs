//! Hardware-facing contracts for the actuator control core.
//!
//! Everything a concrete motor driver, limit switch, encoder, timer or
//! closed-loop controller must provide lives here so that `actuator_core`
//! never depends on a concrete variant.
pub mod clock;
pub mod controller;
pub mod timer;

pub use clock::{Clock, MonotonicClock};
pub use controller::{ClosedLoopController, PidCoefficients};
pub use timer::{OneShotTimer, TimerCallback};

use std::fmt;

/// Error type used at every trait boundary in this crate.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Feature a concrete actuator may or may not implement natively.
///
/// The core queries these up front and branches on the answer instead of
/// probing an operation and reacting to its failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    VelocityControl,
    PositionControl,
    CurrentControl,
    VelocitySensor,
    PositionSensor,
    CurrentSensor,
    BusVoltage,
    LimitSwitches,
    SoftLimits,
}

/// Closed-loop control modes (everything except open-loop power).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClosedLoop {
    Velocity,
    Position,
    Current,
}

impl ClosedLoop {
    /// Capability required to run this mode in hardware.
    pub fn control_capability(self) -> Capability {
        match self {
            ClosedLoop::Velocity => Capability::VelocityControl,
            ClosedLoop::Position => Capability::PositionControl,
            ClosedLoop::Current => Capability::CurrentControl,
        }
    }
}

impl fmt::Display for ClosedLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClosedLoop::Velocity => "velocity",
            ClosedLoop::Position => "position",
            ClosedLoop::Current => "current",
        };
        f.write_str(s)
    }
}

/// Hardware direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Reverse,
    Forward,
}

/// Returned by an [`Actuator`] for features it does not implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unsupported {
    pub feature: &'static str,
}

impl Unsupported {
    pub fn boxed(feature: &'static str) -> Box<dyn std::error::Error + Send + Sync> {
        Box::new(Self { feature })
    }
}

impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is not supported by this actuator", self.feature)
    }
}

impl std::error::Error for Unsupported {}

/// Driver contract for one physical actuator.
///
/// Only power control is mandatory. Every other operation defaults to
/// [`Unsupported`]; implementors override the ones they support and report
/// them through [`Actuator::supports`].
pub trait Actuator: Send {
    fn supports(&self, capability: Capability) -> bool;

    fn set_power(&mut self, power: f64) -> HwResult<()>;
    fn power(&mut self) -> HwResult<f64>;

    fn set_inverted(&mut self, _inverted: bool) -> HwResult<()> {
        Err(Unsupported::boxed("motor inversion"))
    }

    fn set_velocity(&mut self, _velocity: f64) -> HwResult<()> {
        Err(Unsupported::boxed("velocity control"))
    }
    fn velocity(&mut self) -> HwResult<f64> {
        Err(Unsupported::boxed("velocity sensor"))
    }

    /// Native position control; `power_limit` caps the corrective output.
    fn set_position(&mut self, _position: f64, _power_limit: Option<f64>) -> HwResult<()> {
        Err(Unsupported::boxed("position control"))
    }
    fn position(&mut self) -> HwResult<f64> {
        Err(Unsupported::boxed("position sensor"))
    }

    fn set_current(&mut self, _current: f64) -> HwResult<()> {
        Err(Unsupported::boxed("current control"))
    }
    fn current(&mut self) -> HwResult<f64> {
        Err(Unsupported::boxed("current sensor"))
    }

    fn bus_voltage(&mut self) -> HwResult<f64> {
        Err(Unsupported::boxed("bus voltage"))
    }

    fn enable_limit_switch(&mut self, _dir: Direction, _normal_close: bool) -> HwResult<()> {
        Err(Unsupported::boxed("limit switches"))
    }
    fn disable_limit_switch(&mut self, _dir: Direction) -> HwResult<()> {
        Err(Unsupported::boxed("limit switches"))
    }
    fn is_limit_switch_enabled(&mut self, _dir: Direction) -> HwResult<bool> {
        Err(Unsupported::boxed("limit switches"))
    }
    fn set_limit_switch_inverted(&mut self, _dir: Direction, _inverted: bool) -> HwResult<()> {
        Err(Unsupported::boxed("limit switches"))
    }
    fn is_limit_switch_active(&mut self, _dir: Direction) -> HwResult<bool> {
        Err(Unsupported::boxed("limit switches"))
    }

    /// `None` clears the limit in that direction.
    fn set_soft_limit(&mut self, _dir: Direction, _limit: Option<f64>) -> HwResult<()> {
        Err(Unsupported::boxed("soft limits"))
    }

    fn set_position_sensor_inverted(&mut self, _inverted: bool) -> HwResult<()> {
        Err(Unsupported::boxed("position sensor"))
    }
    fn is_position_sensor_inverted(&mut self) -> HwResult<bool> {
        Err(Unsupported::boxed("position sensor"))
    }
    fn reset_position(&mut self) -> HwResult<()> {
        Err(Unsupported::boxed("position sensor"))
    }

    fn set_pid_coefficients(&mut self, _mode: ClosedLoop, _pid: PidCoefficients) -> HwResult<()> {
        Err(Unsupported::boxed("native PID"))
    }
    fn pid_coefficients(&mut self, _mode: ClosedLoop) -> HwResult<PidCoefficients> {
        Err(Unsupported::boxed("native PID"))
    }
    fn set_pid_tolerance(&mut self, _mode: ClosedLoop, _tolerance: f64) -> HwResult<()> {
        Err(Unsupported::boxed("native PID"))
    }
    fn on_target(&mut self, _mode: ClosedLoop) -> HwResult<bool> {
        Err(Unsupported::boxed("native PID"))
    }
}

/// A two-state input such as a limit switch.
pub trait DigitalInput: Send {
    fn is_active(&self) -> bool;
    fn set_inverted(&mut self, inverted: bool);
    fn is_inverted(&self) -> bool;
}

/// External position sensor used when the actuator has none of its own.
pub trait Encoder: Send {
    fn position(&self) -> f64;
    fn reset(&mut self);
    fn set_inverted(&mut self, inverted: bool);
    fn is_inverted(&self) -> bool;
}
