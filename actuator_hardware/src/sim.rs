//! Simulated actuator plant.
//!
//! The plant is a first-order kinematic model: the applied output in
//! `[-1, 1]` maps linearly to velocity (`output * max_velocity`) and position
//! integrates velocity on every [`SimProbe::step`]. Native velocity, position
//! and current loops are ideal. Every write is counted so tests can assert on
//! what actually reached the device.
use crate::error::HwError;
use actuator_traits::{
    Actuator, Capability, ClosedLoop, Direction, HwResult, PidCoefficients,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Current drawn at full output, in amps.
pub const STALL_CURRENT: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct SimParams {
    /// Position units per second at full output.
    pub max_velocity: f64,
    pub bus_voltage: f64,
    pub start_position: f64,
    /// Native on-target band of the closed loops.
    pub position_tolerance: f64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            max_velocity: 100.0,
            bus_voltage: 12.0,
            start_position: 0.0,
            position_tolerance: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimMode {
    Power,
    Velocity(f64),
    Position { target: f64, limit: Option<f64> },
    Current(f64),
}

/// Number of writes that reached the device, per command kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub power: usize,
    pub velocity: usize,
    pub position: usize,
    pub current: usize,
}

impl WriteCounts {
    pub fn total(&self) -> usize {
        self.power + self.velocity + self.position + self.current
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct NativeSwitch {
    enabled: bool,
    inverted: bool,
    /// Physical trip point; `None` means the switch is not wired.
    at: Option<f64>,
}

#[derive(Debug)]
pub(crate) struct SimState {
    params: SimParams,
    mode: SimMode,
    power: f64,
    output: f64,
    position: f64,
    velocity: f64,
    sensor_zero: f64,
    inverted: bool,
    sensor_inverted: bool,
    blocked: bool,
    reverse_switch: NativeSwitch,
    forward_switch: NativeSwitch,
    soft_reverse: Option<f64>,
    soft_forward: Option<f64>,
    pid: [Option<PidCoefficients>; 3],
    tolerance: [Option<f64>; 3],
    writes: WriteCounts,
    last_power: Option<f64>,
}

fn slot(l: ClosedLoop) -> usize {
    match l {
        ClosedLoop::Velocity => 0,
        ClosedLoop::Position => 1,
        ClosedLoop::Current => 2,
    }
}

impl SimState {
    fn new(params: SimParams) -> Self {
        Self {
            position: params.start_position,
            params,
            mode: SimMode::Power,
            power: 0.0,
            output: 0.0,
            velocity: 0.0,
            sensor_zero: 0.0,
            inverted: false,
            sensor_inverted: false,
            blocked: false,
            reverse_switch: NativeSwitch::default(),
            forward_switch: NativeSwitch::default(),
            soft_reverse: None,
            soft_forward: None,
            pid: [None; 3],
            tolerance: [None; 3],
            writes: WriteCounts::default(),
            last_power: None,
        }
    }

    fn switch(&self, dir: Direction) -> &NativeSwitch {
        match dir {
            Direction::Reverse => &self.reverse_switch,
            Direction::Forward => &self.forward_switch,
        }
    }

    fn switch_mut(&mut self, dir: Direction) -> &mut NativeSwitch {
        match dir {
            Direction::Reverse => &mut self.reverse_switch,
            Direction::Forward => &mut self.forward_switch,
        }
    }

    fn switch_tripped(&self, dir: Direction) -> bool {
        let sw = self.switch(dir);
        let Some(at) = sw.at else { return false };
        let closed = match dir {
            Direction::Reverse => self.position <= at,
            Direction::Forward => self.position >= at,
        };
        closed != sw.inverted
    }

    fn tolerance(&self, l: ClosedLoop) -> f64 {
        self.tolerance[slot(l)].unwrap_or(self.params.position_tolerance)
    }

    /// Output the device applies this instant, before inversion.
    fn demanded_output(&self, dt: f64) -> f64 {
        let max_v = self.params.max_velocity;
        let out = match self.mode {
            SimMode::Power => self.power,
            SimMode::Velocity(v) => v / max_v,
            SimMode::Current(a) => a / STALL_CURRENT,
            SimMode::Position { target, limit } => {
                let err = target - self.position;
                let want = if dt > 0.0 { err / (dt * max_v) } else { 0.0 };
                let cap = limit.unwrap_or(1.0).abs().min(1.0);
                want.clamp(-cap, cap)
            }
        };
        out.clamp(-1.0, 1.0)
    }

    fn step(&mut self, dt: f64) {
        let mut out = self.demanded_output(dt);
        if self.inverted {
            out = -out;
        }
        let mut v = out * self.params.max_velocity;
        let rev_stop = (self.reverse_switch.enabled && self.switch_tripped(Direction::Reverse))
            || self.soft_reverse.is_some_and(|lim| self.position <= lim);
        let fwd_stop = (self.forward_switch.enabled && self.switch_tripped(Direction::Forward))
            || self.soft_forward.is_some_and(|lim| self.position >= lim);
        if (v < 0.0 && rev_stop) || (v > 0.0 && fwd_stop) || self.blocked {
            v = 0.0;
        }
        self.output = out;
        self.velocity = v;
        self.position += v * dt;
    }

    fn sensor_position(&self) -> f64 {
        let p = self.position - self.sensor_zero;
        if self.sensor_inverted { -p } else { p }
    }

    fn sensor_velocity(&self) -> f64 {
        if self.sensor_inverted {
            -self.velocity
        } else {
            self.velocity
        }
    }
}

/// Handle for driving and inspecting a simulated plant from tests and demos.
#[derive(Debug, Clone)]
pub struct SimProbe {
    state: Arc<Mutex<SimState>>,
}

impl SimProbe {
    /// Advance the plant by `dt` seconds.
    pub fn step(&self, dt: f64) {
        self.state.lock().step(dt);
    }

    pub fn writes(&self) -> WriteCounts {
        self.state.lock().writes
    }

    pub fn last_power(&self) -> Option<f64> {
        self.state.lock().last_power
    }

    pub fn mode(&self) -> SimMode {
        self.state.lock().mode
    }

    /// True physical position, independent of the sensor zero.
    pub fn position(&self) -> f64 {
        self.state.lock().position
    }

    pub fn velocity(&self) -> f64 {
        self.state.lock().velocity
    }

    pub fn set_position(&self, position: f64) {
        self.state.lock().position = position;
    }

    pub fn set_bus_voltage(&self, volts: f64) {
        self.state.lock().params.bus_voltage = volts;
    }

    /// Jam the mechanism: output no longer produces motion.
    pub fn set_blocked(&self, blocked: bool) {
        self.state.lock().blocked = blocked;
    }

    /// Wire a native limit switch tripping at `at`.
    pub fn wire_native_switch(&self, dir: Direction, at: f64) {
        self.state.lock().switch_mut(dir).at = Some(at);
    }

    pub(crate) fn shared(&self) -> Arc<Mutex<SimState>> {
        self.state.clone()
    }

    pub(crate) fn physical_position(state: &Mutex<SimState>) -> f64 {
        state.lock().position
    }
}

/// Full-featured simulated actuator. Capabilities can be narrowed to
/// exercise the software fallbacks.
#[derive(Debug)]
pub struct SimulatedActuator {
    state: Arc<Mutex<SimState>>,
    caps: HashSet<Capability>,
}

pub const ALL_CAPABILITIES: [Capability; 9] = [
    Capability::VelocityControl,
    Capability::PositionControl,
    Capability::CurrentControl,
    Capability::VelocitySensor,
    Capability::PositionSensor,
    Capability::CurrentSensor,
    Capability::BusVoltage,
    Capability::LimitSwitches,
    Capability::SoftLimits,
];

impl SimulatedActuator {
    pub fn new(params: SimParams) -> Self {
        Self::with_capabilities(params, &ALL_CAPABILITIES)
    }

    pub fn with_capabilities(params: SimParams, caps: &[Capability]) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new(params))),
            caps: caps.iter().copied().collect(),
        }
    }

    /// Drop a capability, e.g. to force software closed loop.
    pub fn without(mut self, cap: Capability) -> Self {
        self.caps.remove(&cap);
        self
    }

    pub fn probe(&self) -> SimProbe {
        SimProbe {
            state: self.state.clone(),
        }
    }

    fn require(&self, cap: Capability, what: &str) -> HwResult<()> {
        if self.caps.contains(&cap) {
            Ok(())
        } else {
            Err(Box::new(HwError::Unsupported(what.to_string())))
        }
    }
}

impl Actuator for SimulatedActuator {
    fn supports(&self, capability: Capability) -> bool {
        self.caps.contains(&capability)
    }

    fn set_power(&mut self, power: f64) -> HwResult<()> {
        let mut s = self.state.lock();
        s.mode = SimMode::Power;
        s.power = power.clamp(-1.0, 1.0);
        s.writes.power += 1;
        s.last_power = Some(s.power);
        tracing::trace!(power, "sim power");
        Ok(())
    }

    fn power(&mut self) -> HwResult<f64> {
        let s = self.state.lock();
        Ok(match s.mode {
            SimMode::Power => s.power,
            _ => s.output,
        })
    }

    fn set_inverted(&mut self, inverted: bool) -> HwResult<()> {
        self.state.lock().inverted = inverted;
        Ok(())
    }

    fn set_velocity(&mut self, velocity: f64) -> HwResult<()> {
        self.require(Capability::VelocityControl, "velocity control")?;
        let mut s = self.state.lock();
        s.mode = SimMode::Velocity(velocity);
        s.writes.velocity += 1;
        Ok(())
    }

    fn velocity(&mut self) -> HwResult<f64> {
        self.require(Capability::VelocitySensor, "velocity sensor")?;
        Ok(self.state.lock().sensor_velocity())
    }

    fn set_position(&mut self, position: f64, power_limit: Option<f64>) -> HwResult<()> {
        self.require(Capability::PositionControl, "position control")?;
        let mut s = self.state.lock();
        let sensed = if s.sensor_inverted { -position } else { position };
        let target = sensed + s.sensor_zero;
        s.mode = SimMode::Position {
            target,
            limit: power_limit,
        };
        s.writes.position += 1;
        Ok(())
    }

    fn position(&mut self) -> HwResult<f64> {
        self.require(Capability::PositionSensor, "position sensor")?;
        Ok(self.state.lock().sensor_position())
    }

    fn set_current(&mut self, current: f64) -> HwResult<()> {
        self.require(Capability::CurrentControl, "current control")?;
        let mut s = self.state.lock();
        s.mode = SimMode::Current(current);
        s.writes.current += 1;
        Ok(())
    }

    fn current(&mut self) -> HwResult<f64> {
        self.require(Capability::CurrentSensor, "current sensor")?;
        Ok(self.state.lock().output.abs() * STALL_CURRENT)
    }

    fn bus_voltage(&mut self) -> HwResult<f64> {
        self.require(Capability::BusVoltage, "bus voltage")?;
        Ok(self.state.lock().params.bus_voltage)
    }

    fn enable_limit_switch(&mut self, dir: Direction, normal_close: bool) -> HwResult<()> {
        self.require(Capability::LimitSwitches, "limit switches")?;
        let mut s = self.state.lock();
        let sw = s.switch_mut(dir);
        sw.enabled = true;
        sw.inverted = normal_close;
        Ok(())
    }

    fn disable_limit_switch(&mut self, dir: Direction) -> HwResult<()> {
        self.require(Capability::LimitSwitches, "limit switches")?;
        self.state.lock().switch_mut(dir).enabled = false;
        Ok(())
    }

    fn is_limit_switch_enabled(&mut self, dir: Direction) -> HwResult<bool> {
        self.require(Capability::LimitSwitches, "limit switches")?;
        Ok(self.state.lock().switch(dir).enabled)
    }

    fn set_limit_switch_inverted(&mut self, dir: Direction, inverted: bool) -> HwResult<()> {
        self.require(Capability::LimitSwitches, "limit switches")?;
        self.state.lock().switch_mut(dir).inverted = inverted;
        Ok(())
    }

    fn is_limit_switch_active(&mut self, dir: Direction) -> HwResult<bool> {
        self.require(Capability::LimitSwitches, "limit switches")?;
        let s = self.state.lock();
        Ok(s.switch(dir).enabled && s.switch_tripped(dir))
    }

    fn set_soft_limit(&mut self, dir: Direction, limit: Option<f64>) -> HwResult<()> {
        self.require(Capability::SoftLimits, "soft limits")?;
        let mut s = self.state.lock();
        let physical = limit.map(|l| l + s.sensor_zero);
        match dir {
            Direction::Reverse => s.soft_reverse = physical,
            Direction::Forward => s.soft_forward = physical,
        }
        Ok(())
    }

    fn set_position_sensor_inverted(&mut self, inverted: bool) -> HwResult<()> {
        self.require(Capability::PositionSensor, "position sensor")?;
        self.state.lock().sensor_inverted = inverted;
        Ok(())
    }

    fn is_position_sensor_inverted(&mut self) -> HwResult<bool> {
        self.require(Capability::PositionSensor, "position sensor")?;
        Ok(self.state.lock().sensor_inverted)
    }

    fn reset_position(&mut self) -> HwResult<()> {
        self.require(Capability::PositionSensor, "position sensor")?;
        let mut s = self.state.lock();
        s.sensor_zero = s.position;
        Ok(())
    }

    fn set_pid_coefficients(&mut self, mode: ClosedLoop, pid: PidCoefficients) -> HwResult<()> {
        self.require(mode.control_capability(), "native PID")?;
        self.state.lock().pid[slot(mode)] = Some(pid);
        Ok(())
    }

    fn pid_coefficients(&mut self, mode: ClosedLoop) -> HwResult<PidCoefficients> {
        self.require(mode.control_capability(), "native PID")?;
        Ok(self.state.lock().pid[slot(mode)].unwrap_or_default())
    }

    fn set_pid_tolerance(&mut self, mode: ClosedLoop, tolerance: f64) -> HwResult<()> {
        self.require(mode.control_capability(), "native PID")?;
        self.state.lock().tolerance[slot(mode)] = Some(tolerance.abs());
        Ok(())
    }

    fn on_target(&mut self, mode: ClosedLoop) -> HwResult<bool> {
        self.require(mode.control_capability(), "native PID")?;
        let s = self.state.lock();
        let tol = s.tolerance(mode);
        Ok(match (mode, s.mode) {
            (ClosedLoop::Position, SimMode::Position { target, .. }) => {
                (target - s.position).abs() <= tol
            }
            (ClosedLoop::Velocity, SimMode::Velocity(v)) => (v - s.velocity).abs() <= tol,
            (ClosedLoop::Current, SimMode::Current(a)) => {
                (a.abs() - s.output.abs() * STALL_CURRENT).abs() <= tol
            }
            _ => false,
        })
    }
}
