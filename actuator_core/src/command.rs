//! Per-actuator command record and the options accepted by the command setters.
use crate::notifier::CompletionEvent;
use crate::stall::StallDetector;
use actuator_traits::ClosedLoop;
use actuator_traits::controller::ClosedLoopController;
use std::fmt;
use std::time::{Duration, Instant};

/// Logical control mode of an actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControlMode {
    #[default]
    Power,
    Velocity,
    Position,
    Current,
}

impl ControlMode {
    pub fn closed_loop(self) -> Option<ClosedLoop> {
        match self {
            ControlMode::Power => None,
            ControlMode::Velocity => Some(ClosedLoop::Velocity),
            ControlMode::Position => Some(ClosedLoop::Position),
            ControlMode::Current => Some(ClosedLoop::Current),
        }
    }
}

impl From<ClosedLoop> for ControlMode {
    fn from(l: ClosedLoop) -> Self {
        match l {
            ClosedLoop::Velocity => ControlMode::Velocity,
            ClosedLoop::Position => ControlMode::Position,
            ClosedLoop::Current => ControlMode::Current,
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.closed_loop() {
            Some(l) => l.fmt(f),
            None => f.write_str("power"),
        }
    }
}

/// Options for power, velocity and current commands.
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Ownership token; `None` only succeeds while the actuator is unowned.
    pub owner: Option<String>,
    /// Hold the actuator at zero power for this long before applying.
    pub delay: Option<Duration>,
    /// Stop automatically after this long and fire the notifier.
    pub duration: Option<Duration>,
    pub notifier: Option<CompletionEvent>,
}

impl CommandOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn notifier(mut self, notifier: CompletionEvent) -> Self {
        self.notifier = Some(notifier);
        self
    }
}

/// Options for position commands.
#[derive(Debug, Clone)]
pub struct PositionOptions {
    pub owner: Option<String>,
    pub delay: Option<Duration>,
    pub notifier: Option<CompletionEvent>,
    /// Keep correcting after the target is reached.
    pub hold_target: bool,
    /// Clamp on the corrective output magnitude.
    pub power_limit: Option<f64>,
    /// Give up (software closed loop only) after this long.
    pub timeout: Option<Duration>,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            owner: None,
            delay: None,
            notifier: None,
            hold_target: true,
            power_limit: None,
            timeout: None,
        }
    }
}

impl PositionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn notifier(mut self, notifier: CompletionEvent) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Without hold the software loop cuts power once the target is reached
    /// or the timeout expires. Native loops always hold.
    pub fn hold_target(mut self, hold: bool) -> Self {
        self.hold_target = hold;
        self
    }

    pub fn power_limit(mut self, limit: f64) -> Self {
        self.power_limit = Some(limit.abs());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Last value written to the hardware per mode; `None` forces the next write.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct LastSent {
    pub power: Option<f64>,
    pub velocity: Option<f64>,
    pub position: Option<f64>,
    pub current: Option<f64>,
}

impl LastSent {
    pub fn get(&self, l: ClosedLoop) -> Option<f64> {
        match l {
            ClosedLoop::Velocity => self.velocity,
            ClosedLoop::Position => self.position,
            ClosedLoop::Current => self.current,
        }
    }

    pub fn set(&mut self, l: ClosedLoop, value: Option<f64>) {
        match l {
            ClosedLoop::Velocity => self.velocity = value,
            ClosedLoop::Position => self.position = value,
            ClosedLoop::Current => self.current = value,
        }
    }
}

/// Software controllers, one slot per closed-loop mode.
#[derive(Default)]
pub(crate) struct SoftwareControllers {
    velocity: Option<Box<dyn ClosedLoopController>>,
    position: Option<Box<dyn ClosedLoopController>>,
    current: Option<Box<dyn ClosedLoopController>>,
}

impl SoftwareControllers {
    fn slot(&mut self, l: ClosedLoop) -> &mut Option<Box<dyn ClosedLoopController>> {
        match l {
            ClosedLoop::Velocity => &mut self.velocity,
            ClosedLoop::Position => &mut self.position,
            ClosedLoop::Current => &mut self.current,
        }
    }

    pub fn get(&self, l: ClosedLoop) -> Option<&dyn ClosedLoopController> {
        match l {
            ClosedLoop::Velocity => self.velocity.as_deref(),
            ClosedLoop::Position => self.position.as_deref(),
            ClosedLoop::Current => self.current.as_deref(),
        }
    }

    pub fn get_mut(&mut self, l: ClosedLoop) -> Option<&mut Box<dyn ClosedLoopController>> {
        self.slot(l).as_mut()
    }

    pub fn set(&mut self, l: ClosedLoop, ctrl: Box<dyn ClosedLoopController>) {
        *self.slot(l) = Some(ctrl);
    }

    pub fn contains(&self, l: ClosedLoop) -> bool {
        self.get(l).is_some()
    }
}

/// Everything the pipeline, the timers and the control tick share. Guarded
/// by the actuator's command lock.
pub(crate) struct CommandRecord {
    pub active_mode: ControlMode,
    /// Mode staged by the pipeline, applied now or when the delay expires.
    pub pending_mode: ControlMode,
    pub value: f64,
    /// Mode whose software controller is currently driving the output.
    pub attached: Option<ClosedLoop>,
    pub duration: Option<Duration>,
    pub expiry: Option<Instant>,
    pub hold_target: bool,
    pub power_limit: Option<f64>,
    pub notifier: Option<CompletionEvent>,
    /// Position target of the joystick-style `set_pid_power` operation.
    pub prev_pos_target: Option<f64>,
    pub calibrating: bool,
    pub cal_power: f64,
    pub stall: StallDetector,
    pub last_sent: LastSent,
    /// Power most recently commanded, before the stall output cut.
    pub curr_power: f64,
    /// Bumped by every new command; stale timer callbacks compare against it.
    pub generation: u64,
    pub software_pid: bool,
    pub controllers: SoftwareControllers,
}

impl CommandRecord {
    pub fn new(stall: StallDetector, software_pid: bool) -> Self {
        Self {
            active_mode: ControlMode::Power,
            pending_mode: ControlMode::Power,
            value: 0.0,
            attached: None,
            duration: None,
            expiry: None,
            hold_target: true,
            power_limit: None,
            notifier: None,
            prev_pos_target: None,
            calibrating: false,
            cal_power: 0.0,
            stall,
            last_sent: LastSent::default(),
            curr_power: 0.0,
            generation: 0,
            software_pid,
            controllers: SoftwareControllers::default(),
        }
    }
}

/// Work deferred until every lock is released: notifier callbacks may call
/// back into the actuator.
#[derive(Default)]
#[must_use]
pub(crate) struct Outcome {
    pub cancel: Vec<CompletionEvent>,
    pub fire: Option<CompletionEvent>,
}

impl Outcome {
    pub fn deliver(self) {
        for ev in self.cancel {
            ev.cancel();
        }
        if let Some(ev) = self.fire {
            ev.signal();
        }
    }
}

/// Deferred step armed on the one-shot timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerAction {
    ApplyValue,
    ApplyPosition,
    DurationExpired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_display_and_closed_loop() {
        assert_eq!(ControlMode::Power.to_string(), "power");
        assert_eq!(ControlMode::Current.to_string(), "current");
        assert_eq!(ControlMode::Power.closed_loop(), None);
        assert_eq!(
            ControlMode::from(ClosedLoop::Position),
            ControlMode::Position
        );
    }

    #[test]
    fn position_options_hold_by_default() {
        let o = PositionOptions::new().power_limit(-0.4);
        assert!(o.hold_target);
        assert_eq!(o.power_limit, Some(0.4));
    }

    #[test]
    fn outcome_cancels_before_firing() {
        let a = CompletionEvent::new("a");
        let b = CompletionEvent::new("b");
        Outcome {
            cancel: vec![a.clone()],
            fire: Some(b.clone()),
        }
        .deliver();
        assert!(a.is_canceled());
        assert!(b.is_signaled());
    }
}
