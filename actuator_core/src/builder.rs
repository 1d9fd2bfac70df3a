//! Type-state builder for [`Motor`].
//!
//! `build()` is only available once an actuator driver has been supplied;
//! `try_build()` is always available and checks at runtime.

use std::marker::PhantomData;
use std::sync::Arc;

use actuator_traits::clock::{Clock, MonotonicClock};
use actuator_traits::controller::ClosedLoopController;
use actuator_traits::timer::OneShotTimer;
use actuator_traits::{Actuator, ClosedLoop, DigitalInput, Encoder};

use crate::command::CommandRecord;
use crate::config::MotorSettings;
use crate::error::{BuildError, Result};
use crate::hardware::{Hardware, LimitSide};
use crate::motor::{Motor, Parts};
use crate::odometry::OdometryRegistry;
use crate::ownership::OwnershipGate;
use crate::pid::PidController;
use crate::scheduler::TaskScheduler;
use crate::stall::StallDetector;
use crate::timer::ThreadTimer;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct MotorBuilder<A> {
    name: String,
    actuator: Option<Box<dyn Actuator>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    timer: Option<Arc<dyn OneShotTimer>>,
    ownership: Option<Arc<dyn OwnershipGate>>,
    odometry_registry: Option<Arc<OdometryRegistry>>,
    scheduler: Option<Arc<dyn TaskScheduler>>,
    lower_switch: Option<Box<dyn DigitalInput>>,
    upper_switch: Option<Box<dyn DigitalInput>>,
    encoder: Option<Box<dyn Encoder>>,
    settings: MotorSettings,
    controllers: Vec<(ClosedLoop, Box<dyn ClosedLoopController>)>,
    _a: PhantomData<A>,
}

impl Motor {
    /// Start building an actuator called `name`.
    pub fn builder(name: impl Into<String>) -> MotorBuilder<Missing> {
        MotorBuilder {
            name: name.into(),
            actuator: None,
            clock: None,
            timer: None,
            ownership: None,
            odometry_registry: None,
            scheduler: None,
            lower_switch: None,
            upper_switch: None,
            encoder: None,
            settings: MotorSettings::default(),
            controllers: Vec::new(),
            _a: PhantomData,
        }
    }
}

impl<A> MotorBuilder<A> {
    fn retype<B>(self) -> MotorBuilder<B> {
        MotorBuilder {
            name: self.name,
            actuator: self.actuator,
            clock: self.clock,
            timer: self.timer,
            ownership: self.ownership,
            odometry_registry: self.odometry_registry,
            scheduler: self.scheduler,
            lower_switch: self.lower_switch,
            upper_switch: self.upper_switch,
            encoder: self.encoder,
            settings: self.settings,
            controllers: self.controllers,
            _a: PhantomData,
        }
    }

    pub fn with_actuator(self, actuator: impl Actuator + 'static) -> MotorBuilder<Set> {
        self.with_boxed_actuator(Box::new(actuator))
    }

    pub fn with_boxed_actuator(mut self, actuator: Box<dyn Actuator>) -> MotorBuilder<Set> {
        self.actuator = Some(actuator);
        self.retype()
    }

    /// Clock used for deadlines and the stall baseline (defaults to monotonic).
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// One-shot timer for delays and durations (defaults to a [`ThreadTimer`]).
    pub fn with_timer(mut self, timer: Arc<dyn OneShotTimer>) -> Self {
        self.timer = Some(timer);
        self
    }

    pub fn with_ownership(mut self, gate: Arc<dyn OwnershipGate>) -> Self {
        self.ownership = Some(gate);
        self
    }

    pub fn with_odometry_registry(mut self, registry: Arc<OdometryRegistry>) -> Self {
        self.odometry_registry = Some(registry);
        self
    }

    /// Register the control task with `scheduler`. Without one the caller
    /// drives [`Motor::tick_at`] directly.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn TaskScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_lower_limit_switch(mut self, input: impl DigitalInput + 'static) -> Self {
        self.lower_switch = Some(Box::new(input));
        self
    }

    pub fn with_upper_limit_switch(mut self, input: impl DigitalInput + 'static) -> Self {
        self.upper_switch = Some(Box::new(input));
        self
    }

    pub fn with_encoder(mut self, encoder: impl Encoder + 'static) -> Self {
        self.encoder = Some(Box::new(encoder));
        self
    }

    pub fn with_settings(mut self, settings: MotorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use a custom software controller for `l`. Implies software PID.
    pub fn with_controller(mut self, l: ClosedLoop, ctrl: Box<dyn ClosedLoopController>) -> Self {
        self.settings.software_pid = true;
        self.controllers.push((l, ctrl));
        self
    }

    /// Validate and construct. Fails with [`BuildError::MissingActuator`] when
    /// no driver was given.
    pub fn try_build(self) -> Result<Arc<Motor>> {
        let Some(driver) = self.actuator else {
            return Err(eyre::Report::new(BuildError::MissingActuator));
        };
        validate(&self.settings)?;
        let s = self.settings;

        let mut hw = Hardware::new(driver);
        if let Some(enc) = self.encoder {
            hw.set_encoder(enc);
        }
        if let Some(sw) = self.lower_switch {
            hw.set_external_switch(LimitSide::Lower, sw);
        }
        if let Some(sw) = self.upper_switch {
            hw.set_external_switch(LimitSide::Upper, sw);
        }
        hw.swapped = s.limit_switches_swapped;
        hw.nominal_voltage = s.nominal_voltage;
        if s.inverted {
            hw.driver
                .set_inverted(true)
                .map_err(|e| crate::hw_error::report(e.as_ref()))?;
        }
        if let Some(sensor) = s.sensor {
            hw.set_scale_and_offset(sensor.scale, sensor.offset);
            if sensor.inverted {
                hw.set_position_sensor_inverted(true)?;
            }
        }
        if s.soft_lower.is_some() || s.soft_upper.is_some() {
            hw.set_soft_limits(s.soft_lower, s.soft_upper)?;
        }

        let mut command = CommandRecord::new(StallDetector::new(s.stall), s.software_pid);
        for l in [ClosedLoop::Velocity, ClosedLoop::Position, ClosedLoop::Current] {
            let Some(pid) = s.pid(l) else { continue };
            if s.software_pid {
                let ctrl = PidController::new(pid.coefficients).with_tolerance(pid.tolerance);
                command.controllers.set(l, Box::new(ctrl));
            } else if hw.supports(l.control_capability()) {
                hw.driver
                    .set_pid_coefficients(l, pid.coefficients)
                    .map_err(|e| crate::hw_error::report(e.as_ref()))?;
                hw.driver
                    .set_pid_tolerance(l, pid.tolerance)
                    .map_err(|e| crate::hw_error::report(e.as_ref()))?;
            } else {
                tracing::warn!(motor = %self.name, mode = %l, "PID gains ignored: no native loop and software PID is off");
            }
        }
        for (l, ctrl) in self.controllers {
            command.controllers.set(l, ctrl);
        }

        let timer = match self.timer {
            Some(t) => t,
            None => Arc::new(ThreadTimer::new(&self.name)),
        };
        let clock = match self.clock {
            Some(c) => c,
            None => Arc::new(MonotonicClock::new()),
        };
        tracing::debug!(motor = %self.name, software_pid = s.software_pid, "actuator built");

        Ok(Motor::from_parts(Parts {
            name: self.name,
            clock,
            timer,
            ownership: self.ownership,
            odometry_registry: self.odometry_registry,
            scheduler: self.scheduler,
            command,
            hw,
            presets: s.presets,
        }))
    }
}

impl MotorBuilder<Set> {
    /// Construct once the driver is known to be present.
    pub fn build(self) -> Result<Arc<Motor>> {
        self.try_build()
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn validate(s: &MotorSettings) -> Result<()> {
    if let Some(v) = s.nominal_voltage
        && !(v.is_finite() && v > 0.0)
    {
        return Err(invalid("nominal voltage must be > 0"));
    }
    if let Some(sensor) = s.sensor
        && (!sensor.scale.is_finite() || sensor.scale == 0.0)
    {
        return Err(invalid("position scale must be finite and non-zero"));
    }
    if let (Some(lo), Some(hi)) = (s.soft_lower, s.soft_upper)
        && lo >= hi
    {
        return Err(invalid("soft lower limit must be below the upper limit"));
    }
    if s.stall.min_power < 0.0 || s.stall.tolerance < 0.0 {
        return Err(invalid("stall thresholds must be >= 0"));
    }
    if let Some(t) = &s.presets
        && t.positions().windows(2).any(|w| w[1] <= w[0])
    {
        return Err(invalid("preset positions must be strictly ascending"));
    }
    Ok(())
}
