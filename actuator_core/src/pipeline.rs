//! Client-facing command pipeline.
//!
//! Every command runs the same steps: clear the caller's notifier, take
//! ownership, cancel whatever was in flight, compensate and veto the value,
//! stage it into the command record and apply it now or after a delay.
use crate::command::{
    CommandOptions, CommandRecord, ControlMode, Outcome, PositionOptions, TimerAction,
};
use crate::error::{ActuatorError, Report, Result};
use crate::motor::Motor;
use crate::notifier::CompletionEvent;
use crate::util::clip_power;
use actuator_traits::{Capability, ClosedLoop};
use std::time::Duration;

struct PositionStage {
    target: f64,
    hold_target: bool,
    power_limit: Option<f64>,
    timeout: Option<Duration>,
    delay: Option<Duration>,
}

fn nonzero(d: Option<Duration>) -> Option<Duration> {
    d.filter(|d| !d.is_zero())
}

impl Motor {
    pub fn set_power(&self, power: f64, opts: CommandOptions) -> Result<()> {
        self.set_motor_value(ControlMode::Power, clip_power(power), opts)
    }

    pub fn set_velocity(&self, velocity: f64, opts: CommandOptions) -> Result<()> {
        self.set_motor_value(ControlMode::Velocity, velocity, opts)
    }

    pub fn set_current(&self, current: f64, opts: CommandOptions) -> Result<()> {
        self.set_motor_value(ControlMode::Current, current, opts)
    }

    /// Cancel the current operation and drive power to zero.
    pub fn stop(&self, owner: Option<&str>) -> Result<()> {
        self.set_power_owned(owner, 0.0)
    }

    /// Fail fast when `mode` can run neither in software nor in hardware.
    fn ensure_configured(&self, mode: ControlMode) -> Result<()> {
        let Some(l) = mode.closed_loop() else {
            return Ok(());
        };
        let software = {
            let rec = self.command.lock();
            if rec.software_pid && !rec.controllers.contains(l) {
                return Err(Report::new(ActuatorError::MisconfiguredController(l)));
            }
            rec.software_pid
        };
        if !software && !self.hw.lock().supports(l.control_capability()) {
            return Err(Report::new(ActuatorError::Unsupported(format!(
                "{l} control"
            ))));
        }
        Ok(())
    }

    /// Take ownership for `owner` and validate it. The returned notifier is
    /// the ownership proxy when ownership was newly acquired.
    fn claim(
        &self,
        owner: Option<&str>,
        notifier: Option<CompletionEvent>,
    ) -> Result<Option<CompletionEvent>> {
        let Some(gate) = &self.ownership else {
            return Ok(notifier);
        };
        let notifier = match owner {
            Some(o) => gate.acquire(o, notifier.clone()).or(notifier),
            None => notifier,
        };
        if !gate.validate(owner) {
            tracing::debug!(motor = %self.name, ?owner, holder = ?gate.owner(), "ownership denied");
            return Err(Report::new(ActuatorError::OwnershipDenied {
                owner: owner.map(str::to_string),
            }));
        }
        Ok(notifier)
    }

    /// Cancel timers and calibration and drop an unfired notifier. The
    /// actuator is not stopped.
    pub(crate) fn cancel_locked(&self, rec: &mut CommandRecord) {
        if let Some(old) = rec.notifier.take() {
            tracing::debug!(motor = %self.name, event = old.name(), "pending notifier discarded");
        }
        self.timer.cancel();
        rec.generation = rec.generation.wrapping_add(1);
        rec.calibrating = false;
        rec.prev_pos_target = None;
        rec.duration = None;
        rec.expiry = None;
    }

    fn arm(&self, rec: &CommandRecord, delay: Duration, action: TimerAction) {
        let me = self.me.clone();
        let generation = rec.generation;
        self.timer.set(
            delay,
            Box::new(move || {
                if let Some(motor) = me.upgrade() {
                    motor.on_timer(generation, action);
                }
            }),
        );
    }

    pub(crate) fn on_timer(&self, generation: u64, action: TimerAction) {
        let mut out = Outcome::default();
        {
            let mut rec = self.command.lock();
            if rec.generation != generation {
                tracing::trace!(motor = %self.name, ?action, "stale timer ignored");
                return;
            }
            let res = match action {
                TimerAction::ApplyValue => self.apply_value_locked(&mut rec, &mut out),
                TimerAction::ApplyPosition => self.apply_position_locked(&mut rec),
                TimerAction::DurationExpired => {
                    tracing::debug!(motor = %self.name, "command duration expired");
                    let res = self.issue_power(&mut rec, 0.0, true).map(|_| ());
                    out.fire = rec.notifier.take();
                    res
                }
            };
            if let Err(e) = res {
                tracing::warn!(motor = %self.name, ?action, error = %e, "timed command failed");
                out.cancel.extend(rec.notifier.take());
            }
        }
        out.deliver();
    }

    fn set_motor_value(&self, mode: ControlMode, value: f64, opts: CommandOptions) -> Result<()> {
        let CommandOptions {
            owner,
            delay,
            duration,
            notifier,
        } = opts;
        self.ensure_configured(mode)?;
        if let Some(n) = &notifier {
            n.clear();
        }
        let notifier = self.claim(owner.as_deref(), notifier)?;
        tracing::debug!(motor = %self.name, %mode, value, ?delay, ?duration, "command");

        let mut out = Outcome::default();
        let res = {
            let mut rec = self.command.lock();
            self.cancel_locked(&mut rec);
            let res = self.stage_value_locked(&mut rec, mode, value, delay, duration, notifier, &mut out);
            if res.is_err() {
                out.cancel.extend(rec.notifier.take());
            }
            res
        };
        out.deliver();
        res
    }

    #[allow(clippy::too_many_arguments)]
    fn stage_value_locked(
        &self,
        rec: &mut CommandRecord,
        mode: ControlMode,
        value: f64,
        delay: Option<Duration>,
        duration: Option<Duration>,
        notifier: Option<CompletionEvent>,
        out: &mut Outcome,
    ) -> Result<()> {
        let value = {
            let mut hw = self.hw.lock();
            let value = if mode == ControlMode::Power {
                hw.compensate(value)?
            } else {
                value
            };
            let value = hw.switch_veto(value);
            hw.soft_limit_veto(value)
        };

        rec.pending_mode = mode;
        rec.value = value;
        rec.duration = nonzero(duration);
        rec.hold_target = false;
        rec.power_limit = None;
        rec.notifier = notifier;

        match nonzero(delay) {
            Some(d) => {
                self.issue_power(rec, 0.0, false)?;
                self.arm(rec, d, TimerAction::ApplyValue);
                Ok(())
            }
            None => self.apply_value_locked(rec, out),
        }
    }

    /// Apply the staged power, velocity or current command.
    fn apply_value_locked(&self, rec: &mut CommandRecord, out: &mut Outcome) -> Result<()> {
        let mode = rec.pending_mode;
        let value = rec.value;
        match mode.closed_loop() {
            None => {
                self.issue_power(rec, value, true)?;
            }
            Some(l) if rec.software_pid => {
                let measured = self.measure(l)?;
                let ctrl = rec
                    .controllers
                    .get_mut(l)
                    .ok_or_else(|| Report::new(ActuatorError::MisconfiguredController(l)))?;
                ctrl.reset();
                ctrl.set_target(value, measured);
                self.enter_mode(rec, mode, Some(l));
            }
            Some(l) => {
                self.enter_mode(rec, mode, None);
                self.issue(rec, l, value)?;
            }
        }
        match rec.duration {
            Some(d) => self.arm(rec, d, TimerAction::DurationExpired),
            None => out.fire = rec.notifier.take(),
        }
        Ok(())
    }

    pub fn set_position(&self, target: f64, opts: PositionOptions) -> Result<()> {
        self.position_command(target, opts, None).map(|_| ())
    }

    /// Returns false when the move was vetoed. `pid_target` records the
    /// target for `set_pid_power` once the command is accepted.
    fn position_command(
        &self,
        target: f64,
        opts: PositionOptions,
        pid_target: Option<f64>,
    ) -> Result<bool> {
        let PositionOptions {
            owner,
            delay,
            notifier,
            hold_target,
            power_limit,
            timeout,
        } = opts;
        self.ensure_configured(ControlMode::Position)?;
        if let Some(n) = &notifier {
            n.clear();
        }
        let notifier = self.claim(owner.as_deref(), notifier)?;
        tracing::debug!(motor = %self.name, target, hold_target, ?power_limit, ?timeout, "position command");

        let stage = PositionStage {
            target,
            hold_target,
            power_limit: power_limit.map(f64::abs),
            timeout: nonzero(timeout),
            delay: nonzero(delay),
        };
        let mut out = Outcome::default();
        let res = {
            let mut rec = self.command.lock();
            self.cancel_locked(&mut rec);
            let res = self.stage_position_locked(&mut rec, &stage, notifier, &mut out);
            match res {
                Ok(true) => rec.prev_pos_target = pid_target,
                Ok(false) => {}
                Err(_) => out.cancel.extend(rec.notifier.take()),
            }
            res
        };
        out.deliver();
        res
    }

    fn stage_position_locked(
        &self,
        rec: &mut CommandRecord,
        stage: &PositionStage,
        notifier: Option<CompletionEvent>,
        out: &mut Outcome,
    ) -> Result<bool> {
        let current = self.position().ok();
        let vetoed = self.hw.lock().position_veto(stage.target, current);
        if vetoed {
            tracing::warn!(motor = %self.name, target = stage.target, ?current, "position command vetoed by limits");
            out.cancel.extend(notifier);
            return Ok(false);
        }

        rec.pending_mode = ControlMode::Position;
        rec.value = stage.target;
        rec.hold_target = stage.hold_target;
        rec.power_limit = stage.power_limit;
        rec.expiry = stage.timeout.map(|t| self.now() + t);
        rec.notifier = notifier;

        match stage.delay {
            Some(d) => {
                self.issue_power(rec, 0.0, false)?;
                self.arm(rec, d, TimerAction::ApplyPosition);
            }
            None => self.apply_position_locked(rec)?,
        }
        Ok(true)
    }

    fn apply_position_locked(&self, rec: &mut CommandRecord) -> Result<()> {
        let target = rec.value;
        if rec.software_pid {
            let measured = self.measure(ClosedLoop::Position)?;
            let ctrl = rec.controllers.get_mut(ClosedLoop::Position).ok_or_else(|| {
                Report::new(ActuatorError::MisconfiguredController(ClosedLoop::Position))
            })?;
            ctrl.reset();
            ctrl.set_target(target, measured);
            self.enter_mode(rec, ControlMode::Position, Some(ClosedLoop::Position));
        } else {
            self.enter_mode(rec, ControlMode::Position, None);
            self.issue(rec, ClosedLoop::Position, target)?;
        }
        Ok(())
    }

    /// Joystick-style position control. The sign of `power` picks `max_pos`
    /// or `min_pos` as the target and its magnitude caps the output. Moving
    /// on in the same direction only updates the cap; releasing the stick
    /// holds the current position when `hold_target` is set, otherwise it
    /// cuts power.
    pub fn set_pid_power(
        &self,
        owner: Option<&str>,
        power: f64,
        min_pos: f64,
        max_pos: f64,
        hold_target: bool,
    ) -> Result<()> {
        let power = clip_power(power);
        let prev_target = self.command.lock().prev_pos_target;

        if power != 0.0 {
            let target = if power > 0.0 { max_pos } else { min_pos };
            if prev_target == Some(target) {
                self.claim(owner, None)?;
                let mut rec = self.command.lock();
                rec.power_limit = Some(power.abs());
                if rec.active_mode == ControlMode::Position && rec.attached.is_none() {
                    let value = rec.value;
                    self.issue(&mut rec, ClosedLoop::Position, value)?;
                }
                return Ok(());
            }
            let mut opts = PositionOptions::new().hold_target(hold_target);
            opts.owner = owner.map(str::to_string);
            opts.power_limit = Some(power.abs());
            self.position_command(target, opts, Some(target))?;
        } else if prev_target.is_some() {
            if hold_target {
                let here = self.position()?;
                let mut opts = PositionOptions::new().hold_target(true);
                opts.owner = owner.map(str::to_string);
                self.position_command(here, opts, None)?;
            } else {
                self.set_power_owned(owner, 0.0)?;
            }
        }
        Ok(())
    }

    /// Drive toward the lower limit switch at `cal_power` until it closes or
    /// the actuator stalls, then zero the position reference there.
    ///
    /// The notifier is signaled the same way for both endings; a stall is
    /// only reported through a warning log.
    pub fn zero_calibrate(
        &self,
        owner: Option<&str>,
        cal_power: f64,
        notifier: Option<CompletionEvent>,
    ) -> Result<()> {
        if let Some(n) = &notifier {
            n.clear();
        }
        let notifier = self.claim(owner, notifier)?;
        let position = self.position().ok();
        let now = self.now();
        tracing::debug!(motor = %self.name, cal_power, "zero calibration started");

        let mut out = Outcome::default();
        let res = {
            let mut rec = self.command.lock();
            self.cancel_locked(&mut rec);
            let res = self.issue_power(&mut rec, 0.0, true);
            if res.is_ok() {
                rec.cal_power = clip_power(cal_power);
                rec.calibrating = true;
                rec.notifier = notifier;
                rec.stall.clear();
                rec.stall.seed(position.unwrap_or(0.0), now);
            } else {
                out.cancel.extend(notifier);
            }
            res.map(|_| ())
        };
        out.deliver();
        res
    }

    /// True when `l` would run on the driver's native loop.
    pub fn uses_native(&self, l: ClosedLoop) -> bool {
        !self.command.lock().software_pid && self.hw.lock().supports(l.control_capability())
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.hw.lock().supports(capability)
    }
}
