//! The per-actuator periodic control tick.
use crate::command::{CommandRecord, ControlMode, LastSent, Outcome};
use crate::error::Result;
use crate::hw_error::report;
use crate::hardware::LimitSide;
use crate::motor::Motor;
use crate::scheduler::PeriodicTask;
use crate::util::{clip_power, clip_range};
use actuator_traits::ClosedLoop;
use std::sync::Weak;
use std::sync::atomic::Ordering;
use std::time::Instant;

/// What followers of a hardware closed loop receive this tick.
#[derive(Debug, Clone, Copy)]
enum FollowerSync {
    Target(ClosedLoop, f64),
    Power(f64),
}

impl Motor {
    /// Run one control cycle at the clock's current time.
    pub fn control_tick(&self) {
        self.tick_at(self.now());
    }

    pub fn tick_at(&self, now: Instant) {
        let trigger = self.hw.lock().poll_trigger();
        match trigger {
            Ok(Some((callback, active))) => {
                let pos = self.hw.lock().try_position();
                self.reseed_odometry(pos, now);
                tracing::debug!(motor = %self.name, active, "lower limit switch reset the position");
                if let Some(cb) = callback {
                    cb(active);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(motor = %self.name, error = %e, "limit switch position reset failed"),
        }

        let mut out = Outcome::default();
        let sync = {
            let mut rec = self.command.lock();
            match self.tick_locked(&mut rec, now, &mut out) {
                Ok(sync) => sync,
                Err(e) => {
                    tracing::warn!(motor = %self.name, error = %e, "control tick failed");
                    None
                }
            }
        };
        if let Some(sync) = sync {
            for follower in self.follower_snapshot() {
                match sync {
                    FollowerSync::Target(l, value) => follower.follow_value(l, value),
                    FollowerSync::Power(p) => follower.follow_power(p),
                }
            }
        }
        out.deliver();
    }

    fn tick_locked(
        &self,
        rec: &mut CommandRecord,
        now: Instant,
        out: &mut Outcome,
    ) -> Result<Option<FollowerSync>> {
        if rec.calibrating {
            self.calibration_step(rec, now, out)?;
            return Ok(None);
        }

        let hardware_loop = rec.attached.is_none() && rec.active_mode != ControlMode::Power;
        if hardware_loop {
            if let Ok(p) = self.hw.lock().driver.power() {
                rec.curr_power = p;
            }
        }
        if let Ok(pos) = self.position() {
            let power = rec.curr_power;
            if rec.stall.check(power, pos, now) {
                tracing::warn!(motor = %self.name, power, position = pos, "actuator stalled, output cut");
                self.hw
                    .lock()
                    .driver
                    .set_power(0.0)
                    .map_err(|e| report(e.as_ref()))?;
                rec.last_sent = LastSent::default();
            }
            if rec.stall.reset(power, pos, now) {
                if !rec.stall.is_stalled() {
                    tracing::info!(motor = %self.name, "stall cleared");
                }
                return Ok(None);
            }
        }

        let Some(l) = rec.active_mode.closed_loop() else {
            return Ok(None);
        };
        let software = rec.attached == Some(l);
        let measured = if software { Some(self.measure(l)?) } else { None };

        let on_target = match measured {
            Some(m) => rec.controllers.get(l).is_some_and(|c| c.on_target(m)),
            None => self
                .hw
                .lock()
                .driver
                .on_target(l)
                .map_err(|e| tracing::trace!(error = %e, "native on-target unavailable"))
                .unwrap_or(false),
        };
        let expired = software && rec.expiry.is_some_and(|t| now >= t);

        let mut sync = None;
        if software && l == ClosedLoop::Position && !rec.hold_target && (on_target || expired) {
            self.issue_power(rec, 0.0, false)?;
        } else if let Some(m) = measured {
            let limit = if l == ClosedLoop::Position {
                rec.power_limit
            } else {
                None
            };
            let Some(ctrl) = rec.controllers.get_mut(l) else {
                return Ok(None);
            };
            let raw = ctrl.output(m, now);
            let target = ctrl.target();
            let mut power = clip_power(raw);
            if let Some(limit) = limit {
                power = clip_range(power, limit);
            }
            if self.trace_pid.load(Ordering::Relaxed) {
                tracing::debug!(motor = %self.name, mode = %l, target, input = m, output = raw, power, "pid");
            }
            self.issue_power(rec, power, false)?;
        } else {
            sync = Some(match l {
                ClosedLoop::Position => {
                    let p = self
                        .hw
                        .lock()
                        .driver
                        .power()
                        .map_err(|e| report(e.as_ref()))?;
                    FollowerSync::Power(p)
                }
                _ => FollowerSync::Target(l, rec.value),
            });
        }

        if on_target || expired {
            if expired && !on_target {
                tracing::debug!(motor = %self.name, mode = %l, "closed loop timed out");
            }
            if let Some(ev) = rec.notifier.take() {
                out.fire = Some(ev);
            }
        }
        Ok(sync)
    }

    /// One zero-calibration cycle: keep pushing at the calibration power
    /// until the lower switch closes or the actuator stalls.
    fn calibration_step(&self, rec: &mut CommandRecord, now: Instant, out: &mut Outcome) -> Result<()> {
        let at_switch = self.hw.lock().is_switch_active(LimitSide::Lower);
        let stalled = rec.stall.is_stalled();
        if at_switch || stalled {
            if stalled {
                tracing::warn!(motor = %self.name, "stalled during zero calibration, lower limit switch might have failed");
            } else {
                tracing::debug!(motor = %self.name, "zero calibration reached the lower limit switch");
            }
            rec.stall.clear();
            rec.calibrating = false;
            self.issue_power(rec, 0.0, true)?;
            let pos = {
                let mut hw = self.hw.lock();
                hw.reset_position(false)?;
                hw.try_position()
            };
            self.reseed_odometry(pos, now);
            out.fire = rec.notifier.take();
            return Ok(());
        }

        let cal_power = rec.cal_power;
        if let Some(pos) = self.hw.lock().try_position() {
            rec.stall.check(cal_power, pos, now);
        }
        self.issue_power(rec, cal_power, true)?;
        Ok(())
    }
}

/// Scheduler adapter for [`Motor::tick_at`].
pub(crate) struct ControlTask {
    motor: Weak<Motor>,
    name: String,
}

impl ControlTask {
    pub fn new(motor: Weak<Motor>, name: &str) -> Self {
        Self {
            motor,
            name: format!("control:{name}"),
        }
    }
}

impl PeriodicTask for ControlTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, now: Instant) {
        if let Some(motor) = self.motor.upgrade() {
            motor.tick_at(now);
        }
    }
}
