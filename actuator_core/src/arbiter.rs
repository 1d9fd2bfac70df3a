//! Control-mode arbitration: the only place that writes commands to the driver.
//!
//! A write is suppressed when the actuator is already in the requested mode
//! with an identical cached value. Position writes are never suppressed since
//! the power limit may have changed. Entering a different mode clears every
//! cached value.
use crate::command::{CommandRecord, ControlMode, LastSent};
use crate::error::Result;
use crate::hw_error::report;
use crate::motor::Motor;
use crate::util::clip_power;
use actuator_traits::ClosedLoop;

impl Motor {
    pub(crate) fn enter_mode(
        &self,
        rec: &mut CommandRecord,
        mode: ControlMode,
        attached: Option<ClosedLoop>,
    ) {
        if rec.active_mode != mode {
            tracing::debug!(motor = %self.name, from = %rec.active_mode, to = %mode, "control mode changed");
            rec.last_sent = LastSent::default();
        }
        rec.active_mode = mode;
        rec.attached = attached;
    }

    /// Write power. With `change_mode` the actuator enters Power mode and the
    /// value is cached for suppression; without it the logical mode is left
    /// alone and the cache is invalidated. Returns whether a write happened.
    pub(crate) fn issue_power(
        &self,
        rec: &mut CommandRecord,
        power: f64,
        change_mode: bool,
    ) -> Result<bool> {
        let power = clip_power(power);
        if change_mode {
            self.enter_mode(rec, ControlMode::Power, None);
            if rec.last_sent.power == Some(power) {
                return Ok(false);
            }
            rec.last_sent.power = Some(power);
        } else {
            rec.last_sent.power = None;
        }
        rec.curr_power = power;
        let output = if rec.stall.is_stalled() { 0.0 } else { power };
        self.hw
            .lock()
            .driver
            .set_power(output)
            .map_err(|e| report(e.as_ref()))?;
        self.mirror_power(output);
        Ok(true)
    }

    /// Write a closed-loop target to the driver's native loop. While stalled
    /// the target is withheld and the output held at zero; nothing is cached,
    /// so the same target is written once the stall clears.
    pub(crate) fn issue(&self, rec: &mut CommandRecord, l: ClosedLoop, value: f64) -> Result<bool> {
        if rec.stall.is_stalled() {
            tracing::debug!(motor = %self.name, mode = %l, value, "stalled, native target withheld");
            rec.last_sent.set(l, None);
            self.hw
                .lock()
                .driver
                .set_power(0.0)
                .map_err(|e| report(e.as_ref()))?;
            return Ok(false);
        }
        let mode = ControlMode::from(l);
        if l != ClosedLoop::Position
            && rec.active_mode == mode
            && rec.last_sent.get(l) == Some(value)
        {
            return Ok(false);
        }
        {
            let mut hw = self.hw.lock();
            let written = match l {
                ClosedLoop::Velocity => {
                    let raw = value / hw.scale();
                    hw.driver.set_velocity(raw)
                }
                ClosedLoop::Position => {
                    let raw = hw.to_raw_position(value);
                    hw.driver.set_position(raw, rec.power_limit)
                }
                ClosedLoop::Current => hw.driver.set_current(value),
            };
            written.map_err(|e| report(e.as_ref()))?;
        }
        rec.last_sent.set(l, Some(value));
        tracing::trace!(motor = %self.name, mode = %l, value, "native target written");
        Ok(true)
    }

    /// Copy a raw power write onto every follower.
    pub(crate) fn mirror_power(&self, power: f64) {
        for follower in self.follower_snapshot() {
            follower.follow_power(power);
        }
    }

    /// Follower side of power mirroring.
    pub(crate) fn follow_power(&self, power: f64) {
        let mut rec = self.command.lock();
        if let Err(e) = self.issue_power(&mut rec, power, true) {
            tracing::warn!(motor = %self.name, error = %e, "follower power write failed");
        }
    }

    /// Follower side of closed-loop mirroring: take the master's target.
    pub(crate) fn follow_value(&self, l: ClosedLoop, value: f64) {
        let mut rec = self.command.lock();
        self.enter_mode(&mut rec, ControlMode::from(l), None);
        if let Err(e) = self.issue(&mut rec, l, value) {
            tracing::warn!(motor = %self.name, mode = %l, error = %e, "follower target write failed");
        }
    }
}
