//! Minimal PID control law used for software closed-loop control.
//!
//! ```text
//! output = kp * e + ki * sum(e dt) + kd * de/dt + kf * target
//! ```
//!
//! The integral term only accumulates while `|e|` is inside `i_zone` (when
//! one is configured). The first call after `reset` has no derivative term.
use actuator_traits::controller::{ClosedLoopController, PidCoefficients};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PidController {
    pid: PidCoefficients,
    tolerance: f64,
    absolute: bool,
    target: f64,
    integral: f64,
    prev_error: f64,
    prev_time: Option<Instant>,
}

impl PidController {
    pub fn new(pid: PidCoefficients) -> Self {
        Self {
            pid,
            tolerance: 0.0,
            absolute: true,
            target: 0.0,
            integral: 0.0,
            prev_error: 0.0,
            prev_time: None,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance.abs();
        self
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }
}

impl ClosedLoopController for PidController {
    fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
        self.prev_time = None;
    }

    fn set_target(&mut self, target: f64, measured: f64) {
        self.target = if self.absolute { target } else { measured + target };
        self.prev_error = self.target - measured;
    }

    fn target(&self) -> f64 {
        self.target
    }

    fn set_absolute_setpoint(&mut self, absolute: bool) {
        self.absolute = absolute;
    }

    fn set_tolerance(&mut self, tolerance: f64) {
        self.tolerance = tolerance.abs();
    }

    fn output(&mut self, measured: f64, now: Instant) -> f64 {
        let error = self.target - measured;
        let dt = self
            .prev_time
            .map_or(0.0, |t| now.saturating_duration_since(t).as_secs_f64());

        if dt > 0.0 && self.pid.ki != 0.0 {
            match self.pid.i_zone {
                Some(zone) if error.abs() > zone => self.integral = 0.0,
                _ => self.integral += error * dt,
            }
        }
        let derivative = if dt > 0.0 {
            (error - self.prev_error) / dt
        } else {
            0.0
        };

        let out = self.pid.kp * error
            + self.pid.ki * self.integral
            + self.pid.kd * derivative
            + self.pid.kf * self.target;

        self.prev_error = error;
        self.prev_time = Some(now);
        out
    }

    fn on_target(&self, measured: f64) -> bool {
        (self.target - measured).abs() <= self.tolerance
    }

    fn coefficients(&self) -> PidCoefficients {
        self.pid
    }

    fn set_coefficients(&mut self, pid: PidCoefficients) {
        self.pid = pid;
    }
}
