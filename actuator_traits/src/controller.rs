use std::time::Instant;

/// PID gains. `kf` is a feed-forward term applied to the target; `i_zone`
/// limits integration to errors smaller than itself (`None` integrates always).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PidCoefficients {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub kf: f64,
    pub i_zone: Option<f64>,
}

impl PidCoefficients {
    pub fn new(kp: f64, ki: f64, kd: f64, kf: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            kf,
            i_zone: None,
        }
    }

    pub fn with_i_zone(mut self, i_zone: f64) -> Self {
        self.i_zone = Some(i_zone);
        self
    }
}

/// Single-axis closed-loop control law.
///
/// The measured process value is passed in on every call; the controller does
/// not read sensors itself.
pub trait ClosedLoopController: Send {
    /// Clear integral and derivative history.
    fn reset(&mut self);

    /// Set a new setpoint. In relative mode the setpoint is `measured + target`.
    fn set_target(&mut self, target: f64, measured: f64);
    fn target(&self) -> f64;

    fn set_absolute_setpoint(&mut self, absolute: bool);
    fn set_tolerance(&mut self, tolerance: f64);

    /// Compute the corrective output for the current measurement.
    fn output(&mut self, measured: f64, now: Instant) -> f64;

    fn on_target(&self, measured: f64) -> bool;

    fn coefficients(&self) -> PidCoefficients;
    fn set_coefficients(&mut self, pid: PidCoefficients);
}
