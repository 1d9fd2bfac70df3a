//! Stall detection: a powered actuator that stops moving.
use std::time::{Duration, Instant};

/// Stall protection parameters. Detection is active only when both
/// `min_power` and `timeout` are non-zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StallCfg {
    /// Power magnitude below which the actuator is never considered stalled.
    pub min_power: f64,
    /// Movement within this band still counts as standing still.
    pub tolerance: f64,
    pub timeout: Duration,
    /// Power must stay removed this long before a stall clears; zero clears
    /// on the first unpowered check.
    pub reset_timeout: Duration,
}

impl Default for StallCfg {
    fn default() -> Self {
        Self {
            min_power: 0.0,
            tolerance: 0.0,
            timeout: Duration::ZERO,
            reset_timeout: Duration::ZERO,
        }
    }
}

impl StallCfg {
    pub fn is_enabled(&self) -> bool {
        self.min_power > 0.0 && !self.timeout.is_zero()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StallDetector {
    cfg: StallCfg,
    stalled: bool,
    still_position: f64,
    still_since: Option<Instant>,
}

impl StallDetector {
    pub fn new(cfg: StallCfg) -> Self {
        Self {
            cfg,
            ..Self::default()
        }
    }

    pub fn cfg(&self) -> &StallCfg {
        &self.cfg
    }

    /// Replace the parameters and forget any stall in progress.
    pub fn set_cfg(&mut self, cfg: StallCfg) {
        self.cfg = cfg;
        self.clear();
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    /// Drop the stalled flag and the baseline.
    pub fn clear(&mut self) {
        self.stalled = false;
        self.still_since = None;
    }

    /// Start a fresh baseline at `position`/`now`.
    pub fn seed(&mut self, position: f64, now: Instant) {
        self.still_position = position;
        self.still_since = Some(now);
    }

    /// Update the baseline and report whether the actuator is stalled.
    ///
    /// The stalled flag is sticky: once set it stays set until
    /// [`StallDetector::reset`] clears it. Returns true only on the check that
    /// first detects the stall.
    pub fn check(&mut self, power: f64, position: f64, now: Instant) -> bool {
        if self.stalled || !self.cfg.is_enabled() {
            return false;
        }
        let moved = (position - self.still_position).abs() > self.cfg.tolerance;
        let since = match self.still_since {
            Some(t) if power.abs() >= self.cfg.min_power && !moved => t,
            _ => {
                self.seed(position, now);
                now
            }
        };
        if now.saturating_duration_since(since) >= self.cfg.timeout {
            self.stalled = true;
            return true;
        }
        false
    }

    /// Clear a stall once power has been removed long enough.
    ///
    /// While stalled with non-zero power the baseline time keeps moving, so
    /// the reset timeout only starts counting when power drops to zero.
    /// Returns whether the actuator was stalled before this call.
    pub fn reset(&mut self, power: f64, position: f64, now: Instant) -> bool {
        let was_stalled = self.stalled;
        if was_stalled {
            if power == 0.0 {
                let since = self.still_since.unwrap_or(now);
                if self.cfg.reset_timeout.is_zero()
                    || now.saturating_duration_since(since) >= self.cfg.reset_timeout
                {
                    self.stalled = false;
                    self.seed(position, now);
                }
            } else {
                self.still_since = Some(now);
            }
        }
        was_stalled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> StallCfg {
        StallCfg {
            min_power: 0.2,
            tolerance: 1.0,
            timeout: Duration::from_millis(500),
            reset_timeout: Duration::from_millis(300),
        }
    }

    #[test]
    fn disabled_without_min_power() {
        let mut d = StallDetector::new(StallCfg {
            min_power: 0.0,
            ..cfg()
        });
        let t0 = Instant::now();
        assert!(!d.check(1.0, 0.0, t0));
        assert!(!d.check(1.0, 0.0, t0 + Duration::from_secs(10)));
        assert!(!d.is_stalled());
    }

    #[test]
    fn low_power_never_stalls() {
        let mut d = StallDetector::new(cfg());
        let t0 = Instant::now();
        for ms in (0..2000).step_by(100) {
            assert!(!d.check(0.1, 0.0, t0 + Duration::from_millis(ms)));
        }
    }

    #[test]
    fn reset_clears_after_unpowered_timeout() {
        let mut d = StallDetector::new(cfg());
        let t0 = Instant::now();
        d.check(0.5, 0.0, t0);
        let t_stall = t0 + Duration::from_millis(500);
        assert!(d.check(0.5, 0.0, t_stall));
        // Still powered: the reset window keeps sliding.
        assert!(d.reset(0.5, 0.0, t_stall));
        assert!(d.reset(0.0, 0.0, t_stall + Duration::from_millis(100)));
        assert!(d.is_stalled());
        assert!(d.reset(0.0, 0.0, t_stall + Duration::from_millis(300)));
        assert!(!d.is_stalled());
        assert!(!d.reset(0.0, 0.0, t_stall + Duration::from_millis(400)));
    }

    #[test]
    fn zero_reset_timeout_clears_immediately() {
        let mut d = StallDetector::new(StallCfg {
            reset_timeout: Duration::ZERO,
            ..cfg()
        });
        let t0 = Instant::now();
        d.check(0.5, 0.0, t0);
        d.check(0.5, 0.0, t0 + Duration::from_millis(500));
        assert!(d.reset(0.0, 0.0, t0 + Duration::from_millis(510)));
        assert!(!d.is_stalled());
    }
}
