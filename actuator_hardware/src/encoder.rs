//! External position encoder reading the simulated plant.
use crate::sim::{SimProbe, SimState};
use actuator_traits::Encoder;
use parking_lot::Mutex;
use std::sync::Arc;

/// Counts plant travel relative to the last `reset`.
#[derive(Debug)]
pub struct SimulatedEncoder {
    plant: Arc<Mutex<SimState>>,
    zero: f64,
    inverted: bool,
}

impl SimulatedEncoder {
    pub fn new(probe: &SimProbe) -> Self {
        Self {
            plant: probe.shared(),
            zero: 0.0,
            inverted: false,
        }
    }
}

impl Encoder for SimulatedEncoder {
    fn position(&self) -> f64 {
        let travel = SimProbe::physical_position(&self.plant) - self.zero;
        if self.inverted { -travel } else { travel }
    }

    fn reset(&mut self) {
        self.zero = SimProbe::physical_position(&self.plant);
    }

    fn set_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }

    fn is_inverted(&self) -> bool {
        self.inverted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servo::ContinuousServo;
    use crate::sim::SimParams;

    #[test]
    fn counts_from_reset_point() {
        let servo = ContinuousServo::new(SimParams {
            start_position: 4.0,
            ..SimParams::default()
        });
        let probe = servo.probe();
        let mut enc = SimulatedEncoder::new(&probe);
        assert_eq!(enc.position(), 4.0);
        enc.reset();
        probe.set_position(6.5);
        assert_eq!(enc.position(), 2.5);
        enc.set_inverted(true);
        assert_eq!(enc.position(), -2.5);
    }
}
