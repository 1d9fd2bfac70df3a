//! Continuous-rotation servo: open-loop power only, plus bus voltage.
//!
//! It shares the simulated plant model but exposes none of the sensors or
//! native loops, so every closed-loop mode has to be emulated in software
//! with an external encoder.
use crate::sim::{SimParams, SimProbe, SimulatedActuator};
use actuator_traits::{Actuator, Capability, HwResult};

#[derive(Debug)]
pub struct ContinuousServo {
    plant: SimulatedActuator,
}

impl ContinuousServo {
    pub fn new(params: SimParams) -> Self {
        Self {
            plant: SimulatedActuator::with_capabilities(params, &[Capability::BusVoltage]),
        }
    }

    pub fn probe(&self) -> SimProbe {
        self.plant.probe()
    }
}

impl Actuator for ContinuousServo {
    fn supports(&self, capability: Capability) -> bool {
        capability == Capability::BusVoltage
    }

    fn set_power(&mut self, power: f64) -> HwResult<()> {
        self.plant.set_power(power)
    }

    fn power(&mut self) -> HwResult<f64> {
        self.plant.power()
    }

    fn set_inverted(&mut self, inverted: bool) -> HwResult<()> {
        self.plant.set_inverted(inverted)
    }

    fn bus_voltage(&mut self) -> HwResult<f64> {
        self.plant.bus_voltage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_power_and_voltage() {
        let mut servo = ContinuousServo::new(SimParams::default());
        assert!(!servo.supports(Capability::PositionSensor));
        assert!(servo.position().is_err());
        servo.set_power(1.0).unwrap();
        servo.probe().step(0.5);
        assert_eq!(servo.probe().position(), 50.0);
        assert_eq!(servo.bus_voltage().unwrap(), 12.0);
    }
}
