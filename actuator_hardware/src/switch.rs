//! Digital inputs used as limit switches.
use crate::sim::SimProbe;
use crate::sim::SimState;
use actuator_traits::DigitalInput;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trip {
    AtOrBelow,
    AtOrAbove,
}

/// Switch that closes when the simulated plant crosses a position.
#[derive(Debug)]
pub struct SimulatedLimitSwitch {
    plant: Arc<Mutex<SimState>>,
    at: f64,
    trip: Trip,
    inverted: bool,
}

impl SimulatedLimitSwitch {
    /// Closed while the physical position is at or below `at`.
    pub fn lower(probe: &SimProbe, at: f64) -> Self {
        Self::new(probe, at, Trip::AtOrBelow)
    }

    /// Closed while the physical position is at or above `at`.
    pub fn upper(probe: &SimProbe, at: f64) -> Self {
        Self::new(probe, at, Trip::AtOrAbove)
    }

    fn new(probe: &SimProbe, at: f64, trip: Trip) -> Self {
        Self {
            plant: probe.shared(),
            at,
            trip,
            inverted: false,
        }
    }
}

impl DigitalInput for SimulatedLimitSwitch {
    fn is_active(&self) -> bool {
        let pos = SimProbe::physical_position(&self.plant);
        let closed = match self.trip {
            Trip::AtOrBelow => pos <= self.at,
            Trip::AtOrAbove => pos >= self.at,
        };
        closed != self.inverted
    }

    fn set_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }

    fn is_inverted(&self) -> bool {
        self.inverted
    }
}

/// Switch whose state is set by hand; clones share the state.
#[derive(Debug, Clone, Default)]
pub struct ManualSwitch {
    closed: Arc<std::sync::atomic::AtomicBool>,
    inverted: bool,
}

impl ManualSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_closed(&self, closed: bool) {
        self.closed
            .store(closed, std::sync::atomic::Ordering::SeqCst);
    }
}

impl DigitalInput for ManualSwitch {
    fn is_active(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::SeqCst) != self.inverted
    }

    fn set_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }

    fn is_inverted(&self) -> bool {
        self.inverted
    }
}
