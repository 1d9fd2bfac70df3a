#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use actuator_core::mocks::ManualTimer;
use actuator_core::{Motor, MotorBuilder, MotorSettings, Set};
use actuator_hardware::sim::{SimParams, SimProbe, SimulatedActuator};
use actuator_traits::clock::{Clock, ManualClock};

/// A motor driven by a manual clock and timer, plus the plant behind it.
pub struct Bench {
    pub motor: Arc<Motor>,
    pub probe: SimProbe,
    pub clock: ManualClock,
    pub timer: ManualTimer,
}

impl Bench {
    /// Advance time by `ms`, move the plant, run any due timer, then tick.
    pub fn tick(&self, ms: u64) {
        let dt = Duration::from_millis(ms);
        self.clock.advance(dt);
        self.probe.step(dt.as_secs_f64());
        self.timer.fire_due();
        self.motor.tick_at(self.clock.now());
    }

    /// Tick until `done` holds or `max` ticks have run. Returns the tick count.
    pub fn tick_until(&self, ms: u64, max: usize, done: impl Fn(&Bench) -> bool) -> Option<usize> {
        for n in 1..=max {
            self.tick(ms);
            if done(self) {
                return Some(n);
            }
        }
        None
    }

    /// Advance time without moving the plant or ticking.
    pub fn advance(&self, ms: u64) -> bool {
        self.clock.advance(Duration::from_millis(ms));
        self.timer.fire_due()
    }
}

pub fn params_at(start: f64) -> SimParams {
    SimParams {
        start_position: start,
        ..SimParams::default()
    }
}

/// Builder pre-wired with a manual clock and timer; `extra` adds anything else.
pub fn bench_with(
    sim: SimulatedActuator,
    settings: MotorSettings,
    extra: impl FnOnce(MotorBuilder<Set>) -> MotorBuilder<Set>,
) -> Bench {
    let clock = ManualClock::new();
    let timer = ManualTimer::new(Arc::new(clock.clone()));
    let probe = sim.probe();
    let builder = Motor::builder("lift")
        .with_actuator(sim)
        .with_clock(clock.clone())
        .with_timer(Arc::new(timer.clone()))
        .with_settings(settings);
    let motor = extra(builder).build().expect("build motor");
    Bench {
        motor,
        probe,
        clock,
        timer,
    }
}

pub fn bench(sim: SimulatedActuator) -> Bench {
    bench_with(sim, MotorSettings::default(), |b| b)
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
