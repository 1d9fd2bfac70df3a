mod common;

use std::time::Duration;

use actuator_core::prelude::*;
use actuator_hardware::sim::{SimMode, SimulatedActuator};
use actuator_hardware::switch::SimulatedLimitSwitch;
use rstest::{fixture, rstest};

use common::{Bench, approx, bench_with, params_at};

fn stall_cfg() -> StallCfg {
    StallCfg {
        min_power: 0.2,
        tolerance: 1.0,
        timeout: Duration::from_millis(500),
        reset_timeout: Duration::from_millis(300),
    }
}

#[fixture]
fn jammed() -> Bench {
    let settings = MotorSettings {
        stall: stall_cfg(),
        ..MotorSettings::default()
    };
    let b = bench_with(SimulatedActuator::new(params_at(10.0)), settings, |b| b);
    b.probe.set_blocked(true);
    b
}

#[rstest]
fn stall_cuts_output_after_timeout(jammed: Bench) {
    let b = jammed;
    b.motor.set_power(0.5, CommandOptions::new()).unwrap();

    // First tick seeds the baseline at t = 100 ms.
    for _ in 0..5 {
        b.tick(100);
    }
    assert!(!b.motor.is_stalled());
    assert_eq!(b.probe.last_power(), Some(0.5));

    b.tick(100);
    assert!(b.motor.is_stalled());
    assert_eq!(b.probe.last_power(), Some(0.0));
    assert!(approx(b.motor.commanded_power(), 0.5));
}

#[rstest]
fn commands_while_stalled_keep_the_output_cut(jammed: Bench) {
    let b = jammed;
    b.motor.set_power(0.5, CommandOptions::new()).unwrap();
    b.tick_until(100, 20, |b| b.motor.is_stalled()).expect("stall");

    b.motor.set_power(0.7, CommandOptions::new()).unwrap();
    assert_eq!(b.probe.last_power(), Some(0.0));
    assert!(approx(b.motor.commanded_power(), 0.7));
}

#[rstest]
fn native_targets_stay_cut_while_stalled(jammed: Bench) {
    let b = jammed;
    b.motor.set_power(0.5, CommandOptions::new()).unwrap();
    b.tick_until(100, 20, |b| b.motor.is_stalled()).expect("stall");

    b.motor.set_velocity(40.0, CommandOptions::new()).unwrap();
    assert_eq!(b.motor.active_mode(), ControlMode::Velocity);
    assert_eq!(b.probe.mode(), SimMode::Power);
    assert_eq!(b.probe.last_power(), Some(0.0));
    assert_eq!(b.probe.writes().velocity, 0);

    // The hardware loop reads back zero output, so the stall still clears.
    b.tick(100);
    assert!(b.motor.is_stalled());
    b.tick_until(100, 5, |b| !b.motor.is_stalled())
        .expect("stall clears");
    assert_eq!(b.probe.writes().velocity, 0);

    b.probe.set_blocked(false);
    b.motor.set_velocity(40.0, CommandOptions::new()).unwrap();
    assert_eq!(b.probe.mode(), SimMode::Velocity(40.0));
}

#[rstest]
fn stall_clears_once_power_stays_off(jammed: Bench) {
    let b = jammed;
    b.motor.set_power(0.5, CommandOptions::new()).unwrap();
    b.tick_until(100, 20, |b| b.motor.is_stalled()).expect("stall");

    b.motor.stop(None).unwrap();
    b.tick(100);
    b.tick(100);
    assert!(b.motor.is_stalled());
    b.tick(100);
    assert!(!b.motor.is_stalled());

    b.probe.set_blocked(false);
    b.motor.set_power(0.5, CommandOptions::new()).unwrap();
    assert_eq!(b.probe.last_power(), Some(0.5));
}

#[rstest]
fn moving_actuator_never_stalls() {
    let settings = MotorSettings {
        stall: stall_cfg(),
        ..MotorSettings::default()
    };
    let b = bench_with(SimulatedActuator::new(params_at(0.0)), settings, |b| b);
    b.motor.set_power(0.5, CommandOptions::new()).unwrap();
    for _ in 0..20 {
        b.tick(100);
    }
    assert!(!b.motor.is_stalled());
    assert!(b.probe.position() > 50.0);
}

#[rstest]
fn disabled_protection_ignores_a_jam() {
    let b = bench_with(SimulatedActuator::new(params_at(0.0)), MotorSettings::default(), |b| b);
    b.probe.set_blocked(true);
    b.motor.set_power(0.9, CommandOptions::new()).unwrap();
    for _ in 0..30 {
        b.tick(100);
    }
    assert!(!b.motor.is_stalled());
    assert_eq!(b.probe.last_power(), Some(0.9));
}

#[rstest]
fn calibration_stops_at_the_lower_switch() {
    let sim = SimulatedActuator::new(params_at(5.0));
    let probe = sim.probe();
    let b = bench_with(sim, MotorSettings::default(), |b| {
        b.with_lower_limit_switch(SimulatedLimitSwitch::lower(&probe, 1.0))
    });
    let ev = CompletionEvent::new("zero");
    b.motor.zero_calibrate(None, -0.5, Some(ev.clone())).unwrap();
    assert!(b.motor.is_calibrating());

    b.tick_until(50, 40, |b| !b.motor.is_calibrating())
        .expect("calibration finished");
    assert!(ev.is_signaled());
    assert_eq!(b.probe.last_power(), Some(0.0));
    assert!(b.probe.position() <= 1.0);
    assert!(approx(b.motor.position().unwrap(), 0.0));
}

#[rstest]
fn calibration_ends_on_stall_without_a_switch(jammed: Bench) {
    let b = jammed;
    let ev = CompletionEvent::new("zero");
    b.motor.zero_calibrate(None, -0.4, Some(ev.clone())).unwrap();

    let ticks = b
        .tick_until(100, 30, |b| !b.motor.is_calibrating())
        .expect("stall ends calibration");
    assert!(ticks >= 5);
    assert!(ev.is_signaled());
    assert!(!b.motor.is_stalled());
    assert_eq!(b.probe.last_power(), Some(0.0));
    assert!(approx(b.motor.position().unwrap(), 0.0));
    assert!(approx(b.probe.position(), 10.0));
}

#[rstest]
fn a_new_command_aborts_calibration(jammed: Bench) {
    let b = jammed;
    let ev = CompletionEvent::new("zero");
    b.motor.zero_calibrate(None, -0.4, Some(ev.clone())).unwrap();
    b.tick(100);
    b.motor.set_power(0.1, CommandOptions::new()).unwrap();
    assert!(!b.motor.is_calibrating());
    assert_eq!(ev.state(), actuator_core::EventState::Pending);
}
