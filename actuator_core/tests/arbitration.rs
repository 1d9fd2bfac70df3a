mod common;

use actuator_core::prelude::*;
use actuator_core::{ActuatorError, EventState};
use actuator_hardware::sim::{SimMode, SimParams, SimulatedActuator};
use common::{approx, bench, bench_with, params_at};
use rstest::rstest;

#[rstest]
fn identical_power_is_written_once() {
    let b = bench(SimulatedActuator::new(SimParams::default()));
    b.motor.set_power(0.5, CommandOptions::new()).unwrap();
    b.motor.set_power(0.5, CommandOptions::new()).unwrap();
    assert_eq!(b.probe.writes().power, 1);

    b.motor.set_power(0.25, CommandOptions::new()).unwrap();
    assert_eq!(b.probe.writes().power, 2);
    assert_eq!(b.probe.last_power(), Some(0.25));
}

#[rstest]
fn mode_change_invalidates_the_cache() {
    let b = bench(SimulatedActuator::new(SimParams::default()));
    b.motor.set_power(0.5, CommandOptions::new()).unwrap();
    b.motor.set_velocity(10.0, CommandOptions::new()).unwrap();
    assert_eq!(b.motor.active_mode(), ControlMode::Velocity);
    assert_eq!(b.probe.mode(), SimMode::Velocity(10.0));

    b.motor.set_power(0.5, CommandOptions::new()).unwrap();
    assert_eq!(b.probe.writes().power, 2);
    assert_eq!(b.motor.active_mode(), ControlMode::Power);
}

#[rstest]
fn identical_velocity_is_suppressed() {
    let b = bench(SimulatedActuator::new(SimParams::default()));
    b.motor.set_velocity(10.0, CommandOptions::new()).unwrap();
    b.motor.set_velocity(10.0, CommandOptions::new()).unwrap();
    assert_eq!(b.probe.writes().velocity, 1);
}

#[rstest]
fn position_targets_are_always_written() {
    let b = bench(SimulatedActuator::new(SimParams::default()));
    b.motor.set_position(10.0, PositionOptions::new()).unwrap();
    b.motor.set_position(10.0, PositionOptions::new()).unwrap();
    assert_eq!(b.probe.writes().position, 2);
    assert!(b.motor.uses_native(ClosedLoop::Position));
}

#[rstest]
#[case(0.5, 10.0, 0.6)]
#[case(0.9, 10.0, 1.0)]
#[case(-0.5, 24.0, -0.25)]
fn power_is_scaled_by_bus_voltage(#[case] power: f64, #[case] bus: f64, #[case] expected: f64) {
    let settings = MotorSettings {
        nominal_voltage: Some(12.0),
        ..MotorSettings::default()
    };
    let b = bench_with(SimulatedActuator::new(SimParams::default()), settings, |b| b);
    b.probe.set_bus_voltage(bus);
    b.motor.set_power(power, CommandOptions::new()).unwrap();
    let written = b.probe.last_power().unwrap();
    assert!(approx(written, expected), "wrote {written}, expected {expected}");
}

#[rstest]
fn compensation_needs_a_bus_voltage_reading() {
    let settings = MotorSettings {
        nominal_voltage: Some(12.0),
        ..MotorSettings::default()
    };
    let sim = SimulatedActuator::new(SimParams::default()).without(Capability::BusVoltage);
    let b = bench_with(sim, settings, |b| b);
    b.motor.set_power(0.5, CommandOptions::new()).unwrap();
    assert_eq!(b.probe.last_power(), Some(0.5));
}

#[rstest]
fn stop_cuts_power() {
    let b = bench(SimulatedActuator::new(params_at(3.0)));
    b.motor.set_power(0.7, CommandOptions::new()).unwrap();
    b.motor.stop(None).unwrap();
    assert_eq!(b.probe.last_power(), Some(0.0));
    assert_eq!(b.motor.commanded_power(), 0.0);
}

#[rstest]
fn unsupported_mode_without_software_fallback() {
    let sim = SimulatedActuator::new(SimParams::default()).without(Capability::VelocityControl);
    let b = bench(sim);
    let err = b
        .motor
        .set_velocity(5.0, CommandOptions::new())
        .expect_err("no velocity loop");
    match err.downcast_ref::<ActuatorError>() {
        Some(ActuatorError::Unsupported(what)) => assert!(what.contains("velocity")),
        other => panic!("expected Unsupported, got {other:?}"),
    }
    assert_eq!(b.probe.writes().total(), 0);
}

#[rstest]
fn software_mode_without_gains_is_misconfigured() {
    let settings = MotorSettings {
        software_pid: true,
        ..MotorSettings::default()
    };
    let b = bench_with(SimulatedActuator::new(SimParams::default()), settings, |b| b);
    let ev = CompletionEvent::new("move");
    let err = b
        .motor
        .set_position(5.0, PositionOptions::new().notifier(ev.clone()))
        .expect_err("no position gains");
    assert_eq!(
        err.downcast_ref::<ActuatorError>(),
        Some(&ActuatorError::MisconfiguredController(ClosedLoop::Position))
    );
    assert_eq!(ev.state(), EventState::Pending);
}
