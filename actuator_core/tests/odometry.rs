mod common;

use std::sync::Arc;
use std::time::Duration;

use actuator_core::prelude::*;
use actuator_core::ActuatorError;
use actuator_hardware::sim::{SimParams, SimulatedActuator};
use actuator_traits::clock::Clock;
use rstest::rstest;

use common::{Bench, approx, bench_with, params_at};

fn sampled(sim: SimulatedActuator) -> (Bench, Arc<CooperativeScheduler>, Arc<OdometryRegistry>) {
    let scheduler = Arc::new(CooperativeScheduler::new());
    let registry = OdometryRegistry::new(scheduler.clone());
    let b = bench_with(sim, MotorSettings::default(), |builder| {
        builder.with_odometry_registry(registry.clone())
    });
    (b, scheduler, registry)
}

#[rstest]
fn enabling_registers_one_sampler() {
    let (b, scheduler, registry) = sampled(SimulatedActuator::new(params_at(5.0)));
    assert!(registry.is_empty());
    assert!(!registry.is_active());

    b.motor.set_odometry_enabled(true, false, false).unwrap();
    b.motor.set_odometry_enabled(true, false, false).unwrap();
    assert_eq!(registry.len(), 1);
    assert!(registry.contains(&b.motor));
    assert_eq!(scheduler.task_names(), vec!["odometry".to_string()]);

    let odo = b.motor.odometry().unwrap();
    assert!(approx(odo.position, 5.0));
    assert!(approx(odo.velocity, 0.0));
}

#[rstest]
fn cached_position_only_moves_when_sampled() {
    let (b, scheduler, _registry) = sampled(SimulatedActuator::new(params_at(5.0)));
    b.motor.set_odometry_enabled(true, false, false).unwrap();

    b.probe.set_position(12.0);
    assert!(approx(b.motor.position().unwrap(), 5.0));

    b.clock.advance(Duration::from_millis(100));
    scheduler.run_once(b.clock.now());
    assert!(approx(b.motor.position().unwrap(), 12.0));
}

#[rstest]
fn velocity_is_derived_without_a_sensor() {
    let sim = SimulatedActuator::new(params_at(5.0)).without(Capability::VelocitySensor);
    let (b, scheduler, _registry) = sampled(sim);
    b.motor.set_odometry_enabled(true, false, false).unwrap();

    b.probe.set_position(12.0);
    b.clock.advance(Duration::from_millis(100));
    scheduler.run_once(b.clock.now());
    let odo = b.motor.odometry().unwrap();
    assert!((odo.velocity - 70.0).abs() < 1e-6);
    assert!(approx(odo.prev_position, 5.0));
    assert!(approx(b.motor.velocity().unwrap(), odo.velocity));
}

#[rstest]
fn spurious_sample_keeps_previous_position() {
    let (b, scheduler, _registry) = sampled(SimulatedActuator::new(params_at(5.0)));
    b.motor.set_odometry_enabled(true, false, false).unwrap();

    b.probe.set_position(4.0e9);
    b.clock.advance(Duration::from_millis(10));
    scheduler.run_once(b.clock.now());
    assert!(approx(b.motor.position().unwrap(), 5.0));

    b.probe.set_position(6.0);
    b.clock.advance(Duration::from_millis(10));
    scheduler.run_once(b.clock.now());
    assert!(approx(b.motor.position().unwrap(), 6.0));
}

#[rstest]
fn disabling_stops_sampling_and_reads_fail() {
    let (b, scheduler, registry) = sampled(SimulatedActuator::new(params_at(5.0)));
    b.motor.set_odometry_enabled(true, false, false).unwrap();
    b.motor.set_odometry_enabled(false, false, false).unwrap();

    assert!(registry.is_empty());
    assert!(scheduler.is_empty());
    let err = b.motor.odometry().unwrap_err();
    assert_eq!(
        err.downcast_ref::<ActuatorError>(),
        Some(&ActuatorError::OdometryDisabled)
    );
    assert!(b.motor.reset_odometry(false).is_err());

    b.probe.set_position(8.0);
    assert!(approx(b.motor.position().unwrap(), 8.0));
}

#[rstest]
fn reset_restarts_the_record_at_zero() {
    let (b, _scheduler, _registry) = sampled(SimulatedActuator::new(params_at(5.0)));
    b.motor.set_odometry_enabled(true, false, false).unwrap();
    b.motor.reset_odometry(false).unwrap();
    assert!(approx(b.motor.odometry().unwrap().position, 0.0));
    assert!(approx(b.probe.position(), 5.0));
}

#[rstest]
fn shutdown_drains_every_member() {
    let (b, scheduler, registry) = sampled(SimulatedActuator::new(params_at(5.0)));
    b.motor.set_odometry_enabled(true, false, false).unwrap();
    registry.shutdown();

    assert!(registry.is_empty());
    assert!(!registry.is_active());
    assert!(scheduler.is_empty());
    assert!(!b.motor.is_odometry_enabled());
}

#[rstest]
fn dropping_the_motor_unregisters_it() {
    let (b, scheduler, registry) = sampled(SimulatedActuator::new(SimParams::default()));
    b.motor.set_odometry_enabled(true, false, false).unwrap();
    drop(b);
    assert!(registry.is_empty());
    assert!(scheduler.is_empty());
}

#[rstest]
fn odometry_requires_a_registry() {
    let b = common::bench(SimulatedActuator::new(SimParams::default()));
    assert!(b.motor.set_odometry_enabled(true, false, false).is_err());
    assert!(!b.motor.is_odometry_enabled());
}

#[rstest]
fn scheduled_motor_ticks_after_sampling() {
    let scheduler = Arc::new(CooperativeScheduler::new());
    let registry = OdometryRegistry::new(scheduler.clone());
    let sched = scheduler.clone();
    let b = bench_with(
        SimulatedActuator::new(params_at(0.0)),
        MotorSettings::default(),
        |builder| {
            builder
                .with_odometry_registry(registry.clone())
                .with_scheduler(sched)
        },
    );
    assert!(b.motor.is_scheduled());
    b.motor.set_odometry_enabled(true, false, false).unwrap();
    assert_eq!(scheduler.len(), 2);

    let ev = CompletionEvent::new("move");
    b.motor
        .set_position(3.0, PositionOptions::new().notifier(ev.clone()))
        .unwrap();
    for _ in 0..10 {
        b.clock.advance(Duration::from_millis(20));
        b.probe.step(0.02);
        scheduler.run_once(b.clock.now());
    }
    assert!(ev.is_signaled());
    assert!(approx(b.motor.position().unwrap(), 3.0));
}

#[rstest]
fn sample_all_runs_without_the_scheduler() {
    let (b, _scheduler, registry) = sampled(SimulatedActuator::new(params_at(1.0)));
    b.motor.set_odometry_enabled(true, false, false).unwrap();
    b.probe.set_position(2.5);
    b.clock.advance(Duration::from_millis(50));
    registry.sample_all(b.clock.now());
    assert!(approx(b.motor.position().unwrap(), 2.5));
}
