mod common;

use std::sync::Arc;
use std::time::Duration;

use actuator_core::prelude::*;
use actuator_core::{ActuatorError, EventState, OwnershipGate};
use actuator_hardware::sim::{SimMode, SimParams, SimulatedActuator};
use actuator_traits::timer::{OneShotTimer, TimerCallback};
use parking_lot::Mutex;
use rstest::rstest;

use common::{bench, bench_with};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[rstest]
fn delay_holds_zero_then_applies() {
    let b = bench(SimulatedActuator::new(SimParams::default()));
    let ev = CompletionEvent::new("delayed");
    b.motor
        .set_power(0.5, CommandOptions::new().delay(ms(100)).notifier(ev.clone()))
        .unwrap();
    assert_eq!(b.probe.last_power(), Some(0.0));
    assert!(b.timer.is_armed());

    assert!(!b.advance(50));
    assert_eq!(ev.state(), EventState::Pending);

    assert!(b.advance(50));
    assert_eq!(b.probe.last_power(), Some(0.5));
    assert!(ev.is_signaled());
}

#[rstest]
fn duration_stops_and_signals() {
    let b = bench(SimulatedActuator::new(SimParams::default()));
    let ev = CompletionEvent::new("burst");
    b.motor
        .set_power(0.4, CommandOptions::new().duration(ms(200)).notifier(ev.clone()))
        .unwrap();
    assert_eq!(b.probe.last_power(), Some(0.4));
    assert_eq!(ev.state(), EventState::Pending);

    assert!(b.advance(200));
    assert_eq!(b.probe.last_power(), Some(0.0));
    assert!(ev.is_signaled());
    assert_eq!(b.motor.active_mode(), ControlMode::Power);
}

#[rstest]
fn delay_then_duration_chain() {
    let b = bench(SimulatedActuator::new(SimParams::default()));
    let ev = CompletionEvent::new("chain");
    b.motor
        .set_velocity(
            30.0,
            CommandOptions::new()
                .delay(ms(100))
                .duration(ms(300))
                .notifier(ev.clone()),
        )
        .unwrap();
    assert_eq!(b.probe.mode(), SimMode::Power);

    assert!(b.advance(100));
    assert_eq!(b.probe.mode(), SimMode::Velocity(30.0));
    assert_eq!(ev.state(), EventState::Pending);

    assert!(b.advance(300));
    assert_eq!(b.probe.mode(), SimMode::Power);
    assert_eq!(b.probe.last_power(), Some(0.0));
    assert!(ev.is_signaled());
}

#[rstest]
fn immediate_command_signals_at_once() {
    let b = bench(SimulatedActuator::new(SimParams::default()));
    let ev = CompletionEvent::new("now");
    b.motor
        .set_power(0.3, CommandOptions::new().notifier(ev.clone()))
        .unwrap();
    assert!(ev.is_signaled());
    assert!(!b.timer.is_armed());
}

#[rstest]
fn new_command_discards_the_pending_notifier() {
    let b = bench(SimulatedActuator::new(SimParams::default()));
    let first = CompletionEvent::new("first");
    b.motor
        .set_power(0.5, CommandOptions::new().delay(ms(100)).notifier(first.clone()))
        .unwrap();
    b.motor.set_power(0.2, CommandOptions::new()).unwrap();

    assert!(!b.timer.is_armed());
    assert!(!b.advance(500));
    assert_eq!(first.state(), EventState::Pending);
    assert_eq!(b.probe.last_power(), Some(0.2));
}

/// Timer that ignores `cancel`, so a superseded callback can still run.
#[derive(Clone, Default)]
struct StubbornTimer {
    callbacks: Arc<Mutex<Vec<TimerCallback>>>,
}

impl StubbornTimer {
    fn fire_all(&self) -> usize {
        let drained: Vec<TimerCallback> = std::mem::take(&mut *self.callbacks.lock());
        let n = drained.len();
        for cb in drained {
            cb();
        }
        n
    }
}

impl OneShotTimer for StubbornTimer {
    fn set(&self, _delay: Duration, callback: TimerCallback) {
        self.callbacks.lock().push(callback);
    }

    fn cancel(&self) {}
}

#[rstest]
fn stale_timer_callback_is_ignored() {
    let timer = StubbornTimer::default();
    let sim = SimulatedActuator::new(SimParams::default());
    let probe = sim.probe();
    let motor = Motor::builder("lift")
        .with_actuator(sim)
        .with_timer(Arc::new(timer.clone()))
        .build()
        .unwrap();

    motor
        .set_power(0.8, CommandOptions::new().delay(ms(100)))
        .unwrap();
    motor.set_power(0.2, CommandOptions::new()).unwrap();
    let writes = probe.writes().power;

    assert_eq!(timer.fire_all(), 1);
    assert_eq!(probe.last_power(), Some(0.2));
    assert_eq!(probe.writes().power, writes);
}

#[rstest]
fn owner_holds_the_actuator_until_completion() {
    let gate = ExclusiveOwnership::new();
    let b = bench_with(
        SimulatedActuator::new(SimParams::default()),
        MotorSettings::default(),
        |builder| builder.with_ownership(Arc::new(gate.clone())),
    );
    let ev = CompletionEvent::new("arm-move");
    b.motor
        .set_power(
            0.5,
            CommandOptions::new()
                .owner("arm")
                .duration(ms(100))
                .notifier(ev.clone()),
        )
        .unwrap();
    assert_eq!(gate.owner().as_deref(), Some("arm"));

    let err = b.motor.set_power_owned(Some("drive"), 0.1).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ActuatorError>(),
        Some(&ActuatorError::OwnershipDenied {
            owner: Some("drive".into())
        })
    );
    assert!(b.motor.set_power_owned(None, 0.1).is_err());
    assert_eq!(b.probe.last_power(), Some(0.5));

    assert!(b.advance(100));
    assert!(ev.is_signaled());
    assert_eq!(gate.owner(), None);
    b.motor.set_power_owned(Some("drive"), 0.1).unwrap();
    assert_eq!(b.probe.last_power(), Some(0.1));
}

#[rstest]
fn holder_may_keep_commanding() {
    let gate = ExclusiveOwnership::new();
    let b = bench_with(
        SimulatedActuator::new(SimParams::default()),
        MotorSettings::default(),
        |builder| builder.with_ownership(Arc::new(gate.clone())),
    );
    b.motor
        .set_power(0.5, CommandOptions::new().owner("arm").duration(ms(100)))
        .unwrap();
    b.motor.set_power_owned(Some("arm"), -0.5).unwrap();
    assert_eq!(b.probe.last_power(), Some(-0.5));
    assert_eq!(gate.owner().as_deref(), Some("arm"));
}

#[rstest]
fn anonymous_commands_pass_while_unowned() {
    let gate = ExclusiveOwnership::new();
    let b = bench_with(
        SimulatedActuator::new(SimParams::default()),
        MotorSettings::default(),
        |builder| builder.with_ownership(Arc::new(gate.clone())),
    );
    b.motor.set_power_owned(None, 0.3).unwrap();
    assert_eq!(gate.owner(), None);
}
