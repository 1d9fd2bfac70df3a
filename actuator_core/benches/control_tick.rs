use std::sync::Arc;
use std::time::Duration;

use actuator_core::mocks::ManualTimer;
use actuator_core::odometry::is_spurious;
use actuator_core::prelude::*;
use actuator_core::PidCfg;
use actuator_hardware::sim::{SimParams, SimulatedActuator};
use actuator_traits::clock::{Clock, ManualClock};
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

fn configure(g: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>) {
    // Quick runs without CLI flags:
    //   BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p actuator_core --bench control_tick
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(10));
        }
    } else {
        g.sample_size(50);
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(Duration::from_millis(ms_u64));
    }
}

fn motor(software: bool, clock: &ManualClock) -> Arc<Motor> {
    let mut settings = MotorSettings {
        software_pid: software,
        ..MotorSettings::default()
    };
    settings.set_pid(
        ClosedLoop::Position,
        PidCfg {
            coefficients: PidCoefficients::new(0.05, 0.001, 0.0, 0.0),
            tolerance: 0.1,
        },
    );
    let sim = SimulatedActuator::new(SimParams::default());
    Motor::builder("bench")
        .with_actuator(sim)
        .with_clock(clock.clone())
        .with_timer(Arc::new(ManualTimer::new(Arc::new(clock.clone()))))
        .with_settings(settings)
        .build()
        .expect("build bench motor")
}

pub fn bench_control_tick(c: &mut Criterion) {
    let mut g = c.benchmark_group("control_tick");
    configure(&mut g);

    for software in [false, true] {
        let label = if software { "software_position" } else { "native_position" };
        let clock = ManualClock::new();
        let m = motor(software, &clock);
        m.set_position(1.0e6, PositionOptions::new()).expect("position command");
        g.bench_function(label, |b| {
            b.iter(|| {
                clock.advance(Duration::from_millis(5));
                m.tick_at(black_box(clock.now()));
            });
        });
    }

    let clock = ManualClock::new();
    let m = motor(false, &clock);
    let mut flip = 0.25;
    g.bench_function("power_command", |b| {
        b.iter(|| {
            flip = -flip;
            m.set_power(black_box(flip), CommandOptions::new())
                .expect("power command");
        });
    });
    g.finish();
}

pub fn bench_spurious(c: &mut Criterion) {
    let mut g = c.benchmark_group("odometry");
    configure(&mut g);
    let samples: Vec<(f64, f64)> = (0..4096)
        .map(|i| {
            let x = f64::from(i);
            (x * 3.5, if i % 97 == 0 { x * 1.0e9 } else { x * 3.5 + 1.0 })
        })
        .collect();
    g.bench_function("is_spurious", |b| {
        b.iter_batched(
            || samples.clone(),
            |s| {
                let hits = s.iter().filter(|(p, c)| is_spurious(*p, *c)).count();
                black_box(hits);
            },
            BatchSize::SmallInput,
        )
    });
    g.finish();
}

criterion_group!(control, bench_control_tick, bench_spurious);
criterion_main!(control);
