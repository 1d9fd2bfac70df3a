//! Actuator assembly from config and command execution.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use actuator_config::{Config, SimProfile};
use actuator_core::prelude::*;
use actuator_core::{
    EventState, MotorBuilder, PeriodicTask, SchedulerThread, Set, TaskKind, TaskScheduler,
};
use actuator_hardware::{
    ContinuousServo, SimParams, SimProbe, SimulatedActuator, SimulatedEncoder,
    SimulatedLimitSwitch,
};
use actuator_traits::Actuator;
use actuator_traits::clock::MonotonicClock;
use parking_lot::Mutex;
use serde_json::json;

/// Tolerance used when presets come only from `--presets`.
const DEFAULT_PRESET_TOLERANCE: f64 = 0.5;
/// Slice used when waiting so Ctrl-C is noticed promptly.
const WAIT_SLICE: Duration = Duration::from_millis(20);

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("operation did not finish within {waited_ms} ms")]
    Timeout { waited_ms: u64 },
    #[error("operation was canceled before completion")]
    Canceled,
    #[error("interrupted by signal")]
    Interrupted,
    #[error("no preset {0} of the current position")]
    NoPreset(&'static str),
}

/// Real GPIO switches from `[pins]` win over the simulated ones.
fn wire_switches(
    mut builder: MotorBuilder<Set>,
    cfg: &Config,
    probe: &SimProbe,
) -> eyre::Result<MotorBuilder<Set>> {
    #[cfg(feature = "hardware")]
    {
        use actuator_hardware::gpio::GpioLimitSwitch;
        if let Some(pin) = cfg.pins.lower_switch {
            builder = builder.with_lower_limit_switch(GpioLimitSwitch::new(pin)?);
        }
        if let Some(pin) = cfg.pins.upper_switch {
            builder = builder.with_upper_limit_switch(GpioLimitSwitch::new(pin)?);
        }
    }
    #[cfg(not(feature = "hardware"))]
    if cfg.pins.lower_switch.is_some() || cfg.pins.upper_switch.is_some() {
        eyre::bail!("[pins] requires a build with the `hardware` feature");
    }

    if cfg.pins.lower_switch.is_none()
        && let Some(at) = cfg.simulation.lower_switch_at
    {
        builder = builder.with_lower_limit_switch(SimulatedLimitSwitch::lower(probe, at));
    }
    if cfg.pins.upper_switch.is_none()
        && let Some(at) = cfg.simulation.upper_switch_at
    {
        builder = builder.with_upper_limit_switch(SimulatedLimitSwitch::upper(probe, at));
    }
    Ok(builder)
}

pub fn run_error_name(e: &RunError) -> &'static str {
    match e {
        RunError::Timeout { .. } => "Timeout",
        RunError::Canceled => "Canceled",
        RunError::Interrupted => "Interrupted",
        RunError::NoPreset(_) => "NoPreset",
    }
}

/// Steps the simulated plant forward by the wall time between runs.
struct PlantTask {
    probe: SimProbe,
    last: Mutex<Option<Instant>>,
}

impl PeriodicTask for PlantTask {
    fn name(&self) -> &str {
        "plant"
    }

    fn run(&self, now: Instant) {
        let prev = self.last.lock().replace(now);
        if let Some(prev) = prev {
            self.probe
                .step(now.saturating_duration_since(prev).as_secs_f64());
        }
    }
}

/// One simulated actuator wired to its schedulers.
pub struct Rig {
    pub motor: Arc<Motor>,
    pub probe: SimProbe,
    pub registry: Option<Arc<OdometryRegistry>>,
    /// Distance from a target that counts as arrived.
    settle_band: f64,
    control: Arc<CooperativeScheduler>,
    odometry: Option<Arc<CooperativeScheduler>>,
    control_hz: u32,
    odometry_hz: Option<u32>,
    threads: Vec<SchedulerThread>,
}

impl Rig {
    /// Build the simulated plant and the actuator described by `cfg`.
    ///
    /// `presets_csv` wins over `[presets] file`, which is resolved relative
    /// to `config_dir`.
    pub fn assemble(cfg: &Config, config_dir: &Path, presets_csv: Option<&Path>) -> eyre::Result<Self> {
        let params = SimParams {
            max_velocity: cfg.simulation.max_velocity,
            bus_voltage: cfg.simulation.bus_voltage,
            start_position: cfg.simulation.start_position,
            position_tolerance: cfg.simulation.position_tolerance,
        };
        let (driver, probe): (Box<dyn Actuator>, SimProbe) = match cfg.simulation.profile {
            SimProfile::Full => {
                let sim = SimulatedActuator::new(params);
                let probe = sim.probe();
                (Box::new(sim), probe)
            }
            SimProfile::Servo => {
                let servo = ContinuousServo::new(params);
                let probe = servo.probe();
                (Box::new(servo), probe)
            }
        };

        let control = Arc::new(CooperativeScheduler::new());
        control.register(
            TaskKind::Standalone,
            Arc::new(PlantTask {
                probe: probe.clone(),
                last: Mutex::new(None),
            }),
        );
        let odometry = cfg
            .scheduler
            .odometry_hz
            .filter(|_| cfg.odometry.enabled)
            .map(|_| Arc::new(CooperativeScheduler::new()));
        let registry = cfg.odometry.enabled.then(|| {
            let sched: Arc<dyn TaskScheduler> = match &odometry {
                Some(s) => s.clone(),
                None => control.clone(),
            };
            OdometryRegistry::new(sched)
        });

        let mut settings = MotorSettings::from(cfg);
        let csv = presets_csv.map(Path::to_path_buf).or_else(|| {
            cfg.presets
                .as_ref()
                .and_then(|p| p.file.as_ref())
                .map(|f| config_dir.join(f))
        });
        if let Some(path) = csv {
            let positions = actuator_config::load_presets_csv(&path)?;
            let tolerance = cfg
                .presets
                .as_ref()
                .map_or(DEFAULT_PRESET_TOLERANCE, |p| p.tolerance);
            tracing::info!(path = %path.display(), count = positions.len(), "presets loaded");
            settings.presets = Some(PresetTable::new(tolerance, positions));
        }

        let mut builder = Motor::builder(cfg.actuator.name.as_str())
            .with_boxed_actuator(driver)
            .with_settings(settings)
            .with_ownership(Arc::new(ExclusiveOwnership::new()))
            .with_scheduler(control.clone());
        if cfg.simulation.profile == SimProfile::Servo {
            builder = builder.with_encoder(SimulatedEncoder::new(&probe));
        }
        builder = wire_switches(builder, cfg, &probe)?;
        if let Some(r) = &registry {
            builder = builder.with_odometry_registry(r.clone());
        }
        let motor = builder.build()?;
        if registry.is_some() {
            motor.set_odometry_enabled(true, false, false)?;
        }

        let settle_band = cfg
            .pid
            .position
            .as_ref()
            .map_or(0.0, |g| g.tolerance)
            .max(cfg.simulation.position_tolerance);
        Ok(Self {
            motor,
            probe,
            registry,
            settle_band,
            control,
            odometry,
            control_hz: cfg.scheduler.control_hz,
            odometry_hz: cfg.scheduler.odometry_hz,
            threads: Vec::new(),
        })
    }

    /// Start the background scheduler threads.
    pub fn start(&mut self) {
        self.threads
            .push(self.control.spawn(self.control_hz, MonotonicClock::new()));
        if let (Some(sched), Some(hz)) = (&self.odometry, self.odometry_hz) {
            self.threads.push(sched.spawn(hz, MonotonicClock::new()));
        }
        tracing::debug!(
            control_hz = self.control_hz,
            tasks = ?self.control.task_names(),
            "schedulers running"
        );
    }

    /// Stop the schedulers and leave the output at zero.
    pub fn shutdown(mut self, owner: Option<&str>) {
        for t in self.threads.drain(..) {
            t.stop();
        }
        if let Err(e) = self.motor.stop(owner) {
            tracing::warn!(error = %e, "failed to stop actuator on shutdown");
        }
        if let Some(r) = &self.registry {
            r.shutdown();
        }
    }

    /// Block until `event` finishes, `timeout` elapses or `shutdown` is raised.
    pub fn wait(
        &self,
        event: &CompletionEvent,
        timeout: Duration,
        shutdown: &AtomicBool,
        owner: Option<&str>,
    ) -> eyre::Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            match event.wait_timeout(WAIT_SLICE) {
                EventState::Signaled => return Ok(()),
                EventState::Canceled => return Err(RunError::Canceled.into()),
                EventState::Pending => {}
            }
            if shutdown.load(Ordering::Relaxed) {
                self.motor.stop(owner)?;
                return Err(RunError::Interrupted.into());
            }
            if Instant::now() >= deadline {
                self.motor.stop(owner)?;
                return Err(RunError::Timeout {
                    waited_ms: duration_ms(timeout),
                }
                .into());
            }
        }
    }

    /// Poll until the position is within `tolerance` of `target`.
    fn wait_near(
        &self,
        target: f64,
        tolerance: f64,
        timeout: Duration,
        shutdown: &AtomicBool,
        owner: Option<&str>,
    ) -> eyre::Result<f64> {
        let deadline = Instant::now() + timeout;
        loop {
            let pos = self.motor.position()?;
            if (pos - target).abs() <= tolerance {
                return Ok(pos);
            }
            if shutdown.load(Ordering::Relaxed) {
                self.motor.stop(owner)?;
                return Err(RunError::Interrupted.into());
            }
            if Instant::now() >= deadline {
                self.motor.stop(owner)?;
                return Err(RunError::Timeout {
                    waited_ms: duration_ms(timeout),
                }
                .into());
            }
            std::thread::sleep(WAIT_SLICE);
        }
    }

    pub fn report(&self) -> serde_json::Value {
        let m = &self.motor;
        json!({
            "name": m.name(),
            "mode": m.active_mode().to_string(),
            "position": m.position().ok(),
            "velocity": m.velocity().ok(),
            "power": m.commanded_power(),
            "stalled": m.is_stalled(),
        })
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

pub struct PowerRun<'a> {
    pub value: f64,
    pub duration: Duration,
    pub delay: Duration,
    pub owner: Option<&'a str>,
    pub timeout: Duration,
}

pub fn run_power(rig: &Rig, p: &PowerRun<'_>, shutdown: &AtomicBool) -> eyre::Result<serde_json::Value> {
    let done = CompletionEvent::new("power");
    let mut opts = CommandOptions::new()
        .delay(p.delay)
        .duration(p.duration)
        .notifier(done.clone());
    opts.owner = p.owner.map(str::to_string);
    tracing::info!(value = p.value, duration_ms = duration_ms(p.duration), "power start");
    rig.motor.set_power(p.value, opts)?;
    rig.wait(&done, p.delay + p.duration + p.timeout, shutdown, p.owner)?;
    rig.motor.stop(p.owner)?;
    Ok(rig.report())
}

pub struct PositionRun<'a> {
    pub target: f64,
    pub power_limit: Option<f64>,
    pub hold: bool,
    pub owner: Option<&'a str>,
    pub timeout: Duration,
}

pub fn run_position(rig: &Rig, p: &PositionRun<'_>, shutdown: &AtomicBool) -> eyre::Result<serde_json::Value> {
    let done = CompletionEvent::new("position");
    let mut opts = PositionOptions::new()
        .hold_target(p.hold)
        .timeout(p.timeout)
        .notifier(done.clone());
    opts.owner = p.owner.map(str::to_string);
    if let Some(limit) = p.power_limit {
        opts = opts.power_limit(limit);
    }
    tracing::info!(target = p.target, hold = p.hold, "position start");
    rig.motor.set_position(p.target, opts)?;
    // Software loops signal on expiry too; a small grace covers native ones.
    rig.wait(&done, p.timeout + Duration::from_millis(250), shutdown, p.owner)?;
    let on_target = rig.motor.on_target(ClosedLoop::Position)?;
    if !on_target {
        rig.motor.stop(p.owner)?;
        return Err(RunError::Timeout {
            waited_ms: duration_ms(p.timeout),
        }
        .into());
    }
    let mut out = rig.report();
    out["target"] = json!(p.target);
    out["on_target"] = json!(on_target);
    Ok(out)
}

pub fn run_calibrate(
    rig: &Rig,
    power: f64,
    owner: Option<&str>,
    timeout: Duration,
    shutdown: &AtomicBool,
) -> eyre::Result<serde_json::Value> {
    let done = CompletionEvent::new("calibrate");
    tracing::info!(power, "calibration start");
    rig.motor.zero_calibrate(owner, power, Some(done.clone()))?;
    rig.wait(&done, timeout, shutdown, owner)?;
    let mut out = rig.report();
    out["lower_switch"] = json!(rig.motor.is_limit_switch_active(LimitSide::Lower));
    Ok(out)
}

pub enum PresetMove {
    Index(usize),
    Up,
    Down,
}

pub fn run_preset(
    rig: &Rig,
    which: PresetMove,
    power_limit: Option<f64>,
    owner: Option<&str>,
    timeout: Duration,
    shutdown: &AtomicBool,
) -> eyre::Result<serde_json::Value> {
    let Some(table) = rig.motor.presets() else {
        eyre::bail!("no presets configured: add [presets] to the config or pass --presets");
    };
    let index = match which {
        PresetMove::Index(i) => {
            let mut opts = PositionOptions::new();
            opts.owner = owner.map(str::to_string);
            if let Some(limit) = power_limit {
                opts = opts.power_limit(limit);
            }
            rig.motor.set_preset_position(i, opts)?;
            i
        }
        PresetMove::Up => rig
            .motor
            .preset_position_up(owner, power_limit)?
            .ok_or(RunError::NoPreset("above"))?,
        PresetMove::Down => rig
            .motor
            .preset_position_down(owner, power_limit)?
            .ok_or(RunError::NoPreset("below"))?,
    };
    let target = table
        .get(index)
        .ok_or(actuator_core::ActuatorError::InvalidPreset(index))?;
    tracing::info!(index, target, "preset move");
    let band = table.tolerance().max(rig.settle_band);
    let pos = rig.wait_near(target, band, timeout, shutdown, owner)?;
    let mut out = rig.report();
    out["index"] = json!(index);
    out["target"] = json!(target);
    out["position"] = json!(pos);
    Ok(out)
}

pub fn self_check(rig: &Rig) -> serde_json::Value {
    let caps: Vec<String> = actuator_hardware::sim::ALL_CAPABILITIES
        .iter()
        .filter(|c| rig.motor.supports(**c))
        .map(|c| format!("{c:?}"))
        .collect();
    let native: Vec<String> = [ClosedLoop::Velocity, ClosedLoop::Position, ClosedLoop::Current]
        .into_iter()
        .filter(|l| rig.motor.uses_native(*l))
        .map(|l| l.to_string())
        .collect();
    let mut out = rig.report();
    out["capabilities"] = json!(caps);
    out["native_loops"] = json!(native);
    out["software_pid"] = json!(rig.motor.is_software_pid_enabled());
    out["presets"] = json!(rig.motor.presets().map(|t| t.positions().to_vec()));
    out["odometry"] = json!(rig.registry.as_ref().map(|r| r.len()));
    out
}
