//! The actuator handle: one command record, one driver, one control task.
//!
//! Lock order is command, then hardware. Followers are locked after their
//! master's hardware lock is released. The odometry slot has its own lock and
//! is never held while another lock is taken.
use crate::command::{CommandOptions, CommandRecord, ControlMode, PositionOptions};
use crate::control_task::ControlTask;
use crate::error::{ActuatorError, Report, Result};
use crate::hardware::{Hardware, LimitSide, TriggerCallback, TriggerMode};
use crate::odometry::{Odometry, OdometryRegistry, OdometryState};
use crate::ownership::OwnershipGate;
use crate::pid::PidController;
use crate::presets::PresetTable;
use crate::scheduler::{TaskHandle, TaskKind, TaskScheduler};
use crate::stall::StallCfg;
use actuator_traits::clock::Clock;
use actuator_traits::controller::{ClosedLoopController, PidCoefficients};
use actuator_traits::timer::OneShotTimer;
use actuator_traits::{Capability, ClosedLoop};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

pub struct Motor {
    pub(crate) name: String,
    pub(crate) me: Weak<Motor>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) timer: Arc<dyn OneShotTimer>,
    pub(crate) ownership: Option<Arc<dyn OwnershipGate>>,
    pub(crate) odometry_registry: Option<Arc<OdometryRegistry>>,
    pub(crate) control_task: Option<(Arc<dyn TaskScheduler>, TaskHandle)>,
    pub(crate) command: Mutex<CommandRecord>,
    pub(crate) hw: Mutex<Hardware>,
    pub(crate) odometry: Mutex<OdometryState>,
    pub(crate) followers: Mutex<Vec<Weak<Motor>>>,
    pub(crate) presets: RwLock<Option<PresetTable>>,
    pub(crate) trace_pid: AtomicBool,
}

impl std::fmt::Debug for Motor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Motor")
            .field("name", &self.name)
            .field("active_mode", &self.active_mode())
            .field("followers", &self.follower_count())
            .finish_non_exhaustive()
    }
}

/// Collaborators wired in by the builder.
pub(crate) struct Parts {
    pub name: String,
    pub clock: Arc<dyn Clock + Send + Sync>,
    pub timer: Arc<dyn OneShotTimer>,
    pub ownership: Option<Arc<dyn OwnershipGate>>,
    pub odometry_registry: Option<Arc<OdometryRegistry>>,
    pub scheduler: Option<Arc<dyn TaskScheduler>>,
    pub command: CommandRecord,
    pub hw: Hardware,
    pub presets: Option<PresetTable>,
}

impl Motor {
    pub(crate) fn from_parts(parts: Parts) -> Arc<Self> {
        let Parts {
            name,
            clock,
            timer,
            ownership,
            odometry_registry,
            scheduler,
            command,
            hw,
            presets,
        } = parts;
        Arc::new_cyclic(|me: &Weak<Motor>| {
            let control_task = scheduler.map(|s| {
                let task = Arc::new(ControlTask::new(me.clone(), &name));
                let handle = s.register(TaskKind::Output, task);
                (s, handle)
            });
            Self {
                name,
                me: me.clone(),
                clock,
                timer,
                ownership,
                odometry_registry,
                control_task,
                command: Mutex::new(command),
                hw: Mutex::new(hw),
                odometry: Mutex::new(OdometryState::default()),
                followers: Mutex::new(Vec::new()),
                presets: RwLock::new(presets),
                trace_pid: AtomicBool::new(false),
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn now(&self) -> Instant {
        self.clock.now()
    }

    /// True when the control task is registered with a scheduler.
    pub fn is_scheduled(&self) -> bool {
        self.control_task.is_some()
    }

    // ── Getters ──────────────────────────────────────────────────────────────

    pub fn active_mode(&self) -> ControlMode {
        self.command.lock().active_mode
    }

    pub fn is_calibrating(&self) -> bool {
        self.command.lock().calibrating
    }

    pub fn is_stalled(&self) -> bool {
        self.command.lock().stall.is_stalled()
    }

    /// Power read back from the driver.
    pub fn power(&self) -> Result<f64> {
        let mut hw = self.hw.lock();
        hw.driver
            .power()
            .map_err(|e| crate::hw_error::report(e.as_ref()))
    }

    /// Power most recently commanded, including software closed-loop output.
    pub fn commanded_power(&self) -> f64 {
        self.command.lock().curr_power
    }

    fn cached_odometry(&self) -> Option<Odometry> {
        let odo = self.odometry.lock();
        if odo.enabled { odo.record } else { None }
    }

    /// Position from the odometry cache when sampling is on, otherwise read
    /// from the sensor.
    pub fn position(&self) -> Result<f64> {
        if let Some(odo) = self.cached_odometry() {
            return Ok(odo.position);
        }
        let mut hw = self.hw.lock();
        if !hw.has_position_sensor() {
            return Err(Report::new(ActuatorError::Unsupported(
                "position sensor".into(),
            )));
        }
        hw.position()
    }

    pub fn velocity(&self) -> Result<f64> {
        if let Some(odo) = self.cached_odometry() {
            return Ok(odo.velocity);
        }
        let mut hw = self.hw.lock();
        if !hw.supports(Capability::VelocitySensor) {
            return Err(Report::new(ActuatorError::Unsupported(
                "velocity sensor".into(),
            )));
        }
        hw.velocity()
    }

    pub fn current(&self) -> Result<f64> {
        let mut hw = self.hw.lock();
        if !hw.supports(Capability::CurrentSensor) {
            return Err(Report::new(ActuatorError::Unsupported(
                "current sensor".into(),
            )));
        }
        hw.current()
    }

    /// Reading fed to the software controller of `l`.
    pub(crate) fn measure(&self, l: ClosedLoop) -> Result<f64> {
        match l {
            ClosedLoop::Velocity => self.velocity(),
            ClosedLoop::Position => self.position(),
            ClosedLoop::Current => self.current(),
        }
    }

    // ── Stall protection & PID configuration ─────────────────────────────────

    pub fn set_stall_protection(&self, cfg: StallCfg) {
        self.command.lock().stall.set_cfg(cfg);
        tracing::debug!(motor = %self.name, ?cfg, "stall protection configured");
    }

    pub fn stall_protection(&self) -> StallCfg {
        *self.command.lock().stall.cfg()
    }

    /// Route closed-loop modes through software controllers instead of the
    /// driver's native loops.
    pub fn set_software_pid_enabled(&self, enabled: bool) {
        self.command.lock().software_pid = enabled;
    }

    pub fn is_software_pid_enabled(&self) -> bool {
        self.command.lock().software_pid
    }

    /// Set the gains for `l`. In software mode this creates the controller on
    /// first use; otherwise the gains go to the driver.
    pub fn set_pid_coefficients(
        &self,
        l: ClosedLoop,
        pid: PidCoefficients,
        tolerance: Option<f64>,
    ) -> Result<()> {
        let mut rec = self.command.lock();
        if rec.software_pid {
            match rec.controllers.get_mut(l) {
                Some(ctrl) => {
                    ctrl.set_coefficients(pid);
                    if let Some(t) = tolerance {
                        ctrl.set_tolerance(t);
                    }
                }
                None => {
                    let ctrl = PidController::new(pid).with_tolerance(tolerance.unwrap_or(0.0));
                    rec.controllers.set(l, Box::new(ctrl));
                }
            }
            return Ok(());
        }
        drop(rec);
        let mut hw = self.hw.lock();
        hw.driver
            .set_pid_coefficients(l, pid)
            .map_err(|e| crate::hw_error::report(e.as_ref()))?;
        if let Some(t) = tolerance {
            hw.driver
                .set_pid_tolerance(l, t)
                .map_err(|e| crate::hw_error::report(e.as_ref()))?;
        }
        Ok(())
    }

    /// Install a custom software controller for `l`.
    pub fn set_controller(&self, l: ClosedLoop, ctrl: Box<dyn ClosedLoopController>) {
        self.command.lock().controllers.set(l, ctrl);
    }

    pub fn pid_coefficients(&self, l: ClosedLoop) -> Result<PidCoefficients> {
        let rec = self.command.lock();
        if rec.software_pid {
            return rec
                .controllers
                .get(l)
                .map(|c| c.coefficients())
                .ok_or_else(|| Report::new(ActuatorError::MisconfiguredController(l)));
        }
        drop(rec);
        self.hw
            .lock()
            .driver
            .pid_coefficients(l)
            .map_err(|e| crate::hw_error::report(e.as_ref()))
    }

    pub fn set_pid_tolerance(&self, l: ClosedLoop, tolerance: f64) -> Result<()> {
        let mut rec = self.command.lock();
        if rec.software_pid {
            let ctrl = rec
                .controllers
                .get_mut(l)
                .ok_or_else(|| Report::new(ActuatorError::MisconfiguredController(l)))?;
            ctrl.set_tolerance(tolerance);
            return Ok(());
        }
        drop(rec);
        self.hw
            .lock()
            .driver
            .set_pid_tolerance(l, tolerance)
            .map_err(|e| crate::hw_error::report(e.as_ref()))
    }

    pub fn on_target(&self, l: ClosedLoop) -> Result<bool> {
        let software = self.command.lock().software_pid;
        if software {
            let measured = self.measure(l)?;
            let rec = self.command.lock();
            let ctrl = rec
                .controllers
                .get(l)
                .ok_or_else(|| Report::new(ActuatorError::MisconfiguredController(l)))?;
            return Ok(ctrl.on_target(measured));
        }
        self.hw
            .lock()
            .driver
            .on_target(l)
            .map_err(|e| crate::hw_error::report(e.as_ref()))
    }

    /// Emit the software controller's target, input and output every tick.
    pub fn set_trace_pid(&self, enabled: bool) {
        self.trace_pid.store(enabled, Ordering::Relaxed);
    }

    // ── Sensor & limits configuration ────────────────────────────────────────

    pub fn set_inverted(&self, inverted: bool) -> Result<()> {
        self.hw
            .lock()
            .driver
            .set_inverted(inverted)
            .map_err(|e| crate::hw_error::report(e.as_ref()))
    }

    /// Compensate power commands for bus sag; `None` disables compensation.
    pub fn set_nominal_voltage(&self, volts: Option<f64>) {
        self.hw.lock().nominal_voltage = volts.filter(|v| *v > 0.0);
    }

    pub fn set_position_sensor_scale_and_offset(&self, scale: f64, offset: f64) -> Result<()> {
        if !scale.is_finite() || scale == 0.0 {
            return Err(Report::new(ActuatorError::Config(
                "position scale must be finite and non-zero".into(),
            )));
        }
        self.hw.lock().set_scale_and_offset(scale, offset);
        Ok(())
    }

    pub fn set_position_sensor_inverted(&self, inverted: bool) -> Result<()> {
        self.hw.lock().set_position_sensor_inverted(inverted)
    }

    pub fn is_position_sensor_inverted(&self) -> Result<bool> {
        self.hw.lock().is_position_sensor_inverted()
    }

    /// Store the current reading as the zero reference; `hardware` also
    /// zeroes the sensor itself.
    pub fn reset_position(&self, hardware: bool) -> Result<()> {
        let pos = {
            let mut hw = self.hw.lock();
            hw.reset_position(hardware)?;
            hw.try_position()
        };
        self.reseed_odometry(pos, self.now());
        Ok(())
    }

    /// Apply soft position limits; either side may be absent.
    pub fn set_soft_position_limits(&self, lower: Option<f64>, upper: Option<f64>) -> Result<()> {
        if let (Some(lo), Some(hi)) = (lower, upper)
            && lo >= hi
        {
            return Err(Report::new(ActuatorError::Config(
                "soft lower limit must be below the upper limit".into(),
            )));
        }
        self.hw.lock().set_soft_limits(lower, upper)
    }

    pub fn soft_position_limits(&self) -> (Option<f64>, Option<f64>) {
        self.hw.lock().soft_limits()
    }

    /// Lower switch on the forward input and upper on reverse.
    pub fn set_limit_switches_swapped(&self, swapped: bool) {
        self.hw.lock().swapped = swapped;
    }

    pub fn enable_limit_switch(&self, side: LimitSide, normal_close: bool) -> Result<()> {
        self.hw.lock().enable_switch(side, normal_close)
    }

    pub fn disable_limit_switch(&self, side: LimitSide) -> Result<()> {
        self.hw.lock().disable_switch(side)
    }

    pub fn is_limit_switch_enabled(&self, side: LimitSide) -> Result<bool> {
        self.hw.lock().is_switch_enabled(side)
    }

    pub fn set_limit_switch_inverted(&self, side: LimitSide, inverted: bool) -> Result<()> {
        self.hw.lock().set_switch_inverted(side, inverted)
    }

    pub fn is_limit_switch_active(&self, side: LimitSide) -> bool {
        self.hw.lock().is_switch_active(side)
    }

    /// Reset the position reference whenever the lower switch changes to a
    /// state matching `mode`. Checked once per control tick; `callback`
    /// receives the new switch state.
    pub fn reset_position_on_lower_limit_switch(
        &self,
        mode: TriggerMode,
        callback: Option<TriggerCallback>,
    ) {
        self.hw.lock().set_trigger(mode, callback);
    }

    pub fn clear_lower_limit_switch_trigger(&self) {
        self.hw.lock().clear_trigger();
    }

    // ── Followers ────────────────────────────────────────────────────────────

    /// Add `follower`. Adding twice, adding the actuator to itself, or adding
    /// anything that already follows it directly or transitively is a no-op
    /// returning false.
    pub fn add_follower(&self, follower: &Arc<Motor>) -> bool {
        if std::ptr::eq(Arc::as_ptr(follower), self) {
            return false;
        }
        if follower.leads_to(self) {
            tracing::warn!(master = %self.name, follower = %follower.name, "refusing follower cycle");
            return false;
        }
        let mut set = self.followers.lock();
        set.retain(|w| w.strong_count() > 0);
        if set.iter().any(|w| w.as_ptr() == Arc::as_ptr(follower)) {
            return false;
        }
        set.push(Arc::downgrade(follower));
        tracing::debug!(master = %self.name, follower = %follower.name, "follower added");
        true
    }

    pub fn remove_follower(&self, follower: &Motor) -> bool {
        let ptr: *const Motor = follower;
        let mut set = self.followers.lock();
        let before = set.len();
        set.retain(|w| w.as_ptr() != ptr && w.strong_count() > 0);
        set.len() != before
    }

    pub fn has_follower(&self, follower: &Motor) -> bool {
        let ptr: *const Motor = follower;
        self.followers.lock().iter().any(|w| w.as_ptr() == ptr)
    }

    /// True when `target` is reachable through the follower graph of `self`.
    fn leads_to(&self, target: &Motor) -> bool {
        let goal: *const Motor = target;
        let mut seen: Vec<*const Motor> = vec![self as *const Motor];
        let mut stack = self.follower_snapshot();
        while let Some(m) = stack.pop() {
            let ptr = Arc::as_ptr(&m);
            if ptr == goal {
                return true;
            }
            if seen.contains(&ptr) {
                continue;
            }
            seen.push(ptr);
            stack.extend(m.follower_snapshot());
        }
        false
    }

    pub fn follower_count(&self) -> usize {
        self.followers
            .lock()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub(crate) fn follower_snapshot(&self) -> Vec<Arc<Motor>> {
        self.followers
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    // ── Presets ──────────────────────────────────────────────────────────────

    /// Replace the preset table; `None` removes it.
    pub fn set_presets(&self, table: Option<PresetTable>) {
        *self.presets.write() = table;
    }

    pub fn presets(&self) -> Option<PresetTable> {
        self.presets.read().clone()
    }

    pub fn validate_preset_index(&self, index: usize) -> bool {
        self.presets
            .read()
            .as_ref()
            .is_some_and(|t| t.is_valid_index(index))
    }

    pub fn preset_position(&self, index: usize) -> Option<f64> {
        self.presets.read().as_ref().and_then(|t| t.get(index))
    }

    /// Move to the preset at `index`.
    pub fn set_preset_position(&self, index: usize, opts: PositionOptions) -> Result<()> {
        let target = self
            .preset_position(index)
            .ok_or_else(|| Report::new(ActuatorError::InvalidPreset(index)))?;
        self.set_position(target, opts)
    }

    /// Move to the next preset above the current position. `Ok(None)` means
    /// no preset table is configured.
    pub fn preset_position_up(
        &self,
        owner: Option<&str>,
        power_limit: Option<f64>,
    ) -> Result<Option<usize>> {
        self.preset_step(owner, power_limit, PresetTable::next_index_up)
    }

    /// Mirror of [`Motor::preset_position_up`].
    pub fn preset_position_down(
        &self,
        owner: Option<&str>,
        power_limit: Option<f64>,
    ) -> Result<Option<usize>> {
        self.preset_step(owner, power_limit, PresetTable::next_index_down)
    }

    fn preset_step(
        &self,
        owner: Option<&str>,
        power_limit: Option<f64>,
        next: fn(&PresetTable, f64) -> Option<usize>,
    ) -> Result<Option<usize>> {
        let Some(table) = self.presets() else {
            return Ok(None);
        };
        let pos = self.position()?;
        let Some(index) = next(&table, pos) else {
            return Ok(None);
        };
        let target = table
            .get(index)
            .ok_or_else(|| Report::new(ActuatorError::InvalidPreset(index)))?;
        let mut opts = PositionOptions::new();
        opts.owner = owner.map(str::to_string);
        opts.power_limit = power_limit.map(f64::abs);
        self.set_position(target, opts)?;
        Ok(Some(index))
    }

    // ── Odometry ─────────────────────────────────────────────────────────────

    /// Join or leave the shared odometry sampler.
    pub fn set_odometry_enabled(
        &self,
        enabled: bool,
        reset_odometry: bool,
        reset_hardware: bool,
    ) -> Result<()> {
        let registry = self.odometry_registry.as_ref().ok_or_else(|| {
            Report::new(ActuatorError::Config(
                "no odometry registry was provided".into(),
            ))
        })?;
        if enabled {
            let me = self.me.upgrade().ok_or_else(|| {
                Report::new(ActuatorError::Config("actuator is shutting down".into()))
            })?;
            if reset_odometry {
                self.hw.lock().reset_position(reset_hardware)?;
            }
            let pos = self.hw.lock().try_position().unwrap_or(0.0);
            {
                let mut odo = self.odometry.lock();
                odo.enabled = true;
                odo.record = Some(Odometry::new(pos, self.now()));
            }
            registry.register(&me);
        } else {
            registry.unregister(self);
            self.mark_odometry_disabled();
        }
        tracing::debug!(motor = %self.name, enabled, "odometry toggled");
        Ok(())
    }

    pub fn is_odometry_enabled(&self) -> bool {
        self.odometry.lock().enabled
    }

    /// Latest sample. Reading odometry that is not being sampled is an error.
    pub fn odometry(&self) -> Result<Odometry> {
        self.cached_odometry()
            .ok_or_else(|| Report::new(ActuatorError::OdometryDisabled))
    }

    /// Reset the position reference and restart the odometry record there.
    pub fn reset_odometry(&self, hardware: bool) -> Result<()> {
        if !self.is_odometry_enabled() {
            return Err(Report::new(ActuatorError::OdometryDisabled));
        }
        self.reset_position(hardware)
    }

    pub(crate) fn reseed_odometry(&self, position: Option<f64>, now: Instant) {
        let mut odo = self.odometry.lock();
        if odo.enabled {
            odo.record = Some(Odometry::new(position.unwrap_or(0.0), now));
        }
    }

    /// Take one odometry sample. Called by the registry's sampler task.
    pub(crate) fn sample_odometry(&self, now: Instant) {
        let reading = {
            let mut hw = self.hw.lock();
            let hw_velocity = if hw.supports(Capability::VelocitySensor) {
                hw.velocity().ok()
            } else {
                None
            };
            hw.try_position().map(|p| (p, hw_velocity))
        };
        let Some((pos, hw_velocity)) = reading else {
            return;
        };
        let mut odo = self.odometry.lock();
        if !odo.enabled {
            return;
        }
        let record = odo.record.get_or_insert_with(|| Odometry::new(pos, now));
        if record.update(now, pos, hw_velocity) {
            tracing::warn!(
                motor = %self.name,
                previous = record.prev_position,
                rejected = pos,
                "spurious position sample discarded"
            );
        }
    }

    pub(crate) fn mark_odometry_disabled(&self) {
        let mut odo = self.odometry.lock();
        odo.enabled = false;
        odo.record = None;
    }

    // ── Convenience commands ─────────────────────────────────────────────────

    /// Power command with only an owner.
    pub fn set_power_owned(&self, owner: Option<&str>, power: f64) -> Result<()> {
        let mut opts = CommandOptions::new();
        opts.owner = owner.map(str::to_string);
        self.set_power(power, opts)
    }
}

impl Drop for Motor {
    fn drop(&mut self) {
        self.timer.cancel();
        if let Some((scheduler, handle)) = self.control_task.take() {
            scheduler.unregister(handle);
        }
        if let Some(registry) = self.odometry_registry.take() {
            registry.unregister(self);
        }
    }
}
