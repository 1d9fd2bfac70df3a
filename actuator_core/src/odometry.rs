//! Cached position/velocity samples and the shared sampler that refreshes them.
//!
//! Actuators opt in through an injected [`OdometryRegistry`]. The registry
//! registers a single standalone sampler task with the scheduler when the
//! first actuator joins and removes it again when the last one leaves or on
//! [`OdometryRegistry::shutdown`].
use crate::motor::Motor;
use crate::scheduler::{PeriodicTask, TaskHandle, TaskKind, TaskScheduler};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Minimum jump between consecutive samples before the magnitude test runs.
pub const SPURIOUS_JUMP: f64 = 10_000.0;
/// Minimum base-2 exponent of `high / low` for a jump to count as a glitch.
pub const SPURIOUS_EXPONENT: i32 = 27;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Odometry {
    pub prev_position: f64,
    pub position: f64,
    pub prev_timestamp: Instant,
    pub timestamp: Instant,
    pub velocity: f64,
}

impl Odometry {
    pub fn new(position: f64, now: Instant) -> Self {
        Self {
            prev_position: position,
            position,
            prev_timestamp: now,
            timestamp: now,
            velocity: 0.0,
        }
    }

    /// Shift the current sample to previous and record a new one.
    ///
    /// A spurious reading is discarded in favor of the previous position.
    /// `hw_velocity` is used when the actuator reports velocity natively;
    /// otherwise velocity is derived from the two samples. Returns true when
    /// the reading was rejected.
    pub fn update(&mut self, now: Instant, position: f64, hw_velocity: Option<f64>) -> bool {
        self.prev_timestamp = self.timestamp;
        self.prev_position = self.position;
        self.timestamp = now.max(self.prev_timestamp);

        let rejected = is_spurious(self.prev_position, position);
        self.position = if rejected { self.prev_position } else { position };

        self.velocity = match hw_velocity {
            Some(v) => v,
            None => {
                let dt = self
                    .timestamp
                    .saturating_duration_since(self.prev_timestamp)
                    .as_secs_f64();
                if dt == 0.0 {
                    0.0
                } else {
                    (self.position - self.prev_position) / dt
                }
            }
        };
        rejected
    }
}

/// A reading is spurious when it jumps more than [`SPURIOUS_JUMP`] units and
/// the ratio of the larger to the smaller magnitude (smaller floored at 1)
/// has a base-2 exponent of at least [`SPURIOUS_EXPONENT`].
pub fn is_spurious(prev: f64, curr: f64) -> bool {
    let (a, b) = (prev.abs(), curr.abs());
    let (low, high) = if a > b { (b, a) } else { (a, b) };
    if high - low > SPURIOUS_JUMP {
        return binary_exponent(high / low.max(1.0)) >= SPURIOUS_EXPONENT;
    }
    false
}

/// Unbiased exponent of a finite positive double, i.e. `floor(log2(x))` for
/// normal values.
fn binary_exponent(x: f64) -> i32 {
    let biased = (x.to_bits() >> 52) & 0x7ff;
    i32::try_from(biased).unwrap_or(0) - 1023
}

/// Per-actuator odometry slot, guarded by its own lock inside `Motor`.
#[derive(Debug, Clone, Default)]
pub(crate) struct OdometryState {
    pub enabled: bool,
    pub record: Option<Odometry>,
}

/// Registry of actuators whose odometry is sampled every cycle.
pub struct OdometryRegistry {
    scheduler: Arc<dyn TaskScheduler>,
    motors: Arc<Mutex<Vec<Weak<Motor>>>>,
    task: Mutex<Option<TaskHandle>>,
}

impl OdometryRegistry {
    pub fn new(scheduler: Arc<dyn TaskScheduler>) -> Arc<Self> {
        Arc::new(Self {
            scheduler,
            motors: Arc::new(Mutex::new(Vec::new())),
            task: Mutex::new(None),
        })
    }

    pub fn len(&self) -> usize {
        self.motors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True while the sampler task is registered with the scheduler.
    pub fn is_active(&self) -> bool {
        self.task.lock().is_some()
    }

    pub fn contains(&self, motor: &Motor) -> bool {
        let ptr: *const Motor = motor;
        self.motors.lock().iter().any(|w| w.as_ptr() == ptr)
    }

    /// Add `motor`; a no-op if it is already registered.
    pub(crate) fn register(&self, motor: &Arc<Motor>) -> bool {
        let mut task = self.task.lock();
        let mut motors = self.motors.lock();
        motors.retain(|w| w.strong_count() > 0);
        if motors.iter().any(|w| w.as_ptr() == Arc::as_ptr(motor)) {
            return false;
        }
        motors.push(Arc::downgrade(motor));
        if task.is_none() {
            let sampler = Arc::new(OdometrySampler {
                motors: self.motors.clone(),
            });
            *task = Some(self.scheduler.register(TaskKind::Standalone, sampler));
            tracing::debug!("odometry sampler started");
        }
        true
    }

    pub(crate) fn unregister(&self, motor: &Motor) -> bool {
        let ptr: *const Motor = motor;
        let mut task = self.task.lock();
        let mut motors = self.motors.lock();
        let before = motors.len();
        motors.retain(|w| w.as_ptr() != ptr && w.strong_count() > 0);
        let removed = motors.len() != before;
        if motors.is_empty() {
            if let Some(handle) = task.take() {
                self.scheduler.unregister(handle);
                tracing::debug!("odometry sampler stopped");
            }
        }
        removed
    }

    /// Tear the registry down: every member stops sampling and the sampler
    /// task is removed from the scheduler.
    pub fn shutdown(&self) {
        let drained: Vec<Weak<Motor>> = {
            let mut task = self.task.lock();
            let drained = std::mem::take(&mut *self.motors.lock());
            if let Some(handle) = task.take() {
                self.scheduler.unregister(handle);
            }
            drained
        };
        for motor in drained.iter().filter_map(Weak::upgrade) {
            motor.mark_odometry_disabled();
        }
        tracing::debug!(count = drained.len(), "odometry registry shut down");
    }

    /// Sample every registered actuator once.
    pub fn sample_all(&self, now: Instant) {
        sample(&self.motors, now);
    }
}

impl Drop for OdometryRegistry {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            self.scheduler.unregister(handle);
        }
    }
}

fn sample(motors: &Mutex<Vec<Weak<Motor>>>, now: Instant) {
    let snapshot: Vec<Arc<Motor>> = motors.lock().iter().filter_map(Weak::upgrade).collect();
    for motor in snapshot {
        motor.sample_odometry(now);
    }
}

struct OdometrySampler {
    motors: Arc<Mutex<Vec<Weak<Motor>>>>,
}

impl PeriodicTask for OdometrySampler {
    fn name(&self) -> &str {
        "odometry"
    }

    fn run(&self, now: Instant) {
        sample(&self.motors, now);
    }
}
