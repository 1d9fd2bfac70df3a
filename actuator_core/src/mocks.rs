//! Test and helper mocks for actuator_core.
use actuator_traits::clock::Clock;
use actuator_traits::timer::{OneShotTimer, TimerCallback};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Timer that never fires on its own. Tests advance a shared clock and call
/// [`ManualTimer::fire_due`] to run an expired callback deterministically.
#[derive(Clone)]
pub struct ManualTimer {
    clock: Arc<dyn Clock + Send + Sync>,
    pending: Arc<Mutex<Option<(Instant, TimerCallback)>>>,
}

impl ManualTimer {
    pub fn new(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            clock,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending.lock().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.lock().as_ref().map(|(d, _)| *d)
    }

    /// Run the pending callback if its deadline has passed. Returns true if it ran.
    pub fn fire_due(&self) -> bool {
        let now = self.clock.now();
        let due = {
            let mut p = self.pending.lock();
            match p.as_ref() {
                Some((deadline, _)) if *deadline <= now => p.take(),
                _ => None,
            }
        };
        match due {
            Some((_, cb)) => {
                cb();
                true
            }
            None => false,
        }
    }
}

impl OneShotTimer for ManualTimer {
    fn set(&self, delay: Duration, callback: TimerCallback) {
        let deadline = self.clock.now() + delay;
        *self.pending.lock() = Some((deadline, callback));
    }

    fn cancel(&self) {
        self.pending.lock().take();
    }
}
