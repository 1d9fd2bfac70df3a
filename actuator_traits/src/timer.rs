use std::time::Duration;

pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// One-shot timer owned by a single actuator.
///
/// Arming replaces whatever was pending. Callbacks run on whatever context the
/// implementation chooses, so they must take their own locks.
pub trait OneShotTimer: Send + Sync {
    fn set(&self, delay: Duration, callback: TimerCallback);
    fn cancel(&self);
}
