//! Real-time one-shot timer backed by a worker thread.
use actuator_traits::timer::{OneShotTimer, TimerCallback};
use crossbeam_channel as xch;
use std::time::{Duration, Instant};

enum Msg {
    Arm(Instant, TimerCallback),
    Cancel,
    Shutdown,
}

/// One-shot timer whose callbacks run on a dedicated thread.
///
/// Arming replaces the pending callback; a canceled callback never runs.
pub struct ThreadTimer {
    tx: xch::Sender<Msg>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl ThreadTimer {
    pub fn new(name: &str) -> Self {
        let (tx, rx) = xch::unbounded::<Msg>();
        let thread_name = format!("timer:{name}");
        let join_handle = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || Self::worker(&rx))
            .map_err(|e| tracing::warn!(error = %e, "failed to spawn timer thread"))
            .ok();
        Self { tx, join_handle }
    }

    fn worker(rx: &xch::Receiver<Msg>) {
        let mut pending: Option<(Instant, TimerCallback)> = None;
        loop {
            let msg = match pending.as_ref() {
                Some((deadline, _)) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match rx.recv_timeout(wait) {
                        Ok(m) => Some(m),
                        Err(xch::RecvTimeoutError::Timeout) => None,
                        Err(xch::RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match rx.recv() {
                    Ok(m) => Some(m),
                    Err(_) => break,
                },
            };
            match msg {
                Some(Msg::Arm(deadline, cb)) => pending = Some((deadline, cb)),
                Some(Msg::Cancel) => pending = None,
                Some(Msg::Shutdown) => break,
                None => {
                    if let Some((_, cb)) = pending.take() {
                        cb();
                    }
                }
            }
        }
        tracing::trace!("timer thread exiting cleanly");
    }
}

impl OneShotTimer for ThreadTimer {
    fn set(&self, delay: Duration, callback: TimerCallback) {
        let deadline = Instant::now() + delay;
        if self.tx.send(Msg::Arm(deadline, callback)).is_err() {
            tracing::warn!("timer thread is gone; callback dropped");
        }
    }

    fn cancel(&self) {
        let _ = self.tx.send(Msg::Cancel);
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        let _ = self.tx.send(Msg::Shutdown);
        if let Some(handle) = self.join_handle.take() {
            if handle.thread().id() == std::thread::current().id() {
                // Dropped from inside one of our own callbacks.
                return;
            }
            if let Err(e) = handle.join() {
                tracing::warn!(?e, "timer thread panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{CompletionEvent, EventState};

    #[test]
    fn fires_after_delay() {
        let timer = ThreadTimer::new("t");
        let ev = CompletionEvent::new("fired");
        let e = ev.clone();
        timer.set(Duration::from_millis(10), Box::new(move || e.signal()));
        assert_eq!(ev.wait_timeout(Duration::from_secs(5)), EventState::Signaled);
    }

    #[test]
    fn rearm_replaces_pending_callback() {
        let timer = ThreadTimer::new("t");
        let first = CompletionEvent::new("first");
        let second = CompletionEvent::new("second");
        let f = first.clone();
        let s = second.clone();
        timer.set(Duration::from_millis(50), Box::new(move || f.signal()));
        timer.set(Duration::from_millis(5), Box::new(move || s.signal()));
        assert_eq!(second.wait_timeout(Duration::from_secs(5)), EventState::Signaled);
        std::thread::sleep(Duration::from_millis(80));
        assert!(!first.is_signaled());
    }

    #[test]
    fn cancel_prevents_callback() {
        let timer = ThreadTimer::new("t");
        let ev = CompletionEvent::new("never");
        let e = ev.clone();
        timer.set(Duration::from_millis(20), Box::new(move || e.signal()));
        timer.cancel();
        std::thread::sleep(Duration::from_millis(60));
        assert!(!ev.is_signaled());
    }
}
