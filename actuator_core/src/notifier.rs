//! One-shot completion events.
//!
//! A `CompletionEvent` is a cheap clonable handle; every clone observes the
//! same state. The core signals an event at most once per command and drops
//! its own handle immediately afterwards.
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

/// Callback attached to an event. Runs once, on the signaling thread, outside
/// the event's lock. The argument is `true` for a signal and `false` for a
/// cancellation.
pub type EventCallback = Box<dyn FnOnce(bool) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    Pending,
    Signaled,
    Canceled,
}

struct Inner {
    state: Mutex<(EventState, Option<EventCallback>)>,
    cv: Condvar,
}

#[derive(Clone)]
pub struct CompletionEvent {
    name: Arc<str>,
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CompletionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionEvent")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl CompletionEvent {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Inner {
                state: Mutex::new((EventState::Pending, None)),
                cv: Condvar::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the event to `Pending`. An attached callback is kept.
    pub fn clear(&self) {
        self.inner.state.lock().0 = EventState::Pending;
    }

    pub fn signal(&self) {
        self.finish(EventState::Signaled);
    }

    pub fn cancel(&self) {
        self.finish(EventState::Canceled);
    }

    fn finish(&self, to: EventState) {
        let cb = {
            let mut guard = self.inner.state.lock();
            if guard.0 != EventState::Pending {
                return;
            }
            guard.0 = to;
            guard.1.take()
        };
        self.inner.cv.notify_all();
        if let Some(cb) = cb {
            cb(to == EventState::Signaled);
        }
    }

    /// Attach a callback, replacing any previous one. If the event already
    /// finished the callback runs immediately.
    pub fn set_callback(&self, cb: impl FnOnce(bool) + Send + 'static) {
        let state = {
            let mut guard = self.inner.state.lock();
            if guard.0 == EventState::Pending {
                guard.1 = Some(Box::new(cb));
                return;
            }
            guard.0
        };
        cb(state == EventState::Signaled);
    }

    pub fn state(&self) -> EventState {
        self.inner.state.lock().0
    }

    pub fn is_signaled(&self) -> bool {
        self.state() == EventState::Signaled
    }

    pub fn is_canceled(&self) -> bool {
        self.state() == EventState::Canceled
    }

    /// Block until the event leaves `Pending` or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> EventState {
        let mut guard = self.inner.state.lock();
        if guard.0 == EventState::Pending {
            let _ = self
                .inner
                .cv
                .wait_while_for(&mut guard, |s| s.0 == EventState::Pending, timeout);
        }
        guard.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn signal_runs_callback_once() {
        let ev = CompletionEvent::new("move");
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        ev.set_callback(move |ok| {
            assert!(ok);
            h.fetch_add(1, Ordering::SeqCst);
        });
        ev.signal();
        ev.signal();
        assert!(ev.is_signaled());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn canceled_event_does_not_become_signaled() {
        let ev = CompletionEvent::new("move");
        ev.cancel();
        ev.signal();
        assert!(ev.is_canceled());
        ev.clear();
        assert_eq!(ev.state(), EventState::Pending);
    }

    #[test]
    fn wait_returns_when_signaled_from_another_thread() {
        let ev = CompletionEvent::new("move");
        let other = ev.clone();
        let t = std::thread::spawn(move || other.signal());
        assert_eq!(ev.wait_timeout(Duration::from_secs(5)), EventState::Signaled);
        t.join().unwrap();
    }
}
