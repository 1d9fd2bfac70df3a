//! Exclusive-ownership arbitration for shared actuators.
use crate::notifier::CompletionEvent;
use parking_lot::Mutex;
use std::sync::Arc;

/// Gate that decides whether a caller may command an actuator.
pub trait OwnershipGate: Send + Sync {
    /// Try to acquire ownership for `owner`.
    ///
    /// Returns a proxy event when ownership was newly acquired: signaling the
    /// proxy releases ownership and then signals `completion`. Returns `None`
    /// when `owner` already held it or when someone else does.
    fn acquire(&self, owner: &str, completion: Option<CompletionEvent>) -> Option<CompletionEvent>;

    /// `None` passes only while nobody owns the actuator.
    fn validate(&self, owner: Option<&str>) -> bool;

    fn release(&self, owner: &str) -> bool;

    fn owner(&self) -> Option<String>;
}

/// Single-resource gate: at most one owner at a time.
#[derive(Debug, Clone, Default)]
pub struct ExclusiveOwnership {
    current: Arc<Mutex<Option<String>>>,
}

impl ExclusiveOwnership {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OwnershipGate for ExclusiveOwnership {
    fn acquire(&self, owner: &str, completion: Option<CompletionEvent>) -> Option<CompletionEvent> {
        {
            let mut cur = self.current.lock();
            if cur.is_some() {
                return None;
            }
            *cur = Some(owner.to_string());
        }
        tracing::debug!(owner, "ownership acquired");

        let proxy = CompletionEvent::new(format!("release:{owner}"));
        let current = self.current.clone();
        let owner = owner.to_string();
        proxy.set_callback(move |signaled| {
            {
                let mut cur = current.lock();
                if cur.as_deref() == Some(owner.as_str()) {
                    *cur = None;
                }
            }
            tracing::debug!(owner = %owner, "ownership released");
            if let Some(ev) = completion {
                if signaled {
                    ev.signal();
                } else {
                    ev.cancel();
                }
            }
        });
        Some(proxy)
    }

    fn validate(&self, owner: Option<&str>) -> bool {
        let cur = self.current.lock();
        match (cur.as_deref(), owner) {
            (None, _) => true,
            (Some(held), Some(o)) => held == o,
            (Some(_), None) => false,
        }
    }

    fn release(&self, owner: &str) -> bool {
        let mut cur = self.current.lock();
        if cur.as_deref() == Some(owner) {
            *cur = None;
            true
        } else {
            false
        }
    }

    fn owner(&self) -> Option<String> {
        self.current.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_owner_is_rejected_until_release() {
        let gate = ExclusiveOwnership::new();
        assert!(gate.acquire("arm", None).is_some());
        assert!(gate.validate(Some("arm")));
        assert!(gate.acquire("drive", None).is_none());
        assert!(!gate.validate(Some("drive")));
        assert!(!gate.validate(None));
        assert!(gate.release("arm"));
        assert!(gate.validate(None));
    }

    #[test]
    fn signaling_the_proxy_releases_and_forwards() {
        let gate = ExclusiveOwnership::new();
        let done = CompletionEvent::new("done");
        let proxy = gate.acquire("arm", Some(done.clone())).unwrap();
        assert_eq!(gate.owner().as_deref(), Some("arm"));
        proxy.signal();
        assert!(done.is_signaled());
        assert_eq!(gate.owner(), None);
    }

    #[test]
    fn reacquire_by_holder_returns_no_proxy() {
        let gate = ExclusiveOwnership::new();
        let _p = gate.acquire("arm", None);
        assert!(gate.acquire("arm", None).is_none());
        assert!(gate.validate(Some("arm")));
    }
}
