//! Revocation lifecycle: chains of cleanup callbacks run exactly once
//!
//! Anything holding secret material owns a [`Revocable`] registry.
//! Revoking runs every registered callback in reverse registration
//! order (the same order Rust drops fields), exactly once. Cascading
//! is explicit: a parent registers a callback that revokes each child.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

use tracing::warn;

type Revoker = Box<dyn FnOnce() + Send>;

enum State {
    Armed(Vec<Revoker>),
    Revoked,
}

/// A registry of revocation callbacks.
pub struct Revocable {
    state: Mutex<State>,
}

impl Revocable {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Armed(Vec::new())),
        }
    }

    /// Register a cleanup callback.
    ///
    /// If the registry was already revoked the callback runs
    /// immediately, so late registrations cannot leak cleanup work.
    pub fn add_revoker(&self, f: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock().expect("revocation lock poisoned");
        match &mut *state {
            State::Armed(revokers) => revokers.push(Box::new(f)),
            State::Revoked => {
                drop(state);
                run_revoker(Box::new(f));
            }
        }
    }

    /// Run all registered callbacks, newest first.
    ///
    /// Returns `true` on the call that performed revocation; a second
    /// call is a no-op returning `false`. A panicking callback does not
    /// prevent the remaining callbacks from running.
    pub fn revoke(&self) -> bool {
        let revokers = {
            let mut state = self.state.lock().expect("revocation lock poisoned");
            match std::mem::replace(&mut *state, State::Revoked) {
                State::Armed(revokers) => revokers,
                State::Revoked => return false,
            }
        };
        for revoker in revokers.into_iter().rev() {
            run_revoker(revoker);
        }
        true
    }

    /// Whether `revoke` has already run.
    pub fn is_revoked(&self) -> bool {
        matches!(
            *self.state.lock().expect("revocation lock poisoned"),
            State::Revoked
        )
    }
}

impl Default for Revocable {
    fn default() -> Self {
        Self::new()
    }
}

fn run_revoker(revoker: Revoker) {
    if catch_unwind(AssertUnwindSafe(revoker)).is_err() {
        warn!("revocation callback panicked; continuing with remaining callbacks");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_revoke_runs_callbacks_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = Revocable::new();
        for _ in 0..3 {
            let counter = counter.clone();
            registry.add_revoker(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(registry.revoke());
        assert!(!registry.revoke());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(registry.is_revoked());
    }

    #[test]
    fn test_reverse_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let registry = Revocable::new();
        for i in 0..3 {
            let order = order.clone();
            registry.add_revoker(move || order.lock().unwrap().push(i));
        }
        registry.revoke();
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_chain() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = Revocable::new();
        {
            let counter = counter.clone();
            registry.add_revoker(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        registry.add_revoker(|| panic!("boom"));
        registry.revoke();
        // The panicking callback ran first (reverse order) and did not
        // stop the earlier registration from running.
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_late_registration_runs_immediately() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = Revocable::new();
        registry.revoke();
        let late = counter.clone();
        registry.add_revoker(move || {
            late.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
