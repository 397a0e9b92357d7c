//! Run-exactly-once gate.
//!
//! [`Once`] guarantees that an action runs to completion exactly once across
//! every caller of the same gate. Callers that race the first execution, and
//! callers that arrive afterwards, only return once that single execution has
//! finished. Class descriptors are materialized through it.
//!
//! # States
//!
//! The gate moves `UNSTARTED -> IN_PROGRESS -> DONE` exactly once. If the
//! action panics the gate becomes `POISONED` instead, and every later caller
//! aborts: the guarded state was left half-built.
//!
//! # Thread Safety
//!
//! The fast path is a single `Acquire` load once the gate is done. Contended
//! callers sleep on a condition variable; the completing thread publishes the
//! final state while holding the same mutex, so no wakeup can be lost.

use objkit_log::error;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU8, Ordering};

const UNSTARTED: u8 = 0;
const IN_PROGRESS: u8 = 1;
const DONE: u8 = 2;
const POISONED: u8 = 3;

/// A process-wide run-exactly-once primitive.
///
/// # Example
///
/// ```rust
/// use objkit::runtime::Once;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// static GATE: Once = Once::new();
/// static RUNS: AtomicUsize = AtomicUsize::new(0);
///
/// for _ in 0..3 {
///     GATE.call_once(|| {
///         RUNS.fetch_add(1, Ordering::SeqCst);
///     });
/// }
///
/// assert_eq!(RUNS.load(Ordering::SeqCst), 1);
/// assert!(GATE.is_completed());
/// ```
pub struct Once {
    state: AtomicU8,
    lock: Mutex<()>,
    completed: Condvar,
}

impl Once {
    /// Creates a gate that has not run yet.
    #[must_use]
    pub const fn new() -> Self {
        Once {
            state: AtomicU8::new(UNSTARTED),
            lock: Mutex::new(()),
            completed: Condvar::new(),
        }
    }

    /// Returns `true` once the action has run to completion.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state.load(Ordering::Acquire) == DONE
    }

    /// Runs `action` if no caller has run it yet, otherwise waits for the
    /// caller that did.
    ///
    /// Calling `call_once` on the same gate from inside `action` deadlocks.
    ///
    /// # Panics
    ///
    /// Panics if a previous action on this gate panicked.
    pub fn call_once<F>(&self, action: F)
    where
        F: FnOnce(),
    {
        if self.state.load(Ordering::Acquire) == DONE {
            return;
        }
        self.call_once_slow(action);
    }

    #[cold]
    fn call_once_slow<F>(&self, action: F)
    where
        F: FnOnce(),
    {
        match self.state.compare_exchange(
            UNSTARTED,
            IN_PROGRESS,
            Ordering::Acquire,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                let mut completion = Completion {
                    gate: self,
                    outcome: POISONED,
                };
                action();
                completion.outcome = DONE;
            }
            Err(_) => self.wait(),
        }
    }

    fn wait(&self) {
        let mut guard = self.lock.lock();
        loop {
            match self.state.load(Ordering::Acquire) {
                DONE => return,
                POISONED => {
                    drop(guard);
                    error!("once-gate used after its action panicked");
                    panic!("Once gate poisoned: the initializer panicked");
                }
                _ => self.completed.wait(&mut guard),
            }
        }
    }
}

impl Default for Once {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes the gate's final state, including when the action unwinds.
struct Completion<'a> {
    gate: &'a Once,
    outcome: u8,
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        let _guard = self.gate.lock.lock();
        self.gate.state.store(self.outcome, Ordering::Release);
        self.gate.completed.notify_all();
    }
}
