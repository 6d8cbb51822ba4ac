//! # Completion Tracker
//!
//! Pending-work counter gating [`super::Machine::wait`]. Incremented before a
//! job is handed to the job queue, decremented once the job (and its result,
//! if any) has been fully handled.

use std::sync::{Condvar, Mutex, MutexGuard};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a pipeline thread terminated with {pending} job(s) still pending")]
pub struct Aborted {
    pub pending: u64,
}

#[derive(Debug, Default)]
struct State {
    pending: u64,
    aborted: bool,
}

#[derive(Debug, Default)]
pub struct CompletionTracker {
    state: Mutex<State>,
    idle: Condvar,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // Counter updates never leave the state half-written, so a poisoned lock is
    // still safe to read.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register one job. Must happen before the job is enqueued.
    pub fn submit(&self) {
        self.lock().pending += 1;
    }

    /// Mark one job as fully handled.
    pub fn complete(&self) {
        let mut state = self.lock();
        state.pending = state.pending.saturating_sub(1);
        if state.pending == 0 {
            self.idle.notify_all();
        }
    }

    /// Fail every current and future waiter.
    pub fn abort(&self) {
        self.lock().aborted = true;
        self.idle.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.lock().aborted
    }

    pub fn pending(&self) -> u64 {
        self.lock().pending
    }

    /// Block until nothing is pending.
    pub fn wait(&self) -> Result<(), Aborted> {
        let mut state = self.lock();
        loop {
            if state.aborted {
                return Err(Aborted {
                    pending: state.pending,
                });
            }
            if state.pending == 0 {
                return Ok(());
            }
            state = self
                .idle
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

/// Aborts the tracker if dropped while the owning thread is panicking.
pub(crate) struct AbortOnPanic<'a>(pub(crate) &'a CompletionTracker);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abort();
        }
    }
}
