//! Cooperative cancellation of a run.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

const RUNNING: u8 = 0;
const END_EARLY: u8 = 1;
const ABORT: u8 = 2;

/// What the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CancelState {
    Running,
    /// Stop reading input, finish in-flight rows, flush aggregates.
    EndEarly,
    /// Stop as soon as possible; close handles without flushing aggregates.
    Abort,
}

/// Shared cancellation flag. Clones observe the same state.
///
/// Requests only escalate: an abort is never downgraded to end-early.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<AtomicU8>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn end_early(&self) {
        self.state.fetch_max(END_EARLY, Ordering::SeqCst);
    }

    pub fn abort(&self) {
        self.state.fetch_max(ABORT, Ordering::SeqCst);
    }

    /// Escalate one step: running → end early → abort. Returns the new state.
    pub fn escalate(&self) -> CancelState {
        let previous = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| Some((s + 1).min(ABORT)))
            .unwrap_or(ABORT);
        decode((previous + 1).min(ABORT))
    }

    pub fn state(&self) -> CancelState {
        decode(self.state.load(Ordering::SeqCst))
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() != CancelState::Running
    }

    pub fn is_aborted(&self) -> bool {
        self.state() == CancelState::Abort
    }
}

fn decode(raw: u8) -> CancelState {
    match raw {
        RUNNING => CancelState::Running,
        END_EARLY => CancelState::EndEarly,
        _ => CancelState::Abort,
    }
}
