//! Progress reporting and cooperative cancellation for long-running scans.
//!
//! Every long loop in the crate (index build, per-document verification,
//! per-chunk composition scan) takes a [`Monitor`]. The monitor forwards
//! `(current, total)` pairs to an optional callback on the scanning thread
//! and exposes a [`CancelFlag`] that the loop polls between batches. A
//! cancelled scan still returns successfully, wrapped in an [`Outcome`]
//! whose [`Completion`] says how far it got.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use serde::Serialize;

/// Shared cancellation flag.
///
/// Clones share the same underlying flag, so a caller can keep one copy and
/// hand another to the [`Monitor`] driving a scan on a worker thread.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Scans notice it at their next batch boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Progress sink plus cancellation flag for one operation at a time.
///
/// Reports are monotonic: once `current` has been reported, a smaller value
/// for the same operation is dropped rather than forwarded.
pub struct Monitor<'a> {
    callback: Option<Box<dyn FnMut(usize, usize) + 'a>>,
    cancel: CancelFlag,
    total: usize,
    last: Option<usize>,
}

impl<'a> Monitor<'a> {
    /// A monitor that reports nowhere and is never cancelled.
    pub fn silent() -> Self {
        Self {
            callback: None,
            cancel: CancelFlag::default(),
            total: 0,
            last: None,
        }
    }

    /// A monitor forwarding progress to `callback`.
    pub fn new(callback: impl FnMut(usize, usize) + 'a) -> Self {
        Self {
            callback: Some(Box::new(callback)),
            ..Self::silent()
        }
    }

    /// Attach a cancellation flag.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Begin a new operation over `total` units and report `(0, total)`.
    pub fn start(&mut self, total: usize) {
        self.total = total;
        self.last = None;
        self.update(0);
    }

    /// Report that `current` units of the current operation are done.
    pub fn update(&mut self, current: usize) {
        if self.last.is_some_and(|last| current < last) {
            return;
        }
        self.last = Some(current);
        if let Some(callback) = self.callback.as_mut() {
            callback(current, self.total);
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for Monitor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("total", &self.total)
            .field("last", &self.last)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Whether a scan ran to the end or stopped at a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Completion {
    Completed,
    Cancelled { processed: usize, total: usize },
}

/// Result of a cancellable operation. `value` is always internally
/// consistent; when cancelled it holds whatever was found before the stop.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    pub value: T,
    pub completion: Completion,
}

impl<T> Outcome<T> {
    pub fn completed(value: T) -> Self {
        Self {
            value,
            completion: Completion::Completed,
        }
    }

    pub fn cancelled(value: T, processed: usize, total: usize) -> Self {
        Self {
            value,
            completion: Completion::Cancelled { processed, total },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.completion, Completion::Cancelled { .. })
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            completion: self.completion,
        }
    }
}
