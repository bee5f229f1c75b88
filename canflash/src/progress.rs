//! Progress observer.
//!
//! Sessions report long phases through [`Progress`]. Any
//! `FnMut(&str, usize, usize)` closure is an observer, so callers can pass
//! `&mut |label, total, done| ...` directly.

/// Receives `(label, total, completed)` notifications.
///
/// Called with `completed = 0` when a phase starts, periodically while it
/// runs and with `completed = total` when it ends. Implementations must
/// return quickly; the bus is idle while they run.
pub trait Progress {
    /// Report phase progress.
    fn report(&mut self, label: &str, total: usize, completed: usize);
}

impl<F> Progress for F
where
    F: FnMut(&str, usize, usize),
{
    fn report(&mut self, label: &str, total: usize, completed: usize) {
        self(label, total, completed);
    }
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&mut self, _label: &str, _total: usize, _completed: usize) {}
}
