//! Progress reporting and cooperative cancellation for long operations.
//!
//! Relaxation runs for a fixed number of steps and batch reconstruction may
//! touch many morphologies; both accept a [`Progress`] to report through and,
//! where it makes sense, a [`CancelToken`] that can stop the work early.
//!
//! # Example
//!
//! ```
//! use somamesh::algo::progress::{CancelToken, Progress};
//!
//! let progress = Progress::new(|current, total, message| {
//!     log::info!("[{}/{}] {}", current, total, message);
//! });
//! progress.report(1, 100, "relaxing soma");
//!
//! let token = CancelToken::new();
//! let handle = token.clone();
//! handle.cancel();
//! assert!(token.is_cancelled());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A progress callback that receives updates during long-running operations.
///
/// The callback receives the current step, the total number of steps and a
/// short description of the work being done.
pub struct Progress {
    callback: Box<dyn Fn(usize, usize, &str) + Send + Sync>,
}

impl Progress {
    /// Create a new progress reporter with the given callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Report progress.
    #[inline]
    pub fn report(&self, current: usize, total: usize, message: &str) {
        (self.callback)(current, total, message);
    }

    /// Report progress of a sub-operation occupying slot `range_current` of
    /// `range_total` top-level slots.
    ///
    /// Values are scaled by 1000 so the callback still receives integers.
    #[inline]
    pub fn report_sub(
        &self,
        sub_current: usize,
        sub_total: usize,
        range_current: usize,
        range_total: usize,
        message: &str,
    ) {
        if sub_total == 0 || range_total == 0 {
            return;
        }
        let sub_fraction = (sub_current.min(sub_total) * 1000) / sub_total;
        (self.callback)(range_current * 1000 + sub_fraction, range_total * 1000, message);
    }

    /// Create a no-op progress reporter that discards all updates.
    pub fn none() -> Self {
        Self::new(|_, _, _| {})
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress").finish_non_exhaustive()
    }
}

/// Shared flag used to stop a long operation between steps.
///
/// Clones share the same flag. Cancelling never rolls back work already done.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_report_sub_scales() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress = Progress::new(move |c, t, _| sink.lock().unwrap().push((c, t)));

        progress.report_sub(1, 2, 3, 4, "sub");
        progress.report_sub(1, 0, 3, 4, "ignored");

        assert_eq!(*seen.lock().unwrap(), vec![(3500, 4000)]);
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }
}
