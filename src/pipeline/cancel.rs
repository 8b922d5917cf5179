use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::TransformError;

/// Cooperative cancellation shared by every task of one analysis.
///
/// Cloning is cheap; all clones observe the same flag. Generators call
/// [`check`](Self::check) between frames or scales.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// Token that only trips when [`cancel`](Self::cancel) is called
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that also trips once `timeout` has elapsed from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Same flag, additionally tripping after `timeout`. An earlier
    /// existing deadline is kept.
    pub fn with_deadline(mut self, timeout: Duration) -> Self {
        let requested = Instant::now().checked_add(timeout);
        self.deadline = match (self.deadline, requested) {
            (Some(current), Some(requested)) => Some(current.min(requested)),
            (current, requested) => current.or(requested),
        };
        self
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self.deadline.map_or(false, |deadline| Instant::now() >= deadline)
    }

    /// `Err(Cancelled)` once the token has tripped
    pub fn check(&self) -> Result<(), TransformError> {
        if self.is_cancelled() {
            Err(TransformError::Cancelled)
        } else {
            Ok(())
        }
    }
}
