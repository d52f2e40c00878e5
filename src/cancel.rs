//! Cooperative cancellation for long-running comparisons

use crate::error::{DatadiffError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag a caller flips to ask a running comparison to stop.
///
/// Cloning shares the same flag. The executor only polls it between segments,
/// so an in-flight engine call always finishes before the run stops.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`DatadiffError::Aborted`] if cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(DatadiffError::Aborted)
        } else {
            Ok(())
        }
    }
}
