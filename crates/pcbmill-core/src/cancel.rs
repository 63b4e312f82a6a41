//! Cooperative cancellation.

use crate::error::{CamError, CamResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Cloneable flag shared between a worker and whoever may abort it.
///
/// Long-running entry points poll [`CancellationToken::check`] between
/// discrete units of work (statement, polygon, tool).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self) {
        if !self.flag.swap(true, Ordering::Relaxed) {
            debug!("Cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// `Err(CamError::Cancelled)` once cancellation was requested.
    pub fn check(&self) -> CamResult<()> {
        if self.is_cancelled() {
            Err(CamError::Cancelled)
        } else {
            Ok(())
        }
    }
}
