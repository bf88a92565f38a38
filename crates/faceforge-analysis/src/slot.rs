//! Single-in-flight gate for analysis requests.
//!
//! The analysis trigger must be disabled while a request is outstanding.
//! The slot is the caller-side busy flag: `try_begin` hands out at most one
//! guard at a time, and dropping the guard reopens the slot (on success,
//! failure, or panic alike).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct AnalysisSlot {
    busy: Arc<AtomicBool>,
}

impl AnalysisSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot. `None` while a previous request is still in flight.
    pub fn try_begin(&self) -> Option<AnalysisGuard> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(AnalysisGuard {
                busy: Arc::clone(&self.busy),
            })
        } else {
            None
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

pub struct AnalysisGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for AnalysisGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
