use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

/// Process-wide "can we reach the model" signal. Monotonic: once marked
/// unavailable it stays that way until the process restarts.
#[derive(Debug)]
pub struct ModelAvailability {
    available: AtomicBool,
}

impl Default for ModelAvailability {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ModelAvailability {
    pub fn new(available: bool) -> Self {
        Self { available: AtomicBool::new(available) }
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Returns `true` only for the call that performed the transition.
    pub fn mark_unavailable(&self, reason: &str) -> bool {
        let flipped = self.available.swap(false, Ordering::AcqRel);
        if flipped {
            warn!(
                event_name = "agent.availability.model_unavailable",
                reason,
                "model marked unavailable; using keyword fallback until restart"
            );
        }
        flipped
    }
}
