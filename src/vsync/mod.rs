//! Refresh pacing
//!
//! The frame loop blocks on a [`VsyncGate`] once per frame, so every active
//! session advances in lock-step with the display refresh.

pub mod timed;

pub use timed::TimedVsync;

use std::sync::atomic::{AtomicU64, Ordering};

/// NTSC refresh rate, the emulated console's native output
pub const REFRESH_RATE_NTSC: f64 = 60.0;

/// Process-wide display refresh signal
pub trait VsyncGate: Send + Sync {
    /// Block the calling thread until the next refresh edge
    fn wait_for_next(&self);
}

/// Gate that never blocks
///
/// Useful for dry runs and tests: a session runs as fast as the CPU allows
/// while still producing one commit per frame.
#[derive(Debug, Default)]
pub struct UnthrottledVsync {
    waits: AtomicU64,
}

impl UnthrottledVsync {
    /// Create an unthrottled gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of `wait_for_next` calls across all sessions
    pub fn waits(&self) -> u64 {
        self.waits.load(Ordering::Relaxed)
    }
}

impl VsyncGate for UnthrottledVsync {
    fn wait_for_next(&self) {
        self.waits.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unthrottled_counts_waits() {
        let gate = UnthrottledVsync::new();
        gate.wait_for_next();
        gate.wait_for_next();
        assert_eq!(gate.waits(), 2);
    }
}
