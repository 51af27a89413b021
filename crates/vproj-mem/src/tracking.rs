//! Peak usage and allocation counts for a budget.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct PeakTracker {
    peak_bytes: AtomicUsize,
    reservations: AtomicU64,
}

impl PeakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note a successful reservation that brought usage to `used_bytes`.
    pub fn record_used(&self, used_bytes: usize) {
        self.reservations.fetch_add(1, Ordering::Relaxed);
        let prev = self.peak_bytes.fetch_max(used_bytes, Ordering::AcqRel);
        if used_bytes > prev {
            #[cfg(feature = "tracing")]
            tracing::trace!(used_bytes, "new budget peak");
        }
    }

    pub fn peak(&self) -> usize {
        self.peak_bytes.load(Ordering::Relaxed)
    }

    /// Number of `record_used` calls so far.
    pub fn reservations(&self) -> u64 {
        self.reservations.load(Ordering::Relaxed)
    }
}
