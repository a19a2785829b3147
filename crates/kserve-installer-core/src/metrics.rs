//! Global atomic counters for installer observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. on controller shutdown).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Pass and apply counters.
pub struct Metrics {
    passes_started: AtomicU64,
    passes_converged: AtomicU64,
    passes_failed: AtomicU64,
    stale_triggers: AtomicU64,
    objects_applied: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            passes_started: AtomicU64::new(0),
            passes_converged: AtomicU64::new(0),
            passes_failed: AtomicU64::new(0),
            stale_triggers: AtomicU64::new(0),
            objects_applied: AtomicU64::new(0),
        }
    }

    pub fn inc_passes_started(&self) {
        self.passes_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_passes_converged(&self) {
        self.passes_converged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_passes_failed(&self) {
        self.passes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_stale_triggers(&self) {
        self.stale_triggers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_objects_applied(&self) {
        self.objects_applied.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "objects_applied", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            passes_started = self.passes_started(),
            passes_converged = self.passes_converged(),
            passes_failed = self.passes_failed(),
            stale_triggers = self.stale_triggers(),
            objects_applied = self.objects_applied(),
        );
    }

    pub fn passes_started(&self) -> u64 {
        self.passes_started.load(Ordering::Relaxed)
    }

    pub fn passes_converged(&self) -> u64 {
        self.passes_converged.load(Ordering::Relaxed)
    }

    pub fn passes_failed(&self) -> u64 {
        self.passes_failed.load(Ordering::Relaxed)
    }

    pub fn stale_triggers(&self) -> u64 {
        self.stale_triggers.load(Ordering::Relaxed)
    }

    pub fn objects_applied(&self) -> u64 {
        self.objects_applied.load(Ordering::Relaxed)
    }
}
