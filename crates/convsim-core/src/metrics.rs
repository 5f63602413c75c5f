//! Global atomic counters for convsim.
//!
//! Counters are bumped at the call site; [`Metrics::flush`] emits them as a
//! single `info!` event at the end of a batch.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free run and environment counters.
pub struct Metrics {
    environments_started: AtomicU64,
    environments_stopped: AtomicU64,
    teardown_warnings: AtomicU64,
    runs_succeeded: AtomicU64,
    runs_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            environments_started: AtomicU64::new(0),
            environments_stopped: AtomicU64::new(0),
            teardown_warnings: AtomicU64::new(0),
            runs_succeeded: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
        }
    }

    pub fn inc_environments_started(&self) {
        self.environments_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "environments_started", "counter incremented");
    }

    pub fn inc_environments_stopped(&self) {
        self.environments_stopped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "environments_stopped", "counter incremented");
    }

    pub fn inc_teardown_warnings(&self) {
        self.teardown_warnings.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "teardown_warnings", "counter incremented");
    }

    pub fn inc_runs_succeeded(&self) {
        self.runs_succeeded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_succeeded", "counter incremented");
    }

    pub fn inc_runs_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_failed", "counter incremented");
    }

    /// Emit all counters as one `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            environments_started = self.environments_started(),
            environments_stopped = self.environments_stopped(),
            teardown_warnings = self.teardown_warnings(),
            runs_succeeded = self.runs_succeeded(),
            runs_failed = self.runs_failed(),
        );
    }

    pub fn environments_started(&self) -> u64 {
        self.environments_started.load(Ordering::Relaxed)
    }

    pub fn environments_stopped(&self) -> u64 {
        self.environments_stopped.load(Ordering::Relaxed)
    }

    pub fn teardown_warnings(&self) -> u64 {
        self.teardown_warnings.load(Ordering::Relaxed)
    }

    pub fn runs_succeeded(&self) -> u64 {
        self.runs_succeeded.load(Ordering::Relaxed)
    }

    pub fn runs_failed(&self) -> u64 {
        self.runs_failed.load(Ordering::Relaxed)
    }

    /// Reset all counters (tests).
    pub fn reset(&self) {
        self.environments_started.store(0, Ordering::Relaxed);
        self.environments_stopped.store(0, Ordering::Relaxed);
        self.teardown_warnings.store(0, Ordering::Relaxed);
        self.runs_succeeded.store(0, Ordering::Relaxed);
        self.runs_failed.store(0, Ordering::Relaxed);
    }
}
