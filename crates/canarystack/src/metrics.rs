//! Atomic counters for stack observability.
//!
//! All counters use relaxed ordering. They are diagnostic only, never
//! synchronization primitives.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global stack operation counters.
pub struct StackMetrics {
    /// Stacks successfully initialized.
    pub stacks_created: AtomicU64,
    /// Stacks released through destroy.
    pub stacks_destroyed: AtomicU64,
    /// Successful pushes.
    pub pushes: AtomicU64,
    /// Pops that returned a value.
    pub pops: AtomicU64,
    /// Pops rejected because the stack was empty.
    pub empty_pops: AtomicU64,
    /// Full integrity verifications performed.
    pub verifications: AtomicU64,
    /// Size/capacity/layout inconsistencies observed.
    pub bounds_failures: AtomicU64,
    /// Sentinel comparisons that failed (overrun detected).
    pub canary_failures: AtomicU64,
    /// Checksum comparisons that failed (in-place corruption detected).
    pub checksum_failures: AtomicU64,
    /// Capacity doublings.
    pub grows: AtomicU64,
    /// Capacity quarterings.
    pub shrinks: AtomicU64,
    /// Allocation or reallocation failures.
    pub out_of_memory: AtomicU64,
    /// Corruption verdicts routed to the reporting path.
    pub corruption_reports: AtomicU64,
    /// Dump blocks rendered (explicit or automatic).
    pub dumps_rendered: AtomicU64,
    /// Automatic dumps delivered to a sink.
    pub dumps_written: AtomicU64,
    /// Automatic dumps lost to a failing sink.
    pub dump_failures: AtomicU64,
}

impl StackMetrics {
    /// Create a new zeroed metrics instance.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            stacks_created: AtomicU64::new(0),
            stacks_destroyed: AtomicU64::new(0),
            pushes: AtomicU64::new(0),
            pops: AtomicU64::new(0),
            empty_pops: AtomicU64::new(0),
            verifications: AtomicU64::new(0),
            bounds_failures: AtomicU64::new(0),
            canary_failures: AtomicU64::new(0),
            checksum_failures: AtomicU64::new(0),
            grows: AtomicU64::new(0),
            shrinks: AtomicU64::new(0),
            out_of_memory: AtomicU64::new(0),
            corruption_reports: AtomicU64::new(0),
            dumps_rendered: AtomicU64::new(0),
            dumps_written: AtomicU64::new(0),
            dump_failures: AtomicU64::new(0),
        }
    }

    /// Increment a counter by 1.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read a counter value.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Snapshot all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            stacks_created: Self::get(&self.stacks_created),
            stacks_destroyed: Self::get(&self.stacks_destroyed),
            pushes: Self::get(&self.pushes),
            pops: Self::get(&self.pops),
            empty_pops: Self::get(&self.empty_pops),
            verifications: Self::get(&self.verifications),
            bounds_failures: Self::get(&self.bounds_failures),
            canary_failures: Self::get(&self.canary_failures),
            checksum_failures: Self::get(&self.checksum_failures),
            grows: Self::get(&self.grows),
            shrinks: Self::get(&self.shrinks),
            out_of_memory: Self::get(&self.out_of_memory),
            corruption_reports: Self::get(&self.corruption_reports),
            dumps_rendered: Self::get(&self.dumps_rendered),
            dumps_written: Self::get(&self.dumps_written),
            dump_failures: Self::get(&self.dump_failures),
        }
    }
}

impl Default for StackMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of all counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub stacks_created: u64,
    pub stacks_destroyed: u64,
    pub pushes: u64,
    pub pops: u64,
    pub empty_pops: u64,
    pub verifications: u64,
    pub bounds_failures: u64,
    pub canary_failures: u64,
    pub checksum_failures: u64,
    pub grows: u64,
    pub shrinks: u64,
    pub out_of_memory: u64,
    pub corruption_reports: u64,
    pub dumps_rendered: u64,
    pub dumps_written: u64,
    pub dump_failures: u64,
}

/// Global metrics instance.
static GLOBAL_METRICS: StackMetrics = StackMetrics::new();

/// Access the global metrics singleton.
#[must_use]
pub fn global_metrics() -> &'static StackMetrics {
    &GLOBAL_METRICS
}
