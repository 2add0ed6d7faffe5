use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters recorded on every invocation of a delegate.
///
/// Updated without locking so concurrent evaluations sharing one delegate do
/// not serialize on bookkeeping.
#[derive(Debug, Default)]
pub struct DelegateUsage {
    compile_time: Duration,
    invocations: AtomicU64,
    failures: AtomicU64,
    extractions: AtomicU64,
}

impl DelegateUsage {
    pub fn new(compile_time: Duration) -> Self {
        Self {
            compile_time,
            ..Self::default()
        }
    }

    /// Records one finished invocation that extracted `extracted` values.
    pub fn record(&self, succeeded: bool, extracted: usize) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        self.extractions.fetch_add(extracted as u64, Ordering::Relaxed);
        if !succeeded {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            compile_time: self.compile_time,
            invocations: self.invocations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            extractions: self.extractions.load(Ordering::Relaxed),
        }
    }
}

/// Copy of a delegate's counters at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub compile_time: Duration,
    pub invocations: u64,
    pub failures: u64,
    /// Parameter values materialized across all invocations.
    pub extractions: u64,
}

/// Point-in-time view of both cache tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub delegates: usize,
    pub items: usize,
    pub in_flight: usize,
    pub compilations: u64,
    pub total_uses: u64,
    pub total_failures: u64,
    pub total_compile_time: Duration,
}
