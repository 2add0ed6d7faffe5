use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::{AHashMap, AHashSet};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, trace, warn};

use super::metadata::CacheStats;
use super::DelegateEntry;
use crate::error::CompileError;
use crate::eval::signature::Fingerprint;

type FlightResult = Result<Arc<DelegateEntry>, CompileError>;

/// Compiled delegates shared across handles, keyed by fingerprint.
///
/// At most one compilation per fingerprint runs at a time. A caller that
/// misses while another thread is compiling the same fingerprint blocks until
/// that compilation publishes, then receives the same outcome.
#[derive(Debug, Default)]
pub struct DelegateCache {
    entries: RwLock<AHashMap<Fingerprint, Arc<DelegateEntry>>>,
    in_flight: Mutex<AHashMap<Fingerprint, Arc<Flight>>>,
    compilations: AtomicU64,
}

impl DelegateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<DelegateEntry>> {
        self.entries.read().get(fingerprint).cloned()
    }

    /// Returns the cached delegate for `fingerprint`, running `compile` on a
    /// miss. Failed compilations are not cached.
    pub fn get_or_compile<F>(
        &self,
        fingerprint: &Fingerprint,
        compile: F,
    ) -> Result<Arc<DelegateEntry>, CompileError>
    where
        F: FnOnce() -> Result<DelegateEntry, CompileError>,
    {
        if let Some(entry) = self.get(fingerprint) {
            trace!(fingerprint = %fingerprint, "delegate cache hit");
            return Ok(entry);
        }

        let (flight, leader) = {
            let mut in_flight = self.in_flight.lock();
            // A leader publishes before leaving the in-flight table, so this
            // re-check under the table lock cannot miss a finished compile.
            if let Some(entry) = self.get(fingerprint) {
                return Ok(entry);
            }
            match in_flight.get(fingerprint) {
                Some(flight) => (Arc::clone(flight), false),
                None => {
                    let flight = Flight::new();
                    in_flight.insert(fingerprint.clone(), Arc::clone(&flight));
                    (flight, true)
                }
            }
        };

        if !leader {
            trace!(fingerprint = %fingerprint, "waiting on in-flight compilation");
            return flight.wait();
        }

        let guard = LeaderGuard {
            cache: self,
            fingerprint,
            flight,
            published: false,
        };
        self.compilations.fetch_add(1, Ordering::Relaxed);
        let result = compile().map(Arc::new);
        guard.publish(result)
    }

    /// Drops the entry for `fingerprint`. Idempotent.
    pub fn remove(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.write().remove(fingerprint).is_some()
    }

    /// Drops the entry for `fingerprint` unless `is_referenced` reports a
    /// live user. The check runs under the entries write lock, so it cannot
    /// interleave with [`Self::adopt`].
    pub fn remove_unreferenced<F>(&self, fingerprint: &Fingerprint, is_referenced: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        let mut entries = self.entries.write();
        if !entries.contains_key(fingerprint) || is_referenced() {
            return false;
        }
        entries.remove(fingerprint);
        true
    }

    /// Drops every entry whose fingerprint is missing from the set returned by
    /// `referenced`, which is computed under the entries write lock. Returns
    /// how many were dropped.
    pub fn retain_referenced<F>(&self, referenced: F) -> usize
    where
        F: FnOnce() -> AHashSet<Fingerprint>,
    {
        let mut entries = self.entries.write();
        let referenced = referenced();
        let before = entries.len();
        entries.retain(|fingerprint, _| referenced.contains(fingerprint));
        before - entries.len()
    }

    /// Re-publishes `entry` after it was attached to an item, in case a
    /// removal ran between compiling and attaching. `is_live` is checked under
    /// the entries write lock so a disposed item does not resurrect its
    /// delegate. A different delegate already cached under the same
    /// fingerprint is left in place.
    pub fn adopt<F>(&self, entry: &Arc<DelegateEntry>, is_live: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        let mut entries = self.entries.write();
        if entries.contains_key(entry.fingerprint()) || !is_live() {
            return false;
        }
        debug!(fingerprint = %entry.fingerprint(), "re-publishing attached delegate");
        entries.insert(entry.fingerprint().clone(), Arc::clone(entry));
        true
    }

    pub fn count(&self) -> usize {
        self.entries.read().len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Number of times the compile step has been started.
    pub fn compilations(&self) -> u64 {
        self.compilations.load(Ordering::Relaxed)
    }

    /// Abandons every in-flight compilation: waiters are woken with an
    /// abandoned [`CompileError`] and the fingerprints become compilable
    /// again.
    ///
    /// A leader that is still running keeps going and will publish its entry
    /// when it finishes, possibly racing a new leader for the same key. Only
    /// call this to recover from a compilation that is known to be stuck.
    pub fn release_locks(&self) -> usize {
        let abandoned: Vec<_> = self.in_flight.lock().drain().collect();
        for (fingerprint, flight) in &abandoned {
            warn!(fingerprint = %fingerprint, "force-releasing in-flight compilation");
            flight.complete(Err(CompileError::abandoned(fingerprint.clone())));
        }
        abandoned.len()
    }

    /// Statistics for this tier; `items` is left at zero.
    pub fn stats(&self) -> CacheStats {
        let in_flight = self.in_flight();
        let entries = self.entries.read();
        let mut stats = CacheStats {
            delegates: entries.len(),
            in_flight,
            compilations: self.compilations(),
            ..CacheStats::default()
        };
        for entry in entries.values() {
            let usage = entry.usage();
            stats.total_uses += usage.invocations;
            stats.total_failures += usage.failures;
            stats.total_compile_time += usage.compile_time;
        }
        stats
    }
}

/// Completion slot for one in-flight compilation.
#[derive(Debug)]
struct Flight {
    outcome: Mutex<Option<FlightResult>>,
    condvar: Condvar,
}

impl Flight {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(None),
            condvar: Condvar::new(),
        })
    }

    /// First completion wins; later ones are ignored.
    fn complete(&self, result: FlightResult) {
        let mut outcome = self.outcome.lock();
        if outcome.is_none() {
            *outcome = Some(result);
        }
        self.condvar.notify_all();
    }

    fn wait(&self) -> FlightResult {
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(result) = outcome.as_ref() {
                return result.clone();
            }
            self.condvar.wait(&mut outcome);
        }
    }
}

/// Publishes the leader's outcome, or an abandoned error if the compile step
/// unwinds before publishing.
struct LeaderGuard<'a> {
    cache: &'a DelegateCache,
    fingerprint: &'a Fingerprint,
    flight: Arc<Flight>,
    published: bool,
}

impl LeaderGuard<'_> {
    fn publish(mut self, result: FlightResult) -> FlightResult {
        if let Ok(entry) = &result {
            self.cache
                .entries
                .write()
                .insert(self.fingerprint.clone(), Arc::clone(entry));
            debug!(fingerprint = %self.fingerprint, "delegate published");
        }
        self.finish(result.clone());
        self.published = true;
        result
    }

    fn finish(&self, result: FlightResult) {
        {
            let mut in_flight = self.cache.in_flight.lock();
            if in_flight
                .get(self.fingerprint)
                .is_some_and(|current| Arc::ptr_eq(current, &self.flight))
            {
                in_flight.remove(self.fingerprint);
            }
        }
        self.flight.complete(result);
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.published {
            warn!(fingerprint = %self.fingerprint, "compilation abandoned before publishing");
            self.finish(Err(CompileError::abandoned(self.fingerprint.clone())));
        }
    }
}
