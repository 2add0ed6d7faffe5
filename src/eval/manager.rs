use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::OnceCell;
use tracing::{debug, trace, warn};

use super::binder::{Arguments, BindingKind};
use super::cache::{CacheStats, DelegateCache, DelegateEntry, Handle, Item, ItemCache, ItemSnapshot};
use super::compiler::{Backend, Compiler};
use super::signature::Fingerprint;
use crate::config::EvalConfig;
use crate::error::EvalError;
use crate::value::{FromValue, TypeDescriptor, Value};

static GLOBAL: OnceCell<EvalManager> = OnceCell::new();

/// Owns both cache tiers and the handles that reference them.
///
/// Managers are independent: each has its own item and delegate caches. A
/// process-wide instance can be installed with [`EvalManager::install_global`].
#[derive(Debug)]
pub struct EvalManager {
    compiler: Compiler,
    delegates: DelegateCache,
    items: ItemCache,
    config: EvalConfig,
    sweeping: AtomicBool,
}

impl EvalManager {
    pub fn new(backend: Arc<dyn Backend>, config: EvalConfig) -> Self {
        Self {
            compiler: Compiler::new(backend),
            delegates: DelegateCache::new(),
            items: ItemCache::new(),
            config,
            sweeping: AtomicBool::new(false),
        }
    }

    /// Installs the process-wide manager. Returns false if one is already
    /// installed, in which case the existing manager is kept.
    pub fn install_global(backend: Arc<dyn Backend>, config: EvalConfig) -> bool {
        GLOBAL.set(Self::new(backend, config)).is_ok()
    }

    pub fn global() -> Option<&'static Self> {
        GLOBAL.get()
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Registers `source` under the configured default binding convention.
    pub fn create(&self, source: impl Into<Arc<str>>) -> Handle {
        self.create_with(source, self.config.default_binding)
    }

    pub fn create_with(&self, source: impl Into<Arc<str>>, binding: BindingKind) -> Handle {
        let handle = Handle::next();
        self.items.insert(handle, Item::new(source, binding));
        debug!(handle = %handle, binding = %binding, "handle created");
        handle
    }

    /// Sets parameter `name` to `value` declared as `ty`.
    ///
    /// Declaring a new name or a new type for an existing name detaches the
    /// handle's delegate, so the next evaluation resolves a fresh one.
    /// Replacing only the value keeps the delegate.
    pub fn set_parameter(
        &self,
        handle: Handle,
        name: &str,
        ty: TypeDescriptor,
        value: impl Into<Value>,
    ) -> Result<(), EvalError> {
        let item = self.item(handle)?;
        if item.set_parameter(name, ty, value.into()) {
            trace!(handle = %handle, parameter = name, ty = %ty, "signature changed");
        }
        Ok(())
    }

    /// Like [`set_parameter`](Self::set_parameter), declaring the value's own
    /// runtime type.
    pub fn set_value(
        &self,
        handle: Handle,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<(), EvalError> {
        let value = value.into();
        self.set_parameter(handle, name, value.type_descriptor(), value)
    }

    /// Runs the handle's snippet against its current parameters, compiling it
    /// first if no delegate for its fingerprint is cached.
    pub fn evaluate(&self, handle: Handle) -> Result<Value, EvalError> {
        let item = self.item(handle)?;
        let snapshot = item.snapshot();
        let entry = match snapshot.delegate() {
            Some(entry) => Arc::clone(entry),
            None => self.resolve(handle, &item, &snapshot)?,
        };

        let values = snapshot.into_values();
        let result = if entry.plan().binding().is_positional() {
            let positional: Vec<Value> = values.into_values().collect();
            entry.invoke(Arguments::Positional(&positional))
        } else {
            entry.invoke(Arguments::Named(&values))
        };

        result.map_err(|err| {
            debug!(handle = %handle, fingerprint = %entry.fingerprint(), error = %err, "evaluation failed");
            EvalError::Evaluation(err)
        })
    }

    /// Evaluates and converts the result to `T`.
    pub fn evaluate_as<T: FromValue>(&self, handle: Handle) -> Result<T, EvalError> {
        let value = self.evaluate(handle)?;
        Ok(T::from_value(value)?)
    }

    /// Fingerprint of the handle's current source and signature.
    pub fn fingerprint(&self, handle: Handle) -> Result<Fingerprint, EvalError> {
        Ok(self.item(handle)?.fingerprint())
    }

    /// Fingerprint of the delegate currently attached to the handle, if any.
    pub fn delegate_fingerprint(&self, handle: Handle) -> Result<Option<Fingerprint>, EvalError> {
        Ok(self
            .item(handle)?
            .delegate()
            .map(|entry| entry.fingerprint().clone()))
    }

    /// Removes the handle. Its delegate is dropped as well once no other live
    /// handle references it, unless `retain_on_dispose` is configured.
    ///
    /// Returns false if the handle is unknown or already disposed.
    pub fn dispose(&self, handle: Handle) -> bool {
        let Some(item) = self.items.remove(handle) else {
            return false;
        };

        if let Some(entry) = item.delegate() {
            let fingerprint = entry.fingerprint();
            if !self.config.retain_on_dispose
                && self
                    .delegates
                    .remove_unreferenced(fingerprint, || self.items.references(fingerprint))
            {
                debug!(handle = %handle, fingerprint = %fingerprint, "dropped last reference to delegate");
            }
        }
        debug!(handle = %handle, "handle disposed");
        true
    }

    /// Drops every delegate no live handle references. Returns false without
    /// waiting if another sweep is running.
    pub fn expire_cache(&self) -> bool {
        self.try_expire_cache().is_ok()
    }

    /// Like [`expire_cache`](Self::expire_cache), reporting how many delegates
    /// were dropped, or [`EvalError::ConcurrencyBusy`].
    pub fn try_expire_cache(&self) -> Result<usize, EvalError> {
        let _sweep = SweepGuard::acquire(&self.sweeping).ok_or(EvalError::ConcurrencyBusy)?;

        let removed = self
            .delegates
            .retain_referenced(|| self.items.referenced_fingerprints());
        debug!(removed, remaining = self.delegates.count(), "expired unreferenced delegates");
        Ok(removed)
    }

    /// Force-releases the eviction lock and abandons every in-flight
    /// compilation.
    ///
    /// Recovery only: calling this while a sweep or compilation is
    /// legitimately running lets a second one start alongside it.
    pub fn release_locks(&self) -> bool {
        let was_sweeping = self.sweeping.swap(false, Ordering::SeqCst);
        let abandoned = self.delegates.release_locks();
        warn!(was_sweeping, abandoned, "force-released cache locks");
        true
    }

    pub fn cache_delegate_count(&self) -> usize {
        self.delegates.count()
    }

    pub fn cache_item_count(&self) -> usize {
        self.items.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            items: self.items.len(),
            ..self.delegates.stats()
        }
    }

    fn item(&self, handle: Handle) -> Result<Arc<Item>, EvalError> {
        self.items.get(handle).ok_or(EvalError::NotFound(handle))
    }

    fn resolve(
        &self,
        handle: Handle,
        item: &Item,
        snapshot: &ItemSnapshot,
    ) -> Result<Arc<DelegateEntry>, EvalError> {
        let fingerprint = snapshot.fingerprint(item.source(), item.binding());
        let entry = self.delegates.get_or_compile(&fingerprint, || {
            debug!(handle = %handle, fingerprint = %fingerprint, "delegate cache miss");
            let plan = item.binding().plan(snapshot.types());
            self.compiler.compile(&fingerprint, item.source(), plan)
        })?;

        if !item.attach(&entry, snapshot) {
            trace!(handle = %handle, "signature changed during compilation, delegate not attached");
        } else if self.delegates.adopt(&entry, || self.items.contains(handle)) {
            trace!(handle = %handle, "delegate removed before attach, cached again");
        }
        Ok(entry)
    }
}

/// Holds the eviction flag for the duration of one sweep.
struct SweepGuard<'a>(&'a AtomicBool);

impl<'a> SweepGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
