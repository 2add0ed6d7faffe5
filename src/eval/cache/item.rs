use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashSet;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::DelegateEntry;
use crate::eval::binder::{BindingKind, ParameterValues};
use crate::eval::signature::Fingerprint;
use crate::value::{TypeDescriptor, Value};

/// Process-unique identity of one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    pub fn raw(self) -> u64 {
        self.0
    }

    pub(crate) fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A declared type together with the last value supplied under it.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub ty: TypeDescriptor,
    pub value: Value,
}

#[derive(Debug, Default)]
struct ItemState {
    parameters: BTreeMap<String, Parameter>,
    delegate: Option<Arc<DelegateEntry>>,
    // Bumped on every signature change so a compile started against an older
    // signature never attaches its delegate.
    generation: u64,
}

/// Live state behind a [`Handle`].
#[derive(Debug)]
pub struct Item {
    source: Arc<str>,
    binding: BindingKind,
    state: Mutex<ItemState>,
}

impl Item {
    pub fn new(source: impl Into<Arc<str>>, binding: BindingKind) -> Self {
        Self {
            source: source.into(),
            binding,
            state: Mutex::new(ItemState::default()),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn binding(&self) -> BindingKind {
        self.binding
    }

    /// Stores `value` under `name`. Returns true when the signature changed
    /// (a new name, or a new type for an existing name), which detaches the
    /// current delegate.
    pub fn set_parameter(&self, name: &str, ty: TypeDescriptor, value: Value) -> bool {
        let mut state = self.state.lock();
        match state.parameters.get_mut(name) {
            Some(parameter) if parameter.ty == ty => {
                parameter.value = value;
                false
            }
            Some(parameter) => {
                *parameter = Parameter { ty, value };
                state.delegate = None;
                state.generation += 1;
                true
            }
            None => {
                state
                    .parameters
                    .insert(name.to_string(), Parameter { ty, value });
                state.delegate = None;
                state.generation += 1;
                true
            }
        }
    }

    pub fn parameter(&self, name: &str) -> Option<Parameter> {
        self.state.lock().parameters.get(name).cloned()
    }

    pub fn delegate(&self) -> Option<Arc<DelegateEntry>> {
        self.state.lock().delegate.clone()
    }

    /// Consistent copy of the parameters and delegate as of now.
    pub fn snapshot(&self) -> ItemSnapshot {
        let state = self.state.lock();
        ItemSnapshot {
            parameters: state.parameters.clone(),
            delegate: state.delegate.clone(),
            generation: state.generation,
        }
    }

    /// Attaches `entry` unless the signature changed since `snapshot` was
    /// taken. Returns whether it was attached.
    pub fn attach(&self, entry: &Arc<DelegateEntry>, snapshot: &ItemSnapshot) -> bool {
        let mut state = self.state.lock();
        if state.generation != snapshot.generation {
            return false;
        }
        state.delegate = Some(Arc::clone(entry));
        true
    }

    /// Fingerprint of the current source and signature.
    pub fn fingerprint(&self) -> Fingerprint {
        self.snapshot().fingerprint(&self.source, self.binding)
    }
}

#[derive(Debug, Clone)]
pub struct ItemSnapshot {
    parameters: BTreeMap<String, Parameter>,
    delegate: Option<Arc<DelegateEntry>>,
    generation: u64,
}

impl ItemSnapshot {
    pub fn delegate(&self) -> Option<&Arc<DelegateEntry>> {
        self.delegate.as_ref()
    }

    pub fn types(&self) -> impl Iterator<Item = (&str, TypeDescriptor)> {
        self.parameters
            .iter()
            .map(|(name, parameter)| (name.as_str(), parameter.ty))
    }

    pub fn fingerprint(&self, source: &str, binding: BindingKind) -> Fingerprint {
        Fingerprint::new(source, binding, self.types())
    }

    pub fn into_values(self) -> ParameterValues {
        self.parameters
            .into_iter()
            .map(|(name, parameter)| (name, parameter.value))
            .collect()
    }
}

/// Per-handle state, sharded so distinct handles never contend.
#[derive(Debug, Default)]
pub struct ItemCache {
    items: DashMap<Handle, Arc<Item>>,
}

impl ItemCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: Handle, item: Item) {
        self.items.insert(handle, Arc::new(item));
    }

    pub fn get(&self, handle: Handle) -> Option<Arc<Item>> {
        self.items.get(&handle).map(|item| Arc::clone(item.value()))
    }

    pub fn remove(&self, handle: Handle) -> Option<Arc<Item>> {
        self.items.remove(&handle).map(|(_, item)| item)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.items.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Fingerprints of every delegate currently attached to a live item.
    pub fn referenced_fingerprints(&self) -> AHashSet<Fingerprint> {
        self.attached()
            .into_iter()
            .map(|entry| entry.fingerprint().clone())
            .collect()
    }

    pub fn references(&self, fingerprint: &Fingerprint) -> bool {
        self.attached()
            .iter()
            .any(|entry| entry.fingerprint() == fingerprint)
    }

    // Items are cloned out first so no shard lock is held while taking an
    // item lock.
    fn attached(&self) -> Vec<Arc<DelegateEntry>> {
        let items: Vec<Arc<Item>> = self
            .items
            .iter()
            .map(|item| Arc::clone(item.value()))
            .collect();
        items.iter().filter_map(|item| item.delegate()).collect()
    }
}
