// Two-tier snippet cache
pub mod delegate;
pub mod item;
pub mod metadata;

pub use delegate::DelegateCache;
pub use item::{Handle, Item, ItemCache, ItemSnapshot, Parameter};
pub use metadata::{CacheStats, DelegateUsage, UsageSnapshot};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::binder::{Arguments, BindingScope, VariablePlan};
use super::compiler::CompiledArtifact;
use super::signature::Fingerprint;
use crate::error::InvokeError;
use crate::value::Value;

/// A compiled snippet shared by every item with the same fingerprint.
pub struct DelegateEntry {
    fingerprint: Fingerprint,
    plan: VariablePlan,
    artifact: Arc<dyn CompiledArtifact>,
    usage: DelegateUsage,
}

impl DelegateEntry {
    pub fn new(
        fingerprint: Fingerprint,
        plan: VariablePlan,
        artifact: Arc<dyn CompiledArtifact>,
        compile_time: Duration,
    ) -> Self {
        Self {
            fingerprint,
            plan,
            artifact,
            usage: DelegateUsage::new(compile_time),
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn plan(&self) -> &VariablePlan {
        &self.plan
    }

    pub fn usage(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }

    /// Binds `arguments` against the plan and runs the artifact.
    pub fn invoke(&self, arguments: Arguments<'_>) -> Result<Value, InvokeError> {
        let scope = BindingScope::new(&self.plan, arguments);
        let result = self.artifact.invoke(&scope);
        self.usage.record(result.is_ok(), scope.bound_count());
        result
    }
}

impl fmt::Debug for DelegateEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateEntry")
            .field("fingerprint", &self.fingerprint)
            .field("plan", &self.plan)
            .field("usage", &self.usage.snapshot())
            .finish_non_exhaustive()
    }
}
