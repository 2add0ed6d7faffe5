use std::sync::Arc;
use std::time::Instant;

use evalnet_utils::Diagnostic;
use tracing::debug;

use super::binder::{BindingScope, VariablePlan};
use super::cache::DelegateEntry;
use super::signature::Fingerprint;
use crate::error::{CompileError, InvokeError};
use crate::value::Value;

/// An invokable produced by a [`Backend`].
pub trait CompiledArtifact: Send + Sync {
    /// Runs the compiled body. Variables are read through `scope`, which
    /// binds them on first access.
    fn invoke(&self, scope: &BindingScope<'_>) -> Result<Value, InvokeError>;
}

/// The external source-to-executable translator.
pub trait Backend: Send + Sync {
    fn compile(
        &self,
        source: &str,
        plan: &VariablePlan,
    ) -> Result<Arc<dyn CompiledArtifact>, Vec<Diagnostic>>;
}

impl<F> Backend for F
where
    F: Fn(&str, &VariablePlan) -> Result<Arc<dyn CompiledArtifact>, Vec<Diagnostic>>
        + Send
        + Sync,
{
    fn compile(
        &self,
        source: &str,
        plan: &VariablePlan,
    ) -> Result<Arc<dyn CompiledArtifact>, Vec<Diagnostic>> {
        self(source, plan)
    }
}

/// Translates a snippet through the backend. Performs no caching.
#[derive(Clone)]
pub struct Compiler {
    backend: Arc<dyn Backend>,
}

impl Compiler {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn compile(
        &self,
        fingerprint: &Fingerprint,
        source: &str,
        plan: VariablePlan,
    ) -> Result<DelegateEntry, CompileError> {
        let start = Instant::now();
        debug!(
            fingerprint = %fingerprint,
            binding = %plan.binding(),
            variables = plan.len(),
            "compiling snippet"
        );

        match self.backend.compile(source, &plan) {
            Ok(artifact) => {
                let elapsed = start.elapsed();
                debug!(fingerprint = %fingerprint, ?elapsed, "snippet compiled");
                Ok(DelegateEntry::new(fingerprint.clone(), plan, artifact, elapsed))
            }
            Err(diagnostics) => {
                debug!(
                    fingerprint = %fingerprint,
                    diagnostics = diagnostics.len(),
                    "backend rejected snippet"
                );
                Err(CompileError::new(fingerprint.clone(), diagnostics))
            }
        }
    }
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler").finish_non_exhaustive()
    }
}
