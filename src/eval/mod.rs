// Snippet compilation and caching
pub mod binder;
pub mod cache;
pub mod compiler;
pub mod manager;
pub mod signature;

pub use binder::{
    Arguments, BindingKind, BindingScope, Extraction, ParameterDictionary, ParameterValues,
    ParseBindingKindError, SINGLE_DICTIONARY_NAME, VariableDecl, VariableKind, VariablePlan,
};
pub use cache::{CacheStats, DelegateCache, DelegateEntry, Handle, ItemCache, UsageSnapshot};
pub use compiler::{Backend, CompiledArtifact, Compiler};
pub use manager::EvalManager;
pub use signature::Fingerprint;
