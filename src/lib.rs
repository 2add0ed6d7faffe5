//! Compile-once, evaluate-many caching for host-submitted source snippets.
//!
//! A host registers snippet source text with an [`EvalManager`], declares
//! typed parameters on the returned [`Handle`] and evaluates it. Compilation
//! goes through a pluggable [`Backend`] and is paid once per distinct
//! (source, binding convention, parameter signature); handles sharing that
//! fingerprint share one compiled delegate.

pub mod config;
pub mod error;
pub mod eval;
pub mod value;

pub use config::EvalConfig;
#[cfg(feature = "toml-config")]
pub use config::ConfigError;
pub use error::{BindError, CompileError, ConversionError, EvalError, InvokeError};
pub use eval::{
    Arguments, Backend, BindingKind, BindingScope, CacheStats, CompiledArtifact, EvalManager,
    Fingerprint, Handle, VariablePlan,
};
pub use value::{DeferredValue, FromValue, TypeDescriptor, Value};

pub use evalnet_utils::{Diagnostic, DiagnosticSeverity, logger};
