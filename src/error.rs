use std::fmt;

use evalnet_utils::{Diagnostic, render_diagnostics};
use thiserror::Error;

use crate::eval::{BindingKind, Fingerprint, Handle};
use crate::value::TypeDescriptor;

/// Errors surfaced by [`EvalManager`](crate::EvalManager) operations.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("handle {0} does not exist or has been disposed")]
    NotFound(Handle),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("evaluation failed: {0}")]
    Evaluation(#[from] InvokeError),
    #[error("result conversion failed: {0}")]
    Conversion(#[from] ConversionError),
    #[error("a cache sweep is already in progress")]
    ConcurrencyBusy,
}

/// The compile backend rejected a snippet, or the compilation producing it
/// was abandoned before publishing a result.
#[derive(Debug, Clone, Error)]
pub struct CompileError {
    fingerprint: Fingerprint,
    diagnostics: Vec<Diagnostic>,
    abandoned: bool,
}

impl CompileError {
    pub fn new(fingerprint: Fingerprint, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            fingerprint,
            diagnostics,
            abandoned: false,
        }
    }

    /// The compilation never completed: it panicked or its in-flight slot was
    /// force-released.
    pub fn abandoned(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            diagnostics: Vec::new(),
            abandoned: true,
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    /// Plain-text report of every diagnostic, annotated against `source`.
    pub fn render(&self, source: &str) -> String {
        render_diagnostics(&self.diagnostics, "snippet", source)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "compilation of {} failed: ", self.fingerprint)?;
        if self.abandoned {
            return f.write_str("compilation was abandoned before completing");
        }
        if self.diagnostics.is_empty() {
            return f.write_str("backend reported no diagnostics");
        }
        for (index, diagnostic) in self.diagnostics.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

/// Failure raised while a compiled artifact runs.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error("{0}")]
    Runtime(String),
}

impl InvokeError {
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }
}

/// A variable could not be bound from the caller's arguments.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    #[error("no variable named `{name}` is bound{}", did_you_mean(.suggestion))]
    UnknownVariable {
        name: String,
        suggestion: Option<String>,
    },
    #[error("parameter `{0}` is declared but no value was supplied")]
    Missing(String),
    #[error("parameter `{name}` is declared as {expected} but holds {found}")]
    TypeMismatch {
        name: String,
        expected: TypeDescriptor,
        found: TypeDescriptor,
    },
    #[error("parameter `{name}`: {source}")]
    Conversion {
        name: String,
        #[source]
        source: ConversionError,
    },
    #[error("{binding} binding received arguments of the wrong shape")]
    ArgumentShape { binding: BindingKind },
    #[error("{binding} binding does not expose a parameter dictionary")]
    NoDictionary { binding: BindingKind },
}

#[allow(clippy::ref_option)]
fn did_you_mean(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(" (did you mean `{s}`?)"))
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert {from} to {to}: {detail}")]
pub struct ConversionError {
    from: TypeDescriptor,
    to: TypeDescriptor,
    detail: String,
}

impl ConversionError {
    pub fn new(from: TypeDescriptor, to: TypeDescriptor, detail: impl Into<String>) -> Self {
        Self {
            from,
            to,
            detail: detail.into(),
        }
    }

    pub fn null(to: TypeDescriptor) -> Self {
        Self::new(TypeDescriptor::Object, to, "value is null")
    }

    pub fn source_type(&self) -> TypeDescriptor {
        self.from
    }

    pub fn target_type(&self) -> TypeDescriptor {
        self.to
    }
}
