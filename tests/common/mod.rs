//! Instrumented stand-in for a real compile backend.
//!
//! Understands `return <term> (+ <term>)*;` where a term is a parameter
//! name, an integer literal or a double-quoted string. Integers add with
//! overflow checking, strings concatenate, and mixing the two is rejected at
//! compile time when both types are declared.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use evalnet::eval::VariableKind;
use evalnet::{
    Backend, BindingKind, BindingScope, CompiledArtifact, Diagnostic, EvalConfig, EvalManager,
    InvokeError, TypeDescriptor, Value, VariablePlan,
};

#[derive(Debug, Default)]
pub struct StubBackend {
    compiles: AtomicUsize,
    delay: Duration,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `delay` inside every compile call.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            compiles: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }
}

impl Backend for StubBackend {
    fn compile(
        &self,
        source: &str,
        plan: &VariablePlan,
    ) -> Result<Arc<dyn CompiledArtifact>, Vec<Diagnostic>> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let terms = parse(source).map_err(|d| vec![d])?;
        check(source, &terms, plan)?;
        Ok(Arc::new(Sum {
            terms,
            from_dictionary: plan.binding() == BindingKind::SingleDictionary,
        }))
    }
}

/// A manager over a fresh stub backend with default configuration.
pub fn manager() -> (Arc<StubBackend>, EvalManager) {
    manager_with(StubBackend::new(), EvalConfig::default())
}

pub fn manager_with(backend: StubBackend, config: EvalConfig) -> (Arc<StubBackend>, EvalManager) {
    evalnet::logger::init_test_logging();
    let backend = Arc::new(backend);
    let manager = EvalManager::new(backend.clone(), config);
    (backend, manager)
}

/// A deferred value of type `ty` that counts how often it is materialized.
pub fn counted(ty: TypeDescriptor, value: Value) -> (Arc<AtomicUsize>, Value) {
    let reads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reads);
    let deferred = Value::deferred(ty, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        value.clone()
    });
    (reads, deferred)
}

#[derive(Debug, Clone)]
enum Term {
    Var(String),
    Int(i32),
    Str(String),
}

fn parse(source: &str) -> Result<Vec<Term>, Diagnostic> {
    let syntax = |message: &str| Diagnostic::error(message.to_string()).with_span(0..source.len());
    let body = source
        .trim()
        .strip_prefix("return")
        .and_then(|rest| rest.strip_suffix(';'))
        .ok_or_else(|| syntax("expected `return <expr>;`"))?;

    body.split('+')
        .map(|raw| {
            let term = raw.trim();
            if let Some(text) = term.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
                Ok(Term::Str(text.to_string()))
            } else if term.starts_with(|c: char| c.is_ascii_digit()) {
                term.parse()
                    .map(Term::Int)
                    .map_err(|_| syntax("invalid integer literal"))
            } else if !term.is_empty()
                && term.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                Ok(Term::Var(term.to_string()))
            } else {
                Err(syntax("expected a term"))
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Class {
    Integer,
    Text,
}

fn check(source: &str, terms: &[Term], plan: &VariablePlan) -> Result<(), Vec<Diagnostic>> {
    let mut diagnostics = Vec::new();
    let mut seen: Option<Class> = None;

    for term in terms {
        let class = match term {
            Term::Int(_) => Some(Class::Integer),
            Term::Str(_) => Some(Class::Text),
            Term::Var(_) if plan.binding() == BindingKind::SingleDictionary => None,
            Term::Var(name) => match plan.get(name).map(|decl| decl.kind()) {
                None => {
                    diagnostics.push(spanned(source, name, format!("unknown identifier `{name}`")));
                    continue;
                }
                Some(VariableKind::Scalar(ty)) if ty.is_integer() => Some(Class::Integer),
                Some(VariableKind::Scalar(TypeDescriptor::String)) => Some(Class::Text),
                Some(VariableKind::Scalar(TypeDescriptor::Object)) => None,
                Some(VariableKind::Scalar(ty)) => {
                    diagnostics.push(spanned(source, name, format!("`{name}` has unsupported type {ty}")));
                    continue;
                }
                Some(_) => None,
            },
        };

        match (seen, class) {
            (Some(previous), Some(current)) if previous != current => {
                diagnostics.push(
                    Diagnostic::error("cannot add integers and strings")
                        .with_span(0..source.len())
                        .with_help("declare every operand with the same kind of type"),
                );
                break;
            }
            (None, Some(_)) => seen = class,
            _ => {}
        }
    }

    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

fn spanned(source: &str, name: &str, message: String) -> Diagnostic {
    let diagnostic = Diagnostic::error(message);
    match source.find(name) {
        Some(start) => diagnostic.with_span(start..start + name.len()),
        None => diagnostic,
    }
}

struct Sum {
    terms: Vec<Term>,
    from_dictionary: bool,
}

impl Sum {
    fn resolve(&self, scope: &BindingScope<'_>, term: &Term) -> Result<Value, InvokeError> {
        match term {
            Term::Int(v) => Ok(Value::Int32(*v)),
            Term::Str(s) => Ok(Value::String(s.clone())),
            Term::Var(name) if self.from_dictionary => scope
                .dictionary()?
                .get(name)
                .cloned()
                .ok_or_else(|| InvokeError::runtime(format!("no parameter named `{name}`"))),
            Term::Var(name) => Ok(scope.variable(name)?.clone()),
        }
    }
}

impl CompiledArtifact for Sum {
    fn invoke(&self, scope: &BindingScope<'_>) -> Result<Value, InvokeError> {
        let mut total: Option<Value> = None;
        for term in &self.terms {
            let value = self.resolve(scope, term)?;
            total = Some(match total {
                None => value,
                Some(acc) => add(acc, value)?,
            });
        }
        Ok(total.unwrap_or_default())
    }
}

fn add(lhs: Value, rhs: Value) -> Result<Value, InvokeError> {
    match (&lhs, &rhs) {
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        _ => {
            let (Some(a), Some(b)) = (lhs.as_i64(), rhs.as_i64()) else {
                return Err(InvokeError::runtime(format!(
                    "cannot add {} and {}",
                    lhs.type_descriptor(),
                    rhs.type_descriptor()
                )));
            };
            let overflow = || InvokeError::runtime("integer overflow");
            let sum = a.checked_add(b).ok_or_else(overflow)?;
            let wide = lhs.type_descriptor() == TypeDescriptor::Int64
                || rhs.type_descriptor() == TypeDescriptor::Int64;
            if wide {
                Ok(Value::Int64(sum))
            } else {
                i32::try_from(sum).map(Value::Int32).map_err(|_| overflow())
            }
        }
    }
}
