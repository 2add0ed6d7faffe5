//! Parameter binding conventions.
//!
//! Binding happens in two phases. At compile time a [`BindingKind`] turns the
//! declared parameter signature into a [`VariablePlan`] that the backend
//! compiles against. At invocation time a [`BindingScope`] pairs that plan
//! with the caller's [`Arguments`] and extracts each variable the first time
//! the compiled body reads it, memoizing the result for the rest of that
//! evaluation. Parameters the body never reads are never extracted.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use evalnet_utils::suggest::find_best_match;
use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::error::BindError;
use crate::value::{TypeDescriptor, Value};

/// Name under which [`BindingKind::SingleDictionary`] exposes the parameter set.
pub const SINGLE_DICTIONARY_NAME: &str = "parameters";

/// Caller-supplied parameter values keyed by name.
pub type ParameterValues = BTreeMap<String, Value>;

/// How caller values are exposed to a compiled body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    /// One lazily bound local per parameter, looked up by name and converted
    /// to its declared type when the runtime type differs.
    #[default]
    Dictionary,
    /// One lazily bound local per parameter, taken by position and converted
    /// to its declared type.
    Enumerable,
    /// A single dictionary variable; the body performs its own lookups.
    SingleDictionary,
    /// Strongly typed locals; values must already hold the declared type.
    Typed,
    /// Dynamically typed locals resolved at first access.
    Untyped,
}

impl BindingKind {
    pub const ALL: [Self; 5] = [
        Self::Dictionary,
        Self::Enumerable,
        Self::SingleDictionary,
        Self::Typed,
        Self::Untyped,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Self::Dictionary => "dictionary",
            Self::Enumerable => "enumerable",
            Self::SingleDictionary => "single_dictionary",
            Self::Typed => "typed",
            Self::Untyped => "untyped",
        }
    }

    /// Whether callers supply values positionally rather than by name.
    pub fn is_positional(self) -> bool {
        self == Self::Enumerable
    }

    /// Builds the declaration plan for a parameter signature.
    ///
    /// Variables are ordered by name, which is also the position order used
    /// by [`BindingKind::Enumerable`]. An empty signature yields an empty plan.
    pub fn plan<'a, I>(self, parameters: I) -> VariablePlan
    where
        I: IntoIterator<Item = (&'a str, TypeDescriptor)>,
    {
        let mut parameters: Vec<_> = parameters.into_iter().collect();
        parameters.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));

        if parameters.is_empty() {
            return VariablePlan {
                binding: self,
                variables: Vec::new(),
            };
        }

        let variables = match self {
            Self::SingleDictionary => vec![VariableDecl {
                name: SINGLE_DICTIONARY_NAME.to_string(),
                kind: VariableKind::Dictionary,
                extraction: Extraction::Container,
            }],
            _ => parameters
                .into_iter()
                .enumerate()
                .map(|(index, (name, ty))| {
                    let (kind, extraction) = match self {
                        Self::Dictionary => (VariableKind::Scalar(ty), Extraction::Lookup),
                        Self::Enumerable => (VariableKind::Scalar(ty), Extraction::Position(index)),
                        Self::Typed => (VariableKind::Scalar(ty), Extraction::Direct),
                        Self::Untyped | Self::SingleDictionary => {
                            (VariableKind::Dynamic, Extraction::Dynamic)
                        }
                    };
                    VariableDecl {
                        name: name.to_string(),
                        kind,
                        extraction,
                    }
                })
                .collect(),
        };

        VariablePlan {
            binding: self,
            variables,
        }
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown binding convention `{0}`")]
pub struct ParseBindingKindError(String);

impl FromStr for BindingKind {
    type Err = ParseBindingKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "dictionary" => Ok(Self::Dictionary),
            "enumerable" => Ok(Self::Enumerable),
            "singledictionary" => Ok(Self::SingleDictionary),
            "typed" => Ok(Self::Typed),
            "untyped" => Ok(Self::Untyped),
            _ => Err(ParseBindingKindError(s.to_string())),
        }
    }
}

/// What the compiled body sees for a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    /// A local of a statically known type.
    Scalar(TypeDescriptor),
    /// A local whose type is only known once it is read.
    Dynamic,
    /// The whole parameter dictionary.
    Dictionary,
}

/// Where a variable's value comes from at invocation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    Lookup,
    Position(usize),
    Direct,
    Dynamic,
    Container,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDecl {
    name: String,
    kind: VariableKind,
    extraction: Extraction,
}

impl VariableDecl {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    pub fn extraction(&self) -> Extraction {
        self.extraction
    }
}

/// The variables a compiled body may reference, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariablePlan {
    binding: BindingKind,
    variables: Vec<VariableDecl>,
}

impl VariablePlan {
    pub fn binding(&self) -> BindingKind {
        self.binding
    }

    pub fn variables(&self) -> &[VariableDecl] {
        &self.variables
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|decl| decl.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&VariableDecl> {
        self.position(name).map(|index| &self.variables[index])
    }

    // An empty single-dictionary plan still exposes an (empty) dictionary.
    fn has_dictionary(&self) -> bool {
        self.binding == BindingKind::SingleDictionary
            || self
                .variables
                .iter()
                .any(|decl| decl.extraction == Extraction::Container)
    }
}

/// Caller values for one invocation.
#[derive(Debug, Clone, Copy)]
pub enum Arguments<'a> {
    Named(&'a ParameterValues),
    Positional(&'a [Value]),
}

/// Read-only view of the named arguments exposed to single-dictionary bodies.
///
/// Lookups share the owning scope's memo, so each entry is materialized at
/// most once per evaluation no matter how often the body reads it.
#[derive(Clone, Copy)]
pub struct ParameterDictionary<'s> {
    values: &'s ParameterValues,
    entries: &'s BTreeMap<&'s str, OnceCell<Value>>,
}

impl<'s> ParameterDictionary<'s> {
    /// Looks up `name`, materializing a deferred value on first read.
    pub fn get(&self, name: &str) -> Option<&'s Value> {
        let (key, cell) = self.entries.get_key_value(name)?;
        let value = cell.get_or_init(|| {
            trace!(entry = %key, "binding dictionary entry");
            self.values
                .get(*key)
                .cloned()
                .map(Value::materialize)
                .unwrap_or_default()
        });
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many entries have been materialized so far.
    pub fn bound_count(&self) -> usize {
        self.entries.values().filter(|cell| cell.get().is_some()).count()
    }
}

impl fmt::Debug for ParameterDictionary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterDictionary")
            .field("entries", &self.len())
            .field("bound", &self.bound_count())
            .finish()
    }
}

/// Per-evaluation binding state handed to a compiled artifact.
pub struct BindingScope<'a> {
    plan: &'a VariablePlan,
    arguments: Arguments<'a>,
    cells: Vec<OnceCell<Value>>,
    entries: BTreeMap<&'a str, OnceCell<Value>>,
}

impl<'a> BindingScope<'a> {
    pub fn new(plan: &'a VariablePlan, arguments: Arguments<'a>) -> Self {
        let entries = match arguments {
            Arguments::Named(values) if plan.has_dictionary() => values
                .keys()
                .map(|key| (key.as_str(), OnceCell::new()))
                .collect(),
            _ => BTreeMap::new(),
        };
        Self {
            plan,
            arguments,
            cells: (0..plan.len()).map(|_| OnceCell::new()).collect(),
            entries,
        }
    }

    pub fn plan(&self) -> &VariablePlan {
        self.plan
    }

    /// Value of variable `name`, extracted on first use and memoized.
    pub fn variable(&self, name: &str) -> Result<&Value, BindError> {
        let index = self.plan.position(name).ok_or_else(|| self.unknown(name))?;
        let decl = &self.plan.variables[index];
        if decl.extraction == Extraction::Container {
            return Err(self.unknown(name));
        }
        self.cells[index].get_or_try_init(|| self.extract(decl))
    }

    /// The whole parameter set, for single-dictionary plans.
    pub fn dictionary(&self) -> Result<ParameterDictionary<'_>, BindError> {
        let binding = self.plan.binding;
        if !self.plan.has_dictionary() {
            return Err(BindError::NoDictionary { binding });
        }
        match self.arguments {
            Arguments::Named(values) => Ok(ParameterDictionary {
                values,
                entries: &self.entries,
            }),
            Arguments::Positional(_) => Err(BindError::ArgumentShape { binding }),
        }
    }

    /// How many values have been extracted so far, counting dictionary
    /// entries.
    pub fn bound_count(&self) -> usize {
        let entries = self.entries.values().filter(|cell| cell.get().is_some());
        self.cells.iter().filter(|cell| cell.get().is_some()).count() + entries.count()
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.plan
            .position(name)
            .is_some_and(|index| self.cells[index].get().is_some())
    }

    fn extract(&self, decl: &VariableDecl) -> Result<Value, BindError> {
        trace!(variable = %decl.name, binding = %self.plan.binding, "binding parameter");

        let raw = match (decl.extraction, self.arguments) {
            (Extraction::Position(index), Arguments::Positional(values)) => values.get(index),
            (
                Extraction::Lookup | Extraction::Direct | Extraction::Dynamic,
                Arguments::Named(values),
            ) => values.get(&decl.name),
            _ => {
                return Err(BindError::ArgumentShape {
                    binding: self.plan.binding,
                });
            }
        };
        let value = raw
            .cloned()
            .ok_or_else(|| BindError::Missing(decl.name.clone()))?
            .materialize();

        match (decl.extraction, decl.kind) {
            (Extraction::Direct, VariableKind::Scalar(expected)) => {
                let found = value.type_descriptor();
                if value.is_null() || expected == TypeDescriptor::Object || found == expected {
                    Ok(value)
                } else {
                    Err(BindError::TypeMismatch {
                        name: decl.name.clone(),
                        expected,
                        found,
                    })
                }
            }
            (_, VariableKind::Scalar(ty)) => {
                value.coerce(ty).map_err(|source| BindError::Conversion {
                    name: decl.name.clone(),
                    source,
                })
            }
            _ => Ok(value),
        }
    }

    fn unknown(&self, name: &str) -> BindError {
        let candidates = self
            .plan
            .variables
            .iter()
            .filter(|decl| decl.extraction != Extraction::Container)
            .map(VariableDecl::name);
        BindError::UnknownVariable {
            name: name.to_string(),
            suggestion: find_best_match(name, candidates),
        }
    }
}

impl fmt::Debug for BindingScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingScope")
            .field("binding", &self.plan.binding)
            .field("variables", &self.plan.len())
            .field("bound", &self.bound_count())
            .finish()
    }
}
