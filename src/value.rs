//! Values exchanged with compiled snippets and the types they are declared as.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConversionError;

/// Declared type of a parameter.
///
/// `Object` is the dynamic type: values declared as `Object` are bound as-is
/// and never converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeDescriptor {
    Bool,
    Int16,
    Int32,
    Int64,
    Float64,
    String,
    Bytes,
    Object,
}

impl TypeDescriptor {
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Object => "object",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Self::Int16 | Self::Int32 | Self::Int64)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value whose host-side marshaling is postponed until a binder extracts it.
#[derive(Clone)]
pub struct DeferredValue {
    ty: TypeDescriptor,
    produce: Arc<dyn Fn() -> Value + Send + Sync>,
}

impl DeferredValue {
    pub fn ty(&self) -> TypeDescriptor {
        self.ty
    }

    pub fn materialize(&self) -> Value {
        (self.produce)()
    }
}

impl fmt::Debug for DeferredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredValue")
            .field("ty", &self.ty)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Deferred(DeferredValue),
}

impl Value {
    /// Wraps a producer that runs only when the value is bound.
    pub fn deferred<F>(ty: TypeDescriptor, produce: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self::Deferred(DeferredValue {
            ty,
            produce: Arc::new(produce),
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Runtime type of the value. `Null` reports `Object`; deferred values
    /// report their declared type without materializing.
    pub fn type_descriptor(&self) -> TypeDescriptor {
        match self {
            Self::Null => TypeDescriptor::Object,
            Self::Bool(_) => TypeDescriptor::Bool,
            Self::Int16(_) => TypeDescriptor::Int16,
            Self::Int32(_) => TypeDescriptor::Int32,
            Self::Int64(_) => TypeDescriptor::Int64,
            Self::Float64(_) => TypeDescriptor::Float64,
            Self::String(_) => TypeDescriptor::String,
            Self::Bytes(_) => TypeDescriptor::Bytes,
            Self::Deferred(deferred) => deferred.ty(),
        }
    }

    /// Resolves deferred values; every other variant is returned unchanged.
    pub fn materialize(self) -> Self {
        let mut value = self;
        while let Self::Deferred(deferred) = value {
            value = deferred.materialize();
        }
        value
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int16(v) => Some(i64::from(*v)),
            Self::Int32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Converts the value to `to`, materializing it first.
    ///
    /// Values already of the target type, nulls, and targets of `Object` pass
    /// through untouched. Narrowing conversions are range checked.
    pub fn coerce(self, to: TypeDescriptor) -> Result<Self, ConversionError> {
        let value = self.materialize();
        let from = value.type_descriptor();
        if to == TypeDescriptor::Object || value.is_null() || from == to {
            return Ok(value);
        }

        let fail = |detail: String| ConversionError::new(from, to, detail);

        match to {
            TypeDescriptor::Bool => match &value {
                Self::String(s) => parse_bool(s)
                    .map(Self::Bool)
                    .ok_or_else(|| fail(format!("`{s}` is not a boolean"))),
                other => other
                    .as_i64()
                    .map(|n| Self::Bool(n != 0))
                    .ok_or_else(|| fail("no boolean interpretation".into())),
            },
            TypeDescriptor::Int16 => {
                let n = integer_of(&value).map_err(fail)?;
                i16::try_from(n).map(Self::Int16).map_err(|_| fail(format!("{n} is out of range")))
            }
            TypeDescriptor::Int32 => {
                let n = integer_of(&value).map_err(fail)?;
                i32::try_from(n).map(Self::Int32).map_err(|_| fail(format!("{n} is out of range")))
            }
            TypeDescriptor::Int64 => integer_of(&value).map(Self::Int64).map_err(fail),
            TypeDescriptor::Float64 => match &value {
                #[allow(clippy::cast_precision_loss)]
                Self::Int16(_) | Self::Int32(_) | Self::Int64(_) => {
                    Ok(Self::Float64(value.as_i64().unwrap_or_default() as f64))
                }
                Self::Bool(b) => Ok(Self::Float64(f64::from(u8::from(*b)))),
                Self::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Self::Float64)
                    .map_err(|err| fail(err.to_string())),
                _ => Err(fail("no numeric interpretation".into())),
            },
            TypeDescriptor::String => match value {
                Self::Bytes(bytes) => String::from_utf8(bytes)
                    .map(Self::String)
                    .map_err(|err| fail(err.to_string())),
                other => Ok(Self::String(other.to_string())),
            },
            TypeDescriptor::Bytes => match value {
                Self::String(s) => Ok(Self::Bytes(s.into_bytes())),
                _ => Err(fail("only strings convert to bytes".into())),
            },
            TypeDescriptor::Object => Ok(value),
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn integer_of(value: &Value) -> Result<i64, String> {
    match value {
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Float64(f) if f.is_finite() => {
            let rounded = f.round_ties_even();
            if rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
                Err(format!("{f} is out of range"))
            } else {
                Ok(rounded as i64)
            }
        }
        Value::Float64(f) => Err(format!("{f} has no integer value")),
        Value::String(s) => s.trim().parse::<i64>().map_err(|err| err.to_string()),
        other => other
            .as_i64()
            .ok_or_else(|| "no integer interpretation".to_string()),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int16(a), Self::Int16(b)) => a == b,
            (Self::Int32(a), Self::Int32(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Deferred(a), Self::Deferred(b)) => Arc::ptr_eq(&a.produce, &b.produce),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
            Self::Bytes(v) => {
                f.write_str("0x")?;
                v.iter().try_for_each(|byte| write!(f, "{byte:02x}"))
            }
            Self::Deferred(d) => write!(f, "<deferred {}>", d.ty()),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        })*
    };
}

value_from! {
    bool => Bool,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f64 => Float64,
    String => String,
    Vec<u8> => Bytes,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Coerces an evaluation result into a host type.
///
/// Non-`Option` targets reject null results; wrap the target in `Option` to
/// accept them.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, ConversionError>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        Ok(value.materialize())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value.materialize() {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

macro_rules! from_value {
    ($($ty:ty => $target:ident),* $(,)?) => {
        $(impl FromValue for $ty {
            fn from_value(value: Value) -> Result<Self, ConversionError> {
                match value.coerce(TypeDescriptor::$target)? {
                    Value::$target(v) => Ok(v),
                    Value::Null => Err(ConversionError::null(TypeDescriptor::$target)),
                    other => Err(ConversionError::new(
                        other.type_descriptor(),
                        TypeDescriptor::$target,
                        "unexpected value after conversion",
                    )),
                }
            }
        })*
    };
}

from_value! {
    bool => Bool,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f64 => Float64,
    String => String,
    Vec<u8> => Bytes,
}
