use std::fmt;
use std::sync::Arc;

use sha1::{Digest, Sha1};

use super::binder::BindingKind;
use crate::value::TypeDescriptor;

/// Canonical key for a compiled snippet: source text, binding convention and
/// the declared parameter signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(Arc<str>);

impl Fingerprint {
    /// Parameter order does not matter; names are expected to be unique, as
    /// they are when taken from an item's parameter map.
    pub fn new<'a, I>(source: &str, binding: BindingKind, parameters: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, TypeDescriptor)>,
    {
        let mut parameters: Vec<_> = parameters.into_iter().collect();
        parameters.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));

        let mut hasher = Sha1::new();
        update_field(&mut hasher, source.as_bytes());
        update_field(&mut hasher, binding.tag().as_bytes());
        hasher.update((parameters.len() as u64).to_le_bytes());
        for (name, ty) in parameters {
            update_field(&mut hasher, name.as_bytes());
            update_field(&mut hasher, ty.name().as_bytes());
        }

        Self(Arc::from(format!("{:x}", hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form used in log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

// Length-prefixed so that ("ab", "c") and ("a", "bc") never hash alike.
fn update_field(hasher: &mut Sha1, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short())
    }
}
