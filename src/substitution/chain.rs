//! Transformers and the process-wide substitution chain.
//!
//! # Responsibilities
//! - Resolve fixture placeholders against an ordered set of transformers
//! - Leave placeholders for unknown keys verbatim so later passes can resolve them
//! - Hold the ordered, mutable registry written by the management API
//!
//! # Design Decisions
//! - The chain is an owned handle (`Arc<RwLock<..>>`) injected into handlers
//! - Reads take a snapshot under a shared lock; writes hold the exclusive lock
//!   for the whole replace-or-append, so no partial update is observable
//! - Key comparison is ASCII case-insensitive for both lookup and replacement
//! - Fixture text is tokenized once; substituted values are emitted as
//!   literal text and never scanned for placeholders again

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::routing::Binding;
use crate::substitution::template::{tokenize, TemplateError, Token};

/// A persistent key/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitution {
    pub key: String,
    pub value: String,
}

impl Substitution {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl From<Binding> for Substitution {
    fn from(binding: Binding) -> Self {
        Self {
            key: binding.key,
            value: binding.value,
        }
    }
}

/// A chainable text transformation.
///
/// Every variant must leave text it does not understand untouched, so that
/// transformers can be applied in sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transformer {
    Substitution(Substitution),
}

impl Transformer {
    /// The key this transformer resolves, if it resolves one.
    pub fn key(&self) -> Option<&str> {
        match self {
            Transformer::Substitution(s) => Some(&s.key),
        }
    }

    pub fn apply(&self, text: &str) -> Result<String, TemplateError> {
        apply_all(text, std::slice::from_ref(self))
    }

    /// Replacement text for the placeholder `key`, if this transformer owns it.
    pub fn resolve(&self, key: &str) -> Option<&str> {
        match self {
            Transformer::Substitution(s) if s.key.eq_ignore_ascii_case(key) => Some(&s.value),
            Transformer::Substitution(_) => None,
        }
    }

    fn resolves(&self, key: &str) -> bool {
        self.key().is_some_and(|k| k.eq_ignore_ascii_case(key))
    }
}

impl From<Substitution> for Transformer {
    fn from(substitution: Substitution) -> Self {
        Transformer::Substitution(substitution)
    }
}

impl From<Binding> for Transformer {
    fn from(binding: Binding) -> Self {
        Transformer::Substitution(binding.into())
    }
}

/// Resolve every placeholder in `text` against `transformers`.
///
/// The first transformer that owns a key wins. Values are inserted as
/// literal text.
pub fn apply_all(text: &str, transformers: &[Transformer]) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(text.len());
    for token in tokenize(text)? {
        match token {
            Token::Text(t) => out.push_str(t),
            Token::Placeholder { raw, key } => {
                let value = transformers.iter().find_map(|t| t.resolve(key));
                out.push_str(value.unwrap_or(raw));
            }
        }
    }
    Ok(out)
}

/// Where a registration landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Appended(usize),
    Replaced(usize),
}

/// Ordered registry of substitutions shared by every request.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionChain {
    inner: Arc<RwLock<Vec<Transformer>>>,
}

impl SubstitutionChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a chain seeded with `defaults`, registered in order.
    pub fn with_defaults(defaults: impl IntoIterator<Item = Substitution>) -> Self {
        let chain = Self::new();
        for substitution in defaults {
            chain.register(substitution);
        }
        chain
    }

    /// Replace the value for an existing key in place, or append.
    pub fn register(&self, substitution: Substitution) -> Registration {
        let mut transformers = self.inner.write();
        let existing = transformers
            .iter()
            .position(|t| t.resolves(&substitution.key));

        match existing {
            Some(position) => {
                transformers[position] = substitution.into();
                Registration::Replaced(position)
            }
            None => {
                transformers.push(substitution.into());
                Registration::Appended(transformers.len() - 1)
            }
        }
    }

    /// Substitutions in chain order.
    pub fn list(&self) -> Vec<Substitution> {
        self.inner
            .read()
            .iter()
            .map(|t| match t {
                Transformer::Substitution(s) => s.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// A consistent copy of the current transformers.
    pub fn snapshot(&self) -> Vec<Transformer> {
        self.inner.read().clone()
    }

    /// Render `text` with the persistent chain plus request-local bindings.
    ///
    /// A local binding shadows a chain entry with the same key.
    pub fn render(&self, text: &str, local: &[Binding]) -> Result<String, TemplateError> {
        let mut active: Vec<Transformer> = self
            .snapshot()
            .into_iter()
            .filter(|t| !local.iter().any(|b| t.resolves(&b.key)))
            .collect();
        active.extend(local.iter().cloned().map(Transformer::from));

        apply_all(text, &active)
    }
}
