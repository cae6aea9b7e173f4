//! source
//!
//! Ordered fact streams feeding the build pipeline.
//!
//! # Overview
//!
//! A fact is a `(key, value)` pair where the key is the source pattern that
//! matched and the value is the scalar text found there. Facts with no value
//! mark structural positions (objects, arrays) and are used to start new
//! repetitions.
//!
//! Sources must yield facts in document order: the pipeline relies on it to
//! decide which repetition a value belongs to.
//!
//! # Modules
//!
//! - [`json`] - JSON documents matched with `/a/*/b` patterns

pub mod json;

pub use json::JsonSource;

use thiserror::Error;

/// Errors from fact sources.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("failed to parse source document: {0}")]
    Parse(String),

    #[error("invalid source pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// One observation from a source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fact {
    pub key: String,
    pub value: Option<String>,
}

impl Fact {
    pub fn new(key: impl Into<String>, value: Option<String>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// A fact with scalar text.
    pub fn text(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, Some(value.into()))
    }

    /// A structural fact.
    pub fn marker(key: impl Into<String>) -> Self {
        Self::new(key, None)
    }

    /// The value, unless absent or empty.
    pub fn non_empty(&self) -> Option<&str> {
        self.value.as_deref().filter(|v| !v.is_empty())
    }
}

/// Something that can produce facts for a set of keys.
pub trait FactSource {
    /// Facts whose key is one of `keys`, in document order.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::InvalidPattern` if a key is not usable by this
    /// source.
    fn facts(&self, keys: &[String]) -> Result<Vec<Fact>, SourceError>;
}

/// A pre-extracted, ordered fact list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatSource {
    facts: Vec<Fact>,
}

impl FlatSource {
    pub fn new(facts: Vec<Fact>) -> Self {
        Self { facts }
    }

    pub fn push(&mut self, fact: Fact) {
        self.facts.push(fact);
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

impl FromIterator<Fact> for FlatSource {
    fn from_iter<I: IntoIterator<Item = Fact>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl FactSource for FlatSource {
    fn facts(&self, keys: &[String]) -> Result<Vec<Fact>, SourceError> {
        Ok(self
            .facts
            .iter()
            .filter(|f| keys.contains(&f.key))
            .cloned()
            .collect())
    }
}
