//! core::composition::flatten
//!
//! Serialize a composition to the flat `address -> text` format.
//!
//! Keys are composition addresses with cardinality suffixes, optionally
//! prefixed with the root id. Structured values fan out into `|suffix` keys
//! next to their base key (see [`Value::expand`]). Context entries are
//! appended verbatim under their `ctx/...` keys.
//!
//! [`Value::expand`]: crate::core::value::Value::expand

use std::collections::btree_map;

use serde::Serialize;
use thiserror::Error;

use super::{Composition, NodeId};
use crate::core::value::FlatMap;

/// Errors from flattening.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlattenError {
    #[error("leaf '{0}' has neither a value nor an absence marker")]
    MissingValue(String),
}

/// Flattening options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlattenOptions {
    /// Prefix every tree key with the root id.
    pub include_root: bool,
}

/// A flattened composition, sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FlatComposition(FlatMap);

impl FlatComposition {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }

    /// Insert or replace an entry.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn into_inner(self) -> FlatMap {
        self.0
    }

    /// Pretty-printed JSON object.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.0)
    }
}

impl<'a> IntoIterator for &'a FlatComposition {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<'t> Composition<'t> {
    /// Flatten with root-relative keys.
    ///
    /// # Errors
    ///
    /// Returns `FlattenError::MissingValue` for the first leaf (in document
    /// order) that has neither a value nor an absence marker.
    pub fn flatten(&self) -> Result<FlatComposition, FlattenError> {
        self.flatten_with(FlattenOptions::default())
    }

    pub fn flatten_with(&self, options: FlattenOptions) -> Result<FlatComposition, FlattenError> {
        let mut out = FlatMap::new();
        for id in self.leaves() {
            let key = self.flat_key(id, options);
            let node = self.node(id);
            match (node.value(), node.absence()) {
                (Some(value), _) => value.expand(&key, &mut out),
                (None, Some(absence)) => absence.expand(&key, &mut out),
                (None, None) => return Err(FlattenError::MissingValue(key)),
            }
        }
        for (key, entry) in &self.ctx {
            entry.expand(key, &mut out);
        }
        Ok(FlatComposition(out))
    }

    fn flat_key(&self, id: NodeId, options: FlattenOptions) -> String {
        let address = self.address_of(id);
        if options.include_root {
            format!("{}/{}", self.root_id(), address)
        } else {
            address
        }
    }
}
