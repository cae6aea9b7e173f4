//! source::json
//!
//! Facts from JSON documents.
//!
//! Patterns are slash-separated paths from the document root. Each segment
//! is an object key, an array index, or `*` for any key or index:
//!
//! ```text
//! /patient/id
//! /visits/*/diagnosis/code
//! ```
//!
//! Object member order is preserved, so facts come out in the order they
//! appear in the text.

use serde_json::Value;
use tracing::debug;

use super::{Fact, FactSource, SourceError};
use crate::core::template::schema::scalar_to_string;

const WILDCARD: &str = "*";

/// A parsed JSON document.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonSource {
    document: Value,
}

impl JsonSource {
    pub fn new(document: Value) -> Self {
        Self { document }
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Parse` for malformed JSON.
    pub fn parse(text: &str) -> Result<Self, SourceError> {
        serde_json::from_str(text)
            .map(Self::new)
            .map_err(|e| SourceError::Parse(e.to_string()))
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Split the document into independent records at `pattern`.
    ///
    /// # Example
    ///
    /// ```
    /// use flatweave::source::JsonSource;
    ///
    /// let source = JsonSource::parse(r#"{ "records": [ {"id": 1}, {"id": 2} ] }"#).unwrap();
    /// let records = source.roots("/records/*").unwrap();
    /// assert_eq!(records.len(), 2);
    /// ```
    pub fn roots(&self, pattern: &str) -> Result<Vec<JsonSource>, SourceError> {
        let segments = split_pattern(pattern)?;
        let mut out = Vec::new();
        collect_roots(&self.document, &segments, &mut out);
        debug!(pattern, records = out.len(), "split source document");
        Ok(out.into_iter().cloned().map(Self::new).collect())
    }
}

impl FactSource for JsonSource {
    fn facts(&self, keys: &[String]) -> Result<Vec<Fact>, SourceError> {
        let patterns = keys
            .iter()
            .map(|k| split_pattern(k).map(|segments| (k.as_str(), segments)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut facts = Vec::new();
        let mut path = Vec::new();
        walk(&self.document, &patterns, &mut path, &mut facts);
        Ok(facts)
    }
}

fn split_pattern(pattern: &str) -> Result<Vec<&str>, SourceError> {
    let trimmed = pattern.trim().trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let segments: Vec<&str> = trimmed.trim_end_matches('/').split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(SourceError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "empty segment".to_string(),
        });
    }
    Ok(segments)
}

fn segment_matches(pattern: &str, segment: &str) -> bool {
    pattern == WILDCARD || pattern == segment
}

/// Whether `path` is a prefix of something `pattern` could match.
fn could_match(pattern: &[&str], path: &[String]) -> bool {
    pattern.len() >= path.len()
        && pattern
            .iter()
            .zip(path)
            .all(|(p, s)| segment_matches(p, s))
}

fn children(value: &Value) -> Vec<(String, &Value)> {
    match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    }
}

fn walk(value: &Value, patterns: &[(&str, Vec<&str>)], path: &mut Vec<String>, out: &mut Vec<Fact>) {
    for (key, segments) in patterns {
        if segments.len() == path.len() && could_match(segments, &path[..]) {
            out.push(Fact::new(*key, scalar_to_string(value)));
        }
    }

    for (segment, child) in children(value) {
        path.push(segment);
        if patterns.iter().any(|(_, p)| could_match(p, &path[..])) {
            walk(child, patterns, path, out);
        }
        path.pop();
    }
}

fn collect_roots<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    let Some((first, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    for (segment, child) in children(value) {
        if segment_matches(first, &segment) {
            collect_roots(child, rest, out);
        }
    }
}
