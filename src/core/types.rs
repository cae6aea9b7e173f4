//! core::types
//!
//! Strong types for composition addressing.
//!
//! # Types
//!
//! - [`Address`] - Parsed slash-separated address
//! - [`Segment`] - One step of an address: an id plus an optional index
//! - [`Index`] - Cardinality selector (`:N`, `:*`, or none)
//!
//! # Grammar
//!
//! ```text
//! address := segment ("/" segment)*
//! segment := id | id ":" digits | id ":*"
//! ```
//!
//! Leading, trailing and repeated separators are ignored, so
//! `/test/context/` and `test/context` parse to the same address.
//!
//! # Examples
//!
//! ```
//! use flatweave::core::types::{Address, Index};
//!
//! let address = Address::parse("test/event:1/test_name").unwrap();
//! assert_eq!(address.len(), 3);
//! assert_eq!(address.segments()[1].index, Index::At(1));
//! assert!(!address.has_wildcard());
//!
//! assert!(Address::parse("event:x").is_err());
//! ```

use std::fmt;

use thiserror::Error;

/// Separator between address segments.
pub const SEPARATOR: char = '/';

/// Prefix of addresses that live in the context side channel.
pub const CTX_PREFIX: &str = "ctx/";

/// Prefix of the "every required leaf with this id" address form.
pub const ALL_REQUIRED_PREFIX: &str = "**/";

/// Errors from address parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,

    #[error("invalid segment '{segment}' in address '{address}': {reason}")]
    InvalidSegment {
        address: String,
        segment: String,
        reason: String,
    },
}

/// Cardinality selector attached to a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Index {
    /// No suffix: the single instance, or the latest repetition.
    Latest,
    /// `:N`: a specific repetition.
    At(usize),
    /// `:*`: every existing repetition.
    Any,
}

/// One step of an [`Address`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    /// Template id this segment selects.
    pub id: String,
    /// Cardinality selector.
    pub index: Index,
}

impl Segment {
    /// A segment without cardinality suffix.
    pub fn plain(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            index: Index::Latest,
        }
    }

    /// A segment pinned to a specific repetition.
    pub fn at(id: impl Into<String>, index: usize) -> Self {
        Self {
            id: id.into(),
            index: Index::At(index),
        }
    }

    /// A wildcard segment.
    pub fn any(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            index: Index::Any,
        }
    }

    /// Whether this segment is a `:*` wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.index == Index::Any
    }

    fn parse(raw: &str, address: &str) -> Result<Self, AddressError> {
        let invalid = |reason: &str| AddressError::InvalidSegment {
            address: address.to_string(),
            segment: raw.to_string(),
            reason: reason.to_string(),
        };

        let (id, index) = match raw.rsplit_once(':') {
            None => (raw, Index::Latest),
            Some((id, "*")) => (id, Index::Any),
            Some((id, digits)) => {
                if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                    return Err(invalid("cardinality must be a number or '*'"));
                }
                let n = digits
                    .parse::<usize>()
                    .map_err(|_| invalid("cardinality out of range"))?;
                (id, Index::At(n))
            }
        };

        if id.is_empty() {
            return Err(invalid("id cannot be empty"));
        }
        if id.contains(':') {
            return Err(invalid("id cannot contain ':'"));
        }

        Ok(Self {
            id: id.to_string(),
            index,
        })
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Index::Latest => write!(f, "{}", self.id),
            Index::At(n) => write!(f, "{}:{}", self.id, n),
            Index::Any => write!(f, "{}:*", self.id),
        }
    }
}

/// A parsed composition address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Address(Vec<Segment>);

impl Address {
    /// Parse an address from its textual form.
    ///
    /// # Errors
    ///
    /// Returns `AddressError::Empty` if the address has no segments and
    /// `AddressError::InvalidSegment` if a cardinality suffix is malformed.
    pub fn parse(text: &str) -> Result<Self, AddressError> {
        let segments = text
            .split(SEPARATOR)
            .filter(|s| !s.is_empty())
            .map(|s| Segment::parse(s, text))
            .collect::<Result<Vec<_>, _>>()?;

        if segments.is_empty() {
            return Err(AddressError::Empty);
        }
        Ok(Self(segments))
    }

    /// Build an address from already-parsed segments.
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self(segments)
    }

    /// The segments of this address.
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any segment is a `:*` wildcard.
    pub fn has_wildcard(&self) -> bool {
        self.0.iter().any(Segment::is_wildcard)
    }

    /// The address without its first segment.
    pub fn tail(&self) -> Address {
        Self(self.0.iter().skip(1).cloned().collect())
    }

    /// Split into parent address and terminal segment.
    pub fn split_last(&self) -> Option<(Address, &Segment)> {
        self.0
            .split_last()
            .map(|(last, parent)| (Self(parent.to_vec()), last))
    }

    /// The address with every cardinality suffix removed.
    pub fn without_cardinality(&self) -> Address {
        Self(self.0.iter().map(|s| Segment::plain(s.id.clone())).collect())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{SEPARATOR}")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Strip `:N` suffixes from a textual address.
///
/// # Example
///
/// ```
/// use flatweave::core::types::remove_cardinality;
///
/// assert_eq!(remove_cardinality("a/event:12/b:0"), "a/event/b");
/// ```
pub fn remove_cardinality(text: &str) -> String {
    text.split(SEPARATOR)
        .map(|segment| match segment.rsplit_once(':') {
            Some((id, suffix)) if suffix.chars().all(|c| c.is_ascii_digit()) => id,
            _ => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_segments() {
        let address = Address::parse("test/context/status").unwrap();
        assert_eq!(
            address.segments(),
            &[
                Segment::plain("test"),
                Segment::plain("context"),
                Segment::plain("status")
            ]
        );
    }

    #[test]
    fn parse_ignores_surrounding_separators() {
        let a = Address::parse("/test/context/").unwrap();
        let b = Address::parse("test//context").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "test/context");
    }

    #[test]
    fn parse_cardinality_and_wildcard() {
        let address = Address::parse("event:3/finding:*").unwrap();
        assert_eq!(address.segments()[0], Segment::at("event", 3));
        assert_eq!(address.segments()[1], Segment::any("finding"));
        assert!(address.has_wildcard());
        assert_eq!(address.to_string(), "event:3/finding:*");
    }

    #[test]
    fn parse_rejects_empty() {
        assert_eq!(Address::parse(""), Err(AddressError::Empty));
        assert_eq!(Address::parse("///"), Err(AddressError::Empty));
    }

    #[test]
    fn parse_rejects_bad_cardinality() {
        assert!(matches!(
            Address::parse("event:x"),
            Err(AddressError::InvalidSegment { .. })
        ));
        assert!(Address::parse("event:").is_err());
        assert!(Address::parse(":1").is_err());
        assert!(Address::parse("a:b:1").is_err());
    }

    #[test]
    fn split_last_returns_parent() {
        let address = Address::parse("a/b:1/c").unwrap();
        let (parent, last) = address.split_last().unwrap();
        assert_eq!(parent.to_string(), "a/b:1");
        assert_eq!(last, &Segment::plain("c"));
    }

    #[test]
    fn without_cardinality_drops_suffixes() {
        let address = Address::parse("a/b:1/c:*").unwrap();
        assert_eq!(address.without_cardinality().to_string(), "a/b/c");
    }

    #[test]
    fn remove_cardinality_keeps_wildcards() {
        assert_eq!(remove_cardinality("a/b:2/c:*"), "a/b/c:*");
    }
}
