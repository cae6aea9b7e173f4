//! core::value
//!
//! Leaf payloads and their flat expansion.
//!
//! Every leaf of a composition carries at most one [`Value`]. A value knows
//! how to expand itself into one or more flat `key|suffix -> text` pairs
//! given the base key of its leaf:
//!
//! | Kind | Expansion |
//! |------|-----------|
//! | Text, Date, Duration, Boolean, DateTime | `key` |
//! | CodePhrase | `key|code`, `key|terminology`, `key|preferred_term`? |
//! | CodedText | code phrase pairs plus `key|value` |
//! | Identifier | `key|id`, `key|issuer`?, `key|assigner`?, `key|type`? |
//! | PartyProxy | `key|name` |
//! | IsmTransition | coded text at `key/current_state` |
//! | Absent | `key/_absence_reason|{value,code,terminology}` plus `key` |
//! | Fields | `key` + each raw suffix |

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Flat output map: unique keys, deterministic iteration order.
pub type FlatMap = BTreeMap<String, String>;

/// Path segment under which absence reasons are written.
pub const ABSENCE_SEGMENT: &str = "_absence_reason";

/// Errors from value construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValueError {
    #[error("invalid date {year:04}-{month:02}-{day:02}")]
    InvalidDate { year: i32, month: u32, day: u32 },

    #[error("invalid boolean '{0}'")]
    InvalidBoolean(String),
}

/// A terminology-bound code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodePhrase {
    pub terminology: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_term: Option<String>,
}

impl CodePhrase {
    pub fn new(terminology: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            terminology: terminology.into(),
            code: code.into(),
            preferred_term: None,
        }
    }

    /// Attach a preferred term.
    pub fn with_preferred_term(mut self, term: impl Into<String>) -> Self {
        self.preferred_term = Some(term.into());
        self
    }

    fn expand(&self, key: &str, out: &mut FlatMap) {
        out.insert(format!("{key}|code"), self.code.clone());
        out.insert(format!("{key}|terminology"), self.terminology.clone());
        if let Some(term) = &self.preferred_term {
            out.insert(format!("{key}|preferred_term"), term.clone());
        }
    }
}

/// Display text plus its code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodedText {
    pub value: String,
    pub code: CodePhrase,
}

impl CodedText {
    pub fn new(
        value: impl Into<String>,
        terminology: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            value: value.into(),
            code: CodePhrase::new(terminology, code),
        }
    }

    fn expand(&self, key: &str, out: &mut FlatMap) {
        self.code.expand(key, out);
        out.insert(format!("{key}|value"), self.value.clone());
    }
}

/// An identifier with optional provenance.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Identifier {
    pub id: String,
    pub issuer: Option<String>,
    pub assigner: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl Identifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    fn expand(&self, key: &str, out: &mut FlatMap) {
        out.insert(format!("{key}|id"), self.id.clone());
        let optional = [
            ("issuer", &self.issuer),
            ("assigner", &self.assigner),
            ("type", &self.kind),
        ];
        for (suffix, value) in optional {
            if let Some(value) = value {
                out.insert(format!("{key}|{suffix}"), value.clone());
            }
        }
    }
}

/// Explicit "value is absent, and here is why" marker.
///
/// The placeholder is written at the bare key because some downstream leaf
/// kinds reject an entry without a value even when it is flagged absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Absence {
    pub value: String,
    pub code: String,
    pub terminology: String,
    #[serde(default = "Absence::default_placeholder")]
    pub placeholder: String,
}

impl Absence {
    pub fn new(
        value: impl Into<String>,
        code: impl Into<String>,
        terminology: impl Into<String>,
    ) -> Self {
        Self {
            value: value.into(),
            code: code.into(),
            terminology: terminology.into(),
            placeholder: Self::default_placeholder(),
        }
    }

    /// The generic "unknown" reason (openehr code 253).
    pub fn unknown() -> Self {
        Self::new("unknown", "253", "openehr")
    }

    /// Replace the wire placeholder text.
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    fn default_placeholder() -> String {
        "1".to_string()
    }

    /// Expand into flat pairs rooted at `key`.
    pub fn expand(&self, key: &str, out: &mut FlatMap) {
        let reason = format!("{key}/{ABSENCE_SEGMENT}");
        out.insert(format!("{reason}|value"), self.value.clone());
        out.insert(format!("{reason}|code"), self.code.clone());
        out.insert(format!("{reason}|terminology"), self.terminology.clone());
        out.insert(key.to_string(), self.placeholder.clone());
    }
}

/// A leaf payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Date(String),
    Duration(String),
    Boolean(bool),
    DateTime(NaiveDateTime),
    CodePhrase(CodePhrase),
    CodedText(CodedText),
    Identifier(Identifier),
    PartyProxy { name: String },
    IsmTransition { current_state: CodedText },
    Absent(Absence),
    /// Raw `suffix -> text` pairs; the empty suffix is the bare key.
    Fields(BTreeMap<String, String>),
}

impl Value {
    /// Plain text value.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Midnight on the given calendar day.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::InvalidDate` for days that do not exist.
    ///
    /// # Example
    ///
    /// ```
    /// use flatweave::core::value::Value;
    ///
    /// let value = Value::date_time(2021, 3, 9).unwrap();
    /// let flat = value.to_flat("start");
    /// assert_eq!(flat["start"], "2021-03-09T00:00:00");
    ///
    /// assert!(Value::date_time(2021, 2, 30).is_err());
    /// ```
    pub fn date_time(year: i32, month: u32, day: u32) -> Result<Self, ValueError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(Self::DateTime)
            .ok_or(ValueError::InvalidDate { year, month, day })
    }

    /// Boolean parsed from `true`/`false` (case-insensitive).
    pub fn boolean(text: &str) -> Result<Self, ValueError> {
        match text.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Self::Boolean(true)),
            "false" => Ok(Self::Boolean(false)),
            _ => Err(ValueError::InvalidBoolean(text.to_string())),
        }
    }

    pub fn code_phrase(terminology: impl Into<String>, code: impl Into<String>) -> Self {
        Self::CodePhrase(CodePhrase::new(terminology, code))
    }

    pub fn coded_text(
        value: impl Into<String>,
        terminology: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self::CodedText(CodedText::new(value, terminology, code))
    }

    pub fn party(name: impl Into<String>) -> Self {
        Self::PartyProxy { name: name.into() }
    }

    /// Raw fields from `(suffix, text)` pairs.
    pub fn fields<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Fields(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Short name of the value kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Date(_) => "date",
            Self::Duration(_) => "duration",
            Self::Boolean(_) => "boolean",
            Self::DateTime(_) => "date_time",
            Self::CodePhrase(_) => "code_phrase",
            Self::CodedText(_) => "coded_text",
            Self::Identifier(_) => "identifier",
            Self::PartyProxy { .. } => "party_proxy",
            Self::IsmTransition { .. } => "ism_transition",
            Self::Absent(_) => "absent",
            Self::Fields(_) => "fields",
        }
    }

    /// Expand this value into `out` using `key` as the base key.
    pub fn expand(&self, key: &str, out: &mut FlatMap) {
        match self {
            Self::Text(v) | Self::Date(v) | Self::Duration(v) => {
                out.insert(key.to_string(), v.clone());
            }
            Self::Boolean(b) => {
                out.insert(key.to_string(), b.to_string());
            }
            Self::DateTime(dt) => {
                out.insert(key.to_string(), dt.format("%Y-%m-%dT%H:%M:%S").to_string());
            }
            Self::CodePhrase(code) => code.expand(key, out),
            Self::CodedText(text) => text.expand(key, out),
            Self::Identifier(id) => id.expand(key, out),
            Self::PartyProxy { name } => {
                out.insert(format!("{key}|name"), name.clone());
            }
            Self::IsmTransition { current_state } => {
                current_state.expand(&format!("{key}/current_state"), out);
            }
            Self::Absent(absence) => absence.expand(key, out),
            Self::Fields(fields) => {
                for (suffix, v) in fields {
                    out.insert(format!("{key}{suffix}"), v.clone());
                }
            }
        }
    }

    /// Expand into a fresh map.
    pub fn to_flat(&self, key: &str) -> FlatMap {
        let mut out = FlatMap::new();
        self.expand(key, &mut out);
        out
    }
}

impl From<CodePhrase> for Value {
    fn from(code: CodePhrase) -> Self {
        Self::CodePhrase(code)
    }
}

impl From<CodedText> for Value {
    fn from(text: CodedText) -> Self {
        Self::CodedText(text)
    }
}

impl From<Identifier> for Value {
    fn from(id: Identifier) -> Self {
        Self::Identifier(id)
    }
}

impl From<Absence> for Value {
    fn from(absence: Absence) -> Self {
        Self::Absent(absence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_expands_to_bare_key() {
        let flat = Value::text("ok").to_flat("context/status");
        assert_eq!(flat.len(), 1);
        assert_eq!(flat["context/status"], "ok");
    }

    #[test]
    fn code_phrase_expansion() {
        let flat = Value::code_phrase("ISO_639-1", "en").to_flat("language");
        assert_eq!(flat.len(), 2);
        assert_eq!(flat["language|code"], "en");
        assert_eq!(flat["language|terminology"], "ISO_639-1");
    }

    #[test]
    fn code_phrase_with_preferred_term() {
        let code = CodePhrase::new("SNOMED-CT", "123").with_preferred_term("thing");
        let flat = Value::from(code).to_flat("k");
        assert_eq!(flat["k|preferred_term"], "thing");
    }

    #[test]
    fn coded_text_adds_value() {
        let flat = Value::coded_text("Male", "local", "at0001").to_flat("sex");
        assert_eq!(flat.len(), 3);
        assert_eq!(flat["sex|value"], "Male");
        assert_eq!(flat["sex|code"], "at0001");
        assert_eq!(flat["sex|terminology"], "local");
    }

    #[test]
    fn identifier_skips_missing_parts() {
        let id = Identifier {
            issuer: Some("hospital".into()),
            ..Identifier::new("42")
        };
        let flat = Value::from(id).to_flat("pid");
        assert_eq!(flat.len(), 2);
        assert_eq!(flat["pid|id"], "42");
        assert_eq!(flat["pid|issuer"], "hospital");
    }

    #[test]
    fn party_proxy_uses_name_suffix() {
        let flat = Value::party("42112").to_flat("ctx/subject");
        assert_eq!(flat["ctx/subject|name"], "42112");
    }

    #[test]
    fn ism_transition_nests_current_state() {
        let value = Value::IsmTransition {
            current_state: CodedText::new("completed", "openehr", "532"),
        };
        let flat = value.to_flat("action/ism_transition");
        assert_eq!(flat["action/ism_transition/current_state|code"], "532");
        assert_eq!(
            flat["action/ism_transition/current_state|value"],
            "completed"
        );
    }

    #[test]
    fn absence_writes_reason_and_placeholder() {
        let flat = Value::from(Absence::unknown()).to_flat("sex");
        assert_eq!(flat["sex/_absence_reason|value"], "unknown");
        assert_eq!(flat["sex/_absence_reason|code"], "253");
        assert_eq!(flat["sex/_absence_reason|terminology"], "openehr");
        assert_eq!(flat["sex"], "1");
    }

    #[test]
    fn fields_concatenate_suffixes() {
        let value = Value::fields([("|magnitude", "12"), ("|unit", "mm")]);
        let flat = value.to_flat("size");
        assert_eq!(flat["size|magnitude"], "12");
        assert_eq!(flat["size|unit"], "mm");
    }

    #[test]
    fn boolean_parsing() {
        assert_eq!(Value::boolean("TRUE"), Ok(Value::Boolean(true)));
        assert!(Value::boolean("yes").is_err());
        assert_eq!(Value::Boolean(false).to_flat("b")["b"], "false");
    }
}
