//! engine::convert
//!
//! Turn rendered suffix maps into typed values for a template leaf.
//!
//! Keys of the suffix map are flat suffixes without the leading `|`; the
//! empty key is the bare value. Leaf types with a dedicated [`Value`] kind
//! are converted to it; everything else is passed through as
//! [`Value::Fields`].

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::core::template::{Input, TemplateNode};
use crate::core::value::{CodedText, Identifier, Value};

/// Errors from value conversion.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConvertError {
    #[error("'{value}' is not an allowed label or code for '{node}'")]
    UnknownCode { node: String, value: String },

    #[error("invalid value for '{node}': {reason}")]
    Invalid { node: String, reason: String },
}

/// Convert `fields` for a leaf of `template`.
pub fn to_value(template: &TemplateNode, fields: &BTreeMap<String, String>) -> Result<Value, ConvertError> {
    let bare = fields.get("").map(String::as_str);
    let single = fields.len() == 1;

    match (template.rm_type(), bare) {
        ("DV_CODED_TEXT", _) => coded_text(template, fields),
        ("CODE_PHRASE", _) => code_phrase(template, fields),
        ("DV_BOOLEAN", Some(text)) if single => {
            Value::boolean(text).map_err(|e| ConvertError::Invalid {
                node: template.id().to_string(),
                reason: e.to_string(),
            })
        }
        ("DV_DATE_TIME", Some(text)) if single => Ok(
            match NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
                Ok(dt) => Value::DateTime(dt),
                Err(_) => Value::text(text),
            },
        ),
        ("DV_DATE", Some(text)) if single => Ok(Value::Date(text.to_string())),
        ("DV_DURATION", Some(text)) if single => Ok(Value::Duration(text.to_string())),
        ("DV_TEXT", Some(text)) if single => Ok(Value::text(text)),
        ("PARTY_PROXY" | "PARTY_IDENTIFIED" | "PARTY_SELF", _) if has_only(fields, &["name"]) => {
            Ok(Value::party(fields["name"].clone()))
        }
        ("DV_IDENTIFIER", _) if fields.contains_key("id") => Ok(identifier(fields)),
        _ => Ok(passthrough(fields)),
    }
}

/// Context entries have no template node; bare values stay text.
pub fn to_ctx_value(fields: &BTreeMap<String, String>) -> Value {
    match fields.get("") {
        Some(text) if fields.len() == 1 => Value::text(text.clone()),
        _ => passthrough(fields),
    }
}

fn has_only(fields: &BTreeMap<String, String>, keys: &[&str]) -> bool {
    fields.len() == keys.len() && keys.iter().all(|k| fields.contains_key(*k))
}

fn passthrough(fields: &BTreeMap<String, String>) -> Value {
    Value::Fields(
        fields
            .iter()
            .map(|(suffix, value)| {
                let suffix = suffix.trim_start_matches('|');
                let key = if suffix.is_empty() {
                    String::new()
                } else {
                    format!("|{suffix}")
                };
                (key, value.clone())
            })
            .collect(),
    )
}

/// Input carrying the code list, preferring suffix `code`.
fn code_input(template: &TemplateNode) -> Option<&Input> {
    let inputs = template.inputs();
    inputs
        .iter()
        .find(|i| i.suffix.as_deref() == Some("code"))
        .or_else(|| inputs.iter().find(|i| !i.list.is_empty()))
        .or_else(|| inputs.first())
}

fn coded_text(template: &TemplateNode, fields: &BTreeMap<String, String>) -> Result<Value, ConvertError> {
    let input = code_input(template);
    let terminology = terminology_of(input, fields);

    if let Some(code) = fields.get("code") {
        let label = fields
            .get("value")
            .map(String::as_str)
            .or_else(|| input.and_then(|i| i.label_for_code(code)))
            .unwrap_or(code);
        return Ok(CodedText::new(label, terminology, code.as_str()).into());
    }

    let Some(text) = fields.get("") else {
        return Ok(passthrough(fields));
    };
    let Some(input) = input.filter(|i| !i.list.is_empty()) else {
        return Ok(passthrough(fields));
    };

    if let Some(code) = input.code_for_label(text) {
        let label = input.label_for_code(code).unwrap_or(text);
        return Ok(CodedText::new(label, terminology, code).into());
    }
    if let Some(label) = input.label_for_code(text) {
        return Ok(CodedText::new(label, terminology, text.as_str()).into());
    }
    Err(ConvertError::UnknownCode {
        node: template.id().to_string(),
        value: text.clone(),
    })
}

fn code_phrase(template: &TemplateNode, fields: &BTreeMap<String, String>) -> Result<Value, ConvertError> {
    let input = code_input(template);
    let Some(code) = fields.get("code").or_else(|| fields.get("")) else {
        return Ok(passthrough(fields));
    };
    Ok(Value::code_phrase(terminology_of(input, fields), code.clone()))
}

fn terminology_of(input: Option<&Input>, fields: &BTreeMap<String, String>) -> String {
    fields
        .get("terminology")
        .cloned()
        .or_else(|| input.and_then(|i| i.terminology.clone()))
        .unwrap_or_else(|| "local".to_string())
}

fn identifier(fields: &BTreeMap<String, String>) -> Value {
    let mut id = Identifier::new(fields["id"].clone());
    id.issuer = fields.get("issuer").cloned();
    id.assigner = fields.get("assigner").cloned();
    id.kind = fields.get("type").cloned();
    id.into()
}
