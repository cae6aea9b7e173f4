//! core::template::schema
//!
//! Web-template JSON schema and parsing.
//!
//! # Shape
//!
//! A web template is either an envelope with a `tree` member or the bare
//! tree itself. Each node looks like:
//!
//! ```json
//! {
//!   "id": "status",
//!   "rmType": "DV_TEXT",
//!   "min": 1,
//!   "max": 1,
//!   "aqlPath": "/context/other_context/items[at0001]/value",
//!   "inContext": false,
//!   "annotations": { "comment": "free text" },
//!   "inputs": [ { "type": "TEXT", "defaultValue": "ok" } ],
//!   "children": []
//! }
//! ```
//!
//! Unknown members are ignored: real web templates carry many presentation
//! fields the engine has no use for.
//!
//! # Cardinality
//!
//! - `min == 1` marks a node required; other lower bounds do not
//! - `max == -1` marks a node repeatable

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Deserializer, Serialize};

use super::{Template, TemplateError, TemplateNode};

/// One entry of a node's `inputs` list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Input {
    /// Flat suffix this input feeds (`code`, `magnitude`, ...).
    #[serde(default)]
    pub suffix: Option<String>,

    /// Input kind (`TEXT`, `CODED_TEXT`, `DECIMAL`, ...).
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    #[serde(default, deserialize_with = "scalar_string")]
    pub default_value: Option<String>,

    #[serde(default)]
    pub terminology: Option<String>,

    /// Allowed codes with their labels.
    #[serde(default)]
    pub list: Vec<InputItem>,
}

impl Input {
    /// Find the code whose label matches `label` (case-insensitive).
    pub fn code_for_label(&self, label: &str) -> Option<&str> {
        let wanted = label.trim().to_lowercase();
        self.list
            .iter()
            .find(|item| {
                item.label_text()
                    .is_some_and(|l| l.trim().to_lowercase() == wanted)
            })
            .map(|item| item.value.as_str())
    }

    /// Find the label of `code`.
    pub fn label_for_code(&self, code: &str) -> Option<&str> {
        self.list
            .iter()
            .find(|item| item.value == code)
            .and_then(InputItem::label_text)
    }
}

/// A code list entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputItem {
    #[serde(deserialize_with = "required_scalar_string")]
    pub value: String,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub localized_labels: BTreeMap<String, String>,
}

impl InputItem {
    /// Label, falling back to the English then any localized label.
    pub fn label_text(&self) -> Option<&str> {
        self.label
            .as_deref()
            .or_else(|| self.localized_labels.get("en").map(String::as_str))
            .or_else(|| self.localized_labels.values().next().map(String::as_str))
    }
}

/// Raw node as it appears in the JSON document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    id: String,
    rm_type: String,
    #[serde(default)]
    min: i64,
    #[serde(default = "default_max")]
    max: i64,
    #[serde(default)]
    aql_path: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    in_context: bool,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
    #[serde(default)]
    inputs: Vec<Input>,
    #[serde(default)]
    children: Vec<RawNode>,
}

fn default_max() -> i64 {
    1
}

/// Envelope fields we care about.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default)]
    template_id: Option<String>,
    tree: RawNode,
}

/// Parse a web template from JSON text.
///
/// # Errors
///
/// Returns `TemplateError::Parse` for malformed JSON or missing node fields
/// and `TemplateError::DuplicateChild` if two siblings share an id.
///
/// # Example
///
/// ```
/// use flatweave::core::template::schema::parse_template;
///
/// let json = r#"{
///     "templateId": "demo",
///     "tree": {
///         "id": "test", "rmType": "COMPOSITION", "min": 1, "max": 1,
///         "children": [
///             { "id": "status", "rmType": "DV_TEXT", "min": 1, "max": 1 }
///         ]
///     }
/// }"#;
///
/// let template = parse_template(json).unwrap();
/// assert_eq!(template.template_id(), Some("demo"));
/// assert_eq!(template.root().id(), "test");
/// assert!(template.lookup("status").unwrap().is_leaf());
/// ```
pub fn parse_template(json: &str) -> Result<Template, TemplateError> {
    let document: serde_json::Value =
        serde_json::from_str(json).map_err(|e| TemplateError::Parse(e.to_string()))?;
    parse_template_value(document)
}

/// Parse a web template from an already-decoded JSON value.
pub fn parse_template_value(document: serde_json::Value) -> Result<Template, TemplateError> {
    let (template_id, raw) = if document.get("tree").is_some() {
        let envelope: Envelope =
            serde_json::from_value(document).map_err(|e| TemplateError::Parse(e.to_string()))?;
        (envelope.template_id, envelope.tree)
    } else {
        let raw: RawNode =
            serde_json::from_value(document).map_err(|e| TemplateError::Parse(e.to_string()))?;
        (None, raw)
    };

    let root = build_node(raw)?;
    Ok(Template::with_id(template_id, root))
}

/// Convert a raw node bottom-up, checking sibling id uniqueness.
fn build_node(raw: RawNode) -> Result<TemplateNode, TemplateError> {
    let mut seen = HashSet::new();
    let mut children = Vec::with_capacity(raw.children.len());
    for child in raw.children {
        if !seen.insert(child.id.clone()) {
            return Err(TemplateError::DuplicateChild {
                parent: raw.id,
                id: child.id,
            });
        }
        children.push(build_node(child)?);
    }

    Ok(TemplateNode {
        id: raw.id,
        rm_type: raw.rm_type,
        aql_path: raw.aql_path,
        name: raw.name,
        min: raw.min,
        max: raw.max,
        in_context: raw.in_context,
        annotations: raw.annotations,
        inputs: raw.inputs,
        children,
    })
}

/// Accept strings, numbers and booleans as text.
fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| scalar_to_string(&v)))
}

fn required_scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    scalar_to_string(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected a scalar, found {value}")))
}

/// Render a JSON scalar as text; `None` for null, objects and arrays.
pub fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
