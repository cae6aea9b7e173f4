//! core::template
//!
//! The immutable schema tree a composition is built against.
//!
//! # Architecture
//!
//! A [`Template`] exclusively owns its root [`TemplateNode`]; every node owns
//! its children by value. The tree is built once, bottom-up, by
//! [`schema::parse_template`] and is never mutated afterwards, so it cannot
//! contain cycles. Compositions borrow template nodes for their whole
//! lifetime.
//!
//! # Addressing
//!
//! Template addresses are slash-separated ids without cardinality suffixes.
//! They are always resolved relative to a node; [`Template::lookup`] strips a
//! leading root id for convenience.

pub mod schema;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::core::types::{Address, AddressError, Segment, CTX_PREFIX, SEPARATOR};
use crate::core::value::Value;

pub use schema::{Input, InputItem};

/// Errors from template operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("failed to parse template: {0}")]
    Parse(String),

    #[error("template node '{node}' has no child '{segment}'")]
    NotFound { node: String, segment: String },

    #[error("template node '{parent}' declares child '{id}' more than once")]
    DuplicateChild { parent: String, id: String },

    #[error("no usable default for '{node}': {reason}")]
    InvalidDefault { node: String, reason: String },

    #[error(transparent)]
    Address(#[from] AddressError),
}

/// One node of the schema tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateNode {
    pub(crate) id: String,
    pub(crate) rm_type: String,
    pub(crate) aql_path: Option<String>,
    pub(crate) name: Option<String>,
    /// Declared lower bound
    pub(crate) min: i64,
    /// Declared upper bound, `-1` for unbounded
    pub(crate) max: i64,
    pub(crate) in_context: bool,
    pub(crate) annotations: BTreeMap<String, String>,
    pub(crate) inputs: Vec<Input>,
    pub(crate) children: Vec<TemplateNode>,
}

impl TemplateNode {
    /// Create a node with no metadata and no children.
    pub fn new(id: impl Into<String>, rm_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rm_type: rm_type.into(),
            aql_path: None,
            name: None,
            min: 0,
            max: 1,
            in_context: false,
            annotations: BTreeMap::new(),
            inputs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Exactly one occurrence is mandatory (`min == 1`).
    pub fn required(&self) -> bool {
        self.min == 1
    }

    /// Unbounded upper cardinality (`max == -1`).
    pub fn repeatable(&self) -> bool {
        self.max == -1
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    /// Mark the node required.
    pub fn with_required(mut self, required: bool) -> Self {
        self.min = i64::from(required);
        self
    }

    /// Mark the node repeatable.
    pub fn with_repeatable(mut self, repeatable: bool) -> Self {
        self.max = if repeatable { -1 } else { 1 };
        self
    }

    /// Set the declared bounds directly.
    pub fn with_bounds(mut self, min: i64, max: i64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Mark the node as a context-only leaf.
    pub fn with_in_context(mut self, in_context: bool) -> Self {
        self.in_context = in_context;
        self
    }

    pub fn with_input(mut self, input: Input) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_child(mut self, child: TemplateNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Reference-model type tag (`DV_TEXT`, `EVENT`, ...).
    pub fn rm_type(&self) -> &str {
        &self.rm_type
    }

    pub fn aql_path(&self) -> Option<&str> {
        self.aql_path.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether this leaf belongs to the context channel rather than the tree.
    pub fn in_context(&self) -> bool {
        self.in_context
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn children(&self) -> &[TemplateNode] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Direct child with the given id.
    pub fn child(&self, id: &str) -> Option<&TemplateNode> {
        self.children.iter().find(|c| c.id == id)
    }

    /// `min..max` rendering of the node's cardinality.
    pub fn cardinality(&self) -> String {
        if self.max == -1 {
            format!("{}..*", self.min)
        } else {
            format!("{}..{}", self.min, self.max)
        }
    }

    /// Resolve a relative address below this node.
    ///
    /// Cardinality suffixes on the address are ignored.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::NotFound` naming the first segment with no
    /// matching child.
    pub fn lookup(&self, address: &str) -> Result<&TemplateNode, TemplateError> {
        if address.trim_matches(SEPARATOR).is_empty() {
            return Ok(self);
        }
        let address = Address::parse(address)?;
        self.lookup_segments(address.segments())
    }

    /// Resolve already-parsed segments below this node.
    pub fn lookup_segments(&self, segments: &[Segment]) -> Result<&TemplateNode, TemplateError> {
        let mut current = self;
        for segment in segments {
            current = current
                .child(&segment.id)
                .ok_or_else(|| TemplateError::NotFound {
                    node: current.id.clone(),
                    segment: segment.id.clone(),
                })?;
        }
        Ok(current)
    }

    /// Evaluate the node's default rule.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::InvalidDefault` when the node has no inputs or
    /// none of them declares a default value.
    pub fn default_value(&self) -> Result<Value, TemplateError> {
        let invalid = |reason: &str| TemplateError::InvalidDefault {
            node: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.inputs.is_empty() {
            return Err(invalid("node declares no inputs"));
        }

        match self.rm_type.as_str() {
            "DV_CODED_TEXT" | "CODE_PHRASE" => {
                let input = self.code_input();
                let code = input
                    .default_value
                    .clone()
                    .ok_or_else(|| invalid("code input has no defaultValue"))?;
                let terminology = input
                    .terminology
                    .clone()
                    .unwrap_or_else(|| "local".to_string());
                return Ok(if self.rm_type == "CODE_PHRASE" {
                    Value::code_phrase(terminology, code)
                } else {
                    let label = input.label_for_code(&code).unwrap_or(&code).to_string();
                    Value::coded_text(label, terminology, code)
                });
            }
            _ => {}
        }

        let defaults: Vec<(&Input, &String)> = self
            .inputs
            .iter()
            .filter_map(|i| i.default_value.as_ref().map(|v| (i, v)))
            .collect();

        match defaults.as_slice() {
            [] => Err(invalid("no input declares a defaultValue")),
            [(input, value)] if input.suffix.is_none() => {
                let value = (*value).clone();
                Ok(match self.rm_type.as_str() {
                    "DV_BOOLEAN" => {
                        Value::boolean(&value).map_err(|e| invalid(&e.to_string()))?
                    }
                    "DV_DATE" => Value::Date(value),
                    "DV_DURATION" => Value::Duration(value),
                    "DV_DATE_TIME" => {
                        match NaiveDateTime::parse_from_str(&value, "%Y-%m-%dT%H:%M:%S") {
                            Ok(dt) => Value::DateTime(dt),
                            Err(_) => Value::Text(value),
                        }
                    }
                    _ => Value::Text(value),
                })
            }
            _ => {
                let mut fields = BTreeMap::new();
                for &(input, value) in &defaults {
                    let suffix = input
                        .suffix
                        .as_ref()
                        .map(|s| format!("|{s}"))
                        .unwrap_or_default();
                    fields.insert(suffix, value.clone());
                    if let Some(terminology) = &input.terminology {
                        fields
                            .entry("|terminology".to_string())
                            .or_insert_with(|| terminology.clone());
                    }
                }
                Ok(Value::Fields(fields))
            }
        }
    }

    /// Input carrying the code list, preferring one with suffix `code`.
    fn code_input(&self) -> &Input {
        self.inputs
            .iter()
            .find(|i| i.suffix.as_deref() == Some("code"))
            .or_else(|| self.inputs.iter().find(|i| !i.list.is_empty()))
            .unwrap_or(&self.inputs[0])
    }
}

/// The rooted schema tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    template_id: Option<String>,
    root: TemplateNode,
}

impl Template {
    pub fn new(root: TemplateNode) -> Self {
        Self::with_id(None, root)
    }

    pub fn with_id(template_id: Option<String>, root: TemplateNode) -> Self {
        Self { template_id, root }
    }

    /// Parse a web template document.
    pub fn parse(json: &str) -> Result<Self, TemplateError> {
        schema::parse_template(json)
    }

    pub fn root(&self) -> &TemplateNode {
        &self.root
    }

    pub fn template_id(&self) -> Option<&str> {
        self.template_id.as_deref()
    }

    /// Resolve an address relative to the root.
    ///
    /// A leading segment equal to the root id is stripped unless the root has
    /// a child of the same name.
    pub fn lookup(&self, address: &str) -> Result<&TemplateNode, TemplateError> {
        let trimmed = address.trim_matches(SEPARATOR);
        let relative = match trimmed.split_once(SEPARATOR) {
            Some((first, rest)) if self.is_root_prefix(first) => rest,
            None if self.is_root_prefix(trimmed) => "",
            _ => trimmed,
        };
        self.root.lookup(relative)
    }

    fn is_root_prefix(&self, segment: &str) -> bool {
        segment == self.root.id && self.root.child(segment).is_none()
    }

    /// Pre-order traversal of every node with its ancestor chain.
    pub fn walk(&self) -> Walk<'_> {
        Walk::new(&self.root)
    }

    /// Leaf nodes in depth-first pre-order.
    ///
    /// Each call starts a fresh traversal.
    pub fn leaves(&self) -> impl Iterator<Item = &TemplateNode> + '_ {
        self.walk().map(|p| p.node()).filter(|n| n.is_leaf())
    }

    /// Every node with the given id, with its path.
    pub fn find(&self, id: &str) -> Vec<TemplatePath<'_>> {
        self.walk().filter(|p| p.node().id == id).collect()
    }

    /// Indented text rendering of the tree.
    ///
    /// # Example
    ///
    /// ```
    /// use flatweave::core::template::{Template, TemplateNode};
    ///
    /// let root = TemplateNode::new("test", "COMPOSITION")
    ///     .with_required(true)
    ///     .with_child(TemplateNode::new("event", "EVENT").with_repeatable(true));
    /// let rendered = Template::new(root).render_tree();
    /// assert_eq!(rendered, "test [COMPOSITION] 1..1\n  event [EVENT] 0..*\n");
    /// ```
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        for path in self.walk() {
            let node = path.node();
            out.push_str(&"  ".repeat(path.depth()));
            out.push_str(&format!(
                "{} [{}] {}\n",
                node.id,
                node.rm_type,
                node.cardinality()
            ));
        }
        out
    }

    /// TOML mapping-configuration skeleton covering every leaf.
    ///
    /// In-context leaves are listed under `ctx/<id>`. Entries are sorted by
    /// address and deduplicated.
    pub fn config_skeleton(&self) -> String {
        let mut entries = BTreeSet::new();
        for path in self.walk().filter(|p| p.node().is_leaf()) {
            let node = path.node();
            let address = if node.in_context {
                format!("{CTX_PREFIX}{}", node.id)
            } else {
                path.to_string()
            };

            let suffixes: Vec<String> = node
                .inputs
                .iter()
                .filter_map(|i| i.suffix.as_ref())
                .map(|s| format!("\"|{s}\" = \"\""))
                .collect();
            let suffixes = if suffixes.is_empty() {
                "\"\" = \"{{maps_to.[0]}}\"".to_string()
            } else {
                suffixes.join(", ")
            };

            entries.insert(format!(
                "# {}{} ({})\n[paths.\"{}\"]\nmaps_to = []\nsuffixes = {{ {} }}\n",
                if node.required() { "" } else { "NOT " },
                "required",
                node.rm_type,
                address,
                suffixes
            ));
        }
        entries.into_iter().collect::<Vec<_>>().join("\n")
    }
}

/// A template node together with its ancestors, root first.
#[derive(Debug, Clone)]
pub struct TemplatePath<'t> {
    chain: Vec<&'t TemplateNode>,
}

impl<'t> TemplatePath<'t> {
    /// The node this path ends at.
    pub fn node(&self) -> &'t TemplateNode {
        self.chain[self.chain.len() - 1]
    }

    /// Ancestors from the root down to the parent.
    pub fn ancestors(&self) -> &[&'t TemplateNode] {
        &self.chain[..self.chain.len() - 1]
    }

    /// Number of ancestors.
    pub fn depth(&self) -> usize {
        self.chain.len() - 1
    }

    /// Address below the root, `:*` on every repeatable step when
    /// `wildcard` is set.
    pub fn relative_address(&self, wildcard: bool) -> Address {
        Address::from_segments(
            self.chain
                .iter()
                .skip(1)
                .map(|n| {
                    if wildcard && n.repeatable() {
                        Segment::any(n.id.clone())
                    } else {
                        Segment::plain(n.id.clone())
                    }
                })
                .collect(),
        )
    }
}

impl fmt::Display for TemplatePath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.chain.iter().map(|n| n.id.as_str()).collect();
        write!(f, "{}", ids.join("/"))
    }
}

/// Explicit pre-order iterator over a template tree.
#[derive(Debug)]
pub struct Walk<'t> {
    stack: Vec<(&'t TemplateNode, usize)>,
    chain: Vec<&'t TemplateNode>,
}

impl<'t> Walk<'t> {
    fn new(root: &'t TemplateNode) -> Self {
        Self {
            stack: vec![(root, 0)],
            chain: Vec::new(),
        }
    }
}

impl<'t> Iterator for Walk<'t> {
    type Item = TemplatePath<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        let (node, depth) = self.stack.pop()?;
        self.chain.truncate(depth);
        self.chain.push(node);
        self.stack
            .extend(node.children.iter().rev().map(|c| (c, depth + 1)));
        Some(TemplatePath {
            chain: self.chain.clone(),
        })
    }
}
