//! core::composition
//!
//! The mutable document tree bound node-for-node to a [`Template`].
//!
//! # Architecture
//!
//! Nodes live in an arena owned by the [`Composition`] and are addressed by
//! [`NodeId`]. Parents own the ordered list of their children's ids; children
//! keep a back-index to their parent. Every node borrows the template node it
//! was created for, so a composition can never outlive its template.
//!
//! # Modules
//!
//! - [`resolve`] - Address resolution and auto-vivification
//! - [`defaults`] - Required-field default population
//! - [`flatten`] - Flat key/value serialization
//!
//! # Invariants
//!
//! - Only nodes bound to template leaves carry a value or absence marker
//! - Nodes bound to repeatable template nodes are named `id:N`, where `N` is
//!   assigned at creation from a per-parent counter and never reused
//! - Nodes bound to non-repeatable template nodes exist at most once per
//!   parent
//! - Nodes are never removed
//!
//! # Example
//!
//! ```
//! use flatweave::core::composition::Composition;
//! use flatweave::core::template::{Template, TemplateNode};
//! use flatweave::core::value::Value;
//!
//! let root = TemplateNode::new("test", "COMPOSITION").with_child(
//!     TemplateNode::new("event", "EVENT")
//!         .with_repeatable(true)
//!         .with_child(TemplateNode::new("test_name", "DV_TEXT")),
//! );
//! let template = Template::new(root);
//! let mut composition = Composition::new(&template);
//!
//! composition.set("event/test_name", Value::text("a")).unwrap();
//! composition.add("event").unwrap();
//! composition.set("event/test_name", Value::text("b")).unwrap();
//!
//! let flat = composition.flatten().unwrap();
//! assert_eq!(flat.get("event:0/test_name"), Some("a"));
//! assert_eq!(flat.get("event:1/test_name"), Some("b"));
//! ```

pub mod defaults;
pub mod flatten;
pub mod resolve;

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;
use tracing::debug;

use crate::core::template::{Template, TemplateNode};
use crate::core::types::{
    Address, AddressError, Index, ALL_REQUIRED_PREFIX, CTX_PREFIX, SEPARATOR,
};
use crate::core::value::{Absence, FlatMap, Value};

pub use defaults::DefaultsReport;
pub use flatten::{FlatComposition, FlattenError, FlattenOptions};

/// Errors from composition operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompositionError {
    #[error("node '{node}' has no child '{segment}'")]
    NotFound { node: String, segment: String },

    #[error("'{0}' is not a leaf")]
    NotALeaf(String),

    #[error("'{0}' already exists")]
    AlreadyExists(String),

    #[error("cannot resolve '{segment}' under '{node}': {reason}")]
    CardinalityMismatch {
        node: String,
        segment: String,
        reason: String,
    },

    #[error(transparent)]
    Address(#[from] AddressError),
}

/// Index of a node in its composition's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// The root node of every composition.
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// A node of the document tree.
#[derive(Debug, Clone)]
pub struct CompositionNode<'t> {
    id: String,
    index: Option<usize>,
    template: &'t TemplateNode,
    value: Option<Value>,
    absence: Option<Absence>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    /// Next cardinality per repeatable child template id.
    next_index: HashMap<&'t str, usize>,
}

impl<'t> CompositionNode<'t> {
    /// `template_id` or `template_id:N`.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cardinality suffix, for nodes bound to repeatable templates.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn template(&self) -> &'t TemplateNode {
        self.template
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn absence(&self) -> Option<&Absence> {
        self.absence.as_ref()
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_leaf(&self) -> bool {
        self.template.is_leaf()
    }
}

/// A context side-channel entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextEntry {
    Value(Value),
    Absent(Absence),
}

impl ContextEntry {
    fn expand(&self, key: &str, out: &mut FlatMap) {
        match self {
            Self::Value(value) => value.expand(key, out),
            Self::Absent(absence) => absence.expand(key, out),
        }
    }
}

/// Result of a [`Composition::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The address had no wildcard.
    One(NodeId),
    /// The address had a wildcard; nodes in document order.
    Many(Vec<NodeId>),
}

impl Selection {
    /// Selected node ids, whichever form.
    pub fn ids(&self) -> Vec<NodeId> {
        match self {
            Self::One(id) => vec![*id],
            Self::Many(ids) => ids.clone(),
        }
    }

    /// The single node, if exactly one was selected without a wildcard.
    pub fn one(&self) -> Option<NodeId> {
        match self {
            Self::One(id) => Some(*id),
            Self::Many(_) => None,
        }
    }
}

/// A document under construction.
#[derive(Debug, Clone)]
pub struct Composition<'t> {
    template: &'t Template,
    nodes: Vec<CompositionNode<'t>>,
    ctx: BTreeMap<String, ContextEntry>,
}

impl<'t> Composition<'t> {
    /// Create an empty composition bound to the template root.
    pub fn new(template: &'t Template) -> Self {
        let root = template.root();
        Self {
            template,
            nodes: vec![CompositionNode {
                id: root.id().to_string(),
                index: None,
                template: root,
                value: None,
                absence: None,
                children: Vec::new(),
                parent: None,
                next_index: HashMap::new(),
            }],
            ctx: BTreeMap::new(),
        }
    }

    pub fn template(&self) -> &'t Template {
        self.template
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Borrow a node.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this composition.
    pub fn node(&self, id: NodeId) -> &CompositionNode<'t> {
        &self.nodes[id.0]
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Context side-channel entries.
    pub fn ctx(&self) -> &BTreeMap<String, ContextEntry> {
        &self.ctx
    }

    /// Address of a node below the root, cardinality suffixes included.
    ///
    /// The root itself has the empty address.
    pub fn address_of(&self, id: NodeId) -> String {
        let mut ids = Vec::new();
        let mut current = id;
        while let Some(parent) = self.nodes[current.0].parent {
            ids.push(self.nodes[current.0].id.as_str());
            current = parent;
        }
        ids.reverse();
        ids.join("/")
    }

    /// Nodes bound to template leaves, in document order.
    pub fn leaves(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            if node.is_leaf() && node.parent.is_some() {
                out.push(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Resolve an address without creating anything.
    ///
    /// # Errors
    ///
    /// Returns `CompositionError::NotFound` with the deepest node reached and
    /// the first segment that could not be resolved.
    pub fn get(&self, address: &str) -> Result<Selection, CompositionError> {
        let address = self.relative(address)?;
        let segments = address.segments();
        if address.has_wildcard() {
            self.check_shape(NodeId::ROOT, segments)?;
            let ids = self
                .select(NodeId::ROOT, segments)
                .map_err(|u| self.not_found(u, segments))?;
            Ok(Selection::Many(ids))
        } else {
            let id = self
                .descend(NodeId::ROOT, segments)
                .map_err(|u| self.not_found(u, segments))?;
            Ok(Selection::One(id))
        }
    }

    /// Assign `value` at `address`, creating missing nodes.
    ///
    /// Addresses starting with `ctx/` go to the context channel; addresses of
    /// the form `**/name` are delegated to [`Composition::set_all_required`].
    /// Returns the number of leaves assigned.
    ///
    /// # Errors
    ///
    /// Returns `CompositionError::NotALeaf` if a target is an interior node.
    pub fn set(&mut self, address: &str, value: Value) -> Result<usize, CompositionError> {
        if let Some(basename) = address.strip_prefix(ALL_REQUIRED_PREFIX) {
            return Ok(self.set_all_required(basename, value));
        }
        if let Some(key) = ctx_key(address) {
            self.ctx.insert(key, ContextEntry::Value(value));
            return Ok(1);
        }

        let targets = self.bind_leaves(address)?;
        for id in &targets {
            self.nodes[id.0].value = Some(value.clone());
        }
        Ok(targets.len())
    }

    /// Attach an absent-with-reason marker at `address`.
    pub fn set_absent(&mut self, address: &str, absence: Absence) -> Result<usize, CompositionError> {
        if let Some(key) = ctx_key(address) {
            self.ctx.insert(key, ContextEntry::Absent(absence));
            return Ok(1);
        }

        let targets = self.bind_leaves(address)?;
        for id in &targets {
            self.nodes[id.0].absence = Some(absence.clone());
        }
        Ok(targets.len())
    }

    /// Resolve-or-create every node along `address`, checking the terminals
    /// are leaves.
    pub(crate) fn bind_leaves(&mut self, address: &str) -> Result<Vec<NodeId>, CompositionError> {
        let parsed = self.relative(address)?;
        let targets = self.ensure(NodeId::ROOT, parsed.segments())?;
        if let Some(interior) = targets.iter().find(|id| !self.nodes[id.0].is_leaf()) {
            return Err(CompositionError::NotALeaf(self.display_address(*interior)));
        }
        Ok(targets)
    }

    /// Create a new instance at the terminal segment of `address`.
    ///
    /// For repeatable terminals a fresh repetition is always created (unless
    /// an explicit existing index is named); otherwise the single instance is
    /// ensured. Returns the resolved address of the node.
    pub fn add(&mut self, address: &str) -> Result<String, CompositionError> {
        let parsed = self.relative(address)?;
        let Some((parent_address, last)) = parsed.split_last() else {
            return Err(CompositionError::AlreadyExists(self.root_id().to_string()));
        };
        if last.is_wildcard() || parent_address.has_wildcard() {
            return Err(CompositionError::CardinalityMismatch {
                node: parent_address.to_string(),
                segment: last.to_string(),
                reason: "add needs a single target, not a wildcard".to_string(),
            });
        }

        let parent = self.ensure_one(parent_address.segments())?;
        let template = self.child_template(parent, &last.id)?;
        let id = match (template.repeatable(), last.index) {
            (true, Index::Latest) => self.attach(parent, template),
            _ => match self.find_child(parent, last) {
                Some(existing) => existing,
                None => self.vivify(parent, last)?,
            },
        };
        Ok(self.address_of(id))
    }

    /// Create the node at `address`, failing if it already exists.
    ///
    /// # Errors
    ///
    /// Returns `CompositionError::AlreadyExists` if the address resolves.
    pub fn create(&mut self, address: &str) -> Result<NodeId, CompositionError> {
        let parsed = self.relative(address)?;
        if parsed.has_wildcard() {
            return Err(CompositionError::CardinalityMismatch {
                node: self.root_id().to_string(),
                segment: parsed.to_string(),
                reason: "create needs a single target, not a wildcard".to_string(),
            });
        }
        if self.descend(NodeId::ROOT, parsed.segments()).is_ok() {
            return Err(CompositionError::AlreadyExists(parsed.to_string()));
        }
        self.ensure_one(parsed.segments())
    }

    /// Assign `value` to every required template leaf named `basename`.
    ///
    /// Existing repetitions along each leaf's path are all visited; missing
    /// ancestors are created when they are non-repeatable or required.
    /// Returns the number of leaves assigned.
    pub fn set_all_required(&mut self, basename: &str, value: Value) -> usize {
        let template = self.template;
        let chains: Vec<Vec<&'t TemplateNode>> = template
            .walk()
            .filter(|p| {
                let node = p.node();
                node.is_leaf() && node.required() && !node.in_context() && node.id() == basename
            })
            .map(|p| {
                let mut chain: Vec<&'t TemplateNode> = p.ancestors().iter().skip(1).copied().collect();
                chain.push(p.node());
                chain
            })
            .collect();

        let mut targets = Vec::new();
        for chain in chains {
            let mut frontier = vec![NodeId::ROOT];
            for step in chain {
                let mut next = Vec::new();
                for parent in frontier {
                    let existing = self.instances(parent, step.id());
                    if !existing.is_empty() {
                        next.extend(existing);
                    } else if !step.repeatable() || step.required() {
                        next.push(self.attach(parent, step));
                    }
                }
                frontier = next;
            }
            targets.extend(frontier);
        }

        debug!(basename, count = targets.len(), "assigning all required leaves");
        for id in &targets {
            self.nodes[id.0].value = Some(value.clone());
        }
        targets.len()
    }

    /// Parse an address and strip a leading root id.
    fn relative(&self, text: &str) -> Result<Address, CompositionError> {
        let trimmed = text.trim_matches(SEPARATOR);
        let root = self.template.root();
        if trimmed.is_empty() || (trimmed == root.id() && root.child(root.id()).is_none()) {
            return Ok(Address::default());
        }

        let address = Address::parse(trimmed)?;
        let first = &address.segments()[0];
        if first.id == root.id() && first.index == Index::Latest && root.child(root.id()).is_none() {
            Ok(address.tail())
        } else {
            Ok(address)
        }
    }

    fn root_id(&self) -> &str {
        &self.nodes[0].id
    }

    /// Address for error messages; the root shows as its id.
    fn display_address(&self, id: NodeId) -> String {
        if id == NodeId::ROOT {
            self.root_id().to_string()
        } else {
            self.address_of(id)
        }
    }

    /// Template of `parent`'s child `id`, or `NotFound`.
    fn child_template(&self, parent: NodeId, id: &str) -> Result<&'t TemplateNode, CompositionError> {
        let template: &'t TemplateNode = self.nodes[parent.0].template;
        template.child(id).ok_or_else(|| CompositionError::NotFound {
            node: self.display_address(parent),
            segment: id.to_string(),
        })
    }

    /// Push a new node bound to `template` under `parent`.
    pub(crate) fn attach(&mut self, parent: NodeId, template: &'t TemplateNode) -> NodeId {
        let (id, index) = if template.repeatable() {
            let counter = self.nodes[parent.0]
                .next_index
                .entry(template.id())
                .or_insert(0);
            let index = *counter;
            *counter += 1;
            (format!("{}:{}", template.id(), index), Some(index))
        } else {
            (template.id().to_string(), None)
        };

        let node_id = NodeId(self.nodes.len());
        self.nodes.push(CompositionNode {
            id,
            index,
            template,
            value: None,
            absence: None,
            children: Vec::new(),
            parent: Some(parent),
            next_index: HashMap::new(),
        });
        self.nodes[parent.0].children.push(node_id);
        debug!(address = %self.address_of(node_id), "created node");
        node_id
    }

    pub(crate) fn set_value(&mut self, id: NodeId, value: Value) {
        self.nodes[id.0].value = Some(value);
    }

    pub(crate) fn set_absence(&mut self, id: NodeId, absence: Absence) {
        self.nodes[id.0].absence = Some(absence);
    }
}

/// `ctx/...` key with surrounding separators removed.
fn ctx_key(address: &str) -> Option<String> {
    let trimmed = address.trim_matches(SEPARATOR);
    trimmed
        .starts_with(CTX_PREFIX)
        .then(|| trimmed.to_string())
}
