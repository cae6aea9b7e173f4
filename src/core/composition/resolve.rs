//! core::composition::resolve
//!
//! Address resolution against the composition arena.
//!
//! Resolution descends segment by segment through existing children. When a
//! segment has no matching child the descent stops and reports how far it
//! got; mutating callers then create the missing node from its template and
//! resume from there. The partial-resolution report never leaves this crate.
//!
//! # Segment matching
//!
//! - `id` matches the single instance, or the latest repetition
//! - `id:N` matches the repetition with cardinality `N`
//! - `id:*` matches every existing repetition and never creates one
//!
//! Wildcard addresses are checked against the template first, so a misspelt
//! id is reported even when there is nothing to expand.

use tracing::trace;

use super::{Composition, CompositionError, NodeId};
use crate::core::types::{Index, Segment};

/// How far a descent got before a segment failed to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Unresolved {
    /// Deepest node reached.
    pub node: NodeId,
    /// Number of segments consumed to reach it.
    pub consumed: usize,
}

impl<'t> Composition<'t> {
    /// Existing child of `parent` matching a non-wildcard segment.
    pub(crate) fn find_child(&self, parent: NodeId, segment: &Segment) -> Option<NodeId> {
        let mut matching = self.nodes[parent.0]
            .children
            .iter()
            .copied()
            .filter(|c| self.nodes[c.0].template.id() == segment.id);

        match segment.index {
            Index::Latest => matching.last(),
            Index::At(n) => matching.find(|c| self.nodes[c.0].index == Some(n)),
            Index::Any => None,
        }
    }

    /// All children of `parent` bound to template id `id`, in order.
    pub(crate) fn instances(&self, parent: NodeId, id: &str) -> Vec<NodeId> {
        self.nodes[parent.0]
            .children
            .iter()
            .copied()
            .filter(|c| self.nodes[c.0].template.id() == id)
            .collect()
    }

    /// Follow wildcard-free `segments` from `from` through existing nodes.
    pub(crate) fn descend(&self, from: NodeId, segments: &[Segment]) -> Result<NodeId, Unresolved> {
        let mut current = from;
        for (consumed, segment) in segments.iter().enumerate() {
            match self.find_child(current, segment) {
                Some(child) => current = child,
                None => {
                    return Err(Unresolved {
                        node: current,
                        consumed,
                    })
                }
            }
        }
        Ok(current)
    }

    /// Resolve `segments` without creating anything, expanding wildcards.
    ///
    /// Branches below a wildcard that fail to resolve are skipped; a failure
    /// before the first wildcard is reported.
    pub(crate) fn select(&self, from: NodeId, segments: &[Segment]) -> Result<Vec<NodeId>, Unresolved> {
        let Some(wildcard) = segments.iter().position(Segment::is_wildcard) else {
            return self.descend(from, segments).map(|id| vec![id]);
        };

        let parent = self.descend(from, &segments[..wildcard])?;
        let rest = &segments[wildcard + 1..];
        let mut out = Vec::new();
        for instance in self.instances(parent, &segments[wildcard].id) {
            if let Ok(found) = self.select(instance, rest) {
                out.extend(found);
            }
        }
        Ok(out)
    }

    /// Resolve `segments`, creating every missing node along the way.
    ///
    /// A wildcard segment expands over existing instances only; the part of
    /// the address before it is not created.
    pub(crate) fn ensure(&mut self, from: NodeId, segments: &[Segment]) -> Result<Vec<NodeId>, CompositionError> {
        if let Some(wildcard) = segments.iter().position(Segment::is_wildcard) {
            self.check_shape(from, segments)?;
            let parents = self.select(from, &segments[..wildcard]).unwrap_or_default();
            let rest = &segments[wildcard + 1..];
            let mut out = Vec::new();
            for parent in parents {
                for instance in self.instances(parent, &segments[wildcard].id) {
                    out.extend(self.ensure(instance, rest)?);
                }
            }
            return Ok(out);
        }

        let mut current = from;
        let mut rest = segments;
        loop {
            match self.descend(current, rest) {
                Ok(id) => return Ok(vec![id]),
                Err(Unresolved { node, consumed }) => {
                    trace!(node = %self.address_of(node), segment = %rest[consumed], "vivifying");
                    current = self.vivify(node, &rest[consumed])?;
                    rest = &rest[consumed + 1..];
                }
            }
        }
    }

    /// Check that `segments` follow the template below `from`, whether or
    /// not the nodes exist yet.
    pub(crate) fn check_shape(&self, from: NodeId, segments: &[Segment]) -> Result<(), CompositionError> {
        let mut template = self.nodes[from.0].template;
        let mut node = self.display_address(from);
        for segment in segments {
            template = template.child(&segment.id).ok_or_else(|| CompositionError::NotFound {
                node: node.clone(),
                segment: segment.to_string(),
            })?;
            node = format!("{node}/{segment}");
        }
        Ok(())
    }

    /// [`Composition::ensure`] from the root for an address with no wildcard.
    pub(crate) fn ensure_one(&mut self, segments: &[Segment]) -> Result<NodeId, CompositionError> {
        let mut found = self.ensure(NodeId::ROOT, segments)?;
        match found.pop() {
            Some(id) if found.is_empty() => Ok(id),
            _ => Err(CompositionError::CardinalityMismatch {
                node: self.root_id().to_string(),
                segment: segments
                    .iter()
                    .map(Segment::to_string)
                    .collect::<Vec<_>>()
                    .join("/"),
                reason: "address must name exactly one node".to_string(),
            }),
        }
    }

    /// Create the child of `parent` named by `segment`.
    pub(crate) fn vivify(&mut self, parent: NodeId, segment: &Segment) -> Result<NodeId, CompositionError> {
        let template = self.child_template(parent, &segment.id)?;
        let mismatch = |this: &Self, reason: String| CompositionError::CardinalityMismatch {
            node: this.display_address(parent),
            segment: segment.to_string(),
            reason,
        };

        match (template.repeatable(), segment.index) {
            (_, Index::Latest) => Ok(self.attach(parent, template)),
            (false, _) => Err(mismatch(self, "node is not repeatable".to_string())),
            (true, Index::At(n)) => {
                let next = self.nodes[parent.0]
                    .next_index
                    .get(template.id())
                    .copied()
                    .unwrap_or(0);
                if n == next {
                    Ok(self.attach(parent, template))
                } else {
                    Err(mismatch(self, format!("next free index is {next}")))
                }
            }
            (true, Index::Any) => Err(mismatch(self, "wildcards never create nodes".to_string())),
        }
    }

    /// Public form of a failed descent.
    pub(crate) fn not_found(&self, unresolved: Unresolved, segments: &[Segment]) -> CompositionError {
        CompositionError::NotFound {
            node: self.display_address(unresolved.node),
            segment: segments
                .get(unresolved.consumed)
                .map(Segment::to_string)
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::core::composition::{Composition, CompositionError, Selection};
    use crate::core::template::{Template, TemplateNode};
    use crate::core::value::Value;

    fn template() -> Template {
        Template::new(
            TemplateNode::new("test", "COMPOSITION").with_child(
                TemplateNode::new("event", "EVENT")
                    .with_repeatable(true)
                    .with_child(
                        TemplateNode::new("finding", "CLUSTER")
                            .with_repeatable(true)
                            .with_child(TemplateNode::new("code", "DV_TEXT")),
                    ),
            ),
        )
    }

    #[test]
    fn plain_segment_resolves_latest_repetition() {
        let template = template();
        let mut composition = Composition::new(&template);
        composition.add("event").unwrap();
        composition.add("event").unwrap();
        let id = composition.get("event").unwrap().one().unwrap();
        assert_eq!(composition.node(id).id(), "event:1");
    }

    #[test]
    fn wildcard_get_lists_existing_only() {
        let template = template();
        let mut composition = Composition::new(&template);
        composition.set("event:0/finding:0/code", Value::text("a")).unwrap();
        composition.set("event:0/finding:1/code", Value::text("b")).unwrap();
        composition.add("event").unwrap();

        let selection = composition.get("event:*/finding:*/code").unwrap();
        let Selection::Many(ids) = selection else {
            panic!("expected wildcard selection");
        };
        let addresses: Vec<String> = ids.iter().map(|id| composition.address_of(*id)).collect();
        assert_eq!(addresses, vec!["event:0/finding:0/code", "event:0/finding:1/code"]);
    }

    #[test]
    fn wildcard_set_never_creates_repetitions() {
        let template = template();
        let mut composition = Composition::new(&template);
        assert_eq!(composition.set("event:*/finding:*/code", Value::text("x")).unwrap(), 0);
        assert!(composition.is_empty());

        composition.add("event").unwrap();
        composition.add("event/finding").unwrap();
        composition.add("event/finding").unwrap();
        assert_eq!(composition.set("event:*/finding:*/code", Value::text("x")).unwrap(), 2);
    }

    #[test]
    fn wildcard_set_creates_below_the_wildcard() {
        let template = template();
        let mut composition = Composition::new(&template);
        composition.add("event").unwrap();
        composition.add("event").unwrap();
        assert_eq!(composition.set("event:*/finding/code", Value::text("x")).unwrap(), 2);
        assert!(composition.get("event:1/finding:0/code").is_ok());
    }

    #[test]
    fn wildcard_with_unknown_id_is_not_found() {
        let template = template();
        let mut composition = Composition::new(&template);
        composition.add("event").unwrap();

        assert!(matches!(
            composition.set("evnt:*/finding/code", Value::text("x")),
            Err(CompositionError::NotFound { ref segment, .. }) if segment == "evnt:*"
        ));
        assert!(matches!(
            composition.get("evnt:*/finding/code"),
            Err(CompositionError::NotFound { .. })
        ));
        assert!(matches!(
            composition.get("event:*/fnding:*/code"),
            Err(CompositionError::NotFound { ref segment, .. }) if segment == "fnding:*"
        ));
    }
}
