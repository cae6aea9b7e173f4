//! core::composition::defaults
//!
//! Fill the required parts of a composition from template defaults.
//!
//! The walk is pre-order over composition nodes. At each node, required
//! template children with no composition counterpart are created; required
//! leaves get the default their template declares. Nodes created during the
//! walk are visited in turn, so the pass reaches a fixed point in one call.
//! Context-only template children are never created here.

use std::collections::HashSet;

use tracing::{info, warn};

use super::{Composition, NodeId};
use crate::core::template::TemplateNode;
use crate::core::value::Absence;

/// Outcome of a default-population pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultsReport {
    /// Leaves that received a template default.
    pub filled: Vec<String>,
    /// Required leaves with no usable default.
    pub undefaultable: Vec<String>,
}

impl DefaultsReport {
    pub fn is_complete(&self) -> bool {
        self.undefaultable.is_empty()
    }
}

impl<'t> Composition<'t> {
    /// Create and default every missing required node.
    ///
    /// Leaves without a usable default are logged and left unset.
    pub fn populate_defaults(&mut self) -> DefaultsReport {
        self.populate_defaults_with(None)
    }

    /// Like [`Composition::populate_defaults`], attaching `fallback` to leaves
    /// without a usable default.
    pub fn populate_defaults_with(&mut self, fallback: Option<&Absence>) -> DefaultsReport {
        let mut report = DefaultsReport::default();
        let mut stack = vec![NodeId::ROOT];

        while let Some(id) = stack.pop() {
            let template: &'t TemplateNode = self.nodes[id.0].template;

            if template.is_leaf() && id != NodeId::ROOT {
                let node = &self.nodes[id.0];
                if template.required() && node.value.is_none() && node.absence.is_none() {
                    self.default_leaf(id, template, fallback, &mut report);
                }
                continue;
            }

            let present: HashSet<&str> = self.nodes[id.0]
                .children
                .iter()
                .map(|c| self.nodes[c.0].template.id())
                .collect();
            let missing: Vec<&'t TemplateNode> = template
                .children()
                .iter()
                .filter(|c| c.required() && !c.in_context() && !present.contains(c.id()))
                .collect();

            for child in missing {
                self.attach(id, child);
            }
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }

        info!(
            filled = report.filled.len(),
            undefaultable = report.undefaultable.len(),
            "populated defaults"
        );
        report
    }

    fn default_leaf(
        &mut self,
        id: NodeId,
        template: &TemplateNode,
        fallback: Option<&Absence>,
        report: &mut DefaultsReport,
    ) {
        let address = self.address_of(id);
        match template.default_value() {
            Ok(value) => {
                self.set_value(id, value);
                report.filled.push(address);
            }
            Err(err) => {
                warn!(address = %address, error = %err, "required leaf has no usable default");
                if let Some(absence) = fallback {
                    self.set_absence(id, absence.clone());
                }
                report.undefaultable.push(address);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::template::{Input, Template};
    use crate::core::value::Value;

    fn text_input(default: &str) -> Input {
        Input {
            kind: Some("TEXT".into()),
            default_value: Some(default.into()),
            ..Input::default()
        }
    }

    fn template() -> Template {
        Template::new(
            TemplateNode::new("test", "COMPOSITION")
                .with_child(
                    TemplateNode::new("context", "EVENT_CONTEXT")
                        .with_required(true)
                        .with_child(
                            TemplateNode::new("status", "DV_TEXT")
                                .with_required(true)
                                .with_input(text_input("final")),
                        )
                        .with_child(TemplateNode::new("note", "DV_TEXT").with_input(text_input("n"))),
                )
                .with_child(
                    TemplateNode::new("event", "EVENT")
                        .with_repeatable(true)
                        .with_child(TemplateNode::new("test_name", "DV_TEXT").with_required(true)),
                )
                .with_child(
                    TemplateNode::new("language", "CODE_PHRASE")
                        .with_required(true)
                        .with_in_context(true),
                ),
        )
    }

    #[test]
    fn creates_required_chain_with_defaults() {
        let template = template();
        let mut composition = Composition::new(&template);
        let report = composition.populate_defaults();

        assert_eq!(report.filled, vec!["context/status".to_string()]);
        assert!(report.is_complete());
        let id = composition.get("context/status").unwrap().one().unwrap();
        assert_eq!(composition.node(id).value(), Some(&Value::text("final")));
        assert!(composition.get("context/note").is_err());
        assert!(composition.get("event").is_err());
        assert!(composition.get("language").is_err());
    }

    #[test]
    fn reports_undefaultable_leaves() {
        let template = template();
        let mut composition = Composition::new(&template);
        composition.add("event").unwrap();
        let report = composition.populate_defaults();

        assert_eq!(report.undefaultable, vec!["event:0/test_name".to_string()]);
        let id = composition.get("event:0/test_name").unwrap().one().unwrap();
        assert_eq!(composition.node(id).value(), None);
    }

    #[test]
    fn fallback_marks_undefaultable_leaves_absent() {
        let template = template();
        let mut composition = Composition::new(&template);
        composition.add("event").unwrap();
        composition.populate_defaults_with(Some(&Absence::unknown()));

        let id = composition.get("event/test_name").unwrap().one().unwrap();
        assert_eq!(composition.node(id).absence(), Some(&Absence::unknown()));
    }

    #[test]
    fn existing_values_are_kept() {
        let template = template();
        let mut composition = Composition::new(&template);
        composition.set("context/status", Value::text("draft")).unwrap();
        let report = composition.populate_defaults();

        assert!(report.filled.is_empty());
        let id = composition.get("context/status").unwrap().one().unwrap();
        assert_eq!(composition.node(id).value(), Some(&Value::text("draft")));
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let template = template();
        let mut composition = Composition::new(&template);
        composition.populate_defaults();
        let before = composition.len();
        let report = composition.populate_defaults();
        assert_eq!(composition.len(), before);
        assert!(report.filled.is_empty());
    }
}
