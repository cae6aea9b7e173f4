//! Property-based tests for composition invariants.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated sequences of operations.

use std::collections::BTreeSet;

use proptest::prelude::*;

use flatweave::core::composition::Composition;
use flatweave::core::template::{Template, TemplateNode};
use flatweave::core::types::Address;
use flatweave::core::value::Value;

fn template() -> Template {
    Template::new(
        TemplateNode::new("test", "COMPOSITION")
            .with_required(true)
            .with_child(
                TemplateNode::new("event", "EVENT")
                    .with_repeatable(true)
                    .with_child(TemplateNode::new("test_name", "DV_TEXT"))
                    .with_child(
                        TemplateNode::new("item", "CLUSTER")
                            .with_repeatable(true)
                            .with_child(TemplateNode::new("value", "DV_TEXT")),
                    ),
            ),
    )
}

/// Strategy for plain address segment ids.
fn segment_id() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,8}"
}

/// Strategy for addresses with optional cardinality suffixes.
fn address_text() -> impl Strategy<Value = String> {
    prop::collection::vec(
        (segment_id(), prop::option::of(0usize..20)),
        1..5,
    )
    .prop_map(|segments| {
        segments
            .into_iter()
            .map(|(id, index)| match index {
                Some(i) => format!("{id}:{i}"),
                None => id,
            })
            .collect::<Vec<_>>()
            .join("/")
    })
}

/// Strategy for leaf text values.
fn text() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 ]{1,12}"
}

proptest! {
    /// Parsed addresses print back to the same text.
    #[test]
    fn address_display_is_stable(text in address_text()) {
        let address = Address::parse(&text).unwrap();
        prop_assert_eq!(address.to_string(), text);
    }

    /// Reading an address never changes the composition.
    #[test]
    fn get_is_idempotent(events in 1usize..5, value in text()) {
        let template = template();
        let mut composition = Composition::new(&template);
        for _ in 0..events {
            composition.add("event").unwrap();
            composition.set("event/test_name", Value::text(value.clone())).unwrap();
        }

        let size = composition.len();
        let first = composition.get("event/test_name").unwrap();
        let second = composition.get("event/test_name").unwrap();
        prop_assert_eq!(first, second);
        prop_assert_eq!(composition.len(), size);
    }

    /// Each add on a repeatable node yields the next unused index.
    #[test]
    fn add_is_monotonic(events in 1usize..12) {
        let template = template();
        let mut composition = Composition::new(&template);
        for i in 0..events {
            prop_assert_eq!(composition.add("event").unwrap(), format!("event:{i}"));
        }
    }

    /// A wildcard selects exactly the repetitions that exist.
    #[test]
    fn wildcard_selects_every_repetition(items in prop::collection::vec(0usize..4, 1..5)) {
        let template = template();
        let mut composition = Composition::new(&template);
        let mut expected = BTreeSet::new();
        for (event, count) in items.iter().enumerate() {
            composition.add("event").unwrap();
            for item in 0..*count {
                composition.add("event/item").unwrap();
                composition.set("event/item/value", Value::text("v")).unwrap();
                expected.insert(format!("event:{event}/item:{item}/value"));
            }
        }

        let selected: BTreeSet<String> = composition
            .get("event:*/item:*/value")
            .unwrap()
            .ids()
            .into_iter()
            .map(|id| composition.address_of(id))
            .collect();
        prop_assert_eq!(selected, expected);
    }

    /// Every assigned text appears in the flat output under its address.
    #[test]
    fn flatten_keeps_every_assignment(values in prop::collection::vec(text(), 1..6)) {
        let template = template();
        let mut composition = Composition::new(&template);
        for value in &values {
            composition.add("event").unwrap();
            composition.set("event/test_name", Value::text(value.clone())).unwrap();
        }

        let flat = composition.flatten().unwrap();
        prop_assert_eq!(flat.len(), values.len());
        for (i, value) in values.iter().enumerate() {
            let key = format!("event:{i}/test_name");
            prop_assert_eq!(flat.get(&key), Some(value.as_str()));
        }
    }
}
