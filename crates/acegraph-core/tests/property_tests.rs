//! # Property-Based Tests
//!
//! Invariants of the value types and the merge engine under arbitrary input.

use acegraph_core::store::parent_dn;
use acegraph_core::{
    AttributeValue, Edge, EdgeBitmap, EdgeRegistry, Object, Objects, Probability, Schema,
    SecurityDescriptor, Sid,
};
use proptest::collection::{btree_set, vec};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn registered_edges(count: usize) -> Vec<Edge> {
    let registry = EdgeRegistry::new();
    (0..count)
        .map(|i| {
            registry
                .define(&format!("Edge{i}"))
                .register()
                .expect("register")
        })
        .collect()
}

fn bitmap(edges: &[Edge], picks: &BTreeSet<usize>) -> EdgeBitmap {
    picks.iter().map(|&i| edges[i]).collect()
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Union and intersection behave like set operations on edge types.
    #[test]
    fn bitmap_algebra_matches_sets(
        left in btree_set(0usize..200, 0..40),
        right in btree_set(0usize..200, 0..40),
    ) {
        let edges = registered_edges(200);
        let a = bitmap(&edges, &left);
        let b = bitmap(&edges, &right);

        let union = a.merge(&b);
        let both = a.intersect(&b);
        prop_assert_eq!(union.count(), left.union(&right).count());
        prop_assert_eq!(both.count(), left.intersection(&right).count());
        prop_assert_eq!(a.intersects(&b), !both.is_blank());
        let expected = bitmap(&edges, &left.union(&right).copied().collect());
        prop_assert_eq!(union, expected);
        for &i in &left {
            prop_assert!(union.is_set(edges[i]));
        }
    }

    /// Probabilities always land in 0..=100.
    #[test]
    fn probability_is_clamped(raw in any::<i64>()) {
        let value = Probability::new(raw).value();
        prop_assert!(value <= 100);
        if (0..=100).contains(&raw) {
            prop_assert_eq!(i64::from(value), raw);
        }
    }

    /// Text and binary forms describe the same SID.
    #[test]
    fn sid_forms_agree(
        authority in 1u64..=0xFFFF_FFFF,
        subs in vec(any::<u32>(), 0..=15),
    ) {
        let sid = Sid::from_parts(authority, &subs);
        let parsed: Sid = sid.to_string().parse().expect("parse");
        prop_assert_eq!(&parsed, &sid);
        prop_assert_eq!(Sid::from_bytes(&sid.to_bytes()).expect("bytes"), sid);
    }

    /// Hostile bytes never panic the parsers.
    #[test]
    fn parsers_survive_garbage(bytes in vec(any::<u8>(), 0..256)) {
        let _ = SecurityDescriptor::parse(&bytes);
        let _ = Sid::from_bytes(&bytes);
    }

    /// The parent of a DN is everything after its first unescaped comma.
    #[test]
    fn parent_dn_strips_first_component(
        head in "[A-Za-z0-9]{1,12}",
        rest in vec("[A-Za-z0-9]{1,8}", 1..5),
    ) {
        let parent = rest.iter().map(|part| format!("DC={part}")).collect::<Vec<_>>().join(",");
        let dn = format!("CN={head},{parent}");
        prop_assert_eq!(parent_dn(&dn), Some(parent.as_str()));
    }

    /// Merging unions multi-valued attributes and repeating it changes nothing.
    #[test]
    fn merge_unions_and_is_idempotent(
        mine in btree_set("[a-z]{1,6}", 0..8),
        theirs in btree_set("[a-z]{1,6}", 0..8),
    ) {
        let schema = Schema::new();
        let description = schema.core().description;
        let objects = Objects::new(&schema);
        let existing = objects
            .add_new(mine.iter().map(|v| (description, AttributeValue::from(v.as_str()))))
            .expect("existing");
        let incoming = Object::with_values(
            &schema,
            theirs.iter().map(|v| (description, AttributeValue::from(v.as_str()))),
        );

        objects.merge(&existing, &incoming).expect("merge");
        let first: BTreeSet<String> = existing
            .get(description)
            .map(|values| values.iter().map(ToString::to_string).collect())
            .unwrap_or_default();
        objects.merge(&existing, &incoming).expect("merge again");
        let second: BTreeSet<String> = existing
            .get(description)
            .map(|values| values.iter().map(ToString::to_string).collect())
            .unwrap_or_default();

        let expected: BTreeSet<String> = mine.union(&theirs).cloned().collect();
        prop_assert_eq!(&first, &expected);
        prop_assert_eq!(first, second);
    }
}
