//! # Merge Engine
//!
//! Combines two objects that represent the same real-world identity.
//!
//! Before anything changes, every registered approver is asked in
//! registration order. An approver answering `GraphError::DontMerge` vetoes
//! the merge; any other error aborts it. Value rules once approved:
//! - `Merge` and multi-valued attributes: union, duplicates suppressed
//! - `Single` attributes: the existing value stays unless it is blank
//! - tags: union
//! - parent: the existing parent stays unless there is none
//!
//! Edges and the parent are moved by the store, which can resolve the
//! neighbours. The store also picks the candidates: values of `Unique`
//! attributes first, then values of single-valued `Merge` attributes such as
//! `objectSid`.

use crate::{GraphError, Object};
use parking_lot::RwLock;
use std::sync::Arc;

/// What an approver thinks of a candidate pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MergeHint {
    /// No objection.
    Neutral,
    /// Strong match: prefer this candidate over other approved ones.
    Preferred,
}

/// Approver callback: `(existing, incoming)`.
pub type MergeApproverFn =
    Arc<dyn Fn(&Object, &Object) -> Result<MergeHint, GraphError> + Send + Sync>;

struct Approver {
    description: String,
    approve: MergeApproverFn,
}

/// Ordered list of merge approvers.
#[derive(Default)]
pub struct MergeApprovers {
    approvers: RwLock<Vec<Approver>>,
}

impl MergeApprovers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an approver. Consulted after all earlier ones.
    pub fn add<F>(&self, description: &str, approve: F)
    where
        F: Fn(&Object, &Object) -> Result<MergeHint, GraphError> + Send + Sync + 'static,
    {
        tracing::debug!(description, "registered merge approver");
        self.approvers.write().push(Approver {
            description: description.to_string(),
            approve: Arc::new(approve),
        });
    }

    /// Ask every approver. The strongest hint wins when nobody objects.
    pub fn approve(&self, existing: &Object, incoming: &Object) -> Result<MergeHint, GraphError> {
        let approvers = self.approvers.read();
        let mut hint = MergeHint::Neutral;
        for approver in approvers.iter() {
            match (approver.approve)(existing, incoming) {
                Ok(h) => hint = hint.max(h),
                Err(e) => {
                    if e.is_dont_merge() {
                        tracing::trace!(
                            approver = %approver.description,
                            existing = %existing.id(),
                            incoming = %incoming.id(),
                            "merge vetoed"
                        );
                    }
                    return Err(e);
                }
            }
        }
        Ok(hint)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.approvers.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Attribute changes a merge would make to `existing`, computed without
/// touching either object. Each entry is the full new value list.
pub(crate) fn merged_values(
    existing: &Object,
    incoming: &Object,
) -> Vec<(crate::Attribute, crate::AttributeValues)> {
    let registry = existing.schema().attributes();
    let mut changes = Vec::new();

    for (attribute, incoming_values) in incoming.values() {
        if incoming_values.is_blank() {
            continue;
        }
        let current = existing.get(attribute).unwrap_or_default();
        if registry.is_single(attribute) {
            if current.is_blank() {
                changes.push((attribute, incoming_values));
            }
            continue;
        }

        let mut combined = current.clone();
        combined.union(&incoming_values);
        if combined.len() != current.len() {
            changes.push((attribute, combined));
        }
    }
    changes
}

/// Copy every tag of `incoming` onto `existing`.
pub(crate) fn merge_tags(existing: &Object, incoming: &Object) {
    for tag in incoming.tags() {
        existing.tag(&tag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AttributeValue, ObjectType, Schema};

    #[test]
    fn first_veto_stops_merge() {
        let schema = Schema::new();
        let approvers = MergeApprovers::new();
        approvers.add("never", |_, _| Err(GraphError::DontMerge("never".into())));
        approvers.add("prefer", |_, _| Ok(MergeHint::Preferred));

        let a = Object::new(&schema);
        let b = Object::new(&schema);
        assert!(matches!(approvers.approve(&a, &b), Err(GraphError::DontMerge(_))));
    }

    #[test]
    fn strongest_hint_wins() {
        let schema = Schema::new();
        let approvers = MergeApprovers::new();
        approvers.add("neutral", |_, _| Ok(MergeHint::Neutral));
        approvers.add("prefer", |_, _| Ok(MergeHint::Preferred));
        let a = Object::new(&schema);
        let b = Object::new(&schema);
        assert_eq!(approvers.approve(&a, &b).expect("approve"), MergeHint::Preferred);
        assert_eq!(approvers.len(), 2);
    }

    #[test]
    fn single_value_keeps_existing_unless_blank() {
        let schema = Schema::new();
        let core = *schema.core();
        let existing = Object::with_values(&schema, [(core.name, AttributeValue::from("kept"))]);
        let incoming = Object::with_values(
            &schema,
            [
                (core.name, AttributeValue::from("ignored")),
                (core.object_type, ObjectType::User.value()),
            ],
        );
        let changes = merged_values(&existing, &incoming);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0, core.object_type);
    }

    #[test]
    fn merge_attributes_union() {
        let schema = Schema::new();
        let class = schema.core().object_class;
        let existing = Object::with_values(&schema, [(class, AttributeValue::from("a"))]);
        let incoming = Object::with_values(
            &schema,
            [(class, AttributeValue::from("b")), (class, AttributeValue::from("a"))],
        );
        let changes = merged_values(&existing, &incoming);
        let rendered: Vec<String> = changes[0].1.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["a", "b"]);
    }
}
