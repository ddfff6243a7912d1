//! Container hierarchy from distinguished names.
//!
//! Every object with a DN hangs under the object named by its parent DN.
//! Missing parents are synthesized as placeholders, walking up until an
//! existing parent or a domain head is reached. Domain heads (DNs made only
//! of `DC=` components) hang under the store root.

use super::{AdContext, domain_suffix, try_iterate};
use crate::store::{PLACEHOLDER_TAG, parent_dn};
use crate::{AttributeValue, GraphError, Object, Objects};
use std::sync::Arc;

/// Value of the first component: `CN=Users,DC=corp` gives `Users`.
fn relative_name<'a>(dn: &'a str, parent: &str) -> &'a str {
    let head = dn[..dn.len() - parent.len()].trim_end().trim_end_matches(',');
    head.split_once('=').map_or(head, |(_, value)| value)
}

pub(super) fn link_parents(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    let dn_attribute = ctx.core.distinguished_name;
    let root = Arc::clone(objects.root());
    let mut synthesized = 0usize;

    try_iterate(objects, |object| {
        if object.id() == root.id() || object.parent().is_some() {
            return Ok(());
        }
        let mut child = Arc::clone(object);
        while let Some(dn) = child.dn() {
            let parent_name = match parent_dn(&dn) {
                Some(parent) if domain_suffix(&dn) != Some(dn.as_str()) => parent,
                _ => {
                    attach(ctx, objects, &child, &root);
                    break;
                }
            };

            let value = AttributeValue::from(parent_name);
            if let Some(parent) = objects.find(dn_attribute, &value) {
                attach(ctx, objects, &child, &parent);
                break;
            }
            let parent = objects.add_new([
                (dn_attribute, value),
                (ctx.core.name, AttributeValue::from(relative_name(&dn, parent_name))),
            ])?;
            parent.tag(PLACEHOLDER_TAG);
            synthesized += 1;
            attach(ctx, objects, &child, &parent);
            child = parent;
        }
        Ok(())
    })?;

    tracing::debug!(synthesized, "container hierarchy linked");
    Ok(())
}

fn attach(ctx: &AdContext, objects: &Objects, child: &Object, parent: &Object) {
    objects.set_parent(child, parent);
    parent.edge_to(child, ctx.edges.contains);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{AnalysisOptions, register};
    use crate::{Pipeline, Schema};

    #[test]
    fn relative_names() {
        assert_eq!(relative_name("CN=Users,DC=corp", "DC=corp"), "Users");
        assert_eq!(relative_name("OU=A\\,B, DC=corp", "DC=corp"), "A\\,B");
    }

    #[test]
    fn missing_parents_become_placeholders() {
        let schema = Schema::new();
        let mut pipeline = Pipeline::new();
        let ctx = register(&schema, &mut pipeline, AnalysisOptions::default()).expect("register");
        let core = schema.core();
        let objects = Objects::new(&schema);

        let domain = objects
            .add_new([(core.distinguished_name, AttributeValue::from("DC=corp,DC=local"))])
            .expect("domain");
        let alice = objects
            .add_new([(
                core.distinguished_name,
                AttributeValue::from("CN=Alice,OU=Staff,OU=People,DC=corp,DC=local"),
            )])
            .expect("alice");

        link_parents(&ctx, &objects).expect("hierarchy");

        assert_eq!(domain.parent(), Some(objects.root().id()));
        let staff = objects
            .find(core.distinguished_name, &AttributeValue::from("ou=staff,ou=people,dc=corp,dc=local"))
            .expect("staff placeholder");
        assert!(staff.has_tag(PLACEHOLDER_TAG));
        assert_eq!(staff.first_string(core.name).as_deref(), Some("Staff"));
        assert_eq!(alice.parent(), Some(staff.id()));
        assert!(staff.has_edge_to(alice.id(), ctx.edges.contains));

        let people = objects.get(staff.parent().expect("people")).expect("stored");
        assert_eq!(people.parent(), Some(domain.id()));
        assert!(domain.children().contains(&people.id()));
    }
}
