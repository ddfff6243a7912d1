//! Group membership, foreign identities and well-known display names.

use super::basics::WELL_KNOWN_TAG;
use super::{AdContext, try_iterate, try_iterate_parallel};
use crate::edge::EdgeBitmap;
use crate::object::Direction;
use crate::store::PLACEHOLDER_TAG;
use crate::traversal::Traversal;
use crate::{Attribute, AttributeValue, GraphError, Object, ObjectId, ObjectType, Objects};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Stored object with this DN, or a placeholder carrying it.
fn by_dn(
    ctx: &AdContext,
    objects: &Objects,
    dn: &AttributeValue,
    kind: Option<ObjectType>,
) -> Result<Arc<Object>, GraphError> {
    if let Some(found) = objects.find(ctx.core.distinguished_name, dn) {
        return Ok(found);
    }
    let mut values = vec![(ctx.core.distinguished_name, dn.clone())];
    if let Some(kind) = kind {
        values.push((ctx.core.object_type, kind.value()));
    }
    let placeholder = objects.find_or_add(values)?;
    placeholder.tag(PLACEHOLDER_TAG);
    Ok(placeholder)
}

/// `member` on groups and `memberOf` on members, both as MemberOfGroup edges
/// from member to group. Unresolved DNs become placeholders.
pub(super) fn group_membership(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    let edge = ctx.edges.member_of_group;
    let mut synthesized = 0usize;
    let mut resolve = |dn: &AttributeValue, kind: Option<ObjectType>| {
        let before = objects.len();
        let found = by_dn(ctx, objects, dn, kind);
        synthesized += objects.len() - before;
        found
    };

    try_iterate(objects, |object| {
        for dn in values(object, ctx.attributes.member) {
            let member = resolve(&dn, None)?;
            member.edge_to(object, edge);
        }
        for dn in values(object, ctx.attributes.member_of) {
            let group = resolve(&dn, Some(ObjectType::Group))?;
            object.edge_to(&group, edge);
        }
        Ok(())
    })?;
    if synthesized > 0 {
        tracing::warn!(synthesized, "group membership referenced objects not in any source");
    }
    Ok(())
}

fn values(object: &Object, attribute: Attribute) -> Vec<AttributeValue> {
    object
        .get(attribute)
        .map(|values| values.into_iter().collect())
        .unwrap_or_default()
}

/// A foreign security principal holds the memberships of a principal from
/// another domain. The real principal gets a ForeignIdentity edge to it.
pub(super) fn foreign_identities(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    let mut linked = 0usize;
    objects
        .filter(|o| o.object_type() == ObjectType::ForeignSecurityPrincipal)
        .iterate(|foreign| {
            let Some(sid) = foreign.sid() else {
                return true;
            };
            let real: Vec<Arc<Object>> = objects
                .find_multi(ctx.core.object_sid, &AttributeValue::Sid(sid))
                .into_iter()
                .filter(|o| o.object_type() != ObjectType::ForeignSecurityPrincipal)
                .collect();
            if real.is_empty() {
                ctx.warn("foreign-identity", foreign, "no principal holds the foreign SID");
            }
            for principal in real {
                principal.edge_to(foreign, ctx.edges.foreign_identity);
                linked += 1;
            }
            true
        });
    tracing::debug!(linked, "foreign identities linked");
    Ok(())
}

pub(super) fn well_known_names(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    try_iterate(objects, |object| {
        if object.has(ctx.core.display_name) {
            return Ok(());
        }
        if let Some(name) = object.sid().and_then(|sid| sid.well_known_name()) {
            object.set(ctx.core.display_name, [AttributeValue::from(name)])?;
            object.tag(WELL_KNOWN_TAG);
        }
        Ok(())
    })
}

/// MemberOfGroupIndirect from every member to each group reached through
/// nested memberships. Group closures are computed once and shared between
/// workers.
pub(super) fn indirect_membership(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    let direct = ctx.edges.member_of_group;
    let traversal = Traversal::new(EdgeBitmap::new().set(direct))
        .include_untraversable()
        .max_depth(ctx.options.max_traversal_depth);
    let closures: DashMap<ObjectId, Arc<BTreeSet<ObjectId>>> = DashMap::new();
    let linked = AtomicUsize::new(0);

    try_iterate_parallel(objects, ctx.options.workers, |object| {
        let groups: BTreeSet<ObjectId> = object
            .edges(Direction::Out)
            .into_iter()
            .filter(|(_, bitmap)| bitmap.is_set(direct))
            .map(|(id, _)| id)
            .collect();

        let mut indirect = BTreeSet::new();
        for group_id in &groups {
            let cached = closures.get(group_id).map(|entry| Arc::clone(entry.value()));
            let closure = match cached {
                Some(closure) => closure,
                None => {
                    let Some(group) = objects.get(*group_id) else {
                        continue;
                    };
                    let reached = Arc::new(traversal.reachable(objects, &group).into_keys().collect());
                    closures.insert(*group_id, Arc::clone(&reached));
                    reached
                }
            };
            indirect.extend(closure.iter().copied());
        }

        for id in indirect {
            if id == object.id() || groups.contains(&id) {
                continue;
            }
            if let Some(group) = objects.get(id) {
                object.edge_to(&group, ctx.edges.member_of_group_indirect);
                linked.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    })?;

    tracing::debug!(
        linked = linked.load(Ordering::Relaxed),
        groups = closures.len(),
        "nested memberships resolved"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{AnalysisOptions, register};
    use crate::{Pipeline, Schema, Sid};

    fn setup() -> (Arc<crate::Schema>, Arc<AdContext>, Objects) {
        let schema = Schema::new();
        let mut pipeline = Pipeline::new();
        let options = AnalysisOptions {
            workers: 2,
            ..AnalysisOptions::default()
        };
        let ctx = register(&schema, &mut pipeline, options).expect("register");
        let objects = Objects::new(&schema);
        (schema, ctx, objects)
    }

    fn named(objects: &Objects, ctx: &AdContext, dn: &str) -> Arc<Object> {
        objects
            .add_new([(ctx.core.distinguished_name, AttributeValue::from(dn))])
            .expect("object")
    }

    #[test]
    fn member_and_member_of_resolve_with_placeholders() {
        let (_schema, ctx, objects) = setup();
        let group = named(&objects, &ctx, "CN=Admins,DC=corp");
        let alice = named(&objects, &ctx, "CN=Alice,DC=corp");
        group
            .add_all(
                ctx.attributes.member,
                [AttributeValue::from("cn=alice,dc=corp"), AttributeValue::from("CN=Ghost,DC=corp")],
            )
            .expect("member");
        alice
            .add(ctx.attributes.member_of, AttributeValue::from("CN=Missing,DC=corp"))
            .expect("memberOf");

        group_membership(&ctx, &objects).expect("membership");

        assert!(alice.has_edge_to(group.id(), ctx.edges.member_of_group));
        let ghost = objects
            .find(ctx.core.distinguished_name, &AttributeValue::from("CN=Ghost,DC=corp"))
            .expect("ghost");
        assert!(ghost.has_tag(PLACEHOLDER_TAG));
        assert!(ghost.has_edge_to(group.id(), ctx.edges.member_of_group));
        let missing = objects
            .find(ctx.core.distinguished_name, &AttributeValue::from("CN=Missing,DC=corp"))
            .expect("missing");
        assert_eq!(missing.object_type(), ObjectType::Group);
        assert!(alice.has_edge_to(missing.id(), ctx.edges.member_of_group));
    }

    #[test]
    fn nested_groups_with_cycle() {
        let (_schema, ctx, objects) = setup();
        let user = named(&objects, &ctx, "CN=User,DC=corp");
        let a = named(&objects, &ctx, "CN=A,DC=corp");
        let b = named(&objects, &ctx, "CN=B,DC=corp");
        let c = named(&objects, &ctx, "CN=C,DC=corp");
        let edge = ctx.edges.member_of_group;
        user.edge_to(&a, edge);
        a.edge_to(&b, edge);
        b.edge_to(&c, edge);
        c.edge_to(&a, edge);

        indirect_membership(&ctx, &objects).expect("indirect");

        let indirect = ctx.edges.member_of_group_indirect;
        assert!(!user.has_edge_to(a.id(), indirect));
        assert!(user.has_edge_to(b.id(), indirect));
        assert!(user.has_edge_to(c.id(), indirect));
        assert!(a.has_edge_to(c.id(), indirect));
        assert!(!a.has_edge_to(a.id(), indirect));
    }

    #[test]
    fn foreign_principal_links_to_real_account() {
        let (schema, ctx, objects) = setup();
        let core = schema.core();
        let sid: Sid = "S-1-5-21-7-7-7-1111".parse().expect("sid");
        let real = objects
            .add_new([
                (core.object_sid, AttributeValue::Sid(sid.clone())),
                (core.object_type, ObjectType::User.value()),
            ])
            .expect("real");
        let foreign = objects
            .add_new([
                (core.object_sid, AttributeValue::Sid(sid)),
                (core.object_type, ObjectType::ForeignSecurityPrincipal.value()),
            ])
            .expect("foreign");

        foreign_identities(&ctx, &objects).expect("foreign");
        assert!(real.has_edge_to(foreign.id(), ctx.edges.foreign_identity));
    }

    #[test]
    fn well_known_objects_get_display_names() {
        let (schema, ctx, objects) = setup();
        let core = schema.core();
        let everyone = objects
            .add_new([(core.object_sid, AttributeValue::Sid("S-1-1-0".parse().expect("sid")))])
            .expect("everyone");

        well_known_names(&ctx, &objects).expect("names");
        assert_eq!(everyone.first_string(core.display_name).as_deref(), Some("Everyone"));
    }
}
