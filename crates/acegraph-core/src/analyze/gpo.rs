//! Group policy application.
//!
//! `gPLink` on a domain, site or OU lists the policies linked there as
//! `[LDAP://cn={GUID},cn=policies,...;OPTIONS]`. Option bit 1 disables the
//! link, bit 2 enforces it. A container with `gPOptions` 1 blocks policies
//! inherited from above unless they are enforced.

use super::{AdContext, try_iterate};
use crate::object::Direction;
use crate::{AttributeValue, GraphError, Object, ObjectId, ObjectType, Objects};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

const LINK_DISABLED: u32 = 1;
const LINK_ENFORCED: u32 = 2;
const BLOCK_INHERITANCE: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Link<'a> {
    dn: &'a str,
    options: u32,
}

/// Links in `gPLink` order. Malformed entries are skipped.
fn parse_gp_link(text: &str) -> Vec<Link<'_>> {
    text.split('[')
        .filter_map(|entry| {
            let entry = entry.trim().strip_suffix(']')?;
            let (path, options) = entry.rsplit_once(';')?;
            let dn = match (path.get(..7), path.get(7..)) {
                (Some(scheme), Some(rest)) if scheme.eq_ignore_ascii_case("LDAP://") => rest,
                _ => path,
            };
            if dn.is_empty() {
                return None;
            }
            Some(Link {
                dn,
                options: options.trim().parse().unwrap_or_default(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct Applied {
    gpo: ObjectId,
    enforced: bool,
}

/// Resolve every container's links, record them in `gpLinkCache` and return
/// them by container.
fn resolve_links(
    ctx: &AdContext,
    objects: &Objects,
) -> Result<BTreeMap<ObjectId, Vec<Applied>>, GraphError> {
    let mut linked = BTreeMap::new();
    try_iterate(objects, |container| {
        let Some(text) = container.first_string(ctx.attributes.gp_link) else {
            return Ok(());
        };
        let mut applied = Vec::new();
        for link in parse_gp_link(&text) {
            if link.options & LINK_DISABLED != 0 {
                continue;
            }
            let Some(gpo) = objects.find(ctx.core.distinguished_name, &AttributeValue::from(link.dn))
            else {
                ctx.warn("gpo-link", container, &format!("linked policy {} not found", link.dn));
                continue;
            };
            applied.push(Applied {
                gpo: gpo.id(),
                enforced: link.options & LINK_ENFORCED != 0,
            });
        }
        container.set(
            ctx.attributes.gp_link_cache,
            applied.iter().map(|a| AttributeValue::Object(a.gpo)),
        )?;
        if !applied.is_empty() {
            linked.insert(container.id(), applied);
        }
        Ok(())
    })?;
    Ok(linked)
}

/// Policies reaching `object` through its ancestors.
fn effective_policies(
    ctx: &AdContext,
    objects: &Objects,
    links: &BTreeMap<ObjectId, Vec<Applied>>,
    object: &Object,
) -> BTreeSet<ObjectId> {
    let mut policies = BTreeSet::new();
    let mut blocked = false;
    let mut seen = BTreeSet::new();
    let mut current = object.parent().and_then(|id| objects.get(id));

    while let Some(container) = current {
        if !seen.insert(container.id()) || seen.len() > ctx.options.max_traversal_depth {
            break;
        }
        for applied in links.get(&container.id()).into_iter().flatten() {
            if applied.enforced || !blocked {
                policies.insert(applied.gpo);
            }
        }
        if container.first_int(ctx.attributes.gp_options) == Some(BLOCK_INHERITANCE) {
            blocked = true;
        }
        current = container.parent().and_then(|id| objects.get(id));
    }
    policies
}

pub(super) fn affected_by_gpo(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    let links = resolve_links(ctx, objects)?;
    if links.is_empty() {
        return Ok(());
    }

    let edge = ctx.edges.affected_by_gpo;
    let mut applied = 0usize;
    objects
        .filter(|o| o.object_type() == ObjectType::Computer)
        .iterate(|computer| {
            let policies: Vec<Arc<Object>> = effective_policies(ctx, objects, &links, computer)
                .into_iter()
                .filter_map(|id| objects.get(id))
                .collect();
            if policies.is_empty() {
                return true;
            }
            let machines: Vec<Arc<Object>> = computer
                .edges(Direction::Out)
                .into_iter()
                .filter(|(_, bitmap)| bitmap.is_set(ctx.edges.machine_account))
                .filter_map(|(id, _)| objects.get(id))
                .collect();
            for gpo in &policies {
                gpo.edge_to(computer, edge);
                for machine in &machines {
                    gpo.edge_to(machine, edge);
                }
                applied += 1;
            }
            true
        });
    tracing::debug!(containers = links.len(), applied, "group policies linked");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{AnalysisOptions, register};
    use crate::{Pipeline, Schema};

    #[test]
    fn parses_links_in_order() {
        let links = parse_gp_link(
            "[LDAP://cn={A},cn=policies,cn=system,DC=corp;0][ldap://cn={B},cn=policies,cn=system,DC=corp;2][broken]",
        );
        assert_eq!(
            links,
            vec![
                Link {
                    dn: "cn={A},cn=policies,cn=system,DC=corp",
                    options: 0
                },
                Link {
                    dn: "cn={B},cn=policies,cn=system,DC=corp",
                    options: 2
                },
            ]
        );
        assert!(parse_gp_link("").is_empty());
    }

    #[test]
    fn blocked_inheritance_keeps_enforced_links() {
        let schema = Schema::new();
        let mut pipeline = Pipeline::new();
        let ctx = register(&schema, &mut pipeline, AnalysisOptions::default()).expect("register");
        let core = schema.core();
        let objects = Objects::new(&schema);
        let dn = |text: &str| (core.distinguished_name, AttributeValue::from(text));

        let gpo = |name: &str| {
            objects
                .add_new([
                    dn(&format!("CN={{{name}}},CN=Policies,CN=System,DC=corp")),
                    (core.object_type, ObjectType::GroupPolicyContainer.value()),
                ])
                .expect("gpo")
        };
        let normal = gpo("NORMAL");
        let enforced = gpo("ENFORCED");
        let local = gpo("LOCAL");
        let disabled = gpo("DISABLED");

        let domain = objects
            .add_new([
                dn("DC=corp"),
                (
                    ctx.attributes.gp_link,
                    AttributeValue::from(
                        "[LDAP://CN={NORMAL},CN=Policies,CN=System,DC=corp;0]\
                         [LDAP://CN={ENFORCED},CN=Policies,CN=System,DC=corp;2]\
                         [LDAP://CN={MISSING},CN=Policies,CN=System,DC=corp;0]",
                    ),
                ),
            ])
            .expect("domain");
        let ou = objects
            .add_new([
                dn("OU=Servers,DC=corp"),
                (ctx.attributes.gp_options, AttributeValue::Int(1)),
                (
                    ctx.attributes.gp_link,
                    AttributeValue::from(
                        "[LDAP://CN={LOCAL},CN=Policies,CN=System,DC=corp;0]\
                         [LDAP://CN={DISABLED},CN=Policies,CN=System,DC=corp;1]",
                    ),
                ),
            ])
            .expect("ou");
        let computer = objects
            .add_new([
                dn("CN=SRV01,OU=Servers,DC=corp"),
                (core.object_type, ObjectType::Computer.value()),
            ])
            .expect("computer");
        let machine = objects
            .add_new([(core.object_type, ObjectType::Machine.value())])
            .expect("machine");
        computer.edge_to(&machine, ctx.edges.machine_account);
        objects.set_parent(&ou, &domain);
        objects.set_parent(&computer, &ou);

        affected_by_gpo(&ctx, &objects).expect("gpo");

        let edge = ctx.edges.affected_by_gpo;
        assert!(local.has_edge_to(computer.id(), edge));
        assert!(enforced.has_edge_to(computer.id(), edge));
        assert!(enforced.has_edge_to(machine.id(), edge));
        assert!(!normal.has_edge_to(computer.id(), edge));
        assert!(!disabled.has_edge_to(computer.id(), edge));
        assert_eq!(
            domain.get(ctx.attributes.gp_link_cache).map(|v| v.len()),
            Some(2)
        );
    }
}
