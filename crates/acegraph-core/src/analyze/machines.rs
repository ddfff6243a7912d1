//! Machine objects: the running operating system behind a computer account.
//!
//! Local-machine collectors describe the machine itself, directory collectors
//! the computer account. Both meet on `domainJoinedSid`, so a machine built
//! here merges with a collected one during identity merging.

use super::AdContext;
use crate::{AttributeValue, GraphError, ObjectType, Objects};

pub(super) fn create_machines(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    let computers = objects
        .filter(|object| object.object_type() == ObjectType::Computer)
        .collect();
    let mut created = 0usize;

    for computer in computers {
        let Some(sid) = computer.sid() else {
            ctx.warn("computer-without-sid", &computer, "computer account has no objectSid");
            continue;
        };
        let joined = AttributeValue::Sid(sid);
        let existing = objects
            .find_multi(ctx.attributes.domain_joined_sid, &joined)
            .into_iter()
            .find(|o| o.object_type() == ObjectType::Machine);

        let machine = match existing {
            Some(machine) => machine,
            None => {
                let name = computer
                    .first_string(ctx.core.name)
                    .or_else(|| {
                        computer
                            .first_string(ctx.core.sam_account_name)
                            .map(|sam| sam.trim_end_matches('$').to_string())
                    })
                    .unwrap_or_else(|| computer.label());
                let machine = objects.add_new([
                    (ctx.core.object_type, ObjectType::Machine.value()),
                    (ctx.core.name, AttributeValue::from(name)),
                    (ctx.attributes.domain_joined_sid, joined),
                ])?;
                for attribute in [
                    ctx.attributes.dns_host_name,
                    ctx.core.domain_context,
                    ctx.core.data_source,
                ] {
                    if let Some(values) = computer.get(attribute) {
                        machine.add_all(attribute, values)?;
                    }
                }
                created += 1;
                machine
            }
        };

        machine.edge_to(&computer, ctx.edges.authenticates_as);
        computer.edge_to(&machine, ctx.edges.machine_account);
    }
    tracing::debug!(created, "machines created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{AnalysisOptions, register};
    use crate::{Pipeline, Schema, Sid};

    #[test]
    fn machine_per_computer_with_both_edges() {
        let schema = Schema::new();
        let mut pipeline = Pipeline::new();
        let ctx = register(&schema, &mut pipeline, AnalysisOptions::default()).expect("register");
        let core = schema.core();
        let objects = Objects::new(&schema);
        let sid: Sid = "S-1-5-21-1-2-3-1105".parse().expect("sid");

        let computer = objects
            .add_new([
                (core.object_type, ObjectType::Computer.value()),
                (core.object_sid, AttributeValue::Sid(sid.clone())),
                (core.sam_account_name, AttributeValue::from("WS01$")),
                (ctx.attributes.dns_host_name, AttributeValue::from("ws01.corp.local")),
            ])
            .expect("computer");

        create_machines(&ctx, &objects).expect("machines");
        create_machines(&ctx, &objects).expect("idempotent");

        let machines = objects
            .filter(|o| o.object_type() == ObjectType::Machine)
            .collect();
        assert_eq!(machines.len(), 1);
        let machine = &machines[0];
        assert_eq!(machine.first_string(core.name).as_deref(), Some("WS01"));
        assert!(machine.has_edge_to(computer.id(), ctx.edges.authenticates_as));
        assert!(computer.has_edge_to(machine.id(), ctx.edges.machine_account));
        assert!(machine.has(ctx.attributes.dns_host_name));
        assert_eq!(machine.sid(), None);
    }
}
