//! Edges derived from security descriptors and delegation settings.
//!
//! Each object's DACL is checked against a table of rules. A rule names the
//! rights (and optionally the attribute or extended right they must be
//! scoped to) that make a trustee able to take the object over in one
//! specific way. Trustees are resolved to objects by SID, synthesizing
//! placeholders for SIDs nobody in the source carries.

use super::{AdContext, guids, tags, try_iterate, try_iterate_parallel};
use crate::object::ObjectType;
use crate::security::rights::{
    DS_CONTROL_ACCESS, DS_WRITE_PROPERTY, DS_WRITE_PROPERTY_EXTENDED, GENERIC_ALL, GENERIC_WRITE,
    VOODOO_BIT, WRITE_DACL, WRITE_OWNER,
};
use crate::security::{AccessRequest, SecurityDescriptor};
use crate::sid::{AUTHENTICATED_USERS, CREATOR_OWNER, EVERYONE, OWNER_RIGHTS, PRINCIPAL_SELF};
use crate::{Attribute, AttributeValue, Edge, GraphError, Object, Objects, Sid};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

// =============================================================================
// RULES
// =============================================================================

/// Which targets a rule is evaluated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Targets {
    Any,
    /// Objects with a password or key material.
    Accounts,
    Users,
    Groups,
    Computers,
    CertificateTemplates,
}

impl Targets {
    fn matches(self, kind: ObjectType) -> bool {
        match self {
            Self::Any => true,
            Self::Accounts => matches!(
                kind,
                ObjectType::User
                    | ObjectType::Computer
                    | ObjectType::ManagedServiceAccount
                    | ObjectType::GroupManagedServiceAccount
            ),
            Self::Users => kind == ObjectType::User,
            Self::Groups => kind == ObjectType::Group,
            Self::Computers => kind == ObjectType::Computer,
            Self::CertificateTemplates => kind == ObjectType::CertificateTemplate,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    edge: Edge,
    rights: u32,
    scope: Option<Uuid>,
    targets: Targets,
}

fn rules(ctx: &AdContext) -> Vec<Rule> {
    let e = &ctx.edges;
    let rule = |edge, rights, scope, targets| Rule {
        edge,
        rights,
        scope,
        targets,
    };
    vec![
        rule(e.generic_all, GENERIC_ALL, None, Targets::Any),
        rule(e.write_all, GENERIC_WRITE, None, Targets::Any),
        rule(e.write_property_all, DS_WRITE_PROPERTY, None, Targets::Any),
        rule(e.write_extended_all, DS_WRITE_PROPERTY_EXTENDED, None, Targets::Any),
        rule(e.take_ownership, WRITE_OWNER, None, Targets::Any),
        rule(e.write_dacl, WRITE_DACL, None, Targets::Any),
        rule(e.all_extended_rights, DS_CONTROL_ACCESS, None, Targets::Any),
        rule(e.voodoo_bit, VOODOO_BIT, None, Targets::Any),
        rule(e.reset_password, DS_CONTROL_ACCESS, Some(guids::RESET_PASSWORD), Targets::Accounts),
        rule(e.write_spn, DS_WRITE_PROPERTY, Some(guids::SERVICE_PRINCIPAL_NAME), Targets::Accounts),
        rule(
            e.write_validated_spn,
            DS_WRITE_PROPERTY_EXTENDED,
            Some(guids::SERVICE_PRINCIPAL_NAME),
            Targets::Accounts,
        ),
        rule(
            e.write_user_account_control,
            DS_WRITE_PROPERTY,
            Some(guids::USER_ACCOUNT_CONTROL),
            Targets::Accounts,
        ),
        rule(
            e.write_key_credential_link,
            DS_WRITE_PROPERTY,
            Some(guids::KEY_CREDENTIAL_LINK),
            Targets::Accounts,
        ),
        rule(e.write_allowed_to_act, DS_WRITE_PROPERTY, Some(guids::ALLOWED_TO_ACT), Targets::Computers),
        rule(e.add_member, DS_WRITE_PROPERTY, Some(guids::MEMBER), Targets::Groups),
        rule(e.add_self_member, DS_WRITE_PROPERTY_EXTENDED, Some(guids::MEMBER), Targets::Groups),
        rule(
            e.add_member_group_attr,
            DS_WRITE_PROPERTY,
            Some(guids::GROUP_MEMBERSHIP),
            Targets::Groups,
        ),
        rule(
            e.write_allowed_to_deleg_to,
            DS_WRITE_PROPERTY,
            Some(guids::ALLOWED_TO_DELEGATE_TO),
            Targets::Computers,
        ),
        rule(
            e.write_alt_security_identities,
            DS_WRITE_PROPERTY,
            Some(guids::ALT_SECURITY_IDENTITIES),
            Targets::Users,
        ),
        rule(e.write_profile_path, DS_WRITE_PROPERTY, Some(guids::PROFILE_PATH), Targets::Users),
        rule(e.write_script_path, DS_WRITE_PROPERTY, Some(guids::SCRIPT_PATH), Targets::Users),
        // Enrollment is granted by the extended right or by the 0x1000 bit.
        rule(
            e.certificate_enroll,
            DS_CONTROL_ACCESS,
            Some(guids::CERTIFICATE_ENROLL),
            Targets::CertificateTemplates,
        ),
        rule(e.certificate_enroll, VOODOO_BIT, None, Targets::CertificateTemplates),
        rule(
            e.certificate_auto_enroll,
            DS_CONTROL_ACCESS,
            Some(guids::CERTIFICATE_AUTO_ENROLL),
            Targets::CertificateTemplates,
        ),
        rule(e.certificate_auto_enroll, VOODOO_BIT, None, Targets::CertificateTemplates),
    ]
}

/// Trustees that stand for "whoever acts", never a stored principal.
fn is_contextual(sid: &Sid) -> bool {
    *sid == *CREATOR_OWNER || *sid == *PRINCIPAL_SELF || *sid == *OWNER_RIGHTS
}

// =============================================================================
// SECURITY DESCRIPTORS
// =============================================================================

/// Resolves trustee SIDs once per object.
struct Trustees<'a> {
    objects: &'a Objects,
    target: &'a Object,
    resolved: BTreeMap<Sid, Arc<Object>>,
}

impl<'a> Trustees<'a> {
    fn new(objects: &'a Objects, target: &'a Object) -> Self {
        Self {
            objects,
            target,
            resolved: BTreeMap::new(),
        }
    }

    fn edge(&mut self, sid: &Sid, edge: Edge) -> Result<(), GraphError> {
        if is_contextual(sid) {
            return Ok(());
        }
        let trustee = match self.resolved.get(sid) {
            Some(found) => Arc::clone(found),
            None => {
                let found = self.objects.find_or_add_adjacent_sid(sid, Some(self.target))?;
                self.resolved.insert(sid.clone(), Arc::clone(&found));
                found
            }
        };
        trustee.edge_to(self.target, edge);
        Ok(())
    }
}

pub(super) fn security_descriptors(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    let rules = rules(ctx);
    try_iterate_parallel(objects, ctx.options.workers, |object| {
        let descriptor = match object.security_descriptor() {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => return Ok(()),
            Err(e) => {
                ctx.warn("security-descriptor", object, &e.to_string());
                return Ok(());
            }
        };
        analyze_descriptor(ctx, objects, object, &descriptor, &rules)
    })
}

fn analyze_descriptor(
    ctx: &AdContext,
    objects: &Objects,
    object: &Arc<Object>,
    descriptor: &SecurityDescriptor,
    rules: &[Rule],
) -> Result<(), GraphError> {
    let edges = &ctx.edges;
    let kind = object.object_type();
    let classes = guids::class_guids(&object.object_classes());
    let mut trustees = Trustees::new(objects, object);

    if !descriptor.is_dacl_protected()
        && let Some(parent) = object.parent().and_then(|id| objects.get(id))
    {
        parent.edge_to(object, edges.inherits_security);
    }

    if let Some(owner) = &descriptor.owner {
        let owner_locked = descriptor
            .dacl
            .as_ref()
            .is_some_and(|dacl| dacl.is_denied(&OWNER_RIGHTS, &AccessRequest::new(WRITE_DACL)));
        if !owner_locked {
            trustees.edge(owner, edges.owns)?;
        }
    }

    for ace in descriptor.dacl_entries() {
        if ace.ace_type.is_deny() && !ace.is_inherit_only() {
            trustees.edge(&ace.sid, edges.acl_contains_deny)?;
        }
    }

    for rule in rules.iter().filter(|rule| rule.targets.matches(kind)) {
        let mut request = AccessRequest::new(rule.rights).on_classes(&classes);
        if let Some(scope) = rule.scope {
            request = request.scoped(scope);
        }
        for sid in descriptor.allowed_trustees(&request) {
            trustees.edge(&sid, rule.edge)?;
        }
    }

    if kind == ObjectType::DomainDns {
        replication(ctx, objects, object, descriptor, &classes, &mut trustees)?;
    }
    Ok(())
}

/// Replication rights on a domain head. Both rights together allow DCsync;
/// the single rights point at a per-domain service point object.
fn replication(
    ctx: &AdContext,
    objects: &Objects,
    domain: &Arc<Object>,
    descriptor: &SecurityDescriptor,
    classes: &[Uuid],
    trustees: &mut Trustees<'_>,
) -> Result<(), GraphError> {
    let edges = &ctx.edges;
    let request = |right: Uuid| {
        AccessRequest::new(DS_CONTROL_ACCESS)
            .scoped(right)
            .on_classes(classes)
    };
    let changes = descriptor.allowed_trustees(&request(guids::DS_REPLICATION_GET_CHANGES));
    let changes_all = descriptor.allowed_trustees(&request(guids::DS_REPLICATION_GET_CHANGES_ALL));
    if changes.is_empty() && changes_all.is_empty() {
        return Ok(());
    }

    let Some(dn) = domain.dn() else {
        ctx.warn("replication", domain, "domain head without distinguishedName");
        return Ok(());
    };
    let core = &ctx.core;
    let point = objects.find_or_add([
        (core.distinguished_name, AttributeValue::from(format!("CN=DCsync,{dn}"))),
        (core.name, AttributeValue::from("DCsync")),
        (core.object_type, ObjectType::CallableServicePoint.value()),
    ])?;
    if let Some(context) = domain.first(core.domain_context) {
        point.add(core.domain_context, context)?;
    }
    objects.set_parent(&point, domain);
    domain.edge_to(&point, edges.contains);

    let mut point_trustees = Trustees::new(objects, &point);
    for sid in &changes {
        point_trustees.edge(sid, edges.ds_replication_get_changes)?;
    }
    for sid in &changes_all {
        point_trustees.edge(sid, edges.ds_replication_get_changes_all)?;
        if changes.contains(sid) {
            trustees.edge(sid, edges.dcsync)?;
        }
    }
    Ok(())
}

// =============================================================================
// DELEGATION
// =============================================================================

/// Host part of an SPN: `cifs/fs01.corp.local:445/x` gives `fs01.corp.local`.
fn spn_host(spn: &str) -> Option<&str> {
    let (_, rest) = spn.split_once('/')?;
    let host = rest.split(['/', ':']).next()?;
    (!host.is_empty()).then_some(host)
}

/// Every allow entry of the descriptor held in `attribute` becomes `edge`
/// from the trustee to the object.
fn descriptor_attribute(
    ctx: &AdContext,
    objects: &Objects,
    object: &Arc<Object>,
    attribute: Attribute,
    kind: &'static str,
    edge: Edge,
) -> Result<(), GraphError> {
    let Some(raw) = object.first(attribute) else {
        return Ok(());
    };
    match raw.as_blob().map(SecurityDescriptor::parse) {
        Some(Ok(descriptor)) => {
            let mut trustees = Trustees::new(objects, object);
            for ace in descriptor.dacl_entries() {
                if ace.ace_type.is_allow() && !ace.is_inherit_only() {
                    trustees.edge(&ace.sid, edge)?;
                }
            }
        }
        Some(Err(e)) => ctx.warn(kind, object, &e.to_string()),
        None => ctx.warn(kind, object, "value is not a security descriptor"),
    }
    Ok(())
}

pub(super) fn delegation(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    let attributes = &ctx.attributes;
    try_iterate(objects, |object| {
        descriptor_attribute(
            ctx,
            objects,
            object,
            attributes.allowed_to_act,
            "allowed-to-act",
            ctx.edges.rb_constrained_deleg,
        )?;

        for spn in object.get(attributes.allowed_to_delegate_to).unwrap_or_default() {
            let mut services = objects.find_multi(attributes.service_principal_name, &spn);
            if services.is_empty()
                && let Some(host) = spn.as_str().and_then(spn_host)
            {
                services = objects.find_multi(attributes.dns_host_name, &AttributeValue::from(host));
            }
            if services.is_empty() {
                ctx.warn("delegation-target", object, &format!("no service holds SPN '{spn}'"));
            }
            for service in services {
                object.edge_to(&service, ctx.edges.constrained_deleg);
            }
        }
        Ok(())
    })
}

// =============================================================================
// MANAGED PASSWORDS
// =============================================================================

/// Principals allowed to retrieve a group managed service account password.
pub(super) fn gmsa_passwords(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    try_iterate(objects, |object| {
        descriptor_attribute(
            ctx,
            objects,
            object,
            ctx.attributes.group_msa_membership,
            "gmsa-membership",
            ctx.edges.read_gmsa_password,
        )
    })
}

/// LAPS schema extensions: the expiry attribute marking a managed computer,
/// and the password attributes whose read right exposes the password.
fn laps_versions(ctx: &AdContext) -> [(Attribute, &'static [&'static str]); 2] {
    [
        (ctx.attributes.laps_expiration, &["ms-Mcs-AdmPwd"]),
        (
            ctx.attributes.laps_v2_expiration,
            &["ms-LAPS-Password", "ms-LAPS-EncryptedPassword"],
        ),
    ]
}

/// schemaIDGUID of a schema extension attribute, if the forest has it.
fn schema_extension(ctx: &AdContext, objects: &Objects, name: &str) -> Option<Uuid> {
    let definition = objects.find_two(
        ctx.core.name,
        &AttributeValue::from(name),
        ctx.core.object_class,
        &AttributeValue::from("attributeSchema"),
    )?;
    let guid = definition
        .first(ctx.attributes.schema_id_guid)
        .and_then(|value| value.as_guid());
    if guid.is_none() {
        ctx.warn("laps-schema", &definition, "schema extension without schemaIDGUID");
    }
    guid
}

/// Readers of a LAPS managed password. The password belongs to the local
/// administrator, so the edge ends at the machine, not the computer account.
pub(super) fn laps_passwords(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    for (expiration, names) in laps_versions(ctx) {
        let rights: Vec<Uuid> = names
            .iter()
            .filter_map(|name| schema_extension(ctx, objects, name))
            .collect();
        if rights.is_empty() {
            tracing::debug!(schema = %names.join(","), "LAPS extension not present");
            continue;
        }
        try_iterate(objects, |computer| {
            if computer.object_type() != ObjectType::Computer || !computer.has(expiration) {
                return Ok(());
            }
            laps_readers(ctx, objects, computer, &rights)
        })?;
    }
    Ok(())
}

fn laps_readers(
    ctx: &AdContext,
    objects: &Objects,
    computer: &Arc<Object>,
    rights: &[Uuid],
) -> Result<(), GraphError> {
    let descriptor = match computer.security_descriptor() {
        Ok(Some(descriptor)) => descriptor,
        Ok(None) => return Ok(()),
        Err(e) => {
            ctx.warn("security-descriptor", computer, &e.to_string());
            return Ok(());
        }
    };
    let Some(sid) = computer.sid() else {
        ctx.warn("computer-without-sid", computer, "computer account has no objectSid");
        return Ok(());
    };
    let Some(machine) = objects
        .find_multi(ctx.attributes.domain_joined_sid, &AttributeValue::Sid(sid))
        .into_iter()
        .find(|o| o.object_type() == ObjectType::Machine)
    else {
        ctx.warn("laps-machine", computer, "no machine for the computer account");
        return Ok(());
    };
    machine.tag(tags::LAPS);

    let classes = guids::class_guids(&computer.object_classes());
    let mut trustees = Trustees::new(objects, &machine);
    for right in rights {
        let request = AccessRequest::new(DS_CONTROL_ACCESS)
            .scoped(*right)
            .on_classes(&classes);
        for sid in descriptor.allowed_trustees(&request) {
            trustees.edge(&sid, ctx.edges.read_laps_password)?;
        }
    }
    Ok(())
}

// =============================================================================
// ROASTING & SID HISTORY
// =============================================================================

/// Enabled user accounts that can be attacked offline: with an SPN by any
/// authenticated user, without pre-authentication by anyone.
pub(super) fn roastable_accounts(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    let authenticated = ctx.well_known(objects, &AUTHENTICATED_USERS)?;
    let everyone = ctx.well_known(objects, &EVERYONE)?;
    let mut roastable = 0usize;

    objects
        .filter(|o| o.object_type() == ObjectType::User && !o.has_tag(tags::ACCOUNT_DISABLED))
        .iterate(|account| {
            if account.has(ctx.attributes.service_principal_name) {
                authenticated.edge_to(account, ctx.edges.has_spn);
                roastable += 1;
            }
            if account.has_tag(tags::DONT_REQ_PREAUTH) {
                everyone.edge_to(account, ctx.edges.dont_req_preauth);
                roastable += 1;
            }
            true
        });
    tracing::debug!(roastable, "roastable accounts linked");
    Ok(())
}

pub(super) fn sid_history(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    try_iterate(objects, |object| {
        for value in object.get(ctx.attributes.sid_history).unwrap_or_default() {
            let Some(sid) = value.as_sid() else {
                ctx.warn("sid-history", object, "sIDHistory value is not a SID");
                continue;
            };
            let target = objects.find_or_add_adjacent_sid(sid, Some(object.as_ref()))?;
            object.edge_to(&target, ctx.edges.sid_history_equality);
        }
        Ok(())
    })
}
