//! Account metadata: userAccountControl tags, primary group membership and
//! domain trusts.

use super::{AdContext, dns_name, tags, try_iterate};
use crate::trust::{TrustDirection, TrustInfo, TrustPair};
use crate::{GraphError, ObjectType, Objects};

/// userAccountControl flags (MS-ADTS 2.2.16).
mod uac {
    pub const ACCOUNT_DISABLE: i64 = 0x0000_0002;
    pub const PASSWD_NOTREQD: i64 = 0x0000_0020;
    pub const DONT_EXPIRE_PASSWORD: i64 = 0x0001_0000;
    pub const TRUSTED_FOR_DELEGATION: i64 = 0x0008_0000;
    pub const DONT_REQ_PREAUTH: i64 = 0x0040_0000;
    pub const TRUSTED_TO_AUTH_FOR_DELEGATION: i64 = 0x0100_0000;
}

const FLAG_TAGS: [(i64, &str); 5] = [
    (uac::PASSWD_NOTREQD, tags::PASSWORD_NOT_REQUIRED),
    (uac::DONT_EXPIRE_PASSWORD, tags::PASSWORD_NEVER_EXPIRES),
    (uac::TRUSTED_FOR_DELEGATION, tags::UNCONSTRAINED_DELEGATION),
    (uac::DONT_REQ_PREAUTH, tags::DONT_REQ_PREAUTH),
    (uac::TRUSTED_TO_AUTH_FOR_DELEGATION, tags::CONSTRAINED_DELEGATION),
];

pub(super) fn account_flags(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    try_iterate(objects, |object| {
        let Some(flags) = object.first_int(ctx.attributes.user_account_control) else {
            return Ok(());
        };
        if flags & uac::ACCOUNT_DISABLE != 0 {
            object.tag(tags::ACCOUNT_DISABLED);
        } else {
            object.tag(tags::ACCOUNT_ENABLED);
        }
        for (flag, tag) in FLAG_TAGS {
            if flags & flag != 0 {
                object.tag(tag);
            }
        }
        Ok(())
    })
}

/// primaryGroupID is a RID in the account's own domain and is not listed in
/// the group's member attribute.
pub(super) fn primary_groups(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    try_iterate(objects, |object| {
        let (Some(rid), Some(sid)) = (
            object.first_int(ctx.attributes.primary_group_id),
            object.sid(),
        ) else {
            return Ok(());
        };
        let Ok(rid) = u32::try_from(rid) else {
            ctx.warn("primary-group", object, "primaryGroupID out of range");
            return Ok(());
        };
        if !sid.is_domain_issued() {
            return Ok(());
        }
        let group_sid = sid.strip_rid().add_component(rid);
        let group = objects.find_or_add_adjacent_sid(&group_sid, Some(object.as_ref()))?;
        object.edge_to(&group, ctx.edges.member_of_group);
        Ok(())
    })
}

pub(super) fn record_trusts(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    try_iterate(objects, |object| {
        if object.object_type() != ObjectType::Trust {
            return Ok(());
        }
        let (Some(partner), Some(raw), Some(context)) = (
            object.first_string(ctx.attributes.trust_partner),
            object.first_int(ctx.attributes.trust_direction),
            object.first_string(ctx.core.domain_context),
        ) else {
            ctx.warn("trust", object, "trust object lacks partner, direction or domain");
            return Ok(());
        };
        let direction = match TrustDirection::try_from(raw) {
            Ok(direction) => direction,
            Err(e) => {
                ctx.warn("trust", object, &e.to_string());
                return Ok(());
            }
        };
        let attributes = object
            .first_int(ctx.attributes.trust_attributes)
            .and_then(|raw| u32::try_from(raw).ok())
            .unwrap_or_default();
        ctx.trusts.record(
            TrustPair::new(&dns_name(&context), &partner),
            TrustInfo {
                direction,
                attributes,
            },
        );
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{AnalysisOptions, register};
    use crate::{AttributeValue, Pipeline, Schema, Sid};

    #[test]
    fn flags_become_tags() {
        let schema = Schema::new();
        let mut pipeline = Pipeline::new();
        let ctx = register(&schema, &mut pipeline, AnalysisOptions::default()).expect("register");
        let objects = Objects::new(&schema);

        let disabled = objects
            .add_new([(ctx.attributes.user_account_control, AttributeValue::Int(0x0001_0202))])
            .expect("disabled");
        let roastable = objects
            .add_new([(ctx.attributes.user_account_control, AttributeValue::Int(0x0040_0200))])
            .expect("roastable");

        account_flags(&ctx, &objects).expect("flags");

        assert!(disabled.has_tag(tags::ACCOUNT_DISABLED));
        assert!(disabled.has_tag(tags::PASSWORD_NEVER_EXPIRES));
        assert!(!disabled.has_tag(tags::ACCOUNT_ENABLED));
        assert!(roastable.has_tag(tags::ACCOUNT_ENABLED));
        assert!(roastable.has_tag(tags::DONT_REQ_PREAUTH));
    }

    #[test]
    fn primary_group_links_to_domain_group() {
        let schema = Schema::new();
        let mut pipeline = Pipeline::new();
        let ctx = register(&schema, &mut pipeline, AnalysisOptions::default()).expect("register");
        let core = schema.core();
        let objects = Objects::new(&schema);
        let user_sid: Sid = "S-1-5-21-10-20-30-1104".parse().expect("sid");

        let user = objects
            .add_new([
                (core.object_sid, AttributeValue::Sid(user_sid)),
                (core.domain_context, AttributeValue::from("DC=corp,DC=local")),
                (ctx.attributes.primary_group_id, AttributeValue::Int(513)),
            ])
            .expect("user");

        primary_groups(&ctx, &objects).expect("primary groups");

        let group_sid: Sid = "S-1-5-21-10-20-30-513".parse().expect("sid");
        let group = objects
            .find(core.object_sid, &AttributeValue::Sid(group_sid))
            .expect("synthesized group");
        assert!(user.has_edge_to(group.id(), ctx.edges.member_of_group));
        assert_eq!(
            group.first_string(core.domain_context).as_deref(),
            Some("DC=corp,DC=local")
        );
    }

    #[test]
    fn trusts_are_recorded() {
        let schema = Schema::new();
        let mut pipeline = Pipeline::new();
        let ctx = register(&schema, &mut pipeline, AnalysisOptions::default()).expect("register");
        let core = schema.core();
        let objects = Objects::new(&schema);

        objects
            .add_new([
                (core.object_type, ObjectType::Trust.value()),
                (core.domain_context, AttributeValue::from("DC=corp,DC=local")),
                (ctx.attributes.trust_partner, AttributeValue::from("Partner.Example")),
                (ctx.attributes.trust_direction, AttributeValue::Int(3)),
            ])
            .expect("trust");

        record_trusts(&ctx, &objects).expect("trusts");

        let info = ctx
            .trusts
            .get(&TrustPair::new("corp.local", "partner.example"))
            .expect("recorded");
        assert_eq!(info.direction, TrustDirection::Bidirectional);
    }
}
