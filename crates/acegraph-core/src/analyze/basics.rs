//! First passes over a freshly loaded source: well-known principals, domain
//! context, object types and down-level logon names.

use super::{AdContext, domain_suffix, try_iterate};
use crate::sid::{AUTHENTICATED_USERS, EVERYONE, WELL_KNOWN};
use crate::{AttributeValue, GraphError, ObjectType, Objects, Sid};

pub(crate) const WELL_KNOWN_TAG: &str = "well_known";

/// Make sure every well-known principal exists in the source.
pub(super) fn well_known_principals(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    let mut added = 0usize;
    for (text, name) in WELL_KNOWN {
        let sid: Sid = text.parse()?;
        let value = AttributeValue::Sid(sid);
        if let Some(existing) = objects.find_multi(ctx.core.object_sid, &value).first() {
            existing.tag(WELL_KNOWN_TAG);
            continue;
        }
        let object = objects.add_new([
            (ctx.core.object_sid, value),
            (ctx.core.name, AttributeValue::from(*name)),
            (ctx.core.object_type, ObjectType::Group.value()),
        ])?;
        object.tag(WELL_KNOWN_TAG);
        added += 1;
    }
    tracing::debug!(added, "well-known principals ensured");
    Ok(())
}

/// Everything later stages take for granted.
pub(super) fn require_principals(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    ctx.well_known(objects, &EVERYONE)?;
    ctx.well_known(objects, &AUTHENTICATED_USERS)?;
    Ok(())
}

/// `domainContext` is the `DC=` suffix of the distinguished name.
pub(super) fn domain_context(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    try_iterate(objects, |object| {
        if object.has(ctx.core.domain_context) {
            return Ok(());
        }
        if let Some(dn) = object.dn()
            && let Some(suffix) = domain_suffix(&dn)
        {
            object.set(ctx.core.domain_context, [AttributeValue::from(suffix)])?;
        }
        Ok(())
    })
}

pub(super) fn object_types(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    try_iterate(objects, |object| {
        if object.has(ctx.core.object_type) {
            return Ok(());
        }
        let classes = object.object_classes();
        if !classes.is_empty() {
            let kind = ObjectType::from_object_classes(&classes);
            object.set(ctx.core.object_type, [kind.value()])?;
        }
        Ok(())
    })
}

/// `NETBIOS\sAMAccountName`, with the NetBIOS name taken from the crossRef
/// whose nCName is the object's domain context.
pub(super) fn down_level_logon_names(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    let nc_name = ctx.attributes.nc_name;
    let mut named = 0usize;
    try_iterate(objects, |object| {
        if object.has(ctx.core.down_level_logon_name) {
            return Ok(());
        }
        let (Some(account), Some(context)) = (
            object.first_string(ctx.core.sam_account_name),
            object.first(ctx.core.domain_context),
        ) else {
            return Ok(());
        };
        let netbios = objects
            .find_multi(nc_name, &context)
            .into_iter()
            .find_map(|cross_ref| cross_ref.first_string(ctx.attributes.netbios_name));
        if let Some(netbios) = netbios {
            object.set(
                ctx.core.down_level_logon_name,
                [AttributeValue::from(format!("{netbios}\\{account}"))],
            )?;
            named += 1;
        }
        Ok(())
    })?;
    objects.drop_index(nc_name);
    tracing::debug!(named, "down-level logon names set");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Pipeline, Schema};
    use crate::analyze::{AnalysisOptions, register};

    #[test]
    fn context_type_and_logon_name() {
        let schema = Schema::new();
        let mut pipeline = Pipeline::new();
        let ctx = register(&schema, &mut pipeline, AnalysisOptions::default()).expect("register");
        let core = schema.core();
        let objects = Objects::new(&schema);

        let user = objects
            .add_new([
                (core.distinguished_name, AttributeValue::from("CN=Alice,CN=Users,DC=corp,DC=local")),
                (core.sam_account_name, AttributeValue::from("alice")),
                (core.object_class, AttributeValue::from("user")),
            ])
            .expect("user");
        objects
            .add_new([
                (core.distinguished_name, AttributeValue::from("CN=CORP,CN=Partitions,CN=Configuration,DC=corp,DC=local")),
                (ctx.attributes.nc_name, AttributeValue::from("dc=corp,dc=local")),
                (ctx.attributes.netbios_name, AttributeValue::from("CORP")),
            ])
            .expect("crossref");

        domain_context(&ctx, &objects).expect("context");
        object_types(&ctx, &objects).expect("types");
        down_level_logon_names(&ctx, &objects).expect("logon names");

        assert_eq!(user.first_string(core.domain_context).as_deref(), Some("DC=corp,DC=local"));
        assert_eq!(user.object_type(), ObjectType::User);
        assert_eq!(
            user.first_string(core.down_level_logon_name).as_deref(),
            Some("CORP\\alice")
        );
    }

    #[test]
    fn missing_everyone_is_fatal() {
        let schema = Schema::new();
        let mut pipeline = Pipeline::new();
        let ctx = register(&schema, &mut pipeline, AnalysisOptions::default()).expect("register");
        let objects = Objects::new(&schema);

        assert!(matches!(
            require_principals(&ctx, &objects),
            Err(GraphError::MissingPrerequisite(_))
        ));
        well_known_principals(&ctx, &objects).expect("well-known");
        well_known_principals(&ctx, &objects).expect("repeatable");
        require_principals(&ctx, &objects).expect("present");
        assert_eq!(objects.len(), WELL_KNOWN.len() + 1);
    }
}
