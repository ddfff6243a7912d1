//! Edge types produced by the analysis processors, with their scoring.

use super::tags;
use crate::edge::{EdgeBitmap, EdgeRegistry, Probability};
use crate::{Edge, GraphError, Object};

/// Hops that need an enabled target account.
fn only_if_target_enabled(_: &Object, target: &Object, _: &EdgeBitmap) -> Probability {
    if target.has_tag(tags::ACCOUNT_DISABLED) {
        Probability::NEVER
    } else {
        Probability::CERTAIN
    }
}

/// Hops that end in offline password cracking.
fn needs_cracking(_: &Object, target: &Object, _: &EdgeBitmap) -> Probability {
    if target.has_tag(tags::ACCOUNT_DISABLED) {
        Probability::NEVER
    } else {
        Probability::new(50)
    }
}

fn informative(_: &Object, _: &Object, _: &EdgeBitmap) -> Probability {
    Probability::NEVER
}

/// Handles of every edge type the processors add.
#[derive(Debug, Clone, Copy)]
pub struct AdEdges {
    pub member_of_group: Edge,
    pub member_of_group_indirect: Edge,
    pub contains: Edge,
    pub authenticates_as: Edge,
    pub machine_account: Edge,
    pub inherits_security: Edge,
    pub acl_contains_deny: Edge,
    pub owns: Edge,
    pub generic_all: Edge,
    pub write_all: Edge,
    pub write_property_all: Edge,
    pub write_extended_all: Edge,
    pub take_ownership: Edge,
    pub write_dacl: Edge,
    pub reset_password: Edge,
    pub write_spn: Edge,
    pub write_validated_spn: Edge,
    pub write_allowed_to_act: Edge,
    pub add_member: Edge,
    pub add_self_member: Edge,
    pub write_user_account_control: Edge,
    pub write_key_credential_link: Edge,
    pub write_alt_security_identities: Edge,
    pub write_profile_path: Edge,
    pub write_script_path: Edge,
    pub add_member_group_attr: Edge,
    pub write_allowed_to_deleg_to: Edge,
    pub read_laps_password: Edge,
    pub read_gmsa_password: Edge,
    pub certificate_enroll: Edge,
    pub certificate_auto_enroll: Edge,
    pub all_extended_rights: Edge,
    pub voodoo_bit: Edge,
    pub ds_replication_get_changes: Edge,
    pub ds_replication_get_changes_all: Edge,
    pub dcsync: Edge,
    pub rb_constrained_deleg: Edge,
    pub constrained_deleg: Edge,
    pub has_spn: Edge,
    pub dont_req_preauth: Edge,
    pub sid_history_equality: Edge,
    pub foreign_identity: Edge,
    pub affected_by_gpo: Edge,
}

impl AdEdges {
    pub fn register(registry: &EdgeRegistry) -> Result<Self, GraphError> {
        let pivot = |name: &str, text: &str| registry.define(name).describe(text).tag("Pivot");
        let granted = |name: &str, text: &str| {
            registry
                .define(name)
                .describe(text)
                .tag("Pivot")
                .tag("Granted")
        };

        Ok(Self {
            member_of_group: granted("MemberOfGroup", "Member of the group").register()?,
            member_of_group_indirect: granted(
                "MemberOfGroupIndirect",
                "Member of the group through nested groups",
            )
            .set_default(false, false, false)
            .register()?,
            contains: registry
                .define("Contains")
                .describe("Container holds the object")
                .tag("Informative")
                .probability_calculator(informative)
                .register()?,
            authenticates_as: pivot("AuthenticatesAs", "Machine runs as the computer account")
                .register()?,
            machine_account: pivot("MachineAccount", "Computer account of the machine")
                .register()?,
            inherits_security: registry
                .define("InheritsSecurity")
                .describe("Object inherits ACEs from its container")
                .tag("Informative")
                .probability_calculator(informative)
                .register()?,
            acl_contains_deny: registry
                .define("ACLContainsDeny")
                .describe("Trustee is denied something on the object")
                .tag("Informative")
                .hidden()
                .probability_calculator(informative)
                .register()?,
            owns: granted("Owns", "Owner of the object can change its DACL").register()?,
            generic_all: granted("GenericAll", "Full control").register()?,
            write_all: granted("WriteAll", "Write every attribute").register()?,
            write_property_all: granted("WritePropertyAll", "Write every property")
                .register()?,
            write_extended_all: granted("WriteExtendedAll", "Every validated write")
                .register()?,
            take_ownership: granted("TakeOwnership", "Can make itself owner").register()?,
            write_dacl: granted("WriteDACL", "Can rewrite the DACL").register()?,
            reset_password: granted("ResetPassword", "Can reset the password")
                .probability_calculator(only_if_target_enabled)
                .register()?,
            write_spn: granted("WriteSPN", "Can set an SPN and roast the account")
                .probability_calculator(needs_cracking)
                .register()?,
            write_validated_spn: granted(
                "WriteValidatedSPN",
                "Can set a validated SPN and roast the account",
            )
            .probability_calculator(needs_cracking)
            .register()?,
            write_allowed_to_act: granted(
                "WriteAllowedToAct",
                "Can configure resource based constrained delegation",
            )
            .register()?,
            add_member: granted("AddMember", "Can add members to the group").register()?,
            add_self_member: granted("AddSelfMember", "Can add itself to the group")
                .register()?,
            write_user_account_control: granted(
                "WriteUserAccountControl",
                "Can change account flags",
            )
            .probability_calculator(only_if_target_enabled)
            .register()?,
            write_key_credential_link: granted(
                "WriteKeyCredentialLink",
                "Can add shadow credentials",
            )
            .probability_calculator(only_if_target_enabled)
            .register()?,
            write_alt_security_identities: granted(
                "WriteAltSecIdent",
                "Can map a certificate that authenticates as the account",
            )
            .probability_calculator(only_if_target_enabled)
            .register()?,
            write_profile_path: pivot(
                "WriteProfilePath",
                "Can point the profile at a UNC path and capture the logon",
            )
            .register()?,
            write_script_path: pivot(
                "WriteScriptPath",
                "Can point the logon script at a UNC path",
            )
            .register()?,
            add_member_group_attr: pivot(
                "AddMemberGroupAttr",
                "Can add members through the group membership property set",
            )
            .register()?,
            write_allowed_to_deleg_to: pivot(
                "WriteAllowedToDelegTo",
                "Can configure constrained delegation on the account",
            )
            .register()?,
            read_laps_password: granted(
                "ReadLAPSPassword",
                "Can read the local administrator password of the machine",
            )
            .register()?,
            read_gmsa_password: pivot(
                "ReadGMSAPassword",
                "Can read the managed service account password",
            )
            .register()?,
            certificate_enroll: registry
                .define("CertificateEnroll")
                .describe("Can enroll into the certificate template")
                .tag("Granted")
                .register()?,
            certificate_auto_enroll: registry
                .define("CertificateAutoEnroll")
                .describe("Can auto-enroll into the certificate template")
                .tag("Granted")
                .register()?,
            all_extended_rights: granted("AllExtendedRights", "Every control access right")
                .register()?,
            voodoo_bit: registry
                .define("VoodooBit")
                .describe("Holds the undocumented 0x1000 access bit")
                .tag("Granted")
                .hidden()
                .register()?,
            ds_replication_get_changes: granted(
                "DSReplicationGetChanges",
                "Can replicate non-secret directory data",
            )
            .probability_calculator(informative)
            .register()?,
            ds_replication_get_changes_all: granted(
                "DSReplicationGetChangesAll",
                "Can replicate secret directory data",
            )
            .probability_calculator(informative)
            .register()?,
            dcsync: granted("DCsync", "Can replicate every password hash").register()?,
            rb_constrained_deleg: pivot(
                "RBConstrainedDeleg",
                "Allowed to act on behalf of users towards the target",
            )
            .register()?,
            constrained_deleg: pivot("ConstrainedDeleg", "Allowed to delegate to the service")
                .register()?,
            has_spn: pivot("HasSPN", "Any authenticated user can roast the account")
                .probability_calculator(needs_cracking)
                .register()?,
            dont_req_preauth: pivot("DontReqPreauth", "Anyone can roast the account")
                .probability_calculator(needs_cracking)
                .register()?,
            sid_history_equality: pivot(
                "SIDHistoryEquality",
                "SID history makes the account act as the target",
            )
            .register()?,
            foreign_identity: pivot(
                "ForeignIdentity",
                "Principal acts through its foreign security principal",
            )
            .register()?,
            affected_by_gpo: pivot("AffectedByGPO", "Group policy applies to the object")
                .register()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Schema;

    #[test]
    fn reset_password_needs_enabled_target() {
        let schema = Schema::new();
        let edges = AdEdges::register(schema.edges()).expect("edges");
        let source = Object::new(&schema);
        let target = Object::new(&schema);
        let bitmap = EdgeBitmap::new().set(edges.reset_password);

        assert_eq!(schema.edges().probability(&source, &target, &bitmap), Probability::CERTAIN);
        target.tag(tags::ACCOUNT_DISABLED);
        assert_eq!(schema.edges().probability(&source, &target, &bitmap), Probability::NEVER);
    }

    #[test]
    fn informative_edges_are_not_traversable() {
        let schema = Schema::new();
        let edges = AdEdges::register(schema.edges()).expect("edges");
        let a = Object::new(&schema);
        let b = Object::new(&schema);
        let informative = EdgeBitmap::new().set(edges.contains).set(edges.inherits_security);
        assert_eq!(schema.edges().probability(&a, &b, &informative), Probability::NEVER);
        assert!(!schema.edges().visible().is_set(edges.acl_contains_deny));
    }

    #[test]
    fn registering_twice_is_a_configuration_error() {
        let schema = Schema::new();
        AdEdges::register(schema.edges()).expect("first");
        assert!(matches!(
            AdEdges::register(schema.edges()),
            Err(GraphError::DuplicateRegistration { .. })
        ));
    }
}
