//! Directory attributes read or written by the analysis processors.

use crate::attribute::{AttributeRegistry, AttributeType, TimeEncoding};
use crate::{Attribute, GraphError};

/// Handles of every directory attribute the processors use.
#[derive(Debug, Clone, Copy)]
pub struct AdAttributes {
    pub user_account_control: Attribute,
    pub member: Attribute,
    pub member_of: Attribute,
    pub primary_group_id: Attribute,
    pub service_principal_name: Attribute,
    pub allowed_to_delegate_to: Attribute,
    pub allowed_to_act: Attribute,
    pub sid_history: Attribute,
    pub gp_link: Attribute,
    pub gp_options: Attribute,
    pub gp_link_cache: Attribute,
    pub netbios_name: Attribute,
    pub nc_name: Attribute,
    pub dns_root: Attribute,
    pub dns_host_name: Attribute,
    pub trust_partner: Attribute,
    pub trust_direction: Attribute,
    pub trust_attributes: Attribute,
    pub domain_joined_sid: Attribute,
    pub pwd_last_set: Attribute,
    pub last_logon_timestamp: Attribute,
    pub account_expires: Attribute,
    pub schema_id_guid: Attribute,
    pub group_msa_membership: Attribute,
    pub laps_expiration: Attribute,
    pub laps_v2_expiration: Attribute,
}

impl AdAttributes {
    pub fn register(registry: &AttributeRegistry) -> Result<Self, GraphError> {
        let string = |name: &str| registry.define(name).tag("AD").single().register();
        let int = |name: &str| {
            registry
                .define(name)
                .tag("AD")
                .single()
                .kind(AttributeType::Int)
                .register()
        };
        let many = |name: &str| registry.define(name).tag("AD").merge().register();
        let time = |name: &str| {
            registry
                .define(name)
                .tag("AD")
                .single()
                .kind(AttributeType::Time(TimeEncoding::FileTime))
                .register()
        };

        Ok(Self {
            user_account_control: int("userAccountControl")?,
            member: many("member")?,
            member_of: many("memberOf")?,
            primary_group_id: int("primaryGroupID")?,
            service_principal_name: many("servicePrincipalName")?,
            allowed_to_delegate_to: many("msDS-AllowedToDelegateTo")?,
            allowed_to_act: registry
                .define("msDS-AllowedToActOnBehalfOfOtherIdentity")
                .tag("AD")
                .single()
                .kind(AttributeType::SecurityDescriptor)
                .register()?,
            sid_history: registry
                .define("sIDHistory")
                .tag("AD")
                .merge()
                .kind(AttributeType::Sid)
                .register()?,
            gp_link: string("gPLink")?,
            gp_options: int("gPOptions")?,
            gp_link_cache: registry
                .define("gpLinkCache")
                .kind(AttributeType::ObjectReference)
                .description("Resolved group policy links, in gPLink order")
                .register()?,
            netbios_name: string("nETBIOSName")?,
            nc_name: string("nCName")?,
            dns_root: string("dnsRoot")?,
            dns_host_name: string("dNSHostName")?,
            trust_partner: string("trustPartner")?,
            trust_direction: int("trustDirection")?,
            trust_attributes: int("trustAttributes")?,
            domain_joined_sid: registry
                .define("domainJoinedSid")
                .single()
                .merge()
                .kind(AttributeType::Sid)
                .description("SID of the computer account a machine runs as")
                .register()?,
            pwd_last_set: time("pwdLastSet")?,
            last_logon_timestamp: time("lastLogonTimestamp")?,
            account_expires: time("accountExpires")?,
            schema_id_guid: registry
                .define("schemaIDGUID")
                .tag("AD")
                .single()
                .kind(AttributeType::Guid)
                .register()?,
            group_msa_membership: registry
                .define("msDS-GroupMSAMembership")
                .tag("AD")
                .single()
                .kind(AttributeType::SecurityDescriptor)
                .register()?,
            laps_expiration: time("ms-Mcs-AdmPwdExpirationTime")?,
            laps_v2_expiration: time("msLAPS-PasswordExpirationTime")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Schema;

    #[test]
    fn registration_is_repeatable() {
        let schema = Schema::new();
        let first = AdAttributes::register(schema.attributes()).expect("first");
        let second = AdAttributes::register(schema.attributes()).expect("second");
        assert_eq!(first.member, second.member);
        assert!(schema.attributes().is_single(first.user_account_control));
        assert!(!schema.attributes().is_single(first.member));
    }
}
