//! Directory schema GUIDs used by the ACL processors.
//!
//! ACE object types are matched against these: attribute schemaIDGUIDs,
//! control access rights (rightsGUID) and class schemaIDGUIDs.

use uuid::Uuid;

// Extended rights
pub const RESET_PASSWORD: Uuid = Uuid::from_u128(0x00299570_246d_11d0_a768_00aa006e0529);
pub const DS_REPLICATION_GET_CHANGES: Uuid =
    Uuid::from_u128(0x1131f6aa_9c07_11d1_f79f_00c04fc2dcd2);
pub const DS_REPLICATION_GET_CHANGES_ALL: Uuid =
    Uuid::from_u128(0x1131f6ad_9c07_11d1_f79f_00c04fc2dcd2);
pub const CERTIFICATE_ENROLL: Uuid = Uuid::from_u128(0x0e10c968_78fb_11d2_90d4_00c04f79dc55);
pub const CERTIFICATE_AUTO_ENROLL: Uuid = Uuid::from_u128(0xa05b8cc2_17bc_4802_a710_e7c15ab866a2);

// Attributes. The validated SPN write shares its GUID with the attribute.
pub const MEMBER: Uuid = Uuid::from_u128(0xbf9679c0_0de6_11d0_a285_00aa003049e2);
pub const SERVICE_PRINCIPAL_NAME: Uuid = Uuid::from_u128(0xf3a64788_5306_11d1_a9c5_0000f80367c1);
pub const USER_ACCOUNT_CONTROL: Uuid = Uuid::from_u128(0xbf967a68_0de6_11d0_a285_00aa003049e2);
pub const ALLOWED_TO_ACT: Uuid = Uuid::from_u128(0x3f78c3e5_f79a_46bd_a0b8_9d18116ddc79);
pub const KEY_CREDENTIAL_LINK: Uuid = Uuid::from_u128(0x5b47d60f_6090_40b2_9f37_2a4de88f3063);
pub const ALLOWED_TO_DELEGATE_TO: Uuid = Uuid::from_u128(0x800d94d7_b7a1_42a1_b14d_7cae1423d07f);
pub const ALT_SECURITY_IDENTITIES: Uuid = Uuid::from_u128(0x00fbf30c_91fe_11d1_aebc_0000f80367c1);
pub const PROFILE_PATH: Uuid = Uuid::from_u128(0xbf967a05_0de6_11d0_a285_00aa003049e2);
pub const SCRIPT_PATH: Uuid = Uuid::from_u128(0xbf9679a8_0de6_11d0_a285_00aa003049e2);

// Property sets
pub const GROUP_MEMBERSHIP: Uuid = Uuid::from_u128(0xbc0ac240_79a9_11d0_9020_00c04fc2d4cf);

/// Class schemaIDGUIDs by lower-cased lDAPDisplayName.
const CLASSES: &[(&str, Uuid)] = &[
    ("user", Uuid::from_u128(0xbf967aba_0de6_11d0_a285_00aa003049e2)),
    ("group", Uuid::from_u128(0xbf967a9c_0de6_11d0_a285_00aa003049e2)),
    ("computer", Uuid::from_u128(0xbf967a86_0de6_11d0_a285_00aa003049e2)),
    ("container", Uuid::from_u128(0xbf967a8b_0de6_11d0_a285_00aa003049e2)),
    ("organizationalunit", Uuid::from_u128(0xbf967aa5_0de6_11d0_a285_00aa003049e2)),
    ("domaindns", Uuid::from_u128(0x19195a5b_6da0_11d0_afd3_00c04fd930c9)),
    ("grouppolicycontainer", Uuid::from_u128(0xf30e3bc2_9ff0_11d1_b603_0000f80367c1)),
    ("inetorgperson", Uuid::from_u128(0x4828cc14_1437_45bc_9b07_ad6f015e5f28)),
    ("msds-groupmanagedserviceaccount", Uuid::from_u128(0x7b8b558a_93a5_4af7_adca_c017e67f1057)),
    ("pkicertificatetemplate", Uuid::from_u128(0xe5209ca2_3bba_11d2_90cc_00c04fd91ab1)),
];

/// schemaIDGUIDs of the known classes in `classes`.
#[must_use]
pub fn class_guids<S: AsRef<str>>(classes: &[S]) -> Vec<Uuid> {
    classes
        .iter()
        .filter_map(|class| {
            CLASSES
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(class.as_ref()))
                .map(|(_, guid)| *guid)
        })
        .collect()
}
