//! # Self-Relative Security Descriptors
//!
//! Parser and encoder for the binary form stored in `nTSecurityDescriptor`
//! (MS-DTYP 2.4.6). All offsets are bounds-checked; malformed input yields
//! `GraphError::MalformedDescriptor` and never panics.
//!
//! Layout:
//! - Header (20 bytes): revision u8, sbz1 u8, control u16, then u32 offsets
//!   of owner, group, SACL and DACL (0 = absent), all little-endian
//! - ACL: revision u8, sbz1 u8, size u16, count u16, sbz2 u16, then ACEs
//! - ACE: type u8, flags u8, size u16, mask u32, optional object data, SID

use crate::primitives::MAX_DESCRIPTOR_SIZE;
use crate::{GraphError, Sid};
use uuid::Uuid;

/// Descriptor control flags.
pub mod control {
    pub const DACL_PRESENT: u16 = 0x0004;
    pub const SACL_PRESENT: u16 = 0x0010;
    pub const DACL_AUTO_INHERITED: u16 = 0x0400;
    pub const DACL_PROTECTED: u16 = 0x1000;
    pub const SACL_PROTECTED: u16 = 0x2000;
    pub const SELF_RELATIVE: u16 = 0x8000;
}

/// ACE header flags.
pub mod ace_flags {
    pub const OBJECT_INHERIT: u8 = 0x01;
    pub const CONTAINER_INHERIT: u8 = 0x02;
    pub const NO_PROPAGATE_INHERIT: u8 = 0x04;
    pub const INHERIT_ONLY: u8 = 0x08;
    pub const INHERITED: u8 = 0x10;
}

const OBJECT_TYPE_PRESENT: u32 = 0x1;
const INHERITED_OBJECT_TYPE_PRESENT: u32 = 0x2;

const HEADER_LEN: usize = 20;
const ACL_HEADER_LEN: usize = 8;
const ACE_HEADER_LEN: usize = 4;

const ACL_REVISION: u8 = 2;
const ACL_REVISION_DS: u8 = 4;

/// ACE kinds the evaluator understands. Anything else is kept as `Other` so
/// entry positions stay faithful, but never grants or denies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AceType {
    AccessAllowed,
    AccessDenied,
    SystemAudit,
    AccessAllowedObject,
    AccessDeniedObject,
    SystemAuditObject,
    Other(u8),
}

impl AceType {
    #[must_use]
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0x00 => Self::AccessAllowed,
            0x01 => Self::AccessDenied,
            0x02 => Self::SystemAudit,
            0x05 => Self::AccessAllowedObject,
            0x06 => Self::AccessDeniedObject,
            0x07 => Self::SystemAuditObject,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub fn to_u8(self) -> u8 {
        match self {
            Self::AccessAllowed => 0x00,
            Self::AccessDenied => 0x01,
            Self::SystemAudit => 0x02,
            Self::AccessAllowedObject => 0x05,
            Self::AccessDeniedObject => 0x06,
            Self::SystemAuditObject => 0x07,
            Self::Other(raw) => raw,
        }
    }

    #[must_use]
    pub fn is_object(self) -> bool {
        matches!(
            self,
            Self::AccessAllowedObject | Self::AccessDeniedObject | Self::SystemAuditObject
        )
    }

    #[must_use]
    pub fn is_allow(self) -> bool {
        matches!(self, Self::AccessAllowed | Self::AccessAllowedObject)
    }

    #[must_use]
    pub fn is_deny(self) -> bool {
        matches!(self, Self::AccessDenied | Self::AccessDeniedObject)
    }
}

/// One access control entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ace {
    pub ace_type: AceType,
    pub flags: u8,
    pub mask: u32,
    pub object_type: Option<Uuid>,
    pub inherited_object_type: Option<Uuid>,
    pub sid: Sid,
}

impl Ace {
    /// Plain allow entry.
    #[must_use]
    pub fn allow(sid: Sid, mask: u32) -> Self {
        Self {
            ace_type: AceType::AccessAllowed,
            flags: 0,
            mask,
            object_type: None,
            inherited_object_type: None,
            sid,
        }
    }

    /// Plain deny entry.
    #[must_use]
    pub fn deny(sid: Sid, mask: u32) -> Self {
        Self {
            ace_type: AceType::AccessDenied,
            ..Self::allow(sid, mask)
        }
    }

    /// Scope to an attribute, property set, extended right or child class.
    #[must_use]
    pub fn with_object_type(mut self, guid: Uuid) -> Self {
        self.object_type = Some(guid);
        self.promote_to_object();
        self
    }

    /// Apply only to objects of the given class.
    #[must_use]
    pub fn with_inherited_object_type(mut self, guid: Uuid) -> Self {
        self.inherited_object_type = Some(guid);
        self.promote_to_object();
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    fn promote_to_object(&mut self) {
        self.ace_type = match self.ace_type {
            AceType::AccessAllowed => AceType::AccessAllowedObject,
            AceType::AccessDenied => AceType::AccessDeniedObject,
            AceType::SystemAudit => AceType::SystemAuditObject,
            other => other,
        };
    }

    #[must_use]
    pub fn is_inherit_only(&self) -> bool {
        self.flags & ace_flags::INHERIT_ONLY != 0
    }

    #[must_use]
    pub fn is_inherited(&self) -> bool {
        self.flags & ace_flags::INHERITED != 0
    }

    fn encoded_len(&self) -> usize {
        let mut len = ACE_HEADER_LEN + 4 + self.sid.binary_len();
        if self.ace_type.is_object() {
            len += 4;
            len += 16 * usize::from(self.object_type.is_some());
            len += 16 * usize::from(self.inherited_object_type.is_some());
        }
        len
    }
}

/// Ordered list of ACEs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Acl {
    pub revision: u8,
    pub entries: Vec<Ace>,
}

impl Acl {
    #[must_use]
    pub fn new(entries: Vec<Ace>) -> Self {
        let revision = if entries.iter().any(|e| e.ace_type.is_object()) {
            ACL_REVISION_DS
        } else {
            ACL_REVISION
        };
        Self { revision, entries }
    }
}

/// Parsed security descriptor. Immutable once parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityDescriptor {
    pub control: u16,
    pub owner: Option<Sid>,
    pub group: Option<Sid>,
    pub sacl: Option<Acl>,
    pub dacl: Option<Acl>,
}

impl SecurityDescriptor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            control: control::SELF_RELATIVE,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_owner(mut self, owner: Sid) -> Self {
        self.owner = Some(owner);
        self
    }

    #[must_use]
    pub fn with_dacl(mut self, entries: Vec<Ace>) -> Self {
        self.control |= control::DACL_PRESENT;
        self.dacl = Some(Acl::new(entries));
        self
    }

    #[must_use]
    pub fn with_control(mut self, flags: u16) -> Self {
        self.control |= flags;
        self
    }

    /// Inheritance from the parent container is blocked.
    #[must_use]
    pub fn is_dacl_protected(&self) -> bool {
        self.control & control::DACL_PROTECTED != 0
    }

    /// DACL entries, empty when there is no DACL.
    #[must_use]
    pub fn dacl_entries(&self) -> &[Ace] {
        self.dacl.as_ref().map_or(&[], |acl| acl.entries.as_slice())
    }

    // =========================================================================
    // PARSING
    // =========================================================================

    /// Parse the self-relative binary form.
    pub fn parse(bytes: &[u8]) -> Result<Self, GraphError> {
        if bytes.len() < HEADER_LEN {
            return Err(malformed(format!(
                "need {HEADER_LEN} header bytes, got {}",
                bytes.len()
            )));
        }
        if bytes.len() > MAX_DESCRIPTOR_SIZE {
            return Err(malformed(format!(
                "{} bytes exceeds maximum {MAX_DESCRIPTOR_SIZE}",
                bytes.len()
            )));
        }
        if bytes[0] != 1 {
            return Err(malformed(format!("unsupported revision {}", bytes[0])));
        }

        let control = read_u16(bytes, 2)?;
        let owner_offset = read_u32(bytes, 4)? as usize;
        let group_offset = read_u32(bytes, 8)? as usize;
        let sacl_offset = read_u32(bytes, 12)? as usize;
        let dacl_offset = read_u32(bytes, 16)? as usize;

        let owner = parse_sid_at(bytes, owner_offset)?;
        let group = parse_sid_at(bytes, group_offset)?;
        let sacl = if control & control::SACL_PRESENT != 0 && sacl_offset != 0 {
            Some(parse_acl(bytes, sacl_offset)?)
        } else {
            None
        };
        let dacl = if control & control::DACL_PRESENT != 0 && dacl_offset != 0 {
            Some(parse_acl(bytes, dacl_offset)?)
        } else {
            None
        };

        Ok(Self {
            control,
            owner,
            group,
            sacl,
            dacl,
        })
    }

    // =========================================================================
    // ENCODING
    // =========================================================================

    /// Encode to the self-relative binary form.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_LEN];
        out[0] = 1;

        let mut control = self.control | control::SELF_RELATIVE;
        if self.sacl.is_some() {
            control |= control::SACL_PRESENT;
        }
        if self.dacl.is_some() {
            control |= control::DACL_PRESENT;
        }
        out[2..4].copy_from_slice(&control.to_le_bytes());

        if let Some(owner) = &self.owner {
            let offset = out.len() as u32;
            out[4..8].copy_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&owner.to_bytes());
        }
        if let Some(group) = &self.group {
            let offset = out.len() as u32;
            out[8..12].copy_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&group.to_bytes());
        }
        if let Some(sacl) = &self.sacl {
            let offset = out.len() as u32;
            out[12..16].copy_from_slice(&offset.to_le_bytes());
            encode_acl(sacl, &mut out);
        }
        if let Some(dacl) = &self.dacl {
            let offset = out.len() as u32;
            out[16..20].copy_from_slice(&offset.to_le_bytes());
            encode_acl(dacl, &mut out);
        }
        out
    }
}

fn malformed(reason: String) -> GraphError {
    GraphError::MalformedDescriptor(reason)
}

fn read_u16(bytes: &[u8], at: usize) -> Result<u16, GraphError> {
    bytes
        .get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| malformed(format!("u16 at {at} out of bounds")))
}

fn read_u32(bytes: &[u8], at: usize) -> Result<u32, GraphError> {
    bytes
        .get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| malformed(format!("u32 at {at} out of bounds")))
}

fn read_guid(bytes: &[u8], at: usize) -> Result<Uuid, GraphError> {
    let raw: [u8; 16] = bytes
        .get(at..at + 16)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| malformed(format!("GUID at {at} out of bounds")))?;
    Ok(Uuid::from_bytes_le(raw))
}

fn parse_sid_at(bytes: &[u8], offset: usize) -> Result<Option<Sid>, GraphError> {
    if offset == 0 {
        return Ok(None);
    }
    let slice = bytes
        .get(offset..)
        .ok_or_else(|| malformed(format!("SID offset {offset} out of bounds")))?;
    let (sid, _) = Sid::parse_prefix(slice)
        .map_err(|e| malformed(format!("SID at {offset}: {e}")))?;
    Ok(Some(sid))
}

fn parse_acl(bytes: &[u8], offset: usize) -> Result<Acl, GraphError> {
    let header = bytes
        .get(offset..offset + ACL_HEADER_LEN)
        .ok_or_else(|| malformed(format!("ACL header at {offset} out of bounds")))?;
    let revision = header[0];
    let size = usize::from(u16::from_le_bytes([header[2], header[3]]));
    let count = usize::from(u16::from_le_bytes([header[4], header[5]]));

    let end = offset + size;
    if size < ACL_HEADER_LEN || end > bytes.len() {
        return Err(malformed(format!("ACL at {offset} claims {size} bytes")));
    }

    let mut entries = Vec::with_capacity(count);
    let mut cursor = offset + ACL_HEADER_LEN;
    for index in 0..count {
        if cursor + ACE_HEADER_LEN > end {
            return Err(malformed(format!("ACE {index} starts past ACL end")));
        }
        let ace_size = usize::from(read_u16(bytes, cursor + 2)?);
        if ace_size < ACE_HEADER_LEN || cursor + ace_size > end {
            return Err(malformed(format!("ACE {index} has invalid size {ace_size}")));
        }
        entries.push(parse_ace(&bytes[cursor..cursor + ace_size])?);
        cursor += ace_size;
    }

    Ok(Acl { revision, entries })
}

fn parse_ace(ace: &[u8]) -> Result<Ace, GraphError> {
    let ace_type = AceType::from_u8(ace[0]);
    let flags = ace[1];

    if let AceType::Other(_) = ace_type {
        return Ok(Ace {
            ace_type,
            flags,
            mask: 0,
            object_type: None,
            inherited_object_type: None,
            sid: Sid::default(),
        });
    }

    let mask = read_u32(ace, 4)?;
    let mut cursor = 8;
    let mut object_type = None;
    let mut inherited_object_type = None;

    if ace_type.is_object() {
        let object_flags = read_u32(ace, cursor)?;
        cursor += 4;
        if object_flags & OBJECT_TYPE_PRESENT != 0 {
            object_type = Some(read_guid(ace, cursor)?);
            cursor += 16;
        }
        if object_flags & INHERITED_OBJECT_TYPE_PRESENT != 0 {
            inherited_object_type = Some(read_guid(ace, cursor)?);
            cursor += 16;
        }
    }

    let sid_bytes = ace
        .get(cursor..)
        .ok_or_else(|| malformed("ACE SID out of bounds".to_string()))?;
    let (sid, _) = Sid::parse_prefix(sid_bytes).map_err(|e| malformed(format!("ACE SID: {e}")))?;

    Ok(Ace {
        ace_type,
        flags,
        mask,
        object_type,
        inherited_object_type,
        sid,
    })
}

fn encode_acl(acl: &Acl, out: &mut Vec<u8>) {
    let size = ACL_HEADER_LEN + acl.entries.iter().map(Ace::encoded_len).sum::<usize>();
    out.push(acl.revision);
    out.push(0);
    out.extend_from_slice(&(size as u16).to_le_bytes());
    out.extend_from_slice(&(acl.entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&[0, 0]);

    for ace in &acl.entries {
        out.push(ace.ace_type.to_u8());
        out.push(ace.flags);
        out.extend_from_slice(&(ace.encoded_len() as u16).to_le_bytes());
        out.extend_from_slice(&ace.mask.to_le_bytes());
        if ace.ace_type.is_object() {
            let mut object_flags = 0u32;
            if ace.object_type.is_some() {
                object_flags |= OBJECT_TYPE_PRESENT;
            }
            if ace.inherited_object_type.is_some() {
                object_flags |= INHERITED_OBJECT_TYPE_PRESENT;
            }
            out.extend_from_slice(&object_flags.to_le_bytes());
            if let Some(guid) = ace.object_type {
                out.extend_from_slice(&guid.to_bytes_le());
            }
            if let Some(guid) = ace.inherited_object_type {
                out.extend_from_slice(&guid.to_bytes_le());
            }
        }
        out.extend_from_slice(&ace.sid.to_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::rights;
    use crate::sid;

    fn sample() -> SecurityDescriptor {
        let user: Sid = "S-1-5-21-1-2-3-1104".parse().expect("sid");
        let reset = Uuid::from_u128(0x00299570_246d_11d0_a768_00aa006e0529);
        SecurityDescriptor::new()
            .with_owner(sid::ADMINISTRATORS.clone())
            .with_dacl(vec![
                Ace::allow(sid::AUTHENTICATED_USERS.clone(), rights::GENERIC_READ),
                Ace::allow(user, rights::DS_CONTROL_ACCESS)
                    .with_object_type(reset)
                    .with_flags(ace_flags::INHERITED),
                Ace::deny(sid::EVERYONE.clone(), rights::DELETE),
            ])
    }

    #[test]
    fn encode_then_parse_preserves_entries() {
        let original = sample();
        let parsed = SecurityDescriptor::parse(&original.to_bytes()).expect("parse");
        assert_eq!(parsed.owner, original.owner);
        assert_eq!(parsed.dacl_entries(), original.dacl_entries());
        assert_eq!(parsed.dacl_entries()[1].ace_type, AceType::AccessAllowedObject);
        assert!(parsed.dacl_entries()[1].is_inherited());
    }

    #[test]
    fn protected_flag_detected() {
        let sd = sample().with_control(control::DACL_PROTECTED);
        let parsed = SecurityDescriptor::parse(&sd.to_bytes()).expect("parse");
        assert!(parsed.is_dacl_protected());
        assert!(!sample().is_dacl_protected());
    }

    #[test]
    fn truncated_input_rejected() {
        let bytes = sample().to_bytes();
        for cut in [0, 10, HEADER_LEN, bytes.len() - 3] {
            assert!(
                SecurityDescriptor::parse(&bytes[..cut]).is_err(),
                "cut at {cut} should fail"
            );
        }
    }

    #[test]
    fn lying_ace_size_rejected() {
        let mut bytes = sample().to_bytes();
        let dacl_offset = read_u32(&bytes, 16).expect("offset") as usize;
        // first ACE size field
        bytes[dacl_offset + ACL_HEADER_LEN + 2] = 0xFF;
        bytes[dacl_offset + ACL_HEADER_LEN + 3] = 0xFF;
        assert!(matches!(
            SecurityDescriptor::parse(&bytes),
            Err(GraphError::MalformedDescriptor(_))
        ));
    }

    #[test]
    fn absent_dacl_yields_no_entries() {
        let sd = SecurityDescriptor::new().with_owner(sid::LOCAL_SYSTEM.clone());
        let parsed = SecurityDescriptor::parse(&sd.to_bytes()).expect("parse");
        assert!(parsed.dacl.is_none());
        assert!(parsed.dacl_entries().is_empty());
    }

    #[test]
    fn unknown_ace_types_keep_their_slot() {
        let mut sd = sample();
        if let Some(dacl) = sd.dacl.as_mut() {
            dacl.entries.insert(
                0,
                Ace {
                    ace_type: AceType::Other(0x09),
                    ..Ace::allow(sid::EVERYONE.clone(), rights::GENERIC_ALL)
                },
            );
        }
        let parsed = SecurityDescriptor::parse(&sd.to_bytes()).expect("parse");
        assert_eq!(parsed.dacl_entries().len(), 4);
        assert_eq!(parsed.dacl_entries()[0].mask, 0);
    }
}
