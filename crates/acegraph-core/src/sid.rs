//! # Security Identifiers
//!
//! Binary and string forms of Windows SIDs (MS-DTYP 2.4.2), plus the table of
//! well-known principals the analysis expects to find.
//!
//! Binary layout:
//! - 1 byte: revision (always 1)
//! - 1 byte: sub-authority count (at most 15)
//! - 6 bytes: identifier authority, big-endian
//! - 4 bytes per sub-authority, little-endian

use crate::{GraphError, primitives::MAX_SUB_AUTHORITIES};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// A parsed security identifier.
///
/// The default value is the blank SID (no authority, no sub-authorities),
/// used for "absent".
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Sid {
    authority: u64,
    sub_authorities: Vec<u32>,
}

impl Sid {
    /// Build a SID from its authority and sub-authorities.
    #[must_use]
    pub fn from_parts(authority: u64, sub_authorities: &[u32]) -> Self {
        Self {
            authority: authority & 0xFFFF_FFFF_FFFF,
            sub_authorities: sub_authorities.to_vec(),
        }
    }

    /// Parse a binary SID from the start of `bytes`.
    ///
    /// Returns the SID and the number of bytes consumed, so callers embedded in
    /// larger structures (ACEs) can continue after it.
    pub fn parse_prefix(bytes: &[u8]) -> Result<(Self, usize), GraphError> {
        if bytes.len() < 8 {
            return Err(GraphError::MalformedSid(format!(
                "need at least 8 bytes, got {}",
                bytes.len()
            )));
        }
        if bytes[0] != 1 {
            return Err(GraphError::MalformedSid(format!(
                "unsupported revision {}",
                bytes[0]
            )));
        }
        let count = bytes[1] as usize;
        if count > MAX_SUB_AUTHORITIES {
            return Err(GraphError::MalformedSid(format!(
                "{count} sub-authorities exceeds {MAX_SUB_AUTHORITIES}"
            )));
        }
        let length = 8 + count * 4;
        if bytes.len() < length {
            return Err(GraphError::MalformedSid(format!(
                "truncated: need {length} bytes, got {}",
                bytes.len()
            )));
        }

        let authority = bytes[2..8]
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
        let sub_authorities = bytes[8..length]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok((
            Self {
                authority,
                sub_authorities,
            },
            length,
        ))
    }

    /// Parse a binary SID that must span all of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GraphError> {
        let (sid, used) = Self::parse_prefix(bytes)?;
        if used != bytes.len() {
            return Err(GraphError::MalformedSid(format!(
                "{} trailing bytes",
                bytes.len() - used
            )));
        }
        Ok(sid)
    }

    /// Binary encoding.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.binary_len());
        out.push(1);
        out.push(self.sub_authorities.len() as u8);
        out.extend_from_slice(&self.authority.to_be_bytes()[2..8]);
        for sub in &self.sub_authorities {
            out.extend_from_slice(&sub.to_le_bytes());
        }
        out
    }

    /// Length of the binary encoding.
    #[must_use]
    pub fn binary_len(&self) -> usize {
        8 + self.sub_authorities.len() * 4
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.authority == 0 && self.sub_authorities.is_empty()
    }

    #[must_use]
    pub fn authority(&self) -> u64 {
        self.authority
    }

    /// Sub-authorities in order.
    #[must_use]
    pub fn components(&self) -> &[u32] {
        &self.sub_authorities
    }

    /// Sub-authority at `index`.
    #[must_use]
    pub fn component(&self, index: usize) -> Option<u32> {
        self.sub_authorities.get(index).copied()
    }

    /// The relative identifier (last sub-authority).
    #[must_use]
    pub fn rid(&self) -> Option<u32> {
        self.sub_authorities.last().copied()
    }

    /// The SID without its RID: for account SIDs, the domain SID.
    #[must_use]
    pub fn strip_rid(&self) -> Self {
        let mut sub_authorities = self.sub_authorities.clone();
        sub_authorities.pop();
        Self {
            authority: self.authority,
            sub_authorities,
        }
    }

    /// Append a sub-authority, e.g. a RID to a domain SID.
    #[must_use]
    pub fn add_component(&self, rid: u32) -> Self {
        let mut sub_authorities = self.sub_authorities.clone();
        sub_authorities.push(rid);
        Self {
            authority: self.authority,
            sub_authorities,
        }
    }

    /// True for SIDs issued by a domain: S-1-5-21-x-y-z[-rid].
    #[must_use]
    pub fn is_domain_issued(&self) -> bool {
        self.authority == 5 && self.component(0) == Some(21) && self.sub_authorities.len() >= 4
    }

    /// Display name if this is a well-known principal.
    #[must_use]
    pub fn well_known_name(&self) -> Option<&'static str> {
        let text = self.to_string();
        WELL_KNOWN
            .iter()
            .find(|(sid, _)| *sid == text)
            .map(|(_, name)| *name)
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_blank() {
            return Ok(());
        }
        if self.authority < (1 << 32) {
            write!(f, "S-1-{}", self.authority)?;
        } else {
            write!(f, "S-1-0x{:012X}", self.authority)?;
        }
        for sub in &self.sub_authorities {
            write!(f, "-{sub}")?;
        }
        Ok(())
    }
}

impl FromStr for Sid {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || GraphError::MalformedSid(s.to_string());
        let mut parts = s.trim().split('-');

        match (parts.next(), parts.next()) {
            (Some(prefix), Some("1")) if prefix.eq_ignore_ascii_case("s") => {}
            _ => return Err(malformed()),
        }

        let authority_text = parts.next().ok_or_else(malformed)?;
        let authority = match authority_text
            .strip_prefix("0x")
            .or_else(|| authority_text.strip_prefix("0X"))
        {
            Some(hex) => u64::from_str_radix(hex, 16).map_err(|_| malformed())?,
            None => authority_text.parse::<u64>().map_err(|_| malformed())?,
        };
        if authority > 0xFFFF_FFFF_FFFF {
            return Err(malformed());
        }

        let sub_authorities = parts
            .map(|p| p.parse::<u32>().map_err(|_| malformed()))
            .collect::<Result<Vec<_>, _>>()?;
        if sub_authorities.len() > MAX_SUB_AUTHORITIES {
            return Err(malformed());
        }

        Ok(Self {
            authority,
            sub_authorities,
        })
    }
}

// =============================================================================
// WELL-KNOWN PRINCIPALS
// =============================================================================

/// Well-known SIDs and their display names.
pub const WELL_KNOWN: &[(&str, &str)] = &[
    ("S-1-0-0", "Null SID"),
    ("S-1-1-0", "Everyone"),
    ("S-1-2-0", "Local"),
    ("S-1-3-0", "Creator Owner"),
    ("S-1-3-1", "Creator Group"),
    ("S-1-3-4", "Owner Rights"),
    ("S-1-5-2", "Network"),
    ("S-1-5-4", "Interactive"),
    ("S-1-5-7", "Anonymous Logon"),
    ("S-1-5-9", "Enterprise Domain Controllers"),
    ("S-1-5-10", "Principal Self"),
    ("S-1-5-11", "Authenticated Users"),
    ("S-1-5-18", "Local System"),
    ("S-1-5-19", "Local Service"),
    ("S-1-5-20", "Network Service"),
    ("S-1-5-32-544", "Administrators"),
    ("S-1-5-32-545", "Users"),
    ("S-1-5-32-546", "Guests"),
    ("S-1-5-32-548", "Account Operators"),
    ("S-1-5-32-549", "Server Operators"),
    ("S-1-5-32-550", "Print Operators"),
    ("S-1-5-32-551", "Backup Operators"),
    ("S-1-5-32-555", "Remote Desktop Users"),
    ("S-1-5-32-562", "Distributed COM Users"),
];

pub static EVERYONE: LazyLock<Sid> = LazyLock::new(|| Sid::from_parts(1, &[0]));
pub static CREATOR_OWNER: LazyLock<Sid> = LazyLock::new(|| Sid::from_parts(3, &[0]));
pub static OWNER_RIGHTS: LazyLock<Sid> = LazyLock::new(|| Sid::from_parts(3, &[4]));
pub static ANONYMOUS_LOGON: LazyLock<Sid> = LazyLock::new(|| Sid::from_parts(5, &[7]));
pub static ENTERPRISE_DOMAIN_CONTROLLERS: LazyLock<Sid> =
    LazyLock::new(|| Sid::from_parts(5, &[9]));
pub static PRINCIPAL_SELF: LazyLock<Sid> = LazyLock::new(|| Sid::from_parts(5, &[10]));
pub static AUTHENTICATED_USERS: LazyLock<Sid> = LazyLock::new(|| Sid::from_parts(5, &[11]));
pub static LOCAL_SYSTEM: LazyLock<Sid> = LazyLock::new(|| Sid::from_parts(5, &[18]));
pub static ADMINISTRATORS: LazyLock<Sid> = LazyLock::new(|| Sid::from_parts(5, &[32, 544]));

/// Domain-relative RIDs used by the analysis.
pub mod rid {
    pub const DOMAIN_ADMINS: u32 = 512;
    pub const DOMAIN_USERS: u32 = 513;
    pub const DOMAIN_COMPUTERS: u32 = 515;
    pub const DOMAIN_CONTROLLERS: u32 = 516;
    pub const ENTERPRISE_ADMINS: u32 = 519;
    pub const PROTECTED_USERS: u32 = 525;
}
