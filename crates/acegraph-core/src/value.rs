//! # Attribute Values
//!
//! `AttributeValue` is the closed set of value kinds an attribute can hold.
//! `AttributeValues` is the insertion-ordered, duplicate-free sequence stored
//! per attribute on an object.

use crate::{GraphError, ObjectId, Sid};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Seconds between 1601-01-01 (FILETIME epoch) and 1970-01-01.
const FILETIME_UNIX_OFFSET: i64 = 11_644_473_600;

/// FILETIME ticks (100 ns) per second.
const FILETIME_TICKS_PER_SECOND: i64 = 10_000_000;

/// One typed attribute value.
///
/// Equality and ordering are structural. Use [`AttributeValue::index_key`]
/// for lookups, which folds string case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Bool(bool),
    Time(DateTime<Utc>),
    Sid(Sid),
    Guid(Uuid),
    /// Raw bytes. Security descriptors are stored in this form.
    Blob(Vec<u8>),
    /// Reference to another object without an edge.
    Object(ObjectId),
}

impl AttributeValue {
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Time from a Windows FILETIME (100 ns ticks since 1601).
    ///
    /// 0 and `i64::MAX` mean "never" in directory data and yield `None`.
    #[must_use]
    pub fn from_filetime(ticks: i64) -> Option<Self> {
        if ticks <= 0 || ticks == i64::MAX {
            return None;
        }
        let seconds = ticks / FILETIME_TICKS_PER_SECOND - FILETIME_UNIX_OFFSET;
        let nanos = (ticks % FILETIME_TICKS_PER_SECOND) * 100;
        DateTime::from_timestamp(seconds, nanos as u32).map(Self::Time)
    }

    /// Time from Unix seconds.
    #[must_use]
    pub fn from_unix(seconds: i64) -> Option<Self> {
        DateTime::from_timestamp(seconds, 0).map(Self::Time)
    }

    /// Time from LDAP generalized time, e.g. `20230115093000.0Z`.
    pub fn from_generalized_time(text: &str) -> Result<Self, GraphError> {
        let trimmed = text.trim();
        let parsed = NaiveDateTime::parse_from_str(trimmed, "%Y%m%d%H%M%S%.fZ")
            .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y%m%d%H%M%SZ"))
            .map_err(|e| GraphError::InvalidValue {
                attribute: "generalized time".to_string(),
                reason: format!("'{trimmed}': {e}"),
            })?;
        Ok(Self::Time(parsed.and_utc()))
    }

    /// GUID from the mixed-endian byte layout used by directory services.
    pub fn guid_from_directory_bytes(bytes: &[u8]) -> Result<Self, GraphError> {
        let raw: [u8; 16] = bytes.try_into().map_err(|_| GraphError::InvalidValue {
            attribute: "guid".to_string(),
            reason: format!("expected 16 bytes, got {}", bytes.len()),
        })?;
        Ok(Self::Guid(Uuid::from_bytes_le(raw)))
    }

    /// True for values that carry no information.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::String(s) => s.is_empty(),
            Self::Blob(b) => b.is_empty(),
            Self::Sid(s) => s.is_blank(),
            Self::Guid(g) => g.is_nil(),
            Self::Int(_) | Self::Bool(_) | Self::Time(_) | Self::Object(_) => false,
        }
    }

    /// Key used by the store's indexes. Strings compare case-insensitively.
    #[must_use]
    pub fn index_key(&self) -> Self {
        match self {
            Self::String(s) => Self::String(s.to_lowercase()),
            other => other.clone(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view. Strings holding decimal numbers are accepted, since
    /// collectors often deliver flags as text.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_sid(&self) -> Option<&Sid> {
        match self {
            Self::Sid(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_guid(&self) -> Option<Uuid> {
        match self {
            Self::Guid(g) => Some(*g),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Self::Object(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Time(t) => f.write_str(&t.to_rfc3339()),
            Self::Sid(s) => write!(f, "{s}"),
            Self::Guid(g) => write!(f, "{}", g.hyphenated()),
            Self::Blob(b) => f.write_str(&hex::encode(b)),
            Self::Object(id) => write!(f, "{id}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<Sid> for AttributeValue {
    fn from(s: Sid) -> Self {
        Self::Sid(s)
    }
}

impl From<Uuid> for AttributeValue {
    fn from(g: Uuid) -> Self {
        Self::Guid(g)
    }
}

impl From<ObjectId> for AttributeValue {
    fn from(id: ObjectId) -> Self {
        Self::Object(id)
    }
}

// =============================================================================
// VALUE SEQUENCES
// =============================================================================

/// Ordered, duplicate-free values of one attribute on one object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValues(Vec<AttributeValue>);

impl AttributeValues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append unless an equal value is already present. Returns true if added.
    pub fn push(&mut self, value: AttributeValue) -> bool {
        if self.0.contains(&value) {
            return false;
        }
        self.0.push(value);
        true
    }

    /// Union `other` into `self`, keeping first-seen order.
    pub fn union(&mut self, other: &Self) {
        for value in &other.0 {
            self.push(value.clone());
        }
    }

    #[must_use]
    pub fn first(&self) -> Option<&AttributeValue> {
        self.0.first()
    }

    #[must_use]
    pub fn contains(&self, value: &AttributeValue) -> bool {
        self.0.contains(value)
    }

    /// True when empty or when every value is blank.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(AttributeValue::is_blank)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AttributeValue> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[AttributeValue] {
        &self.0
    }
}

impl FromIterator<AttributeValue> for AttributeValues {
    fn from_iter<I: IntoIterator<Item = AttributeValue>>(iter: I) -> Self {
        let mut values = Self::new();
        for value in iter {
            values.push(value);
        }
        values
    }
}

impl<'a> IntoIterator for &'a AttributeValues {
    type Item = &'a AttributeValue;
    type IntoIter = std::slice::Iter<'a, AttributeValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for AttributeValues {
    type Item = AttributeValue;
    type IntoIter = std::vec::IntoIter<AttributeValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filetime_conversion() {
        // 2021-01-01T00:00:00Z
        let ticks = (1_609_459_200 + FILETIME_UNIX_OFFSET) * FILETIME_TICKS_PER_SECOND;
        let value = AttributeValue::from_filetime(ticks).expect("valid filetime");
        assert_eq!(value.to_string(), "2021-01-01T00:00:00+00:00");
        assert!(AttributeValue::from_filetime(0).is_none());
        assert!(AttributeValue::from_filetime(i64::MAX).is_none());
    }

    #[test]
    fn generalized_time_parses() {
        let value = AttributeValue::from_generalized_time("20230115093000.0Z").expect("parse");
        assert_eq!(value, AttributeValue::from_unix(1_673_775_000).expect("unix"));
        assert!(AttributeValue::from_generalized_time("yesterday").is_err());
    }

    #[test]
    fn directory_guid_layout() {
        let bytes = [
            0x70, 0x95, 0x29, 0x00, 0x6d, 0x24, 0xd0, 0x11, 0xa7, 0x68, 0x00, 0xaa, 0x00, 0x6e,
            0x05, 0x29,
        ];
        let value = AttributeValue::guid_from_directory_bytes(&bytes).expect("guid");
        assert_eq!(value.to_string(), "00299570-246d-11d0-a768-00aa006e0529");
    }

    #[test]
    fn blank_values() {
        assert!(AttributeValue::string("").is_blank());
        assert!(AttributeValue::Guid(Uuid::nil()).is_blank());
        assert!(AttributeValue::Sid(Sid::default()).is_blank());
        assert!(!AttributeValue::Int(0).is_blank());
    }

    #[test]
    fn index_key_folds_case() {
        assert_eq!(
            AttributeValue::string("CN=Admin,DC=Corp").index_key(),
            AttributeValue::string("cn=admin,dc=corp").index_key()
        );
    }

    #[test]
    fn values_deduplicate_and_keep_order() {
        let mut values: AttributeValues = ["b", "a", "b"].into_iter().map(AttributeValue::from).collect();
        assert_eq!(values.len(), 2);
        values.union(&["c", "a"].into_iter().map(AttributeValue::from).collect());
        let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["b", "a", "c"]);
    }

    #[test]
    fn string_ints_are_readable() {
        assert_eq!(AttributeValue::string("66048").as_int(), Some(66048));
        assert_eq!(AttributeValue::string("x").as_int(), None);
    }
}
