//! # Core Type Definitions
//!
//! Identifiers and the crate-wide error type:
//! - Object identifiers (`ObjectId`)
//! - Registry handles (`Attribute`, `Edge`)
//! - Error taxonomy (`GraphError`)
//!
//! ## Ordering Guarantees
//!
//! Every identifier implements `Ord` so that object tables and indexes can live
//! in `BTreeMap`/`BTreeSet` and iterate in a stable order.

use crate::primitives::EDGE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Internal identifier of an object (graph node).
///
/// Identifiers are handed out by the schema's counter, so they stay unique
/// across every store created from the same schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle of a registered attribute: its stable index in the attribute registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Attribute(pub(crate) u16);

impl Attribute {
    /// Position of this attribute in the registry.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle of a registered edge type: its bit position in an `EdgeBitmap`.
///
/// Deserialized handles are checked against the bitmap width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Edge(pub(crate) u16);

impl Edge {
    /// Bit position of this edge type.
    #[must_use]
    pub const fn bit(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<u16> for Edge {
    type Error = GraphError;

    fn try_from(bit: u16) -> Result<Self, Self::Error> {
        if usize::from(bit) < EDGE_CAPACITY {
            Ok(Self(bit))
        } else {
            Err(GraphError::SerializationError(format!(
                "edge bit {bit} outside bitmap of {EDGE_CAPACITY}"
            )))
        }
    }
}

impl From<Edge> for u16 {
    fn from(edge: Edge) -> Self {
        edge.0
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in engine operations.
///
/// Configuration errors and missing prerequisites are fatal for a run.
/// Parse failures are local to one object: processors log and skip them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A name was registered twice with conflicting definitions.
    #[error("Duplicate registration of {kind} '{name}'")]
    DuplicateRegistration { kind: &'static str, name: String },

    /// The fixed-width edge bitmap has no free slot left.
    #[error("Edge registry full: cannot register '{name}' (capacity {capacity})")]
    EdgeCapacityExceeded { name: String, capacity: usize },

    /// Two objects would share a value of a unique attribute.
    #[error("Unique attribute '{attribute}' value '{value}' already held by {holder}")]
    UniqueViolation {
        attribute: String,
        value: String,
        holder: ObjectId,
    },

    /// Unique attributes of stored objects must be changed through the store.
    #[error("Attribute '{0}' is unique; change it through the object store")]
    UniqueRequiresStore(String),

    /// A merge approver vetoed combining two objects.
    #[error("Merge refused: {0}")]
    DontMerge(String),

    /// SID bytes or text could not be parsed.
    #[error("Malformed SID: {0}")]
    MalformedSid(String),

    /// Security descriptor bytes could not be parsed.
    #[error("Malformed security descriptor: {0}")]
    MalformedDescriptor(String),

    /// A value of the wrong shape was supplied for an attribute.
    #[error("Invalid value for '{attribute}': {reason}")]
    InvalidValue { attribute: String, reason: String },

    /// A well-known object or schema element a processor depends on is absent.
    #[error("Missing prerequisite: {0}")]
    MissingPrerequisite(String),

    /// Unknown processor priority name.
    #[error("Unknown processor priority '{0}'")]
    UnknownPriority(String),

    /// Object identifier not present in the store.
    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// Dataset header refused by the compatibility check.
    #[error("Unsupported dataset: {0}")]
    UnsupportedDataset(String),

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// I/O error (used by the binary).
    #[error("IO error: {0}")]
    IoError(String),

    /// Configuration file could not be used.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl GraphError {
    /// True for the merge veto sentinel.
    #[must_use]
    pub fn is_dont_merge(&self) -> bool {
        matches!(self, Self::DontMerge(_))
    }
}
