//! # Attribute Registry
//!
//! Attributes are registered once at startup through a chainable definition:
//!
//! ```
//! # use acegraph_core::{AttributeType, Schema};
//! let schema = Schema::new();
//! let upn = schema
//!     .attributes()
//!     .define("userPrincipalName")
//!     .single()
//!     .kind(AttributeType::String)
//!     .description("Kerberos style logon name")
//!     .register()
//!     .expect("register");
//! assert_eq!(schema.attributes().lookup("USERPRINCIPALNAME"), Some(upn));
//! ```
//!
//! Names are case-insensitive. The registry is append-only: handles stay valid
//! for the life of the schema. Registration takes the write lock, lookups take
//! the read lock and never wait on each other during analysis since nothing
//! registers after startup.

use crate::{Attribute, AttributeValue, GraphError, Sid};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Encoding of time values delivered as integers or text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeEncoding {
    /// Windows FILETIME: 100 ns ticks since 1601.
    #[default]
    FileTime,
    /// Seconds since 1970.
    Unix,
    /// LDAP generalized time text.
    Generalized,
}

/// Declared value kind of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributeType {
    #[default]
    String,
    Int,
    Time(TimeEncoding),
    Sid,
    Guid,
    SecurityDescriptor,
    ObjectReference,
}

/// Everything the registry knows about one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttributeInfo {
    pub name: String,
    pub description: String,
    pub kind: AttributeType,
    pub unique: bool,
    pub single: bool,
    pub merge: bool,
    pub tags: Vec<String>,
}

impl AttributeInfo {
    /// Convert a raw collected value to the declared kind.
    ///
    /// Values already of the right kind pass through. Conversion failures
    /// are parse errors local to the object being loaded.
    pub fn coerce(&self, value: AttributeValue) -> Result<AttributeValue, GraphError> {
        let invalid = |reason: String| GraphError::InvalidValue {
            attribute: self.name.clone(),
            reason,
        };

        match (self.kind, value) {
            (AttributeType::Sid, AttributeValue::Blob(bytes)) => {
                Ok(AttributeValue::Sid(Sid::from_bytes(&bytes)?))
            }
            (AttributeType::Sid, AttributeValue::String(text)) => {
                Ok(AttributeValue::Sid(text.parse()?))
            }
            (AttributeType::Guid, AttributeValue::Blob(bytes)) => {
                AttributeValue::guid_from_directory_bytes(&bytes)
            }
            (AttributeType::Guid, AttributeValue::String(text)) => uuid::Uuid::parse_str(&text)
                .map(AttributeValue::Guid)
                .map_err(|e| invalid(e.to_string())),
            (AttributeType::Int, AttributeValue::String(text)) => text
                .trim()
                .parse()
                .map(AttributeValue::Int)
                .map_err(|_| invalid(format!("'{text}' is not an integer"))),
            (AttributeType::Time(encoding), AttributeValue::Int(raw)) => {
                let converted = match encoding {
                    TimeEncoding::Unix => AttributeValue::from_unix(raw),
                    TimeEncoding::FileTime | TimeEncoding::Generalized => {
                        AttributeValue::from_filetime(raw)
                    }
                };
                // "never" timestamps are kept as the raw integer
                Ok(converted.unwrap_or(AttributeValue::Int(raw)))
            }
            (AttributeType::Time(TimeEncoding::Generalized), AttributeValue::String(text)) => {
                AttributeValue::from_generalized_time(&text)
            }
            (AttributeType::Time(encoding), AttributeValue::String(text)) => {
                match text.trim().parse::<i64>() {
                    Ok(raw) => self.coerce(AttributeValue::Int(raw)),
                    Err(_) if encoding == TimeEncoding::FileTime => {
                        AttributeValue::from_generalized_time(&text)
                    }
                    Err(_) => Err(invalid(format!("'{text}' is not a timestamp"))),
                }
            }
            (_, value) => Ok(value),
        }
    }
}

// =============================================================================
// DEFINITION BUILDER
// =============================================================================

/// Chainable attribute definition, finished by [`AttributeDefinition::register`].
#[must_use = "an attribute definition does nothing until registered"]
pub struct AttributeDefinition<'r> {
    registry: &'r AttributeRegistry,
    info: AttributeInfo,
}

impl AttributeDefinition<'_> {
    /// Free-form classification, e.g. "AD". Repeatable.
    pub fn tag(mut self, tag: &str) -> Self {
        if !self.info.tags.iter().any(|t| t == tag) {
            self.info.tags.push(tag.to_string());
        }
        self
    }

    /// No two objects may hold the same value.
    pub fn unique(mut self) -> Self {
        self.info.unique = true;
        self
    }

    /// At most one value.
    pub fn single(mut self) -> Self {
        self.info.single = true;
        self
    }

    /// Union values when merging objects.
    pub fn merge(mut self) -> Self {
        self.info.merge = true;
        self
    }

    pub fn kind(mut self, kind: AttributeType) -> Self {
        self.info.kind = kind;
        self
    }

    pub fn description(mut self, text: &str) -> Self {
        self.info.description = text.to_string();
        self
    }

    /// Register the definition.
    ///
    /// Registering an identical definition again returns the existing handle.
    /// A conflicting definition under the same name is a configuration error.
    pub fn register(self) -> Result<Attribute, GraphError> {
        self.registry.insert(self.info)
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Default)]
struct AttributeTable {
    infos: Vec<Arc<AttributeInfo>>,
    by_name: BTreeMap<String, Attribute>,
}

/// Append-only table of attribute definitions.
#[derive(Default)]
pub struct AttributeRegistry {
    table: RwLock<AttributeTable>,
}

impl AttributeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a definition for `name`.
    pub fn define(&self, name: &str) -> AttributeDefinition<'_> {
        AttributeDefinition {
            registry: self,
            info: AttributeInfo {
                name: name.to_string(),
                ..AttributeInfo::default()
            },
        }
    }

    fn insert(&self, info: AttributeInfo) -> Result<Attribute, GraphError> {
        let key = info.name.to_lowercase();
        let mut table = self.table.write();

        if let Some(existing) = table.by_name.get(&key).copied() {
            let current = &table.infos[existing.index()];
            let candidate = AttributeInfo {
                name: current.name.clone(),
                ..info.clone()
            };
            if **current == candidate {
                return Ok(existing);
            }
            return Err(GraphError::DuplicateRegistration {
                kind: "attribute",
                name: info.name,
            });
        }

        let index = u16::try_from(table.infos.len()).map_err(|_| {
            GraphError::ConfigError(format!("attribute registry full at '{}'", info.name))
        })?;
        let handle = Attribute(index);
        tracing::trace!(name = %info.name, index, "registered attribute");
        table.infos.push(Arc::new(info));
        table.by_name.insert(key, handle);
        Ok(handle)
    }

    /// Append a definition on a registry known not to contain its name.
    pub(crate) fn insert_fresh(&self, info: AttributeInfo) -> Attribute {
        let mut table = self.table.write();
        let handle = Attribute(table.infos.len() as u16);
        table.by_name.insert(info.name.to_lowercase(), handle);
        table.infos.push(Arc::new(info));
        handle
    }

    /// Handle for a name, case-insensitively.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Attribute> {
        self.table.read().by_name.get(&name.to_lowercase()).copied()
    }

    /// Look up `name`, registering a plain multi-valued string attribute if
    /// it is not known yet. Used for attributes collectors deliver that no
    /// catalogue declared.
    pub fn lookup_or_register(&self, name: &str) -> Result<Attribute, GraphError> {
        match self.lookup(name) {
            Some(attribute) => Ok(attribute),
            None => self.define(name).register(),
        }
    }

    #[must_use]
    pub fn info(&self, attribute: Attribute) -> Option<Arc<AttributeInfo>> {
        self.table.read().infos.get(attribute.index()).cloned()
    }

    /// Registered name, or `#index` for a foreign handle.
    #[must_use]
    pub fn name(&self, attribute: Attribute) -> String {
        self.info(attribute)
            .map(|info| info.name.clone())
            .unwrap_or_else(|| format!("#{}", attribute.index()))
    }

    #[must_use]
    pub fn is_unique(&self, attribute: Attribute) -> bool {
        self.info(attribute).is_some_and(|info| info.unique)
    }

    #[must_use]
    pub fn is_single(&self, attribute: Attribute) -> bool {
        self.info(attribute).is_some_and(|info| info.single)
    }

    /// All unique attributes in registration order.
    #[must_use]
    pub fn unique_attributes(&self) -> Vec<Attribute> {
        let table = self.table.read();
        table
            .infos
            .iter()
            .enumerate()
            .filter(|(_, info)| info.unique)
            .map(|(index, _)| Attribute(index as u16))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().infos.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
