//! # Schema
//!
//! The registry service every store and object is created from. It owns:
//! - the attribute registry, with the core attributes pre-registered
//! - the edge registry
//! - the merge approvers
//! - the object identifier counter
//!
//! A schema is built at startup, filled by catalogue registration, and then
//! shared read-only as `Arc<Schema>`. Nothing registers once analysis starts.

use crate::attribute::{AttributeInfo, AttributeRegistry, AttributeType};
use crate::edge::EdgeRegistry;
use crate::merge::MergeApprovers;
use crate::{Attribute, ObjectId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Attributes the engine itself reads.
#[derive(Debug, Clone, Copy)]
pub struct CoreAttributes {
    pub distinguished_name: Attribute,
    pub object_sid: Attribute,
    pub object_guid: Attribute,
    pub security_descriptor: Attribute,
    pub name: Attribute,
    pub display_name: Attribute,
    pub description: Attribute,
    pub object_class: Attribute,
    pub object_category: Attribute,
    pub object_type: Attribute,
    pub data_source: Attribute,
    pub domain_context: Attribute,
    pub down_level_logon_name: Attribute,
    pub sam_account_name: Attribute,
}

impl CoreAttributes {
    fn register(registry: &AttributeRegistry) -> Self {
        let add = |name: &str, kind: AttributeType, unique: bool, single: bool, merge: bool| {
            registry.insert_fresh(AttributeInfo {
                name: name.to_string(),
                kind,
                unique,
                single,
                merge,
                tags: vec!["core".to_string()],
                ..AttributeInfo::default()
            })
        };

        Self {
            distinguished_name: add("distinguishedName", AttributeType::String, true, true, false),
            object_sid: add("objectSid", AttributeType::Sid, false, true, true),
            object_guid: add("objectGUID", AttributeType::Guid, true, true, false),
            security_descriptor: add(
                "nTSecurityDescriptor",
                AttributeType::SecurityDescriptor,
                false,
                true,
                false,
            ),
            name: add("name", AttributeType::String, false, true, false),
            display_name: add("displayName", AttributeType::String, false, true, false),
            description: add("description", AttributeType::String, false, false, true),
            object_class: add("objectClass", AttributeType::String, false, false, true),
            object_category: add("objectCategory", AttributeType::String, false, true, false),
            object_type: add("type", AttributeType::String, false, true, false),
            data_source: add("dataSource", AttributeType::String, false, true, false),
            domain_context: add("domainContext", AttributeType::String, false, true, false),
            down_level_logon_name: add(
                "downLevelLogonName",
                AttributeType::String,
                false,
                true,
                false,
            ),
            sam_account_name: add("sAMAccountName", AttributeType::String, false, true, false),
        }
    }
}

/// Registries plus identifier allocation.
pub struct Schema {
    attributes: AttributeRegistry,
    edges: EdgeRegistry,
    approvers: MergeApprovers,
    core: CoreAttributes,
    next_id: AtomicU64,
}

impl Schema {
    /// Fresh schema with only the core attributes registered.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let attributes = AttributeRegistry::new();
        let core = CoreAttributes::register(&attributes);
        Arc::new(Self {
            attributes,
            edges: EdgeRegistry::new(),
            approvers: MergeApprovers::new(),
            core,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn attributes(&self) -> &AttributeRegistry {
        &self.attributes
    }

    pub fn edges(&self) -> &EdgeRegistry {
        &self.edges
    }

    pub fn approvers(&self) -> &MergeApprovers {
        &self.approvers
    }

    pub fn core(&self) -> &CoreAttributes {
        &self.core
    }

    /// Next unused object identifier.
    pub(crate) fn next_object_id(&self) -> ObjectId {
        ObjectId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_attributes_are_registered() {
        let schema = Schema::new();
        let core = schema.core();
        assert_eq!(schema.attributes().lookup("DistinguishedName"), Some(core.distinguished_name));
        assert!(schema.attributes().is_unique(core.distinguished_name));
        assert!(schema.attributes().is_single(core.object_sid));
        assert_eq!(schema.attributes().lookup("type"), Some(core.object_type));
    }

    #[test]
    fn object_ids_are_unique() {
        let schema = Schema::new();
        let a = schema.next_object_id();
        let b = schema.next_object_id();
        assert_ne!(a, b);
    }
}
