//! # Objects
//!
//! An `Object` is one graph node: attribute values, tags, adjacency in both
//! directions, an optional parent, and a cached parsed security descriptor.
//!
//! ## Locking
//!
//! Attribute data, outgoing edges and incoming edges sit behind three
//! separate locks. Adding an edge writes the source's outgoing map and then
//! the target's incoming map, never holding both, so parallel workers adding
//! edges towards the same third object cannot deadlock.

use crate::edge::EdgeBitmap;
use crate::security::SecurityDescriptor;
use crate::store::IndexJournal;
use crate::{Attribute, AttributeValue, AttributeValues, Edge, GraphError, ObjectId, Schema, Sid};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// =============================================================================
// OBJECT TYPES
// =============================================================================

/// Simple classification of an object, stored in the `type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ObjectType {
    #[default]
    Other,
    User,
    Group,
    Computer,
    /// The running operating system of a computer account.
    Machine,
    ForeignSecurityPrincipal,
    DomainDns,
    Container,
    OrganizationalUnit,
    GroupPolicyContainer,
    ManagedServiceAccount,
    GroupManagedServiceAccount,
    CertificateTemplate,
    PkiEnrollmentService,
    Trust,
    AttributeSchema,
    ClassSchema,
    CallableServicePoint,
}

impl ObjectType {
    const ALL: [Self; 18] = [
        Self::Other,
        Self::User,
        Self::Group,
        Self::Computer,
        Self::Machine,
        Self::ForeignSecurityPrincipal,
        Self::DomainDns,
        Self::Container,
        Self::OrganizationalUnit,
        Self::GroupPolicyContainer,
        Self::ManagedServiceAccount,
        Self::GroupManagedServiceAccount,
        Self::CertificateTemplate,
        Self::PkiEnrollmentService,
        Self::Trust,
        Self::AttributeSchema,
        Self::ClassSchema,
        Self::CallableServicePoint,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Other => "Other",
            Self::User => "User",
            Self::Group => "Group",
            Self::Computer => "Computer",
            Self::Machine => "Machine",
            Self::ForeignSecurityPrincipal => "ForeignSecurityPrincipal",
            Self::DomainDns => "DomainDNS",
            Self::Container => "Container",
            Self::OrganizationalUnit => "OrganizationalUnit",
            Self::GroupPolicyContainer => "GroupPolicyContainer",
            Self::ManagedServiceAccount => "ManagedServiceAccount",
            Self::GroupManagedServiceAccount => "GroupManagedServiceAccount",
            Self::CertificateTemplate => "CertificateTemplate",
            Self::PkiEnrollmentService => "PKIEnrollmentService",
            Self::Trust => "Trust",
            Self::AttributeSchema => "AttributeSchema",
            Self::ClassSchema => "ClassSchema",
            Self::CallableServicePoint => "CallableServicePoint",
        }
    }

    /// Value to store in the `type` attribute.
    #[must_use]
    pub fn value(self) -> AttributeValue {
        AttributeValue::string(self.as_str())
    }

    /// Derive the type from an objectClass list. The most specific class is
    /// last, so the list is scanned from the end.
    #[must_use]
    pub fn from_object_classes<S: AsRef<str>>(classes: &[S]) -> Self {
        classes
            .iter()
            .rev()
            .find_map(|class| Self::from_object_class(class.as_ref()))
            .unwrap_or(Self::Other)
    }

    fn from_object_class(class: &str) -> Option<Self> {
        let class = class.to_ascii_lowercase();
        Some(match class.as_str() {
            "user" | "inetorgperson" => Self::User,
            "group" => Self::Group,
            "computer" => Self::Computer,
            "foreignsecurityprincipal" => Self::ForeignSecurityPrincipal,
            "domaindns" => Self::DomainDns,
            "container" | "builtindomain" => Self::Container,
            "organizationalunit" => Self::OrganizationalUnit,
            "grouppolicycontainer" => Self::GroupPolicyContainer,
            "msds-managedserviceaccount" => Self::ManagedServiceAccount,
            "msds-groupmanagedserviceaccount" => Self::GroupManagedServiceAccount,
            "pkicertificatetemplate" => Self::CertificateTemplate,
            "pkienrollmentservice" => Self::PkiEnrollmentService,
            "trusteddomain" => Self::Trust,
            "attributeschema" => Self::AttributeSchema,
            "classschema" => Self::ClassSchema,
            _ => return None,
        })
    }

    /// Principals that can authenticate and hold rights.
    #[must_use]
    pub fn is_principal(self) -> bool {
        matches!(
            self,
            Self::User
                | Self::Group
                | Self::Computer
                | Self::ForeignSecurityPrincipal
                | Self::ManagedServiceAccount
                | Self::GroupManagedServiceAccount
        )
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| GraphError::InvalidValue {
                attribute: "type".to_string(),
                reason: format!("unknown object type '{s}'"),
            })
    }
}

/// Which adjacency map to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Out,
    In,
    /// Both directions, bitmaps for the same neighbour combined.
    Any,
}

// =============================================================================
// OBJECT
// =============================================================================

#[derive(Default)]
struct ObjectData {
    values: BTreeMap<Attribute, AttributeValues>,
    tags: BTreeSet<String>,
    parent: Option<ObjectId>,
    children: BTreeSet<ObjectId>,
    descriptor: Option<Arc<SecurityDescriptor>>,
}

/// One graph node.
pub struct Object {
    id: ObjectId,
    schema: Arc<Schema>,
    data: RwLock<ObjectData>,
    edges_out: RwLock<BTreeMap<ObjectId, EdgeBitmap>>,
    edges_in: RwLock<BTreeMap<ObjectId, EdgeBitmap>>,
    journal: RwLock<Option<Arc<IndexJournal>>>,
}

impl Object {
    /// Empty object with a fresh identifier.
    #[must_use]
    pub fn new(schema: &Arc<Schema>) -> Self {
        Self {
            id: schema.next_object_id(),
            schema: Arc::clone(schema),
            data: RwLock::new(ObjectData::default()),
            edges_out: RwLock::new(BTreeMap::new()),
            edges_in: RwLock::new(BTreeMap::new()),
            journal: RwLock::new(None),
        }
    }

    /// Object holding the given values. Blank values are skipped.
    #[must_use]
    pub fn with_values(
        schema: &Arc<Schema>,
        values: impl IntoIterator<Item = (Attribute, AttributeValue)>,
    ) -> Self {
        let object = Self::new(schema);
        {
            let mut data = object.data.write();
            for (attribute, value) in values {
                if !value.is_blank() {
                    object.push_value(&mut data, attribute, value);
                }
            }
        }
        object
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    // =========================================================================
    // ATTRIBUTES
    // =========================================================================

    /// All values of an attribute.
    #[must_use]
    pub fn get(&self, attribute: Attribute) -> Option<AttributeValues> {
        self.data.read().values.get(&attribute).cloned()
    }

    #[must_use]
    pub fn first(&self, attribute: Attribute) -> Option<AttributeValue> {
        self.data
            .read()
            .values
            .get(&attribute)
            .and_then(|v| v.first().cloned())
    }

    /// First value rendered as text.
    #[must_use]
    pub fn first_string(&self, attribute: Attribute) -> Option<String> {
        self.first(attribute).map(|v| v.to_string())
    }

    #[must_use]
    pub fn first_int(&self, attribute: Attribute) -> Option<i64> {
        self.first(attribute).and_then(|v| v.as_int())
    }

    /// True if the attribute holds at least one non-blank value.
    #[must_use]
    pub fn has(&self, attribute: Attribute) -> bool {
        self.data
            .read()
            .values
            .get(&attribute)
            .is_some_and(|v| !v.is_blank())
    }

    /// True if the attribute holds `value`, comparing index keys.
    #[must_use]
    pub fn has_value(&self, attribute: Attribute, value: &AttributeValue) -> bool {
        let key = value.index_key();
        self.data
            .read()
            .values
            .get(&attribute)
            .is_some_and(|v| v.iter().any(|held| held.index_key() == key))
    }

    /// Attributes with values, in registry order.
    #[must_use]
    pub fn attributes(&self) -> Vec<Attribute> {
        self.data.read().values.keys().copied().collect()
    }

    /// Snapshot of every attribute and its values.
    #[must_use]
    pub fn values(&self) -> Vec<(Attribute, AttributeValues)> {
        self.data
            .read()
            .values
            .iter()
            .map(|(a, v)| (*a, v.clone()))
            .collect()
    }

    /// Replace all values of an attribute.
    ///
    /// Unique attributes of an object that lives in a store must be changed
    /// with `Objects::set`, which keeps the unique index consistent.
    pub fn set(
        &self,
        attribute: Attribute,
        values: impl IntoIterator<Item = AttributeValue>,
    ) -> Result<(), GraphError> {
        self.guard_unique(attribute)?;
        self.replace_values(attribute, values.into_iter().collect());
        Ok(())
    }

    /// Add one value. Single-valued attributes are overwritten.
    pub fn add(&self, attribute: Attribute, value: AttributeValue) -> Result<(), GraphError> {
        self.guard_unique(attribute)?;
        if value.is_blank() {
            return Ok(());
        }
        {
            let mut data = self.data.write();
            self.push_value(&mut data, attribute, value);
        }
        self.notify(attribute);
        Ok(())
    }

    /// Add several values.
    pub fn add_all(
        &self,
        attribute: Attribute,
        values: impl IntoIterator<Item = AttributeValue>,
    ) -> Result<(), GraphError> {
        self.guard_unique(attribute)?;
        {
            let mut data = self.data.write();
            for value in values.into_iter().filter(|v| !v.is_blank()) {
                self.push_value(&mut data, attribute, value);
            }
        }
        self.notify(attribute);
        Ok(())
    }

    /// Remove all values of an attribute.
    pub fn clear(&self, attribute: Attribute) -> Result<(), GraphError> {
        self.set(attribute, std::iter::empty())
    }

    fn guard_unique(&self, attribute: Attribute) -> Result<(), GraphError> {
        if self.is_attached() && self.schema.attributes().is_unique(attribute) {
            return Err(GraphError::UniqueRequiresStore(
                self.schema.attributes().name(attribute),
            ));
        }
        Ok(())
    }

    fn push_value(&self, data: &mut ObjectData, attribute: Attribute, value: AttributeValue) {
        if attribute == self.schema.core().security_descriptor {
            data.descriptor = None;
        }
        let single = self.schema.attributes().is_single(attribute);
        let slot = data.values.entry(attribute).or_default();
        if single {
            *slot = AttributeValues::new();
        }
        slot.push(value);
    }

    /// Replace values without the unique guard. The store calls this after
    /// updating its unique index.
    pub(crate) fn replace_values(&self, attribute: Attribute, values: AttributeValues) {
        {
            let mut data = self.data.write();
            if attribute == self.schema.core().security_descriptor {
                data.descriptor = None;
            }
            let values: AttributeValues = values.into_iter().filter(|v| !v.is_blank()).collect();
            if values.is_empty() {
                data.values.remove(&attribute);
            } else if self.schema.attributes().is_single(attribute) {
                let first = values.into_iter().take(1).collect();
                data.values.insert(attribute, first);
            } else {
                data.values.insert(attribute, values);
            }
        }
        self.notify(attribute);
    }

    // =========================================================================
    // TAGS
    // =========================================================================

    pub fn tag(&self, tag: &str) {
        self.data.write().tags.insert(tag.to_string());
    }

    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.data.read().tags.contains(tag)
    }

    /// Tags in sorted order.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        self.data.read().tags.iter().cloned().collect()
    }

    // =========================================================================
    // HIERARCHY
    // =========================================================================

    #[must_use]
    pub fn parent(&self) -> Option<ObjectId> {
        self.data.read().parent
    }

    #[must_use]
    pub fn children(&self) -> Vec<ObjectId> {
        self.data.read().children.iter().copied().collect()
    }

    /// Hang this object under `parent`. An object cannot be its own parent.
    pub fn set_parent(&self, parent: &Object) {
        if parent.id == self.id {
            return;
        }
        let previous = self.data.write().parent.replace(parent.id);
        if previous == Some(parent.id) {
            return;
        }
        parent.data.write().children.insert(self.id);
    }

    pub(crate) fn replace_hierarchy(&self, parent: Option<ObjectId>, children: BTreeSet<ObjectId>) {
        let mut data = self.data.write();
        data.parent = parent;
        data.children = children;
    }

    pub(crate) fn set_parent_id(&self, parent: ObjectId) {
        if parent != self.id {
            self.data.write().parent = Some(parent);
        }
    }

    pub(crate) fn insert_child(&self, child: ObjectId) {
        if child != self.id {
            self.data.write().children.insert(child);
        }
    }

    pub(crate) fn remove_child(&self, child: ObjectId) {
        self.data.write().children.remove(&child);
    }

    // =========================================================================
    // EDGES
    // =========================================================================

    /// Add `edge` from this object to `target`. Self-loops are ignored.
    pub fn edge_to(&self, target: &Object, edge: Edge) {
        self.edge_to_bitmap(target, &EdgeBitmap::new().set(edge));
    }

    /// Add every edge in `bitmap` from this object to `target`.
    pub fn edge_to_bitmap(&self, target: &Object, bitmap: &EdgeBitmap) {
        if target.id == self.id || bitmap.is_blank() {
            return;
        }
        self.edges_out
            .write()
            .entry(target.id)
            .or_default()
            .merge_in(bitmap);
        target
            .edges_in
            .write()
            .entry(self.id)
            .or_default()
            .merge_in(bitmap);
    }

    /// Neighbours and bitmaps in one direction, ordered by identifier.
    #[must_use]
    pub fn edges(&self, direction: Direction) -> Vec<(ObjectId, EdgeBitmap)> {
        match direction {
            Direction::Out => self.edges_out.read().iter().map(|(k, v)| (*k, *v)).collect(),
            Direction::In => self.edges_in.read().iter().map(|(k, v)| (*k, *v)).collect(),
            Direction::Any => {
                let mut combined = self.edges_out.read().clone();
                for (id, bitmap) in self.edges_in.read().iter() {
                    combined.entry(*id).or_default().merge_in(bitmap);
                }
                combined.into_iter().collect()
            }
        }
    }

    /// Bitmap towards (Out) or from (In) one neighbour.
    #[must_use]
    pub fn edge_bitmap(&self, other: ObjectId, direction: Direction) -> Option<EdgeBitmap> {
        match direction {
            Direction::Out => self.edges_out.read().get(&other).copied(),
            Direction::In => self.edges_in.read().get(&other).copied(),
            Direction::Any => {
                let out = self.edge_bitmap(other, Direction::Out);
                let incoming = self.edge_bitmap(other, Direction::In);
                match (out, incoming) {
                    (Some(a), Some(b)) => Some(a.merge(&b)),
                    (a, b) => a.or(b),
                }
            }
        }
    }

    /// True if `edge` is set from this object to `target`.
    #[must_use]
    pub fn has_edge_to(&self, target: ObjectId, edge: Edge) -> bool {
        self.edges_out
            .read()
            .get(&target)
            .is_some_and(|b| b.is_set(edge))
    }

    #[must_use]
    pub fn edge_count(&self, direction: Direction) -> usize {
        match direction {
            Direction::Out => self.edges_out.read().len(),
            Direction::In => self.edges_in.read().len(),
            Direction::Any => self.edges(Direction::Any).len(),
        }
    }

    /// Remove and return both adjacency maps.
    pub(crate) fn take_edges(
        &self,
    ) -> (BTreeMap<ObjectId, EdgeBitmap>, BTreeMap<ObjectId, EdgeBitmap>) {
        let out = std::mem::take(&mut *self.edges_out.write());
        let incoming = std::mem::take(&mut *self.edges_in.write());
        (out, incoming)
    }

    /// Drop the entry for `other` in one adjacency map.
    pub(crate) fn forget_neighbour(&self, other: ObjectId, direction: Direction) {
        match direction {
            Direction::Out => {
                self.edges_out.write().remove(&other);
            }
            Direction::In => {
                self.edges_in.write().remove(&other);
            }
            Direction::Any => {
                self.edges_out.write().remove(&other);
                self.edges_in.write().remove(&other);
            }
        }
    }

    // =========================================================================
    // SECURITY DESCRIPTOR
    // =========================================================================

    /// Parsed security descriptor, cached after the first call.
    ///
    /// `Ok(None)` means the object carries no descriptor (no ACL data).
    /// The cache is dropped whenever the raw value is replaced.
    pub fn security_descriptor(&self) -> Result<Option<Arc<SecurityDescriptor>>, GraphError> {
        let attribute = self.schema.core().security_descriptor;
        let raw = {
            let data = self.data.read();
            if let Some(cached) = &data.descriptor {
                return Ok(Some(Arc::clone(cached)));
            }
            match data.values.get(&attribute).and_then(|v| v.first()) {
                Some(AttributeValue::Blob(bytes)) => bytes.clone(),
                Some(other) => {
                    return Err(GraphError::MalformedDescriptor(format!(
                        "expected raw bytes, found '{other}'"
                    )));
                }
                None => return Ok(None),
            }
        };

        let parsed = Arc::new(SecurityDescriptor::parse(&raw)?);
        let mut data = self.data.write();
        // another thread may have replaced the raw value meanwhile
        let unchanged = data
            .values
            .get(&attribute)
            .and_then(|v| v.first())
            .and_then(AttributeValue::as_blob)
            == Some(raw.as_slice());
        if unchanged {
            data.descriptor = Some(Arc::clone(&parsed));
        }
        Ok(Some(parsed))
    }

    // =========================================================================
    // CONVENIENCE ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        self.first(self.schema.core().object_type)
            .and_then(|v| v.as_str().and_then(|s| s.parse().ok()))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn sid(&self) -> Option<Sid> {
        self.first(self.schema.core().object_sid)
            .and_then(|v| v.as_sid().cloned())
            .filter(|s| !s.is_blank())
    }

    #[must_use]
    pub fn dn(&self) -> Option<String> {
        self.first_string(self.schema.core().distinguished_name)
    }

    /// Lower-cased objectClass values.
    #[must_use]
    pub fn object_classes(&self) -> Vec<String> {
        self.get(self.schema.core().object_class)
            .map(|v| v.iter().map(|c| c.to_string().to_lowercase()).collect())
            .unwrap_or_default()
    }

    /// Best human readable name.
    #[must_use]
    pub fn label(&self) -> String {
        let core = self.schema.core();
        [
            core.display_name,
            core.name,
            core.sam_account_name,
            core.distinguished_name,
            core.down_level_logon_name,
        ]
        .into_iter()
        .find_map(|a| self.first_string(a).filter(|s| !s.is_empty()))
        .or_else(|| self.sid().map(|s| s.to_string()))
        .unwrap_or_else(|| self.id.to_string())
    }

    // =========================================================================
    // STORE ATTACHMENT
    // =========================================================================

    pub(crate) fn attach(&self, journal: Arc<IndexJournal>) {
        *self.journal.write() = Some(journal);
    }

    pub(crate) fn detach(&self) {
        *self.journal.write() = None;
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.journal.read().is_some()
    }

    fn notify(&self, attribute: Attribute) {
        let journal = self.journal.read().clone();
        if let Some(journal) = journal {
            journal.record(attribute, self.id);
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id)
            .field("label", &self.label())
            .field("type", &self.object_type())
            .finish()
    }
}
