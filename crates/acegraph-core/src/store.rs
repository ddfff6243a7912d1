//! # Object Store & Index Engine
//!
//! `Objects` owns the graph nodes of one analysis run (or one source before
//! identity merging) and the lookup indexes over their attribute values.
//!
//! ## Indexes
//!
//! - Every `Unique` attribute has an index value → object, maintained
//!   synchronously on insertion and on `Objects::set`. A collision is an
//!   `UniqueViolation` error; the store never holds two objects with the same
//!   value of a unique attribute.
//! - Other attributes are indexed on first `find_multi` use. Attached objects
//!   report changes to such attributes through an `IndexJournal`; the store
//!   replays the journal before the next indexed lookup.
//!
//! Index keys fold string case, so `CN=Users` and `cn=users` are one key.
//!
//! ## Locking
//!
//! The store lock is never held while an object lock waits on the store:
//! objects release their data lock before writing to the journal, and the
//! store drains the journal before it reads object data.

use crate::edge::EdgeBitmap;
use crate::merge::{MergeHint, merged_values, merge_tags};
use crate::object::Direction;
use crate::{
    Attribute, AttributeValue, AttributeValues, GraphError, Object, ObjectId, Schema, Sid,
    parallel,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Tag carried by objects synthesized to stand in for unresolved references.
pub const PLACEHOLDER_TAG: &str = "placeholder";

// =============================================================================
// INDEX JOURNAL
// =============================================================================

/// Change log shared between a store and its attached objects.
#[derive(Default)]
pub(crate) struct IndexJournal {
    indexed: RwLock<BTreeSet<Attribute>>,
    pending: Mutex<Vec<(Attribute, ObjectId)>>,
}

impl IndexJournal {
    /// Note that `id` changed `attribute`. Ignored for unindexed attributes.
    pub(crate) fn record(&self, attribute: Attribute, id: ObjectId) {
        if self.indexed.read().contains(&attribute) {
            self.pending.lock().push((attribute, id));
        }
    }

    fn take(&self) -> Vec<(Attribute, ObjectId)> {
        std::mem::take(&mut *self.pending.lock())
    }

    fn is_clean(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

// =============================================================================
// INDEXES
// =============================================================================

#[derive(Default)]
struct MultiIndex {
    by_value: BTreeMap<AttributeValue, BTreeSet<ObjectId>>,
    by_object: BTreeMap<ObjectId, Vec<AttributeValue>>,
}

impl MultiIndex {
    fn remove_object(&mut self, id: ObjectId) {
        let Some(keys) = self.by_object.remove(&id) else {
            return;
        };
        for key in keys {
            if let Some(holders) = self.by_value.get_mut(&key) {
                holders.remove(&id);
                if holders.is_empty() {
                    self.by_value.remove(&key);
                }
            }
        }
    }

    fn reindex(&mut self, object: &Object, attribute: Attribute) {
        let id = object.id();
        self.remove_object(id);
        let keys: Vec<AttributeValue> = object
            .get(attribute)
            .map(|values| index_keys(&values))
            .unwrap_or_default();
        if keys.is_empty() {
            return;
        }
        for key in &keys {
            self.by_value.entry(key.clone()).or_default().insert(id);
        }
        self.by_object.insert(id, keys);
    }

    fn holders(&self, value: &AttributeValue) -> BTreeSet<ObjectId> {
        self.by_value
            .get(&value.index_key())
            .cloned()
            .unwrap_or_default()
    }
}

fn index_keys(values: &AttributeValues) -> Vec<AttributeValue> {
    values
        .iter()
        .filter(|v| !v.is_blank())
        .map(AttributeValue::index_key)
        .collect()
}

#[derive(Default)]
struct StoreData {
    objects: BTreeMap<ObjectId, Arc<Object>>,
    unique: BTreeMap<Attribute, BTreeMap<AttributeValue, ObjectId>>,
    multi: BTreeMap<Attribute, MultiIndex>,
}

impl StoreData {
    fn check_unique(
        &self,
        schema: &Schema,
        id: ObjectId,
        attribute: Attribute,
        values: &AttributeValues,
    ) -> Result<(), GraphError> {
        self.check_unique_for(schema, &[id], attribute, values)
    }

    /// Like `check_unique`, but values held by any of `owners` are fine.
    fn check_unique_for(
        &self,
        schema: &Schema,
        owners: &[ObjectId],
        attribute: Attribute,
        values: &AttributeValues,
    ) -> Result<(), GraphError> {
        let Some(index) = self.unique.get(&attribute) else {
            return Ok(());
        };
        for value in values.iter().filter(|v| !v.is_blank()) {
            if let Some(holder) = index.get(&value.index_key())
                && !owners.contains(holder)
            {
                return Err(GraphError::UniqueViolation {
                    attribute: schema.attributes().name(attribute),
                    value: value.to_string(),
                    holder: *holder,
                });
            }
        }
        Ok(())
    }

    fn unindex_unique(&mut self, id: ObjectId, attribute: Attribute, values: &AttributeValues) {
        if let Some(index) = self.unique.get_mut(&attribute) {
            for key in index_keys(values) {
                if index.get(&key) == Some(&id) {
                    index.remove(&key);
                }
            }
        }
    }

    fn index_unique(&mut self, id: ObjectId, attribute: Attribute, values: &AttributeValues) {
        let index = self.unique.entry(attribute).or_default();
        for key in index_keys(values) {
            index.insert(key, id);
        }
    }

    fn remove(&mut self, schema: &Schema, object: &Object) {
        let id = object.id();
        self.objects.remove(&id);
        for (attribute, values) in object.values() {
            if schema.attributes().is_unique(attribute) {
                self.unindex_unique(id, attribute, &values);
            }
        }
        for index in self.multi.values_mut() {
            index.remove_object(id);
        }
    }
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Counts describing a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub objects: usize,
    /// Ordered object pairs with at least one edge.
    pub edge_pairs: usize,
    /// Pairs carrying each edge type, by edge name.
    pub per_edge: BTreeMap<String, usize>,
    /// Objects per `type` value.
    pub per_type: BTreeMap<String, usize>,
}

// =============================================================================
// OBJECTS
// =============================================================================

/// Concurrent object store with unique and multi-value indexes.
pub struct Objects {
    schema: Arc<Schema>,
    root: Arc<Object>,
    data: RwLock<StoreData>,
    journal: Arc<IndexJournal>,
    /// Serializes find-or-add so concurrent workers agree on one object.
    creation: Mutex<()>,
}

impl Objects {
    /// Empty store holding only its root container.
    #[must_use]
    pub fn new(schema: &Arc<Schema>) -> Self {
        let root = Arc::new(Object::with_values(
            schema,
            [(schema.core().name, AttributeValue::from("Root"))],
        ));
        root.tag("root");

        let journal = Arc::new(IndexJournal::default());
        root.attach(Arc::clone(&journal));

        let mut data = StoreData::default();
        data.objects.insert(root.id(), Arc::clone(&root));

        Self {
            schema: Arc::clone(schema),
            root,
            data: RwLock::new(data),
            journal,
            creation: Mutex::new(()),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Synthetic container every top-level domain hangs under.
    pub fn root(&self) -> &Arc<Object> {
        &self.root
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<Arc<Object>> {
        self.data.read().objects.get(&id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.data.read().objects.contains_key(&id)
    }

    /// Snapshot of every object in identifier order.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<Object>> {
        self.data.read().objects.values().cloned().collect()
    }

    // =========================================================================
    // INSERTION
    // =========================================================================

    /// Insert an object.
    ///
    /// Fails with `UniqueViolation` if another stored object already holds
    /// one of its unique values; the object is then not inserted.
    pub fn add(&self, object: Object) -> Result<Arc<Object>, GraphError> {
        self.insert(Arc::new(object))
    }

    /// Build an object from values (blanks skipped) and insert it.
    pub fn add_new(
        &self,
        values: impl IntoIterator<Item = (Attribute, AttributeValue)>,
    ) -> Result<Arc<Object>, GraphError> {
        self.add(Object::with_values(&self.schema, values))
    }

    /// Insert an already shared object. Inserting the same identifier twice
    /// returns the stored object.
    fn insert(&self, object: Arc<Object>) -> Result<Arc<Object>, GraphError> {
        let values = object.values();
        let registry = self.schema.attributes();
        {
            let mut data = self.data.write();
            if let Some(existing) = data.objects.get(&object.id()) {
                return Ok(Arc::clone(existing));
            }

            for (attribute, values) in &values {
                if registry.is_unique(*attribute) {
                    data.check_unique(&self.schema, object.id(), *attribute, values)?;
                }
            }
            for (attribute, values) in &values {
                if registry.is_unique(*attribute) {
                    data.index_unique(object.id(), *attribute, values);
                }
            }
            for (attribute, index) in &mut data.multi {
                index.reindex(&object, *attribute);
            }
            data.objects.insert(object.id(), Arc::clone(&object));
        }
        object.attach(Arc::clone(&self.journal));
        tracing::trace!(id = %object.id(), "object added");
        Ok(object)
    }

    /// Insert `object`, merging it into an existing object that represents
    /// the same identity when the approvers agree.
    ///
    /// Candidates are found through unique values first, then through
    /// single-valued `Merge` attributes such as `objectSid`.
    pub fn add_or_merge(&self, object: Object) -> Result<Arc<Object>, GraphError> {
        match self.choose_candidate(&object)? {
            Some(existing) => {
                self.merge_values_into(&existing, &object)?;
                self.move_edges(&existing, &object);
                self.move_hierarchy(&existing, &object);
                Ok(existing)
            }
            None => self.add(object),
        }
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    /// The single object holding `value` for `attribute`.
    ///
    /// Returns `None` when no object or more than one object matches.
    #[must_use]
    pub fn find(&self, attribute: Attribute, value: &AttributeValue) -> Option<Arc<Object>> {
        let mut found = self.find_multi(attribute, value);
        if found.len() == 1 { found.pop() } else { None }
    }

    /// Every object holding `value` for `attribute`, in identifier order.
    #[must_use]
    pub fn find_multi(&self, attribute: Attribute, value: &AttributeValue) -> Vec<Arc<Object>> {
        if value.is_blank() {
            return Vec::new();
        }
        let ids = self.holders(attribute, value);
        self.resolve(ids)
    }

    /// The single object matching both pairs.
    #[must_use]
    pub fn find_two(
        &self,
        first: Attribute,
        first_value: &AttributeValue,
        second: Attribute,
        second_value: &AttributeValue,
    ) -> Option<Arc<Object>> {
        let mut found = self.find_two_multi(first, first_value, second, second_value);
        if found.len() == 1 { found.pop() } else { None }
    }

    /// Objects matching both pairs: the intersection of two index lookups.
    #[must_use]
    pub fn find_two_multi(
        &self,
        first: Attribute,
        first_value: &AttributeValue,
        second: Attribute,
        second_value: &AttributeValue,
    ) -> Vec<Arc<Object>> {
        if first_value.is_blank() || second_value.is_blank() {
            return Vec::new();
        }
        let left = self.holders(first, first_value);
        if left.is_empty() {
            return Vec::new();
        }
        let right = self.holders(second, second_value);
        self.resolve(left.intersection(&right).copied().collect())
    }

    /// Find by the first non-blank pair, or insert a new object built from
    /// all pairs. Atomic with respect to other `find_or_add` callers.
    pub fn find_or_add(
        &self,
        values: impl IntoIterator<Item = (Attribute, AttributeValue)>,
    ) -> Result<Arc<Object>, GraphError> {
        let values: Vec<(Attribute, AttributeValue)> =
            values.into_iter().filter(|(_, v)| !v.is_blank()).collect();

        let _creating = self.creation.lock();
        if let Some((attribute, value)) = values.first()
            && let Some(found) = self.find_multi(*attribute, value).into_iter().next()
        {
            return Ok(found);
        }
        self.add_new(values)
    }

    /// Object with `sid`, preferring one in the same domain context as
    /// `relative_to`. Synthesizes a placeholder when none exists.
    pub fn find_or_add_adjacent_sid(
        &self,
        sid: &Sid,
        relative_to: Option<&Object>,
    ) -> Result<Arc<Object>, GraphError> {
        let core = self.schema.core();
        let context = relative_to.and_then(|o| o.first(core.domain_context));

        let _creating = self.creation.lock();
        let candidates = self.find_multi(core.object_sid, &AttributeValue::Sid(sid.clone()));
        if let Some(context) = &context
            && let Some(same) = candidates
                .iter()
                .find(|c| c.first(core.domain_context).as_ref() == Some(context))
        {
            return Ok(Arc::clone(same));
        }
        if let Some(first) = candidates.into_iter().next() {
            return Ok(first);
        }

        // only domain SIDs of the same domain inherit its context
        let same_domain = sid.is_domain_issued()
            && relative_to
                .and_then(Object::sid)
                .is_some_and(|own| own.strip_rid() == sid.strip_rid());
        let name = sid
            .well_known_name()
            .map_or_else(|| sid.to_string(), str::to_string);

        let mut values = vec![
            (core.object_sid, AttributeValue::Sid(sid.clone())),
            (core.name, AttributeValue::from(name)),
        ];
        if same_domain && let Some(context) = context {
            values.push((core.domain_context, context));
        }
        let placeholder = self.add_new(values)?;
        placeholder.tag(PLACEHOLDER_TAG);
        tracing::debug!(%sid, id = %placeholder.id(), "synthesized placeholder for SID");
        Ok(placeholder)
    }

    /// Parent of `object` by its distinguished name, if that parent exists.
    #[must_use]
    pub fn distinguished_parent(&self, object: &Object) -> Option<Arc<Object>> {
        let dn = object.dn()?;
        let parent = parent_dn(&dn)?;
        self.find(
            self.schema.core().distinguished_name,
            &AttributeValue::from(parent),
        )
    }

    fn holders(&self, attribute: Attribute, value: &AttributeValue) -> BTreeSet<ObjectId> {
        if self.schema.attributes().is_unique(attribute) {
            let data = self.data.read();
            return data
                .unique
                .get(&attribute)
                .and_then(|index| index.get(&value.index_key()))
                .map(|id| BTreeSet::from([*id]))
                .unwrap_or_default();
        }

        if self.journal.is_clean() {
            let data = self.data.read();
            if let Some(index) = data.multi.get(&attribute) {
                return index.holders(value);
            }
        }

        let mut data = self.data.write();
        self.replay_journal(&mut data);
        if !data.multi.contains_key(&attribute) {
            self.build_index(&mut data, attribute);
        }
        data.multi
            .get(&attribute)
            .map(|index| index.holders(value))
            .unwrap_or_default()
    }

    fn build_index(&self, data: &mut StoreData, attribute: Attribute) {
        // journal first, so changes racing with the scan are replayed later
        self.journal.indexed.write().insert(attribute);
        let mut index = MultiIndex::default();
        for object in data.objects.values() {
            index.reindex(object, attribute);
        }
        tracing::debug!(
            attribute = %self.schema.attributes().name(attribute),
            values = index.by_value.len(),
            "built lookup index"
        );
        data.multi.insert(attribute, index);
    }

    fn replay_journal(&self, data: &mut StoreData) {
        for (attribute, id) in self.journal.take() {
            let Some(object) = data.objects.get(&id).cloned() else {
                continue;
            };
            if let Some(index) = data.multi.get_mut(&attribute) {
                index.reindex(&object, attribute);
            }
        }
    }

    fn resolve(&self, ids: BTreeSet<ObjectId>) -> Vec<Arc<Object>> {
        let data = self.data.read();
        ids.into_iter()
            .filter_map(|id| data.objects.get(&id).cloned())
            .collect()
    }

    /// Free the lookup index of a non-unique attribute. It is rebuilt if
    /// `find_multi` is used on the attribute again. Returns false when there
    /// was nothing to drop; unique indexes are never dropped.
    pub fn drop_index(&self, attribute: Attribute) -> bool {
        if self.schema.attributes().is_unique(attribute) {
            return false;
        }
        let mut data = self.data.write();
        self.journal.indexed.write().remove(&attribute);
        data.multi.remove(&attribute).is_some()
    }

    // =========================================================================
    // MUTATION
    // =========================================================================

    /// Replace the values of `attribute` on a stored object, keeping the
    /// unique index consistent.
    pub fn set(
        &self,
        object: &Object,
        attribute: Attribute,
        values: impl IntoIterator<Item = AttributeValue>,
    ) -> Result<(), GraphError> {
        let values: AttributeValues = values.into_iter().collect();
        if !self.schema.attributes().is_unique(attribute) {
            object.replace_values(attribute, values);
            return Ok(());
        }

        let mut data = self.data.write();
        if !data.objects.contains_key(&object.id()) {
            return Err(GraphError::ObjectNotFound(object.id()));
        }
        data.check_unique(&self.schema, object.id(), attribute, &values)?;
        self.replace_unique(&mut data, object, attribute, values);
        Ok(())
    }

    fn replace_unique(
        &self,
        data: &mut StoreData,
        object: &Object,
        attribute: Attribute,
        values: AttributeValues,
    ) {
        if let Some(old) = object.get(attribute) {
            data.unindex_unique(object.id(), attribute, &old);
        }
        object.replace_values(attribute, values);
        if let Some(stored) = object.get(attribute) {
            data.index_unique(object.id(), attribute, &stored);
        }
    }

    /// Hang `child` under `parent`, unlinking it from a previous parent.
    pub fn set_parent(&self, child: &Object, parent: &Object) {
        if child.id() == parent.id() {
            return;
        }
        if let Some(previous) = child.parent().filter(|p| *p != parent.id())
            && let Some(previous) = self.get(previous)
        {
            previous.remove_child(child.id());
        }
        child.set_parent(parent);
    }

    /// Merge `incoming` into `existing` after asking every approver.
    ///
    /// Values, tags, edges and children of `incoming` end up on `existing`.
    /// If `incoming` was stored here it is removed from the store. A veto
    /// returns `GraphError::DontMerge` and a unique conflict returns
    /// `UniqueViolation`; both leave both objects untouched.
    pub fn merge(&self, existing: &Arc<Object>, incoming: &Object) -> Result<MergeHint, GraphError> {
        if existing.id() == incoming.id() {
            return Ok(MergeHint::Neutral);
        }
        if !self.contains(existing.id()) {
            return Err(GraphError::ObjectNotFound(existing.id()));
        }
        let hint = self.schema.approvers().approve(existing, incoming)?;

        self.merge_values_into(existing, incoming)?;
        {
            let mut data = self.data.write();
            if data.objects.contains_key(&incoming.id()) {
                data.remove(&self.schema, incoming);
            }
        }
        incoming.detach();

        self.move_edges(existing, incoming);
        self.move_hierarchy(existing, incoming);
        tracing::trace!(existing = %existing.id(), incoming = %incoming.id(), "objects merged");
        Ok(hint)
    }

    /// Values held by `incoming` itself do not count as conflicts, since
    /// `incoming` is about to disappear.
    fn merge_values_into(&self, existing: &Object, incoming: &Object) -> Result<(), GraphError> {
        let registry = self.schema.attributes();
        let (unique, plain): (Vec<_>, Vec<_>) = merged_values(existing, incoming)
            .into_iter()
            .partition(|(attribute, _)| registry.is_unique(*attribute));

        if !unique.is_empty() {
            let owners = [existing.id(), incoming.id()];
            let mut data = self.data.write();
            for (attribute, values) in &unique {
                data.check_unique_for(&self.schema, &owners, *attribute, values)?;
            }
            for (attribute, values) in unique {
                self.replace_unique(&mut data, existing, attribute, values);
            }
        }
        for (attribute, values) in plain {
            existing.replace_values(attribute, values);
        }
        merge_tags(existing, incoming);
        Ok(())
    }

    /// Re-point every edge of `incoming` at `existing`. Neighbours must be
    /// stored here; edges to unknown objects are dropped.
    fn move_edges(&self, existing: &Object, incoming: &Object) {
        let (outgoing, incoming_edges) = incoming.take_edges();
        for (target, bitmap) in outgoing {
            let Some(target) = self.resolve_neighbour(target, existing) else {
                continue;
            };
            target.forget_neighbour(incoming.id(), Direction::In);
            existing.edge_to_bitmap(&target, &bitmap);
        }
        for (source, bitmap) in incoming_edges {
            let Some(source) = self.resolve_neighbour(source, existing) else {
                continue;
            };
            source.forget_neighbour(incoming.id(), Direction::Out);
            source.edge_to_bitmap(existing, &bitmap);
        }
    }

    fn resolve_neighbour(&self, id: ObjectId, existing: &Object) -> Option<Arc<Object>> {
        if id == existing.id() {
            return None;
        }
        let found = self.get(id);
        if found.is_none() {
            tracing::debug!(neighbour = %id, "dropping edge to object outside the store");
        }
        found
    }

    fn move_hierarchy(&self, existing: &Object, incoming: &Object) {
        if let Some(parent) = incoming.parent().and_then(|p| self.get(p)) {
            parent.remove_child(incoming.id());
            if existing.parent().is_none() && parent.id() != existing.id() {
                existing.set_parent_id(parent.id());
                parent.insert_child(existing.id());
            }
        }
        for child in incoming.children() {
            if let Some(child) = self.get(child) {
                child.set_parent_id(existing.id());
                existing.insert_child(child.id());
            }
        }
    }

    fn choose_candidate(&self, incoming: &Object) -> Result<Option<Arc<Object>>, GraphError> {
        let mut best: Option<(MergeHint, Arc<Object>)> = None;
        for candidate in self.merge_candidates(incoming) {
            match self.schema.approvers().approve(&candidate, incoming) {
                Ok(hint) => {
                    if best.as_ref().is_none_or(|(current, _)| hint > *current) {
                        best = Some((hint, candidate));
                    }
                }
                Err(e) if e.is_dont_merge() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(best.map(|(_, candidate)| candidate))
    }

    fn merge_candidates(&self, incoming: &Object) -> Vec<Arc<Object>> {
        let registry = self.schema.attributes();
        let mut seen = BTreeSet::new();
        let mut candidates = Vec::new();
        let mut push = |found: Vec<Arc<Object>>| {
            for object in found {
                if object.id() != incoming.id() && seen.insert(object.id()) {
                    candidates.push(object);
                }
            }
        };

        let values = incoming.values();
        for (attribute, values) in &values {
            if registry.is_unique(*attribute) {
                for value in values {
                    push(self.find_multi(*attribute, value));
                }
            }
        }
        for (attribute, values) in &values {
            let merge_key = registry
                .info(*attribute)
                .is_some_and(|info| info.merge && info.single && !info.unique);
            if merge_key {
                for value in values {
                    push(self.find_multi(*attribute, value));
                }
            }
        }
        candidates
    }

    /// Merge a whole source store into this one.
    ///
    /// Each source object either merges into an approved candidate here or
    /// is inserted as is. An object whose unique value is held by an object
    /// it may not merge with is logged and left out, with its edges. Edges and hierarchy links are then re-pointed
    /// through the resulting identifier map. The source root maps to this
    /// store's root.
    pub fn absorb(&self, source: Objects) -> Result<(), GraphError> {
        let objects = source.all();
        let mut remap: BTreeMap<ObjectId, ObjectId> = BTreeMap::new();
        remap.insert(source.root.id(), self.root.id());
        let mut merged = 0usize;
        let mut rejected = 0usize;

        for object in &objects {
            if object.id() == source.root.id() {
                continue;
            }
            object.detach();
            let placed = match self.choose_candidate(object)? {
                Some(existing) => self.merge_values_into(&existing, object).map(|()| {
                    merged += 1;
                    existing.id()
                }),
                None => self.insert(Arc::clone(object)).map(|stored| stored.id()),
            };
            match placed {
                Ok(id) => {
                    remap.insert(object.id(), id);
                }
                Err(GraphError::UniqueViolation {
                    attribute,
                    value,
                    holder,
                }) => {
                    tracing::warn!(
                        object = %object.label(),
                        %attribute,
                        %value,
                        %holder,
                        "object rejected: unique value held by an object it may not merge with"
                    );
                    rejected += 1;
                }
                Err(e) => return Err(e),
            }
        }

        let adjacency: Vec<(ObjectId, BTreeMap<ObjectId, EdgeBitmap>)> = objects
            .iter()
            .map(|object| (object.id(), object.take_edges().0))
            .collect();
        let mapped = |id: ObjectId| remap.get(&id).and_then(|target| self.get(*target));

        for (source_id, outgoing) in adjacency {
            let Some(from) = mapped(source_id) else {
                continue;
            };
            for (target_id, bitmap) in outgoing {
                if let Some(to) = mapped(target_id) {
                    from.edge_to_bitmap(&to, &bitmap);
                }
            }
        }

        for object in &objects {
            let Some(target) = mapped(object.id()) else {
                continue;
            };
            let parent = object.parent().and_then(|p| remap.get(&p).copied());
            let children: BTreeSet<ObjectId> = object
                .children()
                .into_iter()
                .filter_map(|c| remap.get(&c).copied())
                .filter(|c| *c != target.id())
                .collect();

            if target.id() == object.id() {
                target.replace_hierarchy(parent.filter(|p| *p != target.id()), children);
                continue;
            }
            if target.parent().is_none()
                && let Some(parent) = parent.filter(|p| *p != target.id())
            {
                target.set_parent_id(parent);
            }
            for child in children {
                target.insert_child(child);
            }
        }

        tracing::debug!(
            objects = objects.len(),
            merged,
            rejected,
            total = self.len(),
            "absorbed source store"
        );
        Ok(())
    }

    // =========================================================================
    // ITERATION
    // =========================================================================

    /// Visit every object in identifier order until `visit` returns false.
    ///
    /// Works on a snapshot: objects added during the walk are not visited.
    pub fn iterate<F>(&self, mut visit: F)
    where
        F: FnMut(&Arc<Object>) -> bool,
    {
        for object in self.all() {
            if !visit(&object) {
                break;
            }
        }
    }

    /// Visit every object once using up to `workers` threads (0 = one per
    /// core). No ordering holds between objects.
    pub fn iterate_parallel<F>(&self, workers: usize, visit: F)
    where
        F: Fn(&Arc<Object>) -> bool + Sync,
    {
        parallel::for_each(&self.all(), workers, visit);
    }

    /// Lazily filtered view.
    pub fn filter<'s, P>(&'s self, predicate: P) -> Filter<'s>
    where
        P: Fn(&Object) -> bool + Send + Sync + 's,
    {
        Filter {
            store: self,
            predicates: vec![Box::new(predicate)],
        }
    }

    /// View of objects carrying `tag`.
    pub fn with_tag<'s>(&'s self, tag: &'s str) -> Filter<'s> {
        self.filter(move |object| object.has_tag(tag))
    }

    /// Neighbours of `object` with their bitmaps, resolved to objects.
    #[must_use]
    pub fn edges(&self, object: &Object, direction: Direction) -> Vec<(Arc<Object>, EdgeBitmap)> {
        let data = self.data.read();
        object
            .edges(direction)
            .into_iter()
            .filter_map(|(id, bitmap)| data.objects.get(&id).map(|o| (Arc::clone(o), bitmap)))
            .collect()
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let edges = self.schema.edges();
        let mut stats = StoreStats::default();
        for object in self.all() {
            stats.objects += 1;
            *stats.per_type.entry(object.object_type().to_string()).or_default() += 1;
            for (_, bitmap) in object.edges(Direction::Out) {
                stats.edge_pairs += 1;
                for edge in bitmap.iter() {
                    *stats.per_edge.entry(edges.name(edge)).or_default() += 1;
                }
            }
        }
        stats
    }
}

// =============================================================================
// FILTERED VIEW
// =============================================================================

type Predicate<'s> = Box<dyn Fn(&Object) -> bool + Send + Sync + 's>;

/// Lazily evaluated subset of a store. Predicates run during iteration.
pub struct Filter<'s> {
    store: &'s Objects,
    predicates: Vec<Predicate<'s>>,
}

impl<'s> Filter<'s> {
    /// Narrow the view further.
    #[must_use]
    pub fn filter<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&Object) -> bool + Send + Sync + 's,
    {
        self.predicates.push(Box::new(predicate));
        self
    }

    fn matches(&self, object: &Object) -> bool {
        self.predicates.iter().all(|p| p(object))
    }

    pub fn iterate<F>(&self, mut visit: F)
    where
        F: FnMut(&Arc<Object>) -> bool,
    {
        self.store.iterate(|object| !self.matches(object) || visit(object));
    }

    pub fn iterate_parallel<F>(&self, workers: usize, visit: F)
    where
        F: Fn(&Arc<Object>) -> bool + Sync,
    {
        self.store
            .iterate_parallel(workers, |object| !self.matches(object) || visit(object));
    }

    #[must_use]
    pub fn collect(&self) -> Vec<Arc<Object>> {
        let mut found = Vec::new();
        self.iterate(|object| {
            found.push(Arc::clone(object));
            true
        });
        found
    }

    #[must_use]
    pub fn count(&self) -> usize {
        let mut count = 0;
        self.iterate(|_| {
            count += 1;
            true
        });
        count
    }
}

// =============================================================================
// DISTINGUISHED NAMES
// =============================================================================

/// Parent part of a distinguished name: everything after the first
/// unescaped comma. `None` for a single-component name.
#[must_use]
pub fn parent_dn(dn: &str) -> Option<&str> {
    let mut escaped = false;
    for (index, c) in dn.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' => {
                let rest = dn[index + 1..].trim_start();
                return (!rest.is_empty()).then_some(rest);
            }
            _ => {}
        }
    }
    None
}
