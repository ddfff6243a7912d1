//! # Edge Registry and Edge Bitmaps
//!
//! Edge types are registered once at startup. Each gets a bit position in the
//! fixed-width [`EdgeBitmap`]; all relationship types between one ordered pair
//! of objects share a single bitmap.
//!
//! Lookups by handle are lock-free: slots are write-once cells, published by
//! an atomic counter after the slot is filled.

use crate::primitives::{DEFAULT_PROBABILITY, EDGE_CAPACITY, EDGE_WORDS, MAX_PROBABILITY};
use crate::{Edge, GraphError, Object};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

// =============================================================================
// EDGE BITMAP
// =============================================================================

/// Set of edge types holding between one ordered pair of objects.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeBitmap([u64; EDGE_WORDS]);

impl EdgeBitmap {
    #[must_use]
    pub const fn new() -> Self {
        Self([0; EDGE_WORDS])
    }

    /// Return a copy with `edge` set. Chainable.
    #[must_use]
    pub fn set(mut self, edge: Edge) -> Self {
        self.insert(edge);
        self
    }

    pub fn insert(&mut self, edge: Edge) {
        let bit = edge.bit();
        self.0[bit / 64] |= 1u64 << (bit % 64);
    }

    pub fn clear(&mut self, edge: Edge) {
        let bit = edge.bit();
        self.0[bit / 64] &= !(1u64 << (bit % 64));
    }

    #[must_use]
    pub fn is_set(&self, edge: Edge) -> bool {
        let bit = edge.bit();
        self.0[bit / 64] & (1u64 << (bit % 64)) != 0
    }

    /// Union of both bitmaps.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut out = *self;
        out.merge_in(other);
        out
    }

    pub fn merge_in(&mut self, other: &Self) {
        for (word, other) in self.0.iter_mut().zip(other.0.iter()) {
            *word |= *other;
        }
    }

    /// Bits set in both.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        let mut out = *self;
        for (word, other) in out.0.iter_mut().zip(other.0.iter()) {
            *word &= *other;
        }
        out
    }

    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.0.iter().zip(other.0.iter()).any(|(a, b)| a & b != 0)
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }

    /// Number of edge types set.
    #[must_use]
    pub fn count(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Set edge types in ascending bit order.
    pub fn iter(&self) -> impl Iterator<Item = Edge> + '_ {
        self.0.iter().enumerate().flat_map(|(index, word)| {
            let word = *word;
            (0..64u16)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| Edge(index as u16 * 64 + bit))
        })
    }
}

impl fmt::Debug for EdgeBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|e| e.bit())).finish()
    }
}

impl FromIterator<Edge> for EdgeBitmap {
    fn from_iter<I: IntoIterator<Item = Edge>>(iter: I) -> Self {
        let mut bitmap = Self::new();
        for edge in iter {
            bitmap.insert(edge);
        }
        bitmap
    }
}

// =============================================================================
// PROBABILITY
// =============================================================================

/// Likelihood, 0..=100, that an edge can actually be used by an attacker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Probability(u8);

impl Probability {
    pub const NEVER: Self = Self(0);
    pub const CERTAIN: Self = Self(MAX_PROBABILITY);

    /// Clamp any integer into range.
    #[must_use]
    pub fn new(value: i64) -> Self {
        Self(value.clamp(0, i64::from(MAX_PROBABILITY)) as u8)
    }

    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

/// Pure scoring function bound to an edge type.
///
/// Receives the source, the target and the full bitmap on that pair. It must
/// not mutate the graph.
pub type ProbabilityCalculator =
    Arc<dyn Fn(&Object, &Object, &EdgeBitmap) -> Probability + Send + Sync>;

// =============================================================================
// EDGE DEFINITIONS
// =============================================================================

/// Presentation defaults for an edge type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EdgeDefaults {
    pub visible_in: bool,
    pub visible_out: bool,
    pub enabled: bool,
}

/// Everything the registry knows about one edge type.
#[derive(Clone, Default)]
pub struct EdgeInfo {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub hidden: bool,
    pub defaults: EdgeDefaults,
    pub calculator: Option<ProbabilityCalculator>,
}

impl EdgeInfo {
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

impl fmt::Debug for EdgeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeInfo")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("hidden", &self.hidden)
            .field("defaults", &self.defaults)
            .field("calculator", &self.calculator.is_some())
            .finish()
    }
}

/// Chainable edge definition, finished by [`EdgeDefinition::register`].
#[must_use = "an edge definition does nothing until registered"]
pub struct EdgeDefinition<'r> {
    registry: &'r EdgeRegistry,
    info: EdgeInfo,
}

impl EdgeDefinition<'_> {
    pub fn describe(mut self, text: &str) -> Self {
        self.info.description = text.to_string();
        self
    }

    /// Classification such as "Pivot", "Granted", "Informative". Repeatable.
    pub fn tag(mut self, tag: &str) -> Self {
        if !self.info.has_tag(tag) {
            self.info.tags.push(tag.to_string());
        }
        self
    }

    /// Exclude from default presentation.
    pub fn hidden(mut self) -> Self {
        self.info.hidden = true;
        self
    }

    pub fn set_default(mut self, visible_in: bool, visible_out: bool, enabled: bool) -> Self {
        self.info.defaults = EdgeDefaults {
            visible_in,
            visible_out,
            enabled,
        };
        self
    }

    pub fn probability_calculator<F>(mut self, calculator: F) -> Self
    where
        F: Fn(&Object, &Object, &EdgeBitmap) -> Probability + Send + Sync + 'static,
    {
        self.info.calculator = Some(Arc::new(calculator));
        self
    }

    /// Assign the next free bit.
    pub fn register(self) -> Result<Edge, GraphError> {
        self.registry.insert(self.info)
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Append-only table of edge types with a fixed upper bound.
pub struct EdgeRegistry {
    slots: Box<[OnceLock<Arc<EdgeInfo>>]>,
    count: AtomicUsize,
    by_name: RwLock<BTreeMap<String, Edge>>,
    registration: Mutex<()>,
}

impl Default for EdgeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: (0..EDGE_CAPACITY).map(|_| OnceLock::new()).collect(),
            count: AtomicUsize::new(0),
            by_name: RwLock::new(BTreeMap::new()),
            registration: Mutex::new(()),
        }
    }

    /// Start a definition for `name`.
    pub fn define(&self, name: &str) -> EdgeDefinition<'_> {
        EdgeDefinition {
            registry: self,
            info: EdgeInfo {
                name: name.to_string(),
                ..EdgeInfo::default()
            },
        }
    }

    fn insert(&self, info: EdgeInfo) -> Result<Edge, GraphError> {
        let _guard = self.registration.lock();
        let key = info.name.to_lowercase();

        if self.by_name.read().contains_key(&key) {
            return Err(GraphError::DuplicateRegistration {
                kind: "edge",
                name: info.name,
            });
        }

        let slot = self.count.load(Ordering::Acquire);
        if slot >= EDGE_CAPACITY {
            return Err(GraphError::EdgeCapacityExceeded {
                name: info.name,
                capacity: EDGE_CAPACITY,
            });
        }

        let edge = Edge(slot as u16);
        let name = info.name.clone();
        self.slots[slot]
            .set(Arc::new(info))
            .map_err(|_| GraphError::ConfigError(format!("edge slot {slot} already taken")))?;
        self.by_name.write().insert(key, edge);
        self.count.store(slot + 1, Ordering::Release);
        tracing::trace!(%name, bit = slot, "registered edge");
        Ok(edge)
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Edge> {
        self.by_name.read().get(&name.to_lowercase()).copied()
    }

    #[must_use]
    pub fn info(&self, edge: Edge) -> Option<&Arc<EdgeInfo>> {
        if edge.bit() >= self.len() {
            return None;
        }
        self.slots.get(edge.bit()).and_then(OnceLock::get)
    }

    /// Registered name, or `#bit` for a foreign handle.
    #[must_use]
    pub fn name(&self, edge: Edge) -> String {
        self.info(edge)
            .map(|info| info.name.clone())
            .unwrap_or_else(|| format!("#{}", edge.bit()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered edges in bit order.
    pub fn iter(&self) -> impl Iterator<Item = (Edge, &Arc<EdgeInfo>)> + '_ {
        (0..self.len()).filter_map(|bit| {
            let edge = Edge(bit as u16);
            self.info(edge).map(|info| (edge, info))
        })
    }

    /// Bitmap of every registered edge.
    #[must_use]
    pub fn all(&self) -> EdgeBitmap {
        self.iter().map(|(edge, _)| edge).collect()
    }

    /// Bitmap of every edge that is not hidden.
    #[must_use]
    pub fn visible(&self) -> EdgeBitmap {
        self.iter()
            .filter(|(_, info)| !info.hidden)
            .map(|(edge, _)| edge)
            .collect()
    }

    /// Bitmap of every edge carrying `tag`.
    #[must_use]
    pub fn with_tag(&self, tag: &str) -> EdgeBitmap {
        self.iter()
            .filter(|(_, info)| info.has_tag(tag))
            .map(|(edge, _)| edge)
            .collect()
    }

    /// Bitmap from edge names; unknown names are an error.
    pub fn bitmap_from_names<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<EdgeBitmap, GraphError> {
        names
            .into_iter()
            .map(|name| {
                self.lookup(name)
                    .ok_or_else(|| GraphError::ConfigError(format!("unknown edge '{name}'")))
            })
            .collect()
    }

    /// Names of the edges set in `bitmap`, in bit order.
    #[must_use]
    pub fn names(&self, bitmap: &EdgeBitmap) -> Vec<String> {
        bitmap.iter().map(|edge| self.name(edge)).collect()
    }

    /// Highest probability among the edges set on a pair.
    ///
    /// Edges without a calculator score [`DEFAULT_PROBABILITY`]. An empty
    /// bitmap scores zero.
    #[must_use]
    pub fn probability(&self, source: &Object, target: &Object, bitmap: &EdgeBitmap) -> Probability {
        bitmap
            .iter()
            .map(|edge| match self.info(edge).and_then(|i| i.calculator.as_ref()) {
                Some(calculator) => calculator(source, target, bitmap),
                None => Probability::new(i64::from(DEFAULT_PROBABILITY)),
            })
            .max()
            .unwrap_or(Probability::NEVER)
    }
}
