//! # Edge Traversal
//!
//! Breadth-first walk over edges matching a mask. Iterative with an explicit
//! visited set: cycles such as nested group memberships terminate, and no
//! object is descended into twice. Depth is capped at `MAX_TRAVERSAL_DEPTH`.
//! Hops scoring probability 0 are not traversable unless the walk opts in.

use crate::edge::{EdgeBitmap, Probability};
use crate::object::Direction;
use crate::primitives::MAX_TRAVERSAL_DEPTH;
use crate::{Object, ObjectId, Objects};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

/// Walk configuration.
#[derive(Debug, Clone, Copy)]
pub struct Traversal {
    mask: EdgeBitmap,
    direction: Direction,
    max_depth: usize,
    min_probability: Probability,
}

impl Traversal {
    /// Outgoing walk over `mask` with the maximum depth, skipping hops of
    /// probability 0.
    #[must_use]
    pub fn new(mask: EdgeBitmap) -> Self {
        Self {
            mask,
            direction: Direction::Out,
            max_depth: MAX_TRAVERSAL_DEPTH,
            min_probability: Probability::new(1),
        }
    }

    #[must_use]
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Depth limit, clamped to `MAX_TRAVERSAL_DEPTH`.
    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.min(MAX_TRAVERSAL_DEPTH);
        self
    }

    /// Skip hops scoring below `probability`.
    #[must_use]
    pub fn min_probability(mut self, probability: Probability) -> Self {
        self.min_probability = probability;
        self
    }

    /// Follow every masked hop, probability 0 included. For structural
    /// walks such as membership closure rather than attack paths.
    #[must_use]
    pub fn include_untraversable(self) -> Self {
        self.min_probability(Probability::NEVER)
    }

    /// Walk from `start`.
    ///
    /// `visit(from, to, edges, depth)` is called for every matching hop out
    /// of an object within the depth limit; `depth` is the hop count of
    /// `to`. Returning false prunes the walk below `to`. Hops towards
    /// already visited objects are reported but not descended.
    pub fn walk<F>(&self, objects: &Objects, start: &Arc<Object>, mut visit: F)
    where
        F: FnMut(&Arc<Object>, &Arc<Object>, &EdgeBitmap, usize) -> bool,
    {
        let registry = objects.schema().edges();
        let mut visited = BTreeSet::from([start.id()]);
        let mut queue = VecDeque::from([(Arc::clone(start), 0usize)]);

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= self.max_depth {
                continue;
            }
            for (neighbour, bitmap) in objects.edges(&current, self.direction) {
                let edges = bitmap.intersect(&self.mask);
                if edges.is_blank() {
                    continue;
                }
                if self.min_probability > Probability::NEVER {
                    let probability = match self.direction {
                        Direction::In => registry.probability(&neighbour, &current, &edges),
                        Direction::Out | Direction::Any => {
                            registry.probability(&current, &neighbour, &edges)
                        }
                    };
                    if probability < self.min_probability {
                        continue;
                    }
                }

                let next = depth.saturating_add(1);
                let descend = visit(&current, &neighbour, &edges, next);
                if descend && visited.insert(neighbour.id()) {
                    queue.push_back((neighbour, next));
                }
            }
        }
    }

    /// Every object reachable from `start` with its hop count.
    #[must_use]
    pub fn reachable(&self, objects: &Objects, start: &Arc<Object>) -> BTreeMap<ObjectId, usize> {
        let mut reached = BTreeMap::new();
        self.walk(objects, start, |_, to, _, depth| {
            reached.entry(to.id()).or_insert(depth);
            true
        });
        reached.remove(&start.id());
        reached
    }
}
