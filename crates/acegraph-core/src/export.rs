//! # Graph Export
//!
//! Serializable snapshot of an analysed store for presentation layers.
//!
//! Nodes and edges are sorted by identifier so two exports of the same graph
//! are byte-identical once encoded. Edge bitmaps are rendered as names and
//! scored with the registered probability calculators.

use crate::edge::EdgeBitmap;
use crate::object::Direction;
use crate::store::StoreStats;
use crate::{AttributeValue, Objects};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What to put into an export.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Edge types to keep. `None` keeps every registered type.
    pub mask: Option<EdgeBitmap>,
    /// Keep edge types registered as hidden.
    pub include_hidden: bool,
    /// Attribute names to render on each node.
    pub attributes: Vec<String>,
    /// Keep objects without any exported edge.
    pub include_isolated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportNode {
    pub id: u64,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEdge {
    pub from: u64,
    pub to: u64,
    pub edges: Vec<String>,
    /// Highest probability among `edges`.
    pub probability: u8,
}

/// Nodes and edges ready for transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphExport {
    pub generated: DateTime<Utc>,
    pub nodes: Vec<ExportNode>,
    pub edges: Vec<ExportEdge>,
}

impl GraphExport {
    /// Snapshot `objects` according to `options`.
    #[must_use]
    pub fn from_objects(objects: &Objects, options: &ExportOptions) -> Self {
        let registry = objects.schema().edges();
        let mut mask = options.mask.unwrap_or_else(|| registry.all());
        if !options.include_hidden {
            mask = mask.intersect(&registry.visible());
        }
        let attributes: Vec<_> = options
            .attributes
            .iter()
            .filter_map(|name| {
                let found = objects.schema().attributes().lookup(name);
                if found.is_none() {
                    tracing::warn!(attribute = %name, "unknown attribute requested for export");
                }
                found.map(|attribute| (name.clone(), attribute))
            })
            .collect();

        let mut edges = Vec::new();
        let mut connected = BTreeSet::new();
        let all = objects.all();
        for object in &all {
            for (target, bitmap) in objects.edges(object, Direction::Out) {
                let kept = bitmap.intersect(&mask);
                if kept.is_blank() {
                    continue;
                }
                connected.insert(object.id());
                connected.insert(target.id());
                edges.push(ExportEdge {
                    from: object.id().0,
                    to: target.id().0,
                    edges: registry.names(&kept),
                    probability: registry.probability(object, &target, &kept).value(),
                });
            }
        }

        let nodes = all
            .iter()
            .filter(|object| options.include_isolated || connected.contains(&object.id()))
            .map(|object| ExportNode {
                id: object.id().0,
                label: object.label(),
                kind: object.object_type().to_string(),
                tags: object.tags(),
                attributes: attributes
                    .iter()
                    .filter_map(|(name, attribute)| {
                        object.get(*attribute).map(|values| {
                            let rendered = values.iter().map(AttributeValue::to_string).collect();
                            (name.clone(), rendered)
                        })
                    })
                    .collect(),
            })
            .collect();

        Self {
            generated: Utc::now(),
            nodes,
            edges,
        }
    }

    #[must_use]
    pub fn node(&self, id: u64) -> Option<&ExportNode> {
        self.nodes
            .binary_search_by_key(&id, |node| node.id)
            .ok()
            .map(|index| &self.nodes[index])
    }
}

/// Export plus run statistics, as written by the binary.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub stats: StoreStats,
    pub graph: GraphExport,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Schema;

    #[test]
    fn hidden_edges_are_dropped_by_default() {
        let schema = Schema::new();
        let name = schema.core().name;
        let owns = schema.edges().define("Owns").register().expect("edge");
        let internal = schema.edges().define("Internal").hidden().register().expect("edge");
        let objects = Objects::new(&schema);
        let a = objects.add_new([(name, AttributeValue::from("a"))]).expect("a");
        let b = objects.add_new([(name, AttributeValue::from("b"))]).expect("b");
        let c = objects.add_new([(name, AttributeValue::from("c"))]).expect("c");
        a.edge_to(&b, owns);
        a.edge_to(&b, internal);
        b.edge_to(&c, internal);

        let export = GraphExport::from_objects(&objects, &ExportOptions::default());
        assert_eq!(export.edges.len(), 1);
        assert_eq!(export.edges[0].edges, ["Owns"]);
        assert_eq!(export.edges[0].probability, 100);
        assert_eq!(export.nodes.len(), 2);
        assert_eq!(export.node(a.id().0).map(|n| n.label.as_str()), Some("a"));

        let everything = GraphExport::from_objects(
            &objects,
            &ExportOptions {
                include_hidden: true,
                include_isolated: true,
                ..ExportOptions::default()
            },
        );
        assert_eq!(everything.edges.len(), 2);
        assert_eq!(everything.nodes.len(), 4);
    }

    #[test]
    fn selected_attributes_are_rendered() {
        let schema = Schema::new();
        let core = *schema.core();
        let owns = schema.edges().define("Owns").register().expect("edge");
        let objects = Objects::new(&schema);
        let a = objects
            .add_new([(core.object_sid, AttributeValue::Sid("S-1-5-11".parse().expect("sid")))])
            .expect("a");
        let b = objects.add_new([]).expect("b");
        a.edge_to(&b, owns);

        let export = GraphExport::from_objects(
            &objects,
            &ExportOptions {
                attributes: vec!["objectSid".into(), "noSuchAttribute".into()],
                ..ExportOptions::default()
            },
        );
        let node = export.node(a.id().0).expect("node");
        assert_eq!(node.attributes.get("objectSid"), Some(&vec!["S-1-5-11".to_string()]));
        assert!(export.node(b.id().0).expect("node").attributes.is_empty());
    }
}
