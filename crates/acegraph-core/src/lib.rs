//! # acegraph-core
//!
//! The security graph engine for acegraph - THE LOGIC.
//!
//! Collected directory and host objects are loaded into an attributed object
//! store, merged by identity, and analysed by staged processors that add
//! typed edges between objects. An edge states that the source can gain
//! control over, or act as, the target.
//!
//! ## Layers
//!
//! - `schema`, `attribute`, `edge`: runtime registries for attribute names,
//!   edge types and merge approvers
//! - `object`, `store`, `merge`: objects, the indexed store and the identity
//!   merge engine
//! - `security`, `sid`: binary security descriptors and access evaluation
//! - `pipeline`, `parallel`: the eight processing stages and the worker pool
//! - `analyze`: the Active Directory catalogue of attributes, edges and
//!   processors
//! - `formats`, `export`: dataset bytes in, graph snapshots out
//!
//! ## Architectural Constraints
//!
//! - No async, no network, no file I/O (the app layer owns I/O)
//! - Ordered containers wherever iteration order is observable
//! - Integer probabilities, no floats

// =============================================================================
// MODULES
// =============================================================================

pub mod analyze;
pub mod attribute;
pub mod edge;
pub mod export;
pub mod formats;
pub mod merge;
pub mod object;
pub mod parallel;
pub mod pipeline;
pub mod primitives;
pub mod schema;
pub mod security;
pub mod sid;
pub mod store;
pub mod traversal;
pub mod trust;
pub mod types;
pub mod value;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{Attribute, Edge, GraphError, ObjectId};

// =============================================================================
// RE-EXPORTS: Graph Engine
// =============================================================================

pub use attribute::{AttributeInfo, AttributeRegistry, AttributeType, TimeEncoding};
pub use edge::{EdgeBitmap, EdgeInfo, EdgeRegistry, Probability};
pub use merge::{MergeApprovers, MergeHint};
pub use object::{Direction, Object, ObjectType};
pub use schema::{CoreAttributes, Schema};
pub use sid::Sid;
pub use store::{Objects, StoreStats};
pub use traversal::Traversal;
pub use trust::{TrustDirection, TrustInfo, TrustMap, TrustPair};
pub use value::{AttributeValue, AttributeValues};

// =============================================================================
// RE-EXPORTS: Analysis
// =============================================================================

pub use analyze::{AdAttributes, AdContext, AdEdges, AnalysisOptions};
pub use pipeline::{Pipeline, ProcessPriority};
pub use security::{AccessRequest, SecurityDescriptor};

// =============================================================================
// RE-EXPORTS: Formats and Export
// =============================================================================

pub use export::{AnalysisReport, ExportOptions, GraphExport};
pub use formats::{Dataset, DatasetCompatibility, DatasetHeader, KnownCollector, RawObject};
