//! # Dataset Formats
//!
//! Binary encoding of collected datasets. File I/O lives in the app layer;
//! this module only transforms bytes.

pub mod dataset;

pub use dataset::{
    Dataset, DatasetCompatibility, DatasetHeader, KnownCollector, LoadSummary, RawObject,
};
