//! # Dataset Format
//!
//! A dataset is what one collector run produced: a header naming the
//! collector, followed by raw objects (attribute name → values).
//!
//! Format: Header (5 bytes) + postcard `DatasetHeader` + postcard objects.
//! - 4 bytes: Magic ("ACEG")
//! - 1 byte: Version
//!
//! The header is decoded on its own first, so a dataset can be inspected or
//! refused without decoding its objects. Size limits are checked before any
//! decoding.

use crate::primitives::{FORMAT_VERSION, MAGIC_BYTES, MAX_DATASET_SIZE};
use crate::{AttributeValue, GraphError, Object, Objects};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Size of magic plus version.
const PREAMBLE_SIZE: usize = 5;

// =============================================================================
// HEADER
// =============================================================================

/// Who collected a dataset, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetHeader {
    pub collector: String,
    pub version: String,
    pub commit: String,
    pub collected: DateTime<Utc>,
}

impl DatasetHeader {
    #[must_use]
    pub fn new(collector: &str, version: &str, commit: &str, collected: DateTime<Utc>) -> Self {
        Self {
            collector: collector.to_string(),
            version: version.to_string(),
            commit: commit.to_string(),
            collected,
        }
    }

    /// Judge the header against the collectors this build understands.
    ///
    /// Unknown collectors are refused. A known collector with a version not
    /// in its list is accepted but flagged; an empty version list accepts
    /// every version.
    #[must_use]
    pub fn compatibility(&self, known: &[KnownCollector]) -> DatasetCompatibility {
        let Some(collector) = known
            .iter()
            .find(|k| k.name.eq_ignore_ascii_case(&self.collector))
        else {
            return DatasetCompatibility::Rejected(format!(
                "unknown collector '{}'",
                self.collector
            ));
        };
        if collector.versions.is_empty() || collector.versions.iter().any(|v| *v == self.version) {
            DatasetCompatibility::Accepted
        } else {
            DatasetCompatibility::Flagged(format!(
                "{} version {} not among tested versions {:?}",
                self.collector, self.version, collector.versions
            ))
        }
    }
}

/// A collector this build knows how to read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownCollector {
    pub name: String,
    /// Versions known to work. Empty means any.
    #[serde(default)]
    pub versions: Vec<String>,
}

impl KnownCollector {
    #[must_use]
    pub fn any_version(name: &str) -> Self {
        Self {
            name: name.to_string(),
            versions: Vec::new(),
        }
    }
}

/// Outcome of the header check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetCompatibility {
    Accepted,
    /// Readable, but not a combination known to work.
    Flagged(String),
    Rejected(String),
}

impl DatasetCompatibility {
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

// =============================================================================
// OBJECTS
// =============================================================================

/// One collected object before attribute registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawObject {
    pub attributes: BTreeMap<String, Vec<AttributeValue>>,
}

impl RawObject {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value.
    #[must_use]
    pub fn with(mut self, attribute: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes
            .entry(attribute.to_string())
            .or_default()
            .push(value.into());
        self
    }
}

/// Header plus objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub header: DatasetHeader,
    pub objects: Vec<RawObject>,
}

/// What happened while loading a dataset into a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    /// Objects that collided with a unique value and could not be merged.
    pub rejected: usize,
    /// Values dropped because they could not be converted.
    pub invalid_values: usize,
}

impl Dataset {
    #[must_use]
    pub fn new(header: DatasetHeader) -> Self {
        Self {
            header,
            objects: Vec::new(),
        }
    }

    pub fn push(&mut self, object: RawObject) {
        self.objects.push(object);
    }

    /// Encode with magic and version.
    pub fn to_bytes(&self) -> Result<Vec<u8>, GraphError> {
        let header = postcard::to_stdvec(&self.header)
            .map_err(|e| GraphError::SerializationError(e.to_string()))?;
        let objects = postcard::to_stdvec(&self.objects)
            .map_err(|e| GraphError::SerializationError(e.to_string()))?;

        let mut result = Vec::with_capacity(PREAMBLE_SIZE + header.len() + objects.len());
        result.extend_from_slice(MAGIC_BYTES);
        result.push(FORMAT_VERSION);
        result.extend_from_slice(&header);
        result.extend_from_slice(&objects);
        Ok(result)
    }

    /// Decode only the header.
    pub fn read_header(bytes: &[u8]) -> Result<DatasetHeader, GraphError> {
        let (header, _) = split_header(bytes)?;
        Ok(header)
    }

    /// Decode header and objects.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GraphError> {
        let (header, rest) = split_header(bytes)?;
        let objects: Vec<RawObject> = postcard::from_bytes(rest).map_err(|e| {
            GraphError::SerializationError(format!("Failed to decode dataset objects: {e}"))
        })?;
        Ok(Self { header, objects })
    }

    /// Register attribute names, convert values to their declared kinds and
    /// add every object to `objects`, merging duplicate identities.
    ///
    /// Unconvertible values are dropped with a warning. An object whose
    /// unique value collides with an object it may not merge with is
    /// rejected with a warning. Other errors abort the load.
    pub fn load_into(&self, objects: &Objects) -> Result<LoadSummary, GraphError> {
        let schema = objects.schema();
        let registry = schema.attributes();
        let data_source = AttributeValue::from(self.header.collector.as_str());
        let mut summary = LoadSummary::default();

        for raw in &self.objects {
            let mut values = vec![(schema.core().data_source, data_source.clone())];
            for (name, raw_values) in &raw.attributes {
                let attribute = registry.lookup_or_register(name)?;
                let Some(info) = registry.info(attribute) else {
                    continue;
                };
                for value in raw_values {
                    match info.coerce(value.clone()) {
                        Ok(value) => values.push((attribute, value)),
                        Err(e) => {
                            summary.invalid_values += 1;
                            tracing::warn!(attribute = %name, error = %e, "dropping value");
                        }
                    }
                }
            }

            match objects.add_or_merge(Object::with_values(schema, values)) {
                Ok(_) => summary.loaded += 1,
                Err(e @ GraphError::UniqueViolation { .. }) => {
                    summary.rejected += 1;
                    tracing::warn!(error = %e, "rejected collected object");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            collector = %self.header.collector,
            loaded = summary.loaded,
            rejected = summary.rejected,
            invalid_values = summary.invalid_values,
            "dataset loaded"
        );
        Ok(summary)
    }
}

fn split_header(bytes: &[u8]) -> Result<(DatasetHeader, &[u8]), GraphError> {
    if bytes.len() < PREAMBLE_SIZE {
        return Err(GraphError::SerializationError(format!(
            "Data too short: minimum {PREAMBLE_SIZE} bytes required"
        )));
    }
    if bytes.len() > MAX_DATASET_SIZE {
        return Err(GraphError::SerializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_DATASET_SIZE
        )));
    }
    if &bytes[..4] != MAGIC_BYTES {
        return Err(GraphError::SerializationError("Invalid magic bytes".to_string()));
    }
    if bytes[4] != FORMAT_VERSION {
        return Err(GraphError::UnsupportedDataset(format!(
            "format version {} (expected {FORMAT_VERSION})",
            bytes[4]
        )));
    }
    postcard::take_from_bytes(&bytes[PREAMBLE_SIZE..])
        .map_err(|e| GraphError::SerializationError(format!("Failed to decode header: {e}")))
}
