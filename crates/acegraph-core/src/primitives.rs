//! # Engine Primitives
//!
//! Constants compiled into the engine. They are fixed at build time and
//! immutable at runtime.

/// Number of bits in an `EdgeBitmap`, and therefore the maximum number of
/// edge types a schema can register.
pub const EDGE_CAPACITY: usize = 512;

/// Number of `u64` words backing an `EdgeBitmap`.
pub const EDGE_WORDS: usize = EDGE_CAPACITY / 64;

/// Magic bytes for the dataset format header.
///
/// - File Header = Magic Bytes ("ACEG") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"ACEG";

/// Current dataset format version.
///
/// Increment this when making breaking changes to the dataset format.
pub const FORMAT_VERSION: u8 = 1;

/// Maximum depth of recursive edge traversal.
///
/// Membership chains and container hierarchies can contain cycles; every
/// traversal is clamped to this depth.
pub const MAX_TRAVERSAL_DEPTH: usize = 99;

/// Probability of an edge type that has no calculator bound.
pub const DEFAULT_PROBABILITY: u8 = 100;

/// Upper bound of any probability.
pub const MAX_PROBABILITY: u8 = 100;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum accepted size of an encoded dataset (1 GiB).
pub const MAX_DATASET_SIZE: usize = 1024 * 1024 * 1024;

/// Maximum accepted size of a raw security descriptor blob.
///
/// The on-disk format addresses offsets with u32 but real descriptors are
/// far below this.
pub const MAX_DESCRIPTOR_SIZE: usize = 1024 * 1024;

/// Maximum number of sub-authorities in a SID (MS-DTYP 2.4.2).
pub const MAX_SUB_AUTHORITIES: usize = 15;
