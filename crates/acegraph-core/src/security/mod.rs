//! # Security Descriptors
//!
//! Binary security descriptor parsing and access evaluation.
//!
//! - `rights` - access mask constants and generic right expansion
//! - `descriptor` - self-relative descriptor parser and encoder
//! - `acl` - allow/deny evaluation with object-type scoping

pub mod acl;
pub mod descriptor;
pub mod rights;

pub use acl::AccessRequest;
pub use descriptor::{Ace, AceType, Acl, SecurityDescriptor, ace_flags, control};
