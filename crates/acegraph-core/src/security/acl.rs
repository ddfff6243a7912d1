//! # ACL Evaluation
//!
//! Access checks against a DACL for a requested right and optional
//! object-type GUID.
//!
//! Rules:
//! - Stored generic bits are expanded before any comparison.
//! - Inherit-only entries never apply to the object itself.
//! - An entry's object type matches when it is absent/nil, or equal to the
//!   requested GUID. A scoped entry does not satisfy an unscoped request.
//! - An entry with an inherited-object-type applies only to objects whose
//!   class list contains that GUID.
//! - An allow entry grants when its mask holds every requested bit.
//! - A matching deny entry for the same trustee vetoes wherever it sits in
//!   the list.

use super::descriptor::{Ace, Acl, SecurityDescriptor};
use super::rights::expand_generic;
use crate::Sid;
use uuid::Uuid;

/// One access check.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    /// Requested rights, already expanded (no generic bits).
    pub rights: u32,
    /// Attribute, property set, extended right or child class the request is
    /// scoped to. `None` asks for rights on the whole object.
    pub object_type: Option<Uuid>,
    /// schemaIDGUIDs of the classes of the object being checked.
    pub object_classes: &'a [Uuid],
}

impl<'a> AccessRequest<'a> {
    #[must_use]
    pub fn new(rights: u32) -> Self {
        Self {
            rights,
            object_type: None,
            object_classes: &[],
        }
    }

    #[must_use]
    pub fn scoped(mut self, object_type: Uuid) -> Self {
        self.object_type = Some(object_type);
        self
    }

    #[must_use]
    pub fn on_classes(mut self, object_classes: &'a [Uuid]) -> Self {
        self.object_classes = object_classes;
        self
    }
}

impl Ace {
    /// Mask with generic bits expanded.
    #[must_use]
    pub fn effective_mask(&self) -> u32 {
        expand_generic(self.mask)
    }

    /// Whether this entry speaks about the requested object type and applies
    /// to the object's classes.
    #[must_use]
    pub fn applies_to(&self, request: &AccessRequest<'_>) -> bool {
        if self.is_inherit_only() {
            return false;
        }
        if let Some(class) = self.inherited_object_type.filter(|g| !g.is_nil()) {
            if !request.object_classes.contains(&class) {
                return false;
            }
        }
        match self.object_type.filter(|g| !g.is_nil()) {
            None => true,
            Some(scope) => request.object_type == Some(scope),
        }
    }

    /// Allow entry granting every requested bit.
    ///
    /// The request must be a subset of the expanded mask. An entry that
    /// overlaps only part of a compound request (for example one bit of
    /// `GENERIC_WRITE`) does not grant it; ask for single rights to test
    /// them one at a time.
    #[must_use]
    pub fn grants(&self, request: &AccessRequest<'_>) -> bool {
        self.ace_type.is_allow()
            && request.rights != 0
            && self.effective_mask() & request.rights == request.rights
            && self.applies_to(request)
    }

    /// Deny entry covering any requested bit.
    #[must_use]
    pub fn denies(&self, request: &AccessRequest<'_>) -> bool {
        self.ace_type.is_deny()
            && self.effective_mask() & request.rights != 0
            && self.applies_to(request)
    }
}

impl Acl {
    /// True if `trustee` has a matching deny entry anywhere in the list.
    #[must_use]
    pub fn is_denied(&self, trustee: &Sid, request: &AccessRequest<'_>) -> bool {
        self.entries
            .iter()
            .any(|ace| ace.sid == *trustee && ace.denies(request))
    }

    /// True if `trustee` is granted the request and not denied it.
    #[must_use]
    pub fn is_allowed(&self, trustee: &Sid, request: &AccessRequest<'_>) -> bool {
        self.entries
            .iter()
            .any(|ace| ace.sid == *trustee && ace.grants(request))
            && !self.is_denied(trustee, request)
    }

    /// Every distinct trustee the request is granted to, in list order.
    #[must_use]
    pub fn allowed_trustees(&self, request: &AccessRequest<'_>) -> Vec<Sid> {
        let mut trustees: Vec<Sid> = Vec::new();
        for ace in &self.entries {
            if ace.grants(request)
                && !trustees.contains(&ace.sid)
                && !self.is_denied(&ace.sid, request)
            {
                trustees.push(ace.sid.clone());
            }
        }
        trustees
    }

    /// True if the list contains any deny entry.
    #[must_use]
    pub fn has_deny(&self) -> bool {
        self.entries.iter().any(|ace| ace.ace_type.is_deny())
    }
}

impl SecurityDescriptor {
    /// Evaluate one request for one trustee. No DACL means no grants.
    #[must_use]
    pub fn evaluate(&self, trustee: &Sid, request: &AccessRequest<'_>) -> bool {
        self.dacl
            .as_ref()
            .is_some_and(|dacl| dacl.is_allowed(trustee, request))
    }

    /// Trustees granted the request by the DACL.
    #[must_use]
    pub fn allowed_trustees(&self, request: &AccessRequest<'_>) -> Vec<Sid> {
        self.dacl
            .as_ref()
            .map(|dacl| dacl.allowed_trustees(request))
            .unwrap_or_default()
    }
}
