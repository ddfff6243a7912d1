//! # Active Directory Analysis
//!
//! The catalogue that turns collected directory objects into graph edges:
//! - `attributes` / `edges` - the directory attributes and edge types
//! - `guids` - schema GUIDs matched against ACE object types
//! - the processors, one module per concern, registered by [`register`]
//!
//! All shared state (trusts, warning counters) lives in one [`AdContext`]
//! built at registration and handed to every processor.

pub mod attributes;
pub mod edges;
pub mod guids;

mod accounts;
mod acl;
mod basics;
mod gpo;
mod hierarchy;
mod machines;
mod membership;

pub use attributes::AdAttributes;
pub use edges::AdEdges;

use crate::merge::MergeHint;
use crate::primitives::MAX_TRAVERSAL_DEPTH;
use crate::schema::CoreAttributes;
use crate::trust::TrustMap;
use crate::{
    AttributeValue, GraphError, Object, ObjectType, Objects, Pipeline, ProcessPriority, Schema, Sid,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Tags set on accounts from userAccountControl.
pub mod tags {
    pub const ACCOUNT_ENABLED: &str = "account_enabled";
    pub const ACCOUNT_DISABLED: &str = "account_disabled";
    pub const PASSWORD_NEVER_EXPIRES: &str = "password_never_expires";
    pub const PASSWORD_NOT_REQUIRED: &str = "password_not_required";
    pub const UNCONSTRAINED_DELEGATION: &str = "unconstrained_delegation";
    pub const CONSTRAINED_DELEGATION: &str = "constrained_delegation";
    pub const DONT_REQ_PREAUTH: &str = "dont_req_preauth";
    pub const LAPS: &str = "laps";
}

// =============================================================================
// OPTIONS & CONTEXT
// =============================================================================

/// Knobs for one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// Worker threads for parallel processors. 0 means one per core.
    pub workers: usize,
    /// Depth cap for nested group resolution.
    pub max_traversal_depth: usize,
    /// Warnings of one kind logged before the rest are only counted.
    pub warning_limit: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            workers: 0,
            max_traversal_depth: MAX_TRAVERSAL_DEPTH,
            warning_limit: 10,
        }
    }
}

/// Per-kind warning counters shared by all processors of a run.
#[derive(Debug, Default)]
pub struct WarningLimiter {
    limit: usize,
    seen: DashMap<&'static str, AtomicUsize>,
}

impl WarningLimiter {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            seen: DashMap::new(),
        }
    }

    /// Count one warning of `kind`; true while it should still be logged.
    pub fn allow(&self, kind: &'static str) -> bool {
        let count = self
            .seen
            .entry(kind)
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
        count < self.limit
    }

    /// Warnings counted but not logged, by kind.
    #[must_use]
    pub fn suppressed(&self) -> Vec<(&'static str, usize)> {
        let mut out: Vec<(&'static str, usize)> = self
            .seen
            .iter()
            .map(|entry| (*entry.key(), entry.value().load(Ordering::Relaxed)))
            .filter(|(_, count)| *count > self.limit)
            .map(|(kind, count)| (kind, count - self.limit))
            .collect();
        out.sort_unstable();
        out
    }
}

/// Everything the processors share.
pub struct AdContext {
    pub attributes: AdAttributes,
    pub edges: AdEdges,
    pub core: CoreAttributes,
    pub trusts: TrustMap,
    pub options: AnalysisOptions,
    pub warnings: WarningLimiter,
}

impl AdContext {
    /// Stored object for a well-known SID. Its absence is fatal.
    pub(crate) fn well_known(&self, objects: &Objects, sid: &Sid) -> Result<Arc<Object>, GraphError> {
        objects
            .find_multi(self.core.object_sid, &AttributeValue::Sid(sid.clone()))
            .into_iter()
            .next()
            .ok_or_else(|| {
                GraphError::MissingPrerequisite(format!(
                    "well-known principal {} ({sid}) is missing",
                    sid.well_known_name().unwrap_or("unnamed")
                ))
            })
    }

    /// Log a local data-quality problem, rate-limited per kind.
    pub(crate) fn warn(&self, kind: &'static str, object: &Object, message: &str) {
        if self.warnings.allow(kind) {
            tracing::warn!(kind, object = %object.label(), id = %object.id(), "{}", message);
        }
    }
}

/// Visit every object in order, stopping at the first error.
pub(crate) fn try_iterate<F>(objects: &Objects, mut visit: F) -> Result<(), GraphError>
where
    F: FnMut(&Arc<Object>) -> Result<(), GraphError>,
{
    let mut failure = None;
    objects.iterate(|object| match visit(object) {
        Ok(()) => true,
        Err(e) => {
            failure = Some(e);
            false
        }
    });
    failure.map_or(Ok(()), Err)
}

/// Parallel [`try_iterate`]. Workers stop claiming objects after an error;
/// the first error is returned.
pub(crate) fn try_iterate_parallel<F>(
    objects: &Objects,
    workers: usize,
    visit: F,
) -> Result<(), GraphError>
where
    F: Fn(&Arc<Object>) -> Result<(), GraphError> + Sync,
{
    let failure = Mutex::new(None);
    objects.iterate_parallel(workers, |object| match visit(object) {
        Ok(()) => true,
        Err(e) => {
            let mut first = failure.lock();
            if first.is_none() {
                *first = Some(e);
            }
            false
        }
    });
    failure.into_inner().map_or(Ok(()), Err)
}

// =============================================================================
// REGISTRATION
// =============================================================================

type Step = fn(&AdContext, &Objects) -> Result<(), GraphError>;

fn add(
    pipeline: &mut Pipeline,
    ctx: &Arc<AdContext>,
    description: &str,
    priority: ProcessPriority,
    step: Step,
) {
    let ctx = Arc::clone(ctx);
    pipeline.add_processor(description, priority, move |objects| step(&ctx, objects));
}

/// Register the directory attributes, edge types, merge approvers and every
/// processor on `schema` and `pipeline`.
///
/// Edge registration is not repeatable, so call this once per schema.
pub fn register(
    schema: &Arc<Schema>,
    pipeline: &mut Pipeline,
    options: AnalysisOptions,
) -> Result<Arc<AdContext>, GraphError> {
    let ctx = Arc::new(AdContext {
        attributes: AdAttributes::register(schema.attributes())?,
        edges: AdEdges::register(schema.edges())?,
        core: *schema.core(),
        trusts: TrustMap::new(),
        options,
        warnings: WarningLimiter::new(options.warning_limit),
    });

    register_approvers(schema);

    use ProcessPriority::*;
    add(pipeline, &ctx, "Adding well-known principals", BeforeMergeLow, basics::well_known_principals);
    add(pipeline, &ctx, "Computing domain context", BeforeMergeLow, basics::domain_context);
    add(pipeline, &ctx, "Assigning object types", BeforeMergeLow, basics::object_types);
    add(pipeline, &ctx, "Resolving down-level logon names", BeforeMergeLow, basics::down_level_logon_names);

    add(pipeline, &ctx, "Checking required principals", BeforeMerge, basics::require_principals);
    add(pipeline, &ctx, "Creating machines for computer accounts", BeforeMerge, machines::create_machines);

    add(pipeline, &ctx, "Linking container hierarchy", BeforeMergeHigh, hierarchy::link_parents);
    add(pipeline, &ctx, "Tagging account flags", BeforeMergeHigh, accounts::account_flags);
    add(pipeline, &ctx, "Linking primary groups", BeforeMergeHigh, accounts::primary_groups);
    add(pipeline, &ctx, "Recording domain trusts", BeforeMergeHigh, accounts::record_trusts);

    add(pipeline, &ctx, "Analyzing security descriptors", BeforeMergeFinal, acl::security_descriptors);
    add(pipeline, &ctx, "Analyzing delegation", BeforeMergeFinal, acl::delegation);
    add(pipeline, &ctx, "Analyzing LAPS password readers", BeforeMergeFinal, acl::laps_passwords);
    add(pipeline, &ctx, "Analyzing managed service account readers", BeforeMergeFinal, acl::gmsa_passwords);
    add(pipeline, &ctx, "Analyzing roastable accounts", BeforeMergeFinal, acl::roastable_accounts);
    add(pipeline, &ctx, "Analyzing SID history", BeforeMergeFinal, acl::sid_history);

    add(pipeline, &ctx, "Resolving group membership", AfterMergeLow, membership::group_membership);
    add(pipeline, &ctx, "Linking foreign identities", AfterMergeLow, membership::foreign_identities);
    add(pipeline, &ctx, "Linking group policies", AfterMergeLow, gpo::affected_by_gpo);
    add(pipeline, &ctx, "Naming well-known principals", AfterMergeLow, membership::well_known_names);

    add(pipeline, &ctx, "Resolving nested group membership", AfterMerge, membership::indirect_membership);

    add(pipeline, &ctx, "Summarizing warnings", AfterMergeFinal, report_warnings);

    tracing::info!(
        attributes = schema.attributes().len(),
        edges = schema.edges().len(),
        processors = pipeline.len(),
        "analysis catalogue registered"
    );
    Ok(ctx)
}

fn register_approvers(schema: &Schema) {
    schema.approvers().add("Machines only merge with machines", |existing, incoming| {
        let machines = [existing, incoming]
            .iter()
            .filter(|o| o.object_type() == ObjectType::Machine)
            .count();
        match machines {
            1 => Err(GraphError::DontMerge("machine with non-machine".to_string())),
            2 => Ok(MergeHint::Preferred),
            _ => Ok(MergeHint::Neutral),
        }
    });

    // BUILTIN groups (S-1-5-32-*) carry the same SID in every domain.
    let context = schema.core().domain_context;
    schema.approvers().add("Domains stay apart", move |existing, incoming| {
        match (existing.first_string(context), incoming.first_string(context)) {
            (Some(a), Some(b)) if !a.eq_ignore_ascii_case(&b) => {
                Err(GraphError::DontMerge(format!("objects from {a} and {b}")))
            }
            _ => Ok(MergeHint::Neutral),
        }
    });

    // A foreign security principal shares its SID with the real account in
    // the other domain; the ForeignIdentity edge links them instead.
    schema.approvers().add("Foreign principals stay apart", |existing, incoming| {
        let foreign = [existing, incoming]
            .iter()
            .filter(|o| o.object_type() == ObjectType::ForeignSecurityPrincipal)
            .count();
        if foreign == 1 {
            Err(GraphError::DontMerge("foreign principal with local principal".to_string()))
        } else {
            Ok(MergeHint::Neutral)
        }
    });
}

fn report_warnings(ctx: &AdContext, objects: &Objects) -> Result<(), GraphError> {
    for (kind, count) in ctx.warnings.suppressed() {
        tracing::warn!(kind, count, "further warnings suppressed");
    }
    tracing::info!(objects = objects.len(), trusts = ctx.trusts.len(), "analysis finished");
    Ok(())
}

// =============================================================================
// DISTINGUISHED NAME HELPERS
// =============================================================================

/// The `DC=` suffix of a DN: the naming context of its domain.
pub(crate) fn domain_suffix(dn: &str) -> Option<&str> {
    let lower = dn.to_ascii_lowercase();
    let mut start = 0;
    loop {
        if lower[start..].starts_with("dc=") {
            return Some(&dn[start..]);
        }
        let next = crate::store::parent_dn(&dn[start..])?;
        start = dn.len() - next.len();
    }
}

/// `DC=corp,DC=example,DC=com` to `corp.example.com`.
pub(crate) fn dns_name(naming_context: &str) -> String {
    naming_context
        .split(',')
        .filter_map(|part| {
            let (key, value) = part.trim().split_once('=')?;
            key.eq_ignore_ascii_case("dc").then(|| value.to_ascii_lowercase())
        })
        .collect::<Vec<_>>()
        .join(".")
}
