//! # Validation Tier Tests (T0-T3)
//!
//! If ANY tier fails, the analysis is INVALID.
//!
//! ## Tiers
//! - T0: Store Integrity
//! - T1: Identity Merging
//! - T2: Access Evaluation
//! - T3: Staged Analysis

use acegraph_core::analyze::{self, guids};
use acegraph_core::security::Ace;
use acegraph_core::security::descriptor::ace_flags;
use acegraph_core::security::rights::{DS_CONTROL_ACCESS, DS_WRITE_PROPERTY, GENERIC_ALL_BIT};
use acegraph_core::{
    AccessRequest, AnalysisOptions, AttributeValue, GraphError, MergeHint, ObjectType, Objects,
    Pipeline, ProcessPriority, Schema, SecurityDescriptor, Sid,
};
use std::sync::Arc;

fn sid(text: &str) -> Sid {
    text.parse().expect("sid")
}

// =============================================================================
// TIER T0: STORE INTEGRITY
// =============================================================================

mod t0_store_integrity {
    use super::*;

    /// T0.1: A unique value belongs to one object only.
    #[test]
    fn unique_values_are_exclusive() {
        let schema = Schema::new();
        let dn = schema.core().distinguished_name;
        let objects = Objects::new(&schema);

        objects
            .add_new([(dn, AttributeValue::from("CN=Alice,DC=corp"))])
            .expect("first");
        let second = objects.add_new([(dn, AttributeValue::from("cn=alice,dc=corp"))]);

        assert!(matches!(second, Err(GraphError::UniqueViolation { .. })));
        assert_eq!(objects.len(), 2); // root + alice
    }

    /// T0.2: Lookups ignore case and refuse ambiguity.
    #[test]
    fn find_is_case_insensitive_and_exact() {
        let schema = Schema::new();
        let core = schema.core();
        let objects = Objects::new(&schema);
        let shared = AttributeValue::Sid(sid("S-1-5-21-1-2-3-500"));

        let alice = objects
            .add_new([(core.distinguished_name, AttributeValue::from("CN=Alice,DC=corp"))])
            .expect("alice");
        objects.add_new([(core.object_sid, shared.clone())]).expect("a");
        objects.add_new([(core.object_sid, shared.clone())]).expect("b");

        let found = objects
            .find(core.distinguished_name, &AttributeValue::from("CN=ALICE,DC=CORP"))
            .expect("found");
        assert_eq!(found.id(), alice.id());
        assert!(objects.find(core.object_sid, &shared).is_none());
        assert_eq!(objects.find_multi(core.object_sid, &shared).len(), 2);
    }

    /// T0.3: Edges are recorded on both ends and self-loops are ignored.
    #[test]
    fn edges_are_symmetric() {
        let schema = Schema::new();
        let owns = schema.edges().define("Owns").register().expect("edge");
        let objects = Objects::new(&schema);
        let a = objects.add_new([]).expect("a");
        let b = objects.add_new([]).expect("b");

        a.edge_to(&b, owns);
        a.edge_to(&a, owns);

        assert!(a.has_edge_to(b.id(), owns));
        assert_eq!(
            b.edge_bitmap(a.id(), acegraph_core::Direction::In)
                .map(|bitmap| bitmap.is_set(owns)),
            Some(true)
        );
        assert!(!a.has_edge_to(a.id(), owns));
    }
}

// =============================================================================
// TIER T1: IDENTITY MERGING
// =============================================================================

mod t1_identity_merging {
    use super::*;

    /// T1.1: Objects sharing a SID collapse into one, unioning values and tags.
    #[test]
    fn shared_sid_merges() {
        let schema = Schema::new();
        let core = *schema.core();
        let objects = Objects::new(&schema);
        let account = AttributeValue::Sid(sid("S-1-5-21-9-9-9-1001"));

        let first = objects
            .add_new([
                (core.object_sid, account.clone()),
                (core.distinguished_name, AttributeValue::from("CN=Svc,DC=corp")),
                (core.description, AttributeValue::from("directory")),
            ])
            .expect("first");
        first.tag("collected");

        let incoming = acegraph_core::Object::with_values(
            &schema,
            [
                (core.object_sid, account.clone()),
                (core.name, AttributeValue::from("svc")),
                (core.description, AttributeValue::from("host")),
            ],
        );
        incoming.tag("local");
        let merged = objects.add_or_merge(incoming).expect("merge");

        assert_eq!(merged.id(), first.id());
        assert_eq!(objects.find_multi(core.object_sid, &account).len(), 1);
        assert_eq!(merged.get(core.description).map(|v| v.len()), Some(2));
        assert_eq!(merged.first_string(core.name).as_deref(), Some("svc"));
        assert!(merged.has_tag("collected") && merged.has_tag("local"));
    }

    /// T1.2: A veto keeps identities apart.
    #[test]
    fn approver_veto_keeps_objects_apart() {
        let schema = Schema::new();
        let core = *schema.core();
        schema.approvers().add("Never merge", |_, _| {
            Err(GraphError::DontMerge("test veto".to_string()))
        });
        let objects = Objects::new(&schema);
        let shared = AttributeValue::Sid(sid("S-1-5-21-9-9-9-1002"));

        let first = objects.add_new([(core.object_sid, shared.clone())]).expect("first");
        let result = objects.merge(&first, &acegraph_core::Object::with_values(&schema, []));
        assert!(matches!(result, Err(GraphError::DontMerge(_))));

        objects
            .add_or_merge(acegraph_core::Object::with_values(
                &schema,
                [(core.object_sid, shared.clone())],
            ))
            .expect("added");
        assert_eq!(objects.find_multi(core.object_sid, &shared).len(), 2);
    }

    /// T1.3: Merging twice changes nothing.
    #[test]
    fn merge_is_idempotent() {
        let schema = Schema::new();
        let core = *schema.core();
        let objects = Objects::new(&schema);
        let existing = objects
            .add_new([(core.object_class, AttributeValue::from("user"))])
            .expect("existing");
        let incoming = acegraph_core::Object::with_values(
            &schema,
            [(core.object_class, AttributeValue::from("person"))],
        );

        assert_eq!(objects.merge(&existing, &incoming).expect("merge"), MergeHint::Neutral);
        let after_first = existing.get(core.object_class);
        objects.merge(&existing, &incoming).expect("again");
        assert_eq!(existing.get(core.object_class), after_first);
        assert_eq!(after_first.map(|v| v.len()), Some(2));
    }
}

// =============================================================================
// TIER T2: ACCESS EVALUATION
// =============================================================================

mod t2_access_evaluation {
    use super::*;

    /// T2.1: A deny anywhere in the DACL wins over any allow.
    #[test]
    fn deny_takes_precedence() {
        let user = sid("S-1-5-21-1-2-3-1100");
        let descriptor = SecurityDescriptor::new().with_dacl(vec![
            Ace::allow(user.clone(), DS_WRITE_PROPERTY),
            Ace::deny(user.clone(), DS_WRITE_PROPERTY),
        ]);

        assert!(!descriptor.evaluate(&user, &AccessRequest::new(DS_WRITE_PROPERTY)));
    }

    /// T2.2: Scoped grants answer only their own object type.
    #[test]
    fn object_type_scoping() {
        let user = sid("S-1-5-21-1-2-3-1101");
        let descriptor = SecurityDescriptor::new().with_dacl(vec![
            Ace::allow(user.clone(), DS_CONTROL_ACCESS).with_object_type(guids::RESET_PASSWORD),
        ]);
        let reset = AccessRequest::new(DS_CONTROL_ACCESS).scoped(guids::RESET_PASSWORD);
        let replicate =
            AccessRequest::new(DS_CONTROL_ACCESS).scoped(guids::DS_REPLICATION_GET_CHANGES);

        assert!(descriptor.evaluate(&user, &reset));
        assert!(!descriptor.evaluate(&user, &replicate));
        assert!(!descriptor.evaluate(&user, &AccessRequest::new(DS_CONTROL_ACCESS)));

        let unscoped = SecurityDescriptor::new()
            .with_dacl(vec![Ace::allow(user.clone(), DS_CONTROL_ACCESS)]);
        assert!(unscoped.evaluate(&user, &reset));
    }

    /// T2.3: Generic rights expand, inherit-only entries do not apply.
    #[test]
    fn generic_and_inherit_only() {
        let user = sid("S-1-5-21-1-2-3-1102");
        let generic = SecurityDescriptor::new()
            .with_dacl(vec![Ace::allow(user.clone(), GENERIC_ALL_BIT)]);
        assert!(generic.evaluate(&user, &AccessRequest::new(DS_WRITE_PROPERTY)));

        let inherit_only = SecurityDescriptor::new().with_dacl(vec![
            Ace::allow(user.clone(), GENERIC_ALL_BIT).with_flags(ace_flags::INHERIT_ONLY),
        ]);
        assert!(!inherit_only.evaluate(&user, &AccessRequest::new(DS_WRITE_PROPERTY)));
    }

    /// T2.4: The binary form survives a round trip with its entries.
    #[test]
    fn descriptor_bytes_parse_back() {
        let owner = sid("S-1-5-21-1-2-3-512");
        let descriptor = SecurityDescriptor::new()
            .with_owner(owner.clone())
            .with_dacl(vec![
                Ace::deny(sid("S-1-1-0"), DS_WRITE_PROPERTY),
                Ace::allow(owner.clone(), DS_CONTROL_ACCESS).with_object_type(guids::MEMBER),
            ]);

        let parsed = SecurityDescriptor::parse(&descriptor.to_bytes()).expect("parse");
        assert_eq!(parsed.owner, Some(owner));
        assert_eq!(parsed.dacl_entries(), descriptor.dacl_entries());
    }
}

// =============================================================================
// TIER T3: STAGED ANALYSIS
// =============================================================================

mod t3_staged_analysis {
    use super::*;
    use acegraph_core::formats::{Dataset, DatasetHeader, RawObject};
    use acegraph_core::{EdgeBitmap, Traversal};
    use chrono::Utc;
    use parking_lot::Mutex;

    /// T3.1: A failing processor stops the run before later stages.
    #[test]
    fn processor_error_aborts_run() {
        let schema = Schema::new();
        let ran = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        {
            let ran = Arc::clone(&ran);
            pipeline.add_processor("fails", ProcessPriority::BeforeMerge, move |_| {
                ran.lock().push("fails");
                Err(GraphError::MissingPrerequisite("nothing collected".to_string()))
            });
        }
        {
            let ran = Arc::clone(&ran);
            pipeline.add_processor("never", ProcessPriority::AfterMergeLow, move |_| {
                ran.lock().push("never");
                Ok(())
            });
        }

        let result = pipeline.run(&schema, vec![Objects::new(&schema)]);
        assert!(matches!(result, Err(GraphError::MissingPrerequisite(_))));
        assert_eq!(*ran.lock(), vec!["fails"]);
    }

    /// T3.2: Missing or broken descriptors are skipped, not fatal.
    #[test]
    fn missing_descriptor_is_harmless() {
        let schema = Schema::new();
        let mut pipeline = Pipeline::new();
        let ctx = analyze::register(&schema, &mut pipeline, AnalysisOptions::default())
            .expect("register");
        let core = *schema.core();
        let objects = Objects::new(&schema);
        objects
            .add_new([
                (core.distinguished_name, AttributeValue::from("CN=NoAcl,DC=corp")),
                (core.object_class, AttributeValue::from("user")),
            ])
            .expect("no acl");
        objects
            .add_new([
                (core.distinguished_name, AttributeValue::from("CN=Broken,DC=corp")),
                (core.security_descriptor, AttributeValue::Blob(vec![1, 0, 4])),
            ])
            .expect("broken");

        let merged = pipeline.run(&schema, vec![objects]).expect("run");
        let everyone = merged
            .find(core.object_sid, &AttributeValue::Sid(sid("S-1-1-0")))
            .expect("everyone");
        assert_eq!(everyone.first_string(core.display_name).as_deref(), Some("Everyone"));
        assert!(ctx.warnings.suppressed().is_empty());
    }

    /// T3.4: BUILTIN groups share a SID across domains but stay separate.
    #[test]
    fn builtin_groups_stay_per_domain() {
        let schema = Schema::new();
        let mut pipeline = Pipeline::new();
        let ctx = analyze::register(&schema, &mut pipeline, AnalysisOptions::default())
            .expect("register");
        let core = *schema.core();

        let domain = |dc: &str, domain_sid: &str, user: &str| {
            let header = DatasetHeader::new("directory", "1.0.0", "abc123", Utc::now());
            let mut dataset = Dataset::new(header);
            dataset.push(
                RawObject::new()
                    .with("distinguishedName", dc)
                    .with("objectClass", "domainDNS")
                    .with("objectSid", sid(domain_sid)),
            );
            dataset.push(
                RawObject::new()
                    .with("distinguishedName", format!("CN=Administrators,CN=Builtin,{dc}"))
                    .with("objectClass", "group")
                    .with("objectSid", sid("S-1-5-32-544")),
            );
            dataset.push(
                RawObject::new()
                    .with("distinguishedName", format!("CN={user},CN=Users,{dc}"))
                    .with("objectClass", "user")
                    .with("objectSid", sid(&format!("{domain_sid}-1100")))
                    .with("memberOf", format!("CN=Administrators,CN=Builtin,{dc}")),
            );
            dataset
        };

        let mut sources = Vec::new();
        for dataset in [
            domain("DC=a,DC=test", "S-1-5-21-1-1-1", "Alice"),
            domain("DC=b,DC=test", "S-1-5-21-2-2-2", "Bob"),
        ] {
            let objects = Objects::new(&schema);
            dataset.load_into(&objects).expect("load");
            sources.push(objects);
        }
        let merged = pipeline.run(&schema, sources).expect("run");

        let admins = AttributeValue::Sid(sid("S-1-5-32-544"));
        assert_eq!(merged.find_multi(core.object_sid, &admins).len(), 2);
        let everyone = AttributeValue::Sid(sid("S-1-1-0"));
        assert_eq!(merged.find_multi(core.object_sid, &everyone).len(), 1);

        let dn = |text: &str| {
            merged
                .find(core.distinguished_name, &AttributeValue::from(text))
                .expect(text)
        };
        let admins_a = dn("CN=Administrators,CN=Builtin,DC=a,DC=test");
        let admins_b = dn("CN=Administrators,CN=Builtin,DC=b,DC=test");
        let bob = dn("CN=Bob,CN=Users,DC=b,DC=test");
        assert!(!admins_b.has_tag(acegraph_core::store::PLACEHOLDER_TAG));
        assert!(bob.has_edge_to(admins_b.id(), ctx.edges.member_of_group));
        assert!(!bob.has_edge_to(admins_a.id(), ctx.edges.member_of_group));
    }

    /// T3.3: Two collectors, one identity, one attack path.
    #[test]
    fn two_sources_produce_reset_password_path() {
        let schema = Schema::new();
        let mut pipeline = Pipeline::new();
        let options = AnalysisOptions {
            workers: 2,
            ..AnalysisOptions::default()
        };
        let ctx = analyze::register(&schema, &mut pipeline, options).expect("register");
        let core = *schema.core();

        let helpdesk_sid = sid("S-1-5-21-1-2-3-1200");
        let bob_sid = sid("S-1-5-21-1-2-3-1300");
        let bob_acl = SecurityDescriptor::new()
            .with_owner(sid("S-1-5-21-1-2-3-512"))
            .with_dacl(vec![
                Ace::allow(helpdesk_sid.clone(), DS_CONTROL_ACCESS)
                    .with_object_type(guids::RESET_PASSWORD),
            ]);

        let header = |collector: &str| DatasetHeader::new(collector, "1.0.0", "abc123", Utc::now());
        let mut directory = Dataset::new(header("directory"));
        directory.push(
            RawObject::new()
                .with("distinguishedName", "DC=corp,DC=local")
                .with("objectClass", "domainDNS")
                .with("objectSid", sid("S-1-5-21-1-2-3")),
        );
        directory.push(
            RawObject::new()
                .with("distinguishedName", "CN=Helpdesk,CN=Users,DC=corp,DC=local")
                .with("objectClass", "group")
                .with("objectSid", helpdesk_sid.clone()),
        );
        directory.push(
            RawObject::new()
                .with("distinguishedName", "CN=Alice,CN=Users,DC=corp,DC=local")
                .with("objectClass", "user")
                .with("objectSid", sid("S-1-5-21-1-2-3-1100"))
                .with("memberOf", "CN=Helpdesk,CN=Users,DC=corp,DC=local")
                .with("userAccountControl", 512_i64),
        );
        directory.push(
            RawObject::new()
                .with("distinguishedName", "CN=Bob,CN=Users,DC=corp,DC=local")
                .with("objectClass", "user")
                .with("objectSid", bob_sid.clone())
                .with("userAccountControl", 512_i64)
                .with("nTSecurityDescriptor", AttributeValue::Blob(bob_acl.to_bytes())),
        );
        let mut host = Dataset::new(header("localmachine"));
        host.push(
            RawObject::new()
                .with("objectSid", bob_sid.clone())
                .with("description", "local administrator on WS01"),
        );

        let mut sources = Vec::new();
        for dataset in [&directory, &host] {
            let objects = Objects::new(&schema);
            dataset.load_into(&objects).expect("load");
            sources.push(objects);
        }
        let merged = pipeline.run(&schema, sources).expect("run");

        let bobs = merged.find_multi(core.object_sid, &AttributeValue::Sid(bob_sid));
        assert_eq!(bobs.len(), 1);
        let bob = &bobs[0];
        assert_eq!(bob.object_type(), ObjectType::User);
        assert!(bob.has(core.description));
        assert_eq!(
            merged
                .find_multi(core.object_sid, &AttributeValue::Sid(sid("S-1-1-0")))
                .len(),
            1
        );

        let dn = |text: &str| {
            merged
                .find(core.distinguished_name, &AttributeValue::from(text))
                .expect(text)
        };
        let alice = dn("CN=Alice,CN=Users,DC=corp,DC=local");
        let helpdesk = dn("CN=Helpdesk,CN=Users,DC=corp,DC=local");
        let users = dn("CN=Users,DC=corp,DC=local");
        assert!(users.has_tag(acegraph_core::store::PLACEHOLDER_TAG));
        assert!(users.has_edge_to(bob.id(), ctx.edges.contains));
        assert!(alice.has_edge_to(helpdesk.id(), ctx.edges.member_of_group));
        assert!(helpdesk.has_edge_to(bob.id(), ctx.edges.reset_password));

        let attack = EdgeBitmap::new()
            .set(ctx.edges.member_of_group)
            .set(ctx.edges.reset_password);
        let reached = Traversal::new(attack).reachable(&merged, &alice);
        assert_eq!(reached.get(&bob.id()), Some(&2));

        let everything = schema.edges().all();
        assert!(!Traversal::new(everything).reachable(&merged, &users).contains_key(&bob.id()));
        assert!(
            Traversal::new(everything)
                .include_untraversable()
                .reachable(&merged, &users)
                .contains_key(&bob.id())
        );
    }
}
