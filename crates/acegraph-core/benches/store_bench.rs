//! # Store Benchmarks
//!
//! Performance benchmarks for acegraph-core store and analysis operations.
//!
//! Run with: `cargo bench -p acegraph-core`

use acegraph_core::security::Ace;
use acegraph_core::security::rights::GENERIC_ALL_BIT;
use acegraph_core::{
    AccessRequest, AnalysisOptions, AttributeValue, Edge, EdgeBitmap, ExportOptions, GraphExport,
    Objects, Pipeline, Schema, SecurityDescriptor, Sid, Traversal, analyze,
};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn user_sid(rid: usize) -> Sid {
    Sid::from_parts(5, &[21, 100, 200, 300, 1000 + rid as u32])
}

/// Store with `size` users chained by one edge type.
fn create_chain(size: usize) -> (Arc<Schema>, Objects, Edge) {
    let schema = Schema::new();
    let edge = schema.edges().define("Next").register().expect("edge");
    let core = *schema.core();
    let objects = Objects::new(&schema);
    let mut previous: Option<Arc<acegraph_core::Object>> = None;

    for i in 0..size {
        let object = objects
            .add_new([
                (core.distinguished_name, AttributeValue::from(format!("CN=User{i},DC=bench"))),
                (core.object_sid, AttributeValue::Sid(user_sid(i))),
            ])
            .expect("insert");
        if let Some(previous) = &previous {
            previous.edge_to(&object, edge);
        }
        previous = Some(object);
    }
    (schema, objects, edge)
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_object_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("object_insertion");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| black_box(create_chain(size)));
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    for size in [100, 1000, 10000].iter() {
        let (schema, objects, _) = create_chain(*size);
        let core = *schema.core();
        let dn = AttributeValue::from(format!("cn=user{},dc=bench", size / 2));
        let sid = AttributeValue::Sid(user_sid(size / 2));

        group.bench_with_input(BenchmarkId::new("unique", size), size, |b, _| {
            b.iter(|| black_box(objects.find(core.distinguished_name, &dn)));
        });
        group.bench_with_input(BenchmarkId::new("multi", size), size, |b, _| {
            b.iter(|| black_box(objects.find_multi(core.object_sid, &sid)));
        });
    }

    group.finish();
}

fn bench_edge_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("edge_insertion");

    for size in [100, 1000].iter() {
        let (_, objects, edge) = create_chain(*size);
        let all = objects.all();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                for pair in all.windows(2) {
                    pair[1].edge_to(&pair[0], edge);
                }
            });
        });
    }

    group.finish();
}

fn bench_parallel_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_iteration");
    let (schema, objects, _) = create_chain(10000);
    let sid = schema.core().object_sid;

    for workers in [1, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &workers| {
            b.iter(|| {
                let hits = AtomicUsize::new(0);
                objects.iterate_parallel(workers, |object| {
                    if object.has(sid) {
                        hits.fetch_add(1, Ordering::Relaxed);
                    }
                    true
                });
                black_box(hits.into_inner())
            });
        });
    }

    group.finish();
}

fn bench_traversal(c: &mut Criterion) {
    let mut group = c.benchmark_group("traversal");

    for size in [100, 500, 1000].iter() {
        let (schema, objects, edge) = create_chain(*size);
        let start = objects
            .find(
                schema.core().distinguished_name,
                &AttributeValue::from("CN=User0,DC=bench"),
            )
            .expect("start");

        for depth in [10, 50] {
            let traversal = Traversal::new(EdgeBitmap::new().set(edge)).max_depth(depth);
            group.bench_with_input(
                BenchmarkId::new(format!("depth_{depth}"), size),
                size,
                |b, _| {
                    b.iter(|| black_box(traversal.reachable(&objects, &start)));
                },
            );
        }
    }

    group.finish();
}

fn bench_acl_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("acl_evaluation");

    for entries in [10, 100, 1000].iter() {
        let dacl = (0..*entries)
            .map(|i| Ace::allow(user_sid(i), GENERIC_ALL_BIT))
            .collect();
        let bytes = SecurityDescriptor::new().with_dacl(dacl).to_bytes();
        let descriptor = SecurityDescriptor::parse(&bytes).expect("parse");
        let request = AccessRequest::new(GENERIC_ALL_BIT);

        group.bench_with_input(BenchmarkId::new("parse", entries), &bytes, |b, bytes| {
            b.iter(|| black_box(SecurityDescriptor::parse(bytes)));
        });
        group.bench_with_input(BenchmarkId::new("trustees", entries), entries, |b, _| {
            b.iter(|| black_box(descriptor.allowed_trustees(&request)));
        });
    }

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);

    for size in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let schema = Schema::new();
                let mut pipeline = Pipeline::new();
                analyze::register(&schema, &mut pipeline, AnalysisOptions::default())
                    .expect("register");
                let core = *schema.core();
                let objects = Objects::new(&schema);
                for i in 0..size {
                    objects
                        .add_new([
                            (
                                core.distinguished_name,
                                AttributeValue::from(format!("CN=User{i},OU=Staff,DC=bench")),
                            ),
                            (core.object_class, AttributeValue::from("user")),
                            (core.object_sid, AttributeValue::Sid(user_sid(i))),
                        ])
                        .expect("insert");
                }
                black_box(pipeline.run(&schema, vec![objects]).expect("run"))
            });
        });
    }

    group.finish();
}

fn bench_export(c: &mut Criterion) {
    let mut group = c.benchmark_group("export");

    for size in [100, 500, 1000].iter() {
        let (_, objects, _) = create_chain(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(GraphExport::from_objects(&objects, &ExportOptions::default())));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_object_insertion,
    bench_lookup,
    bench_edge_insertion,
    bench_parallel_iteration,
    bench_traversal,
    bench_acl_evaluation,
    bench_pipeline,
    bench_export,
);

criterion_main!(benches);
