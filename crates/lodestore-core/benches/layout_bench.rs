//! # Layout and Persistence Benchmarks
//!
//! Performance benchmarks for layout derivation, traversal and store/load.
//!
//! Run with: `cargo bench -p lodestore-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use lodestore_core::graph::GraphTraverserProvider;
use lodestore_core::{
    BinaryField, CustomTypeHandler, FieldDescriptor, FieldKind, Loader, MemberIdentifier,
    ObjRef, ObjectGraph, ObjectIdRegistry, PrimitiveKind, ReferenceHandler, Storer,
    TypeDefinition, TypeId, TypeRegistry,
};
use std::hint::black_box;
use std::ops::ControlFlow;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Item {
    weight: u64,
    name: String,
    next: Option<ObjRef>,
}

fn item_name(item: &Item) -> &str {
    &item.name
}

fn registry() -> TypeRegistry {
    let registry = TypeRegistry::new();
    registry
        .register_type_handler(Arc::new(
            CustomTypeHandler::builder(TypeId(1000), "Item", Item::default)
                .field(BinaryField::value_mut("weight", |i: &Item| i.weight, |i, v| i.weight = v))
                .field(BinaryField::text_mut("name", item_name, |i, v| i.name = v))
                .field(BinaryField::reference_mut("next", |i: &Item| i.next, |i, v| i.next = v))
                .build(),
        ))
        .expect("item");
    registry
}

/// Create a linked chain of N items; returns the graph and its head.
fn create_chain(size: usize) -> (ObjectGraph, ObjRef) {
    let mut graph = ObjectGraph::new();
    let mut next = None;
    for i in 0..size {
        let item = Item {
            weight: i as u64,
            name: format!("item-{i}"),
            next,
        };
        next = Some(graph.insert(item).expect("insert"));
    }
    let head = next.unwrap_or(ObjRef(0));
    (graph, head)
}

/// Declarations of a type with `width` fixed fields and one text field.
fn members(width: usize) -> Vec<FieldDescriptor> {
    let mut members = vec![FieldDescriptor::new(
        MemberIdentifier::new("label"),
        FieldKind::Text,
    )];
    for i in 0..width {
        members.push(FieldDescriptor::new(
            MemberIdentifier::new(format!("f{i}")),
            FieldKind::Primitive(PrimitiveKind::U32),
        ));
    }
    members
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_layout_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout_derivation");

    for width in [4, 32, 256].iter() {
        let declared = members(*width);
        group.bench_with_input(BenchmarkId::from_parameter(width), width, |b, _| {
            b.iter(|| {
                let definition =
                    TypeDefinition::new(TypeId(1), "Wide", None, declared.clone()).expect("layout");
                black_box(definition)
            });
        });
    }

    group.finish();
}

fn bench_traversal(c: &mut Criterion) {
    let mut group = c.benchmark_group("traversal");
    let registry = registry();

    for size in [100, 1000, 10000].iter() {
        let (graph, head) = create_chain(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            let provider = GraphTraverserProvider::new(&graph, &registry);
            b.iter(|| {
                let summary = ReferenceHandler::new(&provider)
                    .handle([head], |_, _| Ok(ControlFlow::Continue(())))
                    .expect("traversal");
                black_box(summary)
            });
        });
    }

    group.finish();
}

fn bench_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");
    let registry = registry();

    for size in [100, 1000, 10000].iter() {
        let (graph, head) = create_chain(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut ids = ObjectIdRegistry::new();
                let chunk = Storer::new(&registry)
                    .store(&graph, &[head], &mut ids)
                    .expect("store");
                black_box(chunk)
            });
        });
    }

    group.finish();
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");
    let registry = registry();

    for size in [100, 1000, 10000].iter() {
        let (graph, head) = create_chain(*size);
        let mut ids = ObjectIdRegistry::new();
        let chunk = Storer::new(&registry)
            .store(&graph, &[head], &mut ids)
            .expect("store");

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut loaded = ObjectGraph::new();
                let mut loaded_ids = ObjectIdRegistry::new();
                let refs = Loader::new(&registry)
                    .load(&mut loaded, &mut loaded_ids, &chunk.bytes)
                    .expect("load");
                black_box(refs)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_layout_derivation,
    bench_traversal,
    bench_store,
    bench_load
);
criterion_main!(benches);
