#![allow(missing_docs)]

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use graphcodec::{
    Compression, GraphCodec, ObjectGraph, ObjectId, SharedReferenceStore, StoreBox, TypeCatalog,
    TypeShape,
};
use std::hint::black_box;
use uuid::Uuid;

fn catalog() -> TypeCatalog {
    let mut catalog = TypeCatalog::new();
    catalog
        .insert(TypeShape::collection("bench.Items"))
        .insert(
            TypeShape::instance("bench.Item")
                .field("id", "u64")
                .field("label", "string")
                .field("score", "f64")
                .field("parent", "bench.Item"),
        );
    catalog
}

/// A collection of `count` items where every item also points at its predecessor, so half of
/// the slots are back-references.
fn generate_graph(codec: &GraphCodec, count: usize) -> (ObjectGraph, ObjectId) {
    let mut graph = ObjectGraph::new();
    let list = graph
        .add_collection("bench.Items", Vec::with_capacity(count))
        .expect("arena");
    let mut previous = None;
    for i in 0..count {
        let item = graph
            .instantiate(codec.catalog(), "bench.Item")
            .expect("catalogued");
        graph.set_field(item, "id", i as u64).expect("instance");
        graph
            .set_field(item, "label", format!("item-{i}"))
            .expect("instance");
        graph.set_field(item, "score", i as f64 * 0.5).expect("instance");
        if let Some(prev) = previous {
            graph.set_field(item, "parent", prev).expect("instance");
        }
        graph.push_item(list, item).expect("collection");
        previous = Some(item);
    }
    (graph, list)
}

// --- BENCHMARKS ---

fn bench_encode(c: &mut Criterion) {
    let item_count = 50_000;
    let codec = GraphCodec::new(catalog());
    let (graph, root) = generate_graph(&codec, item_count);
    let size = codec.encode(&graph, root).expect("encode").len();

    println!("Encode item count: {item_count}, stream size: {size}b");

    let mut group = c.benchmark_group("Graph Encode");
    group.throughput(Throughput::Bytes(size as u64));

    group.bench_function("encode_uncompressed", |b| {
        b.iter(|| codec.encode(black_box(&graph), root).expect("encode"));
    });

    let deflate = GraphCodec::builder(catalog())
        .compression(Compression::Deflate)
        .build();
    group.bench_function("encode_deflate", |b| {
        b.iter(|| deflate.encode(black_box(&graph), root).expect("encode"));
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let item_count = 50_000;
    let codec = GraphCodec::new(catalog());
    let (graph, root) = generate_graph(&codec, item_count);
    let bytes = codec.encode(&graph, root).expect("encode");

    let mut group = c.benchmark_group("Graph Decode");
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    group.bench_function("decode_uncompressed", |b| {
        b.iter(|| codec.decode(black_box(&bytes)).expect("decode"));
    });

    group.finish();
}

fn bench_store(c: &mut Criterion) {
    let codec = GraphCodec::new(catalog());
    let store = SharedReferenceStore::new(codec);
    let centralizer = Uuid::new_v4();
    store.register_centralizer(centralizer);
    let labels: Vec<String> = (0..64).map(|i| format!("shared label {i}")).collect();

    let mut group = c.benchmark_group("Shared Store");
    group.throughput(Throughput::Elements(1_000));

    group.bench_function("intern_1k_boxes", |b| {
        b.iter(|| {
            for i in 0..1_000 {
                let mut boxed = StoreBox::<String>::centralized(centralizer);
                boxed
                    .set(&store, labels[i % labels.len()].clone())
                    .expect("set");
                black_box(boxed.stored_bytes());
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_store);
criterion_main!(benches);
