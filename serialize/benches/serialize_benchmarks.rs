#![allow(dead_code)]

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use redlilium_serialize::format::{decode_with, encode_with};
use redlilium_serialize::{
    ContractRegistry, Format, GraphSerializer, Poly, Reflect, TextStyle, decode, encode,
};

// ---------------------------------------------------------------------------
// Helper asset types
// ---------------------------------------------------------------------------

#[derive(Reflect, Clone, Default)]
#[reflect(serializable)]
struct Transform {
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

#[derive(Reflect, Clone, Default)]
#[reflect(serializable)]
struct Entity {
    pub name: String,
    pub transform: Transform,
    pub children: Vec<u32>,
}

#[derive(Reflect, Clone, Default)]
#[reflect(serializable)]
struct Light {
    #[reflect(base)]
    entity: Entity,
    pub intensity: f32,
    pub color: [u8; 4],
}

#[derive(Reflect, Clone, Default)]
#[reflect(serializable)]
struct Scene {
    pub title: String,
    pub entities: Vec<Poly<Entity>>,
}

fn entity(i: u32) -> Entity {
    Entity {
        name: format!("entity_{i}"),
        transform: Transform {
            position: [i as f32, 0.0, -(i as f32)],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0; 3],
        },
        children: (0..i % 4).collect(),
    }
}

fn scene(count: u32) -> Scene {
    let entities = (0..count)
        .map(|i| {
            if i % 8 == 0 {
                Poly::from_derived(Light {
                    entity: entity(i),
                    intensity: 2.5,
                    color: [255, 240, 200, 255],
                })
                .unwrap()
            } else {
                Poly::new(entity(i))
            }
        })
        .collect();
    Scene {
        title: "bench".into(),
        entities,
    }
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

fn bench_contract_build(c: &mut Criterion) {
    c.bench_function("contract_build_cold", |b| {
        b.iter_batched(
            ContractRegistry::new,
            |registry| {
                black_box(registry.contract_of::<Light>());
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_contract_lookup(c: &mut Criterion) {
    let registry = ContractRegistry::new();
    registry.contract_of::<Light>();
    c.bench_function("contract_lookup_cached", |b| {
        b.iter(|| black_box(registry.contract_of::<Light>()));
    });
}

// ---------------------------------------------------------------------------
// Graphs
// ---------------------------------------------------------------------------

fn bench_encode_binary_1k(c: &mut Criterion) {
    let scene = scene(1_000);
    c.bench_function("encode_binary_1k_entities", |b| {
        b.iter(|| black_box(encode(&scene, Format::Binary).unwrap()));
    });
}

fn bench_decode_binary_1k(c: &mut Criterion) {
    let bytes = encode(&scene(1_000), Format::Binary).unwrap();
    c.bench_function("decode_binary_1k_entities", |b| {
        b.iter(|| black_box(decode::<Scene>(&bytes, Format::Binary).unwrap()));
    });
}

fn bench_encode_text_1k(c: &mut Criterion) {
    let registry = ContractRegistry::new();
    let serializer = GraphSerializer::new(&registry);
    let scene = scene(1_000);
    let style = TextStyle::compact();
    c.bench_function("encode_text_1k_entities", |b| {
        b.iter(|| black_box(encode_with(&serializer, &scene, Format::Text, &style).unwrap()));
    });
}

fn bench_decode_text_1k(c: &mut Criterion) {
    let registry = ContractRegistry::new();
    let serializer = GraphSerializer::new(&registry);
    let bytes = encode_with(&serializer, &scene(1_000), Format::Text, &TextStyle::compact())
        .unwrap();
    c.bench_function("decode_text_1k_entities", |b| {
        b.iter(|| black_box(decode_with::<Scene>(&serializer, &bytes, Format::Text).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_contract_build,
    bench_contract_lookup,
    bench_encode_binary_1k,
    bench_decode_binary_1k,
    bench_encode_text_1k,
    bench_decode_text_1k,
);
criterion_main!(benches);
