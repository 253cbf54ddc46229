//! Benchmarks for stackwright core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};
use stackwright::apidef::{loader, transform};
use stackwright::core::resolver::{resolve_stage, BuildPlan};
use stackwright::core::{parser, synth, types::StackKind};
use stackwright::provenance::hasher;

const PROJECT: &str = r#"
version: "1.0"
project: bench
account: "123456789012"
region: eu-west-1
organization_prefix: org
base_domain: example.com
stages:
  dev:
    domain: "dev.{{base_domain}}"
api:
  definition: openapi.yaml
  controllers:
    auth:
      is_authorizer: true
    items:
      paths: ["/items", "/items/{id}"]
    orders:
      paths: ["/orders", "/orders/{id}"]
tables:
  items:
    partition_key: { name: itemId }
  orders:
    partition_key: { name: orderId }
    sort_key: { name: createdAt }
media:
  folders: [images, attachments]
"#;

/// An API document with `n` resources, each with a shared schema reference.
fn document(n: usize) -> Value {
    let mut paths = serde_json::Map::new();
    for i in 0..n {
        let name = match i {
            0 => "items".to_string(),
            1 => "orders".to_string(),
            _ => format!("res{i}"),
        };
        let op = json!({
            "responses": {"200": {"content": {"application/json": {
                "schema": {"$ref": "#/components/schemas/Item"}
            }}}}
        });
        paths.insert(format!("/{name}"), json!({"get": op, "post": op}));
        paths.insert(format!("/{name}/{{id}}"), json!({"get": op, "delete": op}));
    }
    json!({
        "openapi": "3.0.3",
        "info": {"title": "bench", "version": "1.0.0"},
        "paths": paths,
        "components": {
            "schemas": {"Item": {"type": "object", "properties": {"id": {"type": "string"}}}},
            "securitySchemes": {"auth": {"type": "apiKey"}}
        }
    })
}

fn bench_yaml_parse(c: &mut Criterion) {
    c.bench_function("yaml_parse_project", |b| {
        b.iter(|| {
            let config = parser::parse_config(black_box(PROJECT)).unwrap();
            black_box(config);
        });
    });
}

fn bench_build_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_order");
    group.bench_function("standard", |b| {
        b.iter(|| {
            let plan = BuildPlan::standard(black_box("bench"), black_box("dev"));
            black_box(plan.execution_order().unwrap());
        });
    });
    for n in [10, 50, 100] {
        let mut plan = BuildPlan::default();
        for i in 0..n {
            let deps = if i > 0 {
                vec![format!("stack-{:04}", i - 1)]
            } else {
                vec![]
            };
            plan.add(format!("stack-{i:04}"), StackKind::SharedTables, deps);
        }
        group.bench_with_input(BenchmarkId::new("chain", n), &plan, |b, plan| {
            b.iter(|| black_box(plan.execution_order().unwrap()));
        });
    }
    group.finish();
}

fn bench_dereference(c: &mut Criterion) {
    let mut group = c.benchmark_group("dereference_internal");
    for n in [2, 20, 100] {
        let doc = document(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &doc, |b, doc| {
            b.iter(|| black_box(loader::dereference_internal(black_box(doc)).unwrap()));
        });
    }
    group.finish();
}

fn bench_transforms(c: &mut Criterion) {
    let doc = document(20);
    let paths = vec!["/items".to_string(), "/items/{id}".to_string()];
    let uri = transform::invocation_uri("eu-west-1", "${items-function.Arn}");
    c.bench_function("with_cors_and_bind", |b| {
        b.iter(|| {
            let doc = transform::with_metadata(&transform::with_cors(black_box(&doc)), "bench", "dev");
            black_box(transform::bind_controller(&doc, "items", &paths, &uri));
        });
    });
}

fn bench_hash_value(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_value");
    for n in [2, 20, 100] {
        let doc = document(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &doc, |b, doc| {
            b.iter(|| black_box(hasher::hash_value(black_box(doc)).unwrap()));
        });
    }
    group.finish();
}

fn bench_synthesize(c: &mut Criterion) {
    let config = parser::parse_config(PROJECT).unwrap();
    let ctx = resolve_stage(&config, "dev").unwrap();
    let doc = loader::dereference_internal(&document(2)).unwrap();
    c.bench_function("synthesize_document", |b| {
        b.iter(|| {
            let app = synth::synthesize_document(&ctx, black_box(doc.clone()), Vec::new()).unwrap();
            black_box(app);
        });
    });
}

criterion_group!(
    benches,
    bench_yaml_parse,
    bench_build_order,
    bench_dereference,
    bench_transforms,
    bench_hash_value,
    bench_synthesize
);
criterion_main!(benches);
