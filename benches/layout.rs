use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};
use std::hint::black_box;
use workflow_layout::config::{CollisionConfig, LayoutConfig, RoutingConfig};
use workflow_layout::layout::{compute_layout, resolve_collisions, route_links};
use workflow_layout::parser::parse_document;

const TYPES: [&str; 5] = ["MODEL", "CLIP", "VAE", "LATENT", "CONDITIONING"];

/// A `cols`-wide grid of nodes placed slightly closer than the padding allows,
/// each linked to the next node and to one a row further down.
fn grid_workflow(nodes: usize, cols: usize) -> String {
    let mut node_values = Vec::with_capacity(nodes);
    for i in 0..nodes {
        let x = (i % cols) as i64 * 240;
        let y = (i / cols) as i64 * 130;
        node_values.push(json!({
            "id": i + 1,
            "type": "KSampler",
            "pos": [x, y],
            "size": [200, 100],
            "inputs": [{"name": "in", "type": "*", "link": null}],
            "outputs": [{"name": "out", "type": "*", "links": []}],
        }));
    }

    let mut links: Vec<Value> = Vec::new();
    let mut push = |from: usize, to: usize| {
        let id = links.len() + 1;
        let data_type = TYPES[id % TYPES.len()];
        links.push(json!([id, from + 1, 0, to + 1, 0, data_type]));
    };
    for i in 0..nodes.saturating_sub(1) {
        push(i, i + 1);
    }
    for i in 0..nodes.saturating_sub(cols) {
        push(i, i + cols);
    }

    json!({
        "last_link_id": links.len(),
        "nodes": node_values,
        "links": links,
        "groups": [],
    })
    .to_string()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for nodes in [20usize, 100, 400] {
        let input = grid_workflow(nodes, 10);
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &input, |b, data| {
            b.iter(|| {
                let doc = parse_document(black_box(data)).expect("parse failed");
                black_box(doc.nodes.len());
            });
        });
    }
    group.finish();
}

fn bench_route(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_links");
    let config = RoutingConfig::default();
    for nodes in [20usize, 100, 400] {
        let doc = parse_document(&grid_workflow(nodes, 10)).expect("parse failed");
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &doc, |b, doc| {
            b.iter(|| {
                let mut doc = doc.clone();
                let report = route_links(black_box(&mut doc), &config);
                black_box(report.total_reroutes_added);
            });
        });
    }
    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_collisions");
    let config = CollisionConfig::default();
    for nodes in [20usize, 100, 200] {
        let doc = parse_document(&grid_workflow(nodes, 10)).expect("parse failed");
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &doc, |b, doc| {
            b.iter(|| {
                let mut doc = doc.clone();
                let report = resolve_collisions(black_box(&mut doc), &config);
                black_box(report.iterations_used);
            });
        });
    }
    group.finish();
}

fn bench_end_to_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("end_to_end");
    group.sample_size(20);
    let config = LayoutConfig::default();
    for nodes in [20usize, 100] {
        let input = grid_workflow(nodes, 10);
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &input, |b, data| {
            b.iter(|| {
                let mut doc = parse_document(black_box(data)).expect("parse failed");
                let report = compute_layout(&mut doc, &config);
                black_box(report.collision.refinements_applied.len());
            });
        });
    }
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default();
    targets = bench_parse, bench_route, bench_resolve, bench_end_to_end
);
criterion_main!(benches);
