//! Performance benchmarks for children cache maintenance
//!
//! These benchmarks measure:
//! - Incremental cache upkeep while a key is built
//! - Whole-document refreshes triggered by filter edits
//! - Full rebuild and verification of every cache
//! - Pairwise crosslink cycle checks
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nature_key::{
    config::KeyConfig,
    crosslink::CrosslinkManager,
    filters::{AssignedSpace, FilterType, FormValue, RangeSpace, SpaceNumber},
    keybase::{FilterUpdate, KeyBase, NewFilter, NewNode},
    paths::NuidCodec,
    properties::{FilterId, NodeType},
};
use std::collections::BTreeSet;

/// A root with `width` groups of `width` results, each group with a range and a color filter.
fn build_key(width: usize) -> (KeyBase, Vec<FilterId>) {
    let mut key = KeyBase::new(KeyConfig::default(), "Bench").unwrap();
    let root = key.root();
    let mut range_filters = Vec::new();
    for g in 0..width {
        let group = key
            .create_node(&root, NewNode::named(&format!("Group {g}"), NodeType::Node))
            .unwrap();
        let meta = key.node(&group).unwrap().meta_node;
        let size = key
            .add_filter(&meta, NewFilter::new("Size", FilterType::Range))
            .unwrap();
        let color = key
            .add_filter(&meta, NewFilter::new("Color", FilterType::Color))
            .unwrap();
        let mut colors = Vec::new();
        for c in 0..4u8 {
            let space = key
                .add_space_from_form(&color, &FormValue::Single(format!("{},0,0", c * 60)), None)
                .unwrap();
            colors.push(space);
        }
        for r in 0..width {
            let result = key
                .create_node(&group, NewNode::named(&format!("Result {g}.{r}"), NodeType::Result))
                .unwrap();
            let min = SpaceNumber::new(r as f64).unwrap();
            let max = SpaceNumber::new(r as f64 + 2.0).unwrap();
            key.assign(&result, &size, AssignedSpace::Range(RangeSpace::new(min, max).unwrap()))
                .unwrap();
            let picked: BTreeSet<_> = [colors[r % 4]].into_iter().collect();
            key.assign(&result, &color, AssignedSpace::Spaces(picked)).unwrap();
        }
        range_filters.push(size);
    }
    (key, range_filters)
}

fn bench_build_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_key");
    for width in [4, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            b.iter(|| black_box(build_key(width)))
        });
    }
    group.finish();
}

fn bench_weight_refresh(c: &mut Criterion) {
    let (mut key, filters) = build_key(32);
    let filter = filters[0];
    let mut weight = 1;
    c.bench_function("weight_refresh_32_children", |b| {
        b.iter(|| {
            weight = weight % 100 + 1;
            key.update_filter(
                &filter,
                FilterUpdate {
                    weight: Some(weight),
                    ..Default::default()
                },
            )
            .unwrap();
        })
    });
}

fn bench_verify_caches(c: &mut Criterion) {
    let (key, _) = build_key(24);
    c.bench_function("verify_caches_24x24", |b| {
        b.iter(|| black_box(key.verify_caches().unwrap()))
    });
}

fn bench_number_space(c: &mut Criterion) {
    let (mut key, _) = build_key(8);
    let root = key.root();
    let root_meta = key.node(&root).unwrap().meta_node;
    let legs = key
        .add_filter(&root_meta, NewFilter::new("Legs", FilterType::Number))
        .unwrap();
    let mut toggle = false;
    c.bench_function("number_space_prune", |b| {
        b.iter(|| {
            toggle = !toggle;
            let numbers = if toggle { "2,4,6,8" } else { "4,6" };
            let space = FilterType::Number
                .encode_from_form_value(&FormValue::Single(numbers.into()))
                .unwrap();
            key.set_filter_space(&legs, space).unwrap();
        })
    });
}

fn bench_find_cycle(c: &mut Criterion) {
    let codec = NuidCodec::default();
    let root = codec.root_path().unwrap();
    let mut group = c.benchmark_group("find_cycle");
    for count in [16u64, 128] {
        // siblings linking forward, never closing a loop, so every pair is compared
        let paths: Vec<String> = (0..=count)
            .map(|i| codec.next_child_path(&root, i).unwrap().to_string())
            .collect();
        let links: Vec<(&str, &str)> = paths
            .windows(2)
            .map(|pair| (pair[0].as_str(), pair[1].as_str()))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(count), &links, |b, links| {
            b.iter(|| black_box(CrosslinkManager::find_cycle(links)))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_build_key,
    bench_weight_refresh,
    bench_verify_caches,
    bench_number_space,
    bench_find_cycle
);
criterion_main!(benches);
