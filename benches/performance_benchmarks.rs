//! Performance benchmarks for litellm-router-core
//!
//! Mirrors the teacher crate's `benches/performance_benchmarks.rs` layout
//! (one `criterion_group` per subsystem) but targets this crate's actual
//! surface: cache single-flight, store atomic updates, and deployment
//! selection.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use litellm_router_core::core::cache::{fingerprint_text, Cache, InMemoryCache};
use litellm_router_core::core::router::cooldown::CooldownManager;
use litellm_router_core::core::router::deployment::{Deployment, ModelGroup};
use litellm_router_core::core::router::selector::{
    DeploymentSelector, LowestLatency, SelectionContext, SimpleShuffle,
};
use litellm_router_core::core::store::{InMemoryStore, Store};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn bench_cache_operations(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("cache_operations");

    group.bench_function("lookup_or_claim_miss", |b| {
        let cache = InMemoryCache::new();
        let mut counter = 0u64;
        b.iter(|| {
            counter += 1;
            let fp = fingerprint_text("gpt-4", &serde_json::json!({ "n": counter }));
            rt.block_on(async { black_box(cache.lookup_or_claim(&fp, Duration::from_millis(10)).await) })
        });
    });

    group.bench_function("lookup_or_claim_hit", |b| {
        let cache = InMemoryCache::new();
        let fp = fingerprint_text("gpt-4", &serde_json::json!({ "n": 1 }));
        rt.block_on(async {
            cache
                .finalize(&fp, serde_json::json!({"ok": true}), Duration::from_secs(3600))
                .await;
        });
        b.iter(|| {
            rt.block_on(async { black_box(cache.lookup_or_claim(&fp, Duration::from_millis(10)).await) })
        });
    });

    group.finish();
}

fn bench_store_updates(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("store_updates");

    for deployment_count in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("atomic_update", deployment_count),
            &deployment_count,
            |b, &count| {
                let store = InMemoryStore::new();
                rt.block_on(async {
                    let seed: std::collections::HashMap<String, f64> =
                        (0..count).map(|i| (format!("d{i}"), 0.0)).collect();
                    store
                        .set("bench_map", &seed, Duration::from_secs(3600))
                        .await
                        .unwrap();
                });

                b.iter(|| {
                    rt.block_on(async {
                        black_box(
                            store
                                .update(
                                    "bench_map",
                                    Duration::from_secs(3600),
                                    |current: Option<std::collections::HashMap<String, f64>>| {
                                        let mut map = current.unwrap_or_default();
                                        if let Some(v) = map.get_mut("d0") {
                                            *v += 1.0;
                                        }
                                        map
                                    },
                                )
                                .await
                                .unwrap(),
                        )
                    })
                });
            },
        );
    }

    group.finish();
}

fn bench_deployment_selection(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("deployment_selection");

    for deployment_count in [2usize, 10, 50] {
        let deployments: Vec<Deployment> = (0..deployment_count)
            .map(|i| Deployment::new(format!("d{i}"), "g", serde_json::json!({})))
            .collect();
        let group_def = ModelGroup::new("g", deployments).unwrap();

        group.bench_with_input(
            BenchmarkId::new("simple_shuffle", deployment_count),
            &deployment_count,
            |b, _| {
                let cooldowns = CooldownManager::new(Arc::new(InMemoryStore::new()));
                b.iter(|| {
                    rt.block_on(async {
                        black_box(
                            SimpleShuffle
                                .pick(&group_def, &cooldowns, SelectionContext::default())
                                .await
                                .unwrap(),
                        )
                    })
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("lowest_latency", deployment_count),
            &deployment_count,
            |b, _| {
                let store = Arc::new(InMemoryStore::new());
                let cooldowns = CooldownManager::new(store.clone());
                let selector = LowestLatency::new(store);
                b.iter(|| {
                    rt.block_on(async {
                        black_box(
                            selector
                                .pick(&group_def, &cooldowns, SelectionContext::default())
                                .await
                                .unwrap(),
                        )
                    })
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_cache_operations,
    bench_store_updates,
    bench_deployment_selection
);
criterion_main!(benches);
