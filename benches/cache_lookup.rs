//! Fixture Cache Benchmarks
//!
//! Measures the hot path every test takes: looking up a fixture that is
//! already resident, and applying request overrides.

use api_harness::cache::{Provisioned, ResourceCache, ResourceKey, provider_fn};
use api_harness::request::{Override, RequestSpec, bearer};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde_json::json;

fn warmed_cache(runtime: &tokio::runtime::Runtime, keys: &[ResourceKey]) -> ResourceCache {
    let cache = ResourceCache::new();
    cache.register(
        "token",
        provider_fn(|_ctx, key: ResourceKey| async move {
            Ok(Provisioned::new(format!("token-for-{}", key.name())))
        }),
    );
    runtime.block_on(async {
        for key in keys {
            let _ = cache.get::<String>(key).await;
        }
    });
    cache
}

/// Benchmark lookups of fixtures that are already created
fn bench_resident_lookup(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let mut group = c.benchmark_group("resident_lookup");

    for size in [1usize, 100, 1000] {
        let keys: Vec<ResourceKey> = (0..size)
            .map(|i| ResourceKey::new("token", format!("user-{}", i)))
            .collect();
        let cache = warmed_cache(&runtime, &keys);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("get", size), &keys, |b, keys| {
            b.iter(|| {
                runtime.block_on(async {
                    for key in keys {
                        black_box(cache.get::<String>(key).await.ok());
                    }
                })
            });
        });
    }

    group.finish();
}

/// Benchmark building request variants from a shared base
fn bench_request_overrides(c: &mut Criterion) {
    let base = RequestSpec::post("/gl-share/api/share")
        .json(&json!({ "name": "demo", "recipients": [] }))
        .expect("serializable body");

    c.bench_function("request_with_bearer_and_url", |b| {
        b.iter(|| {
            black_box(
                base.with(Override::Authorization(Some(bearer("token"))))
                    .with(Override::Url("/gl-share/api/share/personal".to_string())),
            )
        })
    });
}

criterion_group!(benches, bench_resident_lookup, bench_request_overrides);
criterion_main!(benches);
