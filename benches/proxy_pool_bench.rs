use bizcrawl_engine::{ProxyPool, ProxyPoolConfig};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn pool(n: usize, weighted: bool) -> ProxyPool {
    let endpoints = (0..n).map(|i| (format!("http://proxy{i}:8080"), 1)).collect();
    ProxyPool::new(endpoints, ProxyPoolConfig { weighted, ..ProxyPoolConfig::default() })
}

fn benchmark_round_robin_selection(c: &mut Criterion) {
    let p = pool(50, false);
    c.bench_function("proxy_pool_get_next_round_robin_50", |b| {
        b.iter(|| black_box(p.get_next()))
    });
}

fn benchmark_weighted_selection(c: &mut Criterion) {
    let p = pool(50, true);
    c.bench_function("proxy_pool_get_next_weighted_50", |b| {
        b.iter(|| black_box(p.get_next()))
    });
}

fn benchmark_selection_with_quarantined_proxies(c: &mut Criterion) {
    let p = pool(50, false);
    for i in 0..25 {
        let endpoint = format!("http://proxy{i}:8080");
        for _ in 0..3 {
            p.record_failure(&endpoint);
        }
    }
    c.bench_function("proxy_pool_get_next_half_quarantined", |b| {
        b.iter(|| black_box(p.get_next()))
    });
}

fn benchmark_record_failure(c: &mut Criterion) {
    let p = pool(50, false);
    c.bench_function("proxy_pool_record_failure", |b| {
        b.iter(|| p.record_failure(black_box("http://proxy0:8080")))
    });
}

criterion_group!(
    benches,
    benchmark_round_robin_selection,
    benchmark_weighted_selection,
    benchmark_selection_with_quarantined_proxies,
    benchmark_record_failure
);
criterion_main!(benches);
