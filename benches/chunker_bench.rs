use bizcrawl_engine::{chunk_pages, ChunkerConfig};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn sample_page(lines: usize) -> String {
    (0..lines)
        .map(|i| format!("line number {i} with some filler words to pad out the content a bit"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn benchmark_small_page(c: &mut Criterion) {
    let text = sample_page(40);
    let pages = [("https://a.example.com", text.as_str())];
    let config = ChunkerConfig::default();

    c.bench_function("chunk_pages_small_page", |b| {
        b.iter(|| black_box(chunk_pages(black_box(&pages), black_box(&config))))
    });
}

fn benchmark_large_page_many_chunks(c: &mut Criterion) {
    let text = sample_page(5_000);
    let pages = [("https://a.example.com", text.as_str())];
    let config = ChunkerConfig { max_chunk_tokens: 500, ..ChunkerConfig::default() };

    c.bench_function("chunk_pages_large_page_500_token_budget", |b| {
        b.iter(|| black_box(chunk_pages(black_box(&pages), black_box(&config))))
    });
}

fn benchmark_multi_page_scrape(c: &mut Criterion) {
    let urls: Vec<String> = (0..10).map(|i| format!("https://site{i}.example.com")).collect();
    let bodies: Vec<String> = (0..10).map(|_| sample_page(200)).collect();
    let pages: Vec<(&str, &str)> = urls.iter().zip(bodies.iter()).map(|(u, b)| (u.as_str(), b.as_str())).collect();
    let config = ChunkerConfig::default();

    c.bench_function("chunk_pages_ten_page_scrape", |b| {
        b.iter(|| black_box(chunk_pages(black_box(&pages), black_box(&config))))
    });
}

criterion_group!(
    benches,
    benchmark_small_page,
    benchmark_large_page_many_chunks,
    benchmark_multi_page_scrape
);
criterion_main!(benches);
