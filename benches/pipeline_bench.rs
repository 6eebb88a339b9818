// Benchmarks for the CPU-bound pipeline stages: parsing, chunking,
// fingerprinting, and intent detection

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use codequarry::chunker::chunk_file;
use codequarry::config::EngineConfig;
use codequarry::fingerprint::fingerprint_text;
use codequarry::parsing::parse_file;
use codequarry::query::detect_intent;
use codequarry::types::Language;

fn sample_source() -> String {
    let mut source = String::from("//! Benchmark fixture\n");
    for index in 0..50 {
        source.push_str(&format!(
            r#"
/// Handler number {index}.
pub struct Handler{index} {{
    inner: Inner{index},
}}

impl Handler{index} {{
    pub fn handle(&self, input: &str) -> Response {{
        let parsed = parse_input(input);
        self.inner.dispatch(parsed)
    }}
}}
"#
        ));
    }
    source
}

fn bench_parse(c: &mut Criterion) {
    let source = sample_source();
    c.bench_function("parse_rust_50_types", |b| {
        b.iter(|| {
            let outcome = parse_file("bench.rs", black_box(&source), Language::Rust);
            black_box(outcome.symbols.len())
        })
    });
}

fn bench_chunk(c: &mut Criterion) {
    let source = sample_source();
    let outcome = parse_file("bench.rs", &source, Language::Rust);
    let config = EngineConfig::default();
    c.bench_function("chunk_parsed_file", |b| {
        b.iter(|| {
            let chunks = chunk_file(
                &config,
                "bench.rs",
                black_box(&source),
                Language::Rust,
                &outcome.symbols,
            );
            black_box(chunks.len())
        })
    });
}

fn bench_fingerprint(c: &mut Criterion) {
    let source = sample_source();
    c.bench_function("fingerprint_text", |b| {
        b.iter(|| black_box(fingerprint_text(black_box(&source))))
    });
}

fn bench_intent(c: &mut Criterion) {
    let queries = [
        "Where is the UserService class?",
        "what calls HashPassword?",
        "explain the retry logic",
        "password hashing",
        "show me how to use the embedding client",
    ];
    c.bench_function("detect_intent", |b| {
        b.iter(|| {
            for query in &queries {
                black_box(detect_intent(black_box(query)));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_parse,
    bench_chunk,
    bench_fingerprint,
    bench_intent
);
criterion_main!(benches);
