use criterion::{Criterion, criterion_group, criterion_main};
use legal_rag::embeddings::{ChunkingConfig, chunk_document};
use legal_rag::ingest::Document;
use std::hint::black_box;
use std::path::PathBuf;

const OPINION_PARAGRAPH: &str = "The plaintiff contends that the defendant's failure to deliver \
the goods on the agreed date constituted a material breach of contract, entitling the plaintiff \
to expectation damages. The defendant responds that performance was excused by impossibility. \
We disagree: the supervening event was foreseeable at the time of contracting, and the risk of \
its occurrence was allocated to the seller by the express terms of the agreement. ";

pub fn criterion_benchmark(c: &mut Criterion) {
    let document = Document {
        source: PathBuf::from("data/opinion.pdf"),
        text: OPINION_PARAGRAPH.repeat(400),
    };
    let config = ChunkingConfig::default();

    c.bench_function("chunking", |b| {
        b.iter(|| chunk_document(black_box(&document), black_box(&config)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
