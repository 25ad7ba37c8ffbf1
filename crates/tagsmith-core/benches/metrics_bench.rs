use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tagsmith_core::{chunk_f1, token_f1, TagSet, ViterbiDecoder};

fn bench_metrics(c: &mut Criterion) {
    let tags = TagSet::new(["O", "B-PER", "I-PER", "B-LOC", "I-LOC"]).unwrap();

    let gold: Vec<Vec<u32>> = (0..512)
        .map(|i| (0..40).map(|j| ((i + j) % 5) as u32).collect())
        .collect();
    let pred: Vec<Vec<u32>> = gold
        .iter()
        .map(|row| row.iter().map(|&t| if t == 2 { 0 } else { t }).collect())
        .collect();
    let lengths = vec![40usize; gold.len()];

    let gold_tags = tags.decode_sequences(&gold, &lengths).unwrap();
    let pred_tags = tags.decode_sequences(&pred, &lengths).unwrap();

    c.bench_function("token_f1_512x40", |b| {
        b.iter(|| token_f1(tags.len(), black_box(&pred), black_box(&gold), &lengths).unwrap());
    });

    c.bench_function("chunk_f1_512x40", |b| {
        b.iter(|| chunk_f1(black_box(&pred_tags), black_box(&gold_tags)).unwrap());
    });

    let decoder = ViterbiDecoder::constrained(&tags);
    let emissions: Vec<Vec<f32>> = (0..40)
        .map(|i| (0..5).map(|j| ((i * 7 + j * 3) % 11) as f32 / 11.0).collect())
        .collect();
    c.bench_function("viterbi_constrained_40", |b| {
        b.iter(|| decoder.decode(black_box(&emissions), None).unwrap());
    });
}

criterion_group!(benches, bench_metrics);
criterion_main!(benches);
