use criterion::{black_box, criterion_group, criterion_main, Criterion};
use loopscope::audio::SpectralAnalyzer;

fn analyzer_update(c: &mut Criterion) {
    let sample_rate = 44_100.0;
    let block: Vec<f32> = (0..512)
        .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate).sin())
        .collect();

    c.bench_function("analyzer_update_512", |b| {
        let mut analyzer = SpectralAnalyzer::new(sample_rate, 1024, 512, 3, 100).unwrap();
        b.iter(|| analyzer.update(black_box(&block)));
    });
}

criterion_group!(benches, analyzer_update);
criterion_main!(benches);
