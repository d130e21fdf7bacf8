use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use textcnn::{one_hot, TextCnn, TextCnnConfig};

fn synthetic_batch(config: &TextCnnConfig, batch: usize) -> (Vec<Vec<usize>>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(0);
    let inputs = (0..batch)
        .map(|_| {
            (0..config.max_len)
                .map(|_| rng.random_range(0..config.vocab_size))
                .collect()
        })
        .collect();
    let labels = (0..batch).map(|_| rng.random_range(0..config.num_classes)).collect();
    (inputs, labels)
}

fn forward_bench(c: &mut Criterion) {
    let config = TextCnnConfig::small(5000, 10);
    let model = TextCnn::new(config.clone()).unwrap();
    let (inputs, _) = synthetic_batch(&config, 32);

    c.bench_function("textcnn_forward_small_b32", |b| {
        b.iter(|| {
            let probs = model.predict_proba(black_box(&inputs)).unwrap();
            black_box(probs);
        })
    });
}

fn train_step_bench(c: &mut Criterion) {
    let config = TextCnnConfig::small(5000, 10);
    let mut model = TextCnn::new(config.clone()).unwrap();
    let (inputs, labels) = synthetic_batch(&config, 32);
    let targets = one_hot(&labels, config.num_classes);

    c.bench_function("textcnn_train_step_small_b32", |b| {
        b.iter(|| {
            let loss = model.train_on_batch(black_box(&inputs), &targets).unwrap();
            black_box(loss);
        })
    });
}

criterion_group!(benches, forward_bench, train_step_bench);
criterion_main!(benches);
