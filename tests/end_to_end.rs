// End-to-end behavior: encoding, training, snapshots and the full
// dataset-to-prediction pipeline.

use approx::assert_relative_eq;
use std::collections::BTreeMap;
use textcnn::{
    cross_entropy_loss, one_hot, softmax, train_val_split, Checkpoint, CheckpointMetadata, Dataset,
    Error, Example, LabelMap, Predictor, Tensor, TextCnn, TextCnnConfig, Trainer, TrainingConfig,
    Vocabulary,
};

fn scenario_vocab() -> Vocabulary {
    let pairs = [("<PAD>", 0), ("cat", 1), ("dog", 2), ("sat", 3), ("ran", 4)];
    let map: BTreeMap<String, usize> = pairs
        .into_iter()
        .map(|(t, i)| (t.to_string(), i))
        .collect();
    Vocabulary::from_map(map).unwrap()
}

/// Eight separable examples: class 0 uses tokens 1-4, class 1 uses 5-8
fn separable_batch() -> (Vec<Vec<usize>>, Tensor) {
    let inputs = vec![
        vec![1, 2, 3, 4, 0, 0],
        vec![2, 3, 1, 0, 0, 0],
        vec![4, 1, 2, 3, 1, 0],
        vec![3, 4, 0, 0, 0, 0],
        vec![5, 6, 7, 8, 0, 0],
        vec![6, 7, 5, 0, 0, 0],
        vec![8, 5, 6, 7, 5, 0],
        vec![7, 8, 0, 0, 0, 0],
    ];
    (inputs, one_hot(&[0, 0, 0, 0, 1, 1, 1, 1], 2))
}

fn training_config() -> TextCnnConfig {
    TextCnnConfig {
        vocab_size: 9,
        embedding_dim: 8,
        max_len: 6,
        num_filters: 4,
        filter_sizes: vec![2, 3],
        num_classes: 2,
        learning_rate: 0.5,
        seed: 42,
    }
}

#[test]
fn test_encode_scenarios() {
    let vocab = scenario_vocab();
    assert_eq!(vocab.encode("cat sat", 4), vec![1, 3, 0, 0]);
    assert_eq!(vocab.encode("dog ran fast", 4), vec![2, 4, 0, 0]);
    assert_eq!(vocab.encode("", 4), vec![0, 0, 0, 0]);
}

#[test]
fn test_softmax_and_loss_properties() {
    let logits = Tensor::new(vec![1.0, 2.0, 3.0, -50.0, 0.0, 50.0], vec![2, 3]);
    let probs = softmax(&logits);
    for r in 0..2 {
        assert_relative_eq!(probs.row(r).iter().sum::<f32>(), 1.0, epsilon = 1e-6);
    }
    let loss = cross_entropy_loss(&probs, &one_hot(&[2, 0], 3));
    assert!(loss >= 0.0);
    assert!(loss.is_finite());
}

#[test]
fn test_split_is_deterministic() {
    let examples: Vec<usize> = (0..50).collect();
    let a = train_val_split(&examples, 0.2, 7).unwrap();
    let b = train_val_split(&examples, 0.2, 7).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.0.len(), 40);
    assert_eq!(a.1.len(), 10);
}

#[test]
fn test_training_lowers_loss() {
    let (inputs, targets) = separable_batch();
    let mut model = TextCnn::new(training_config()).unwrap();

    let losses: Vec<f32> = (0..50)
        .map(|_| model.train_on_batch(&inputs, &targets).unwrap())
        .collect();

    assert!(losses.iter().all(|l| l.is_finite()));
    assert!(losses[49] < losses[0], "loss went from {} to {}", losses[0], losses[49]);
}

#[test]
fn test_snapshot_round_trip() {
    let (inputs, targets) = separable_batch();
    let mut model = TextCnn::new(training_config()).unwrap();
    for _ in 0..5 {
        model.train_on_batch(&inputs, &targets).unwrap();
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    Checkpoint {
        model: model.clone(),
        metadata: CheckpointMetadata {
            epoch: 5,
            train_loss: Some(0.25),
            best_val_loss: None,
        },
    }
    .save(&path)
    .unwrap();

    let loaded = Checkpoint::load(&path).unwrap();
    assert_eq!(loaded.metadata.epoch, 5);
    let mut restored = loaded.model;

    let held_out = vec![vec![1, 5, 2, 6, 0, 0], vec![8, 8, 3, 0, 0, 0]];
    assert_eq!(
        model.predict_proba(&held_out).unwrap(),
        restored.predict_proba(&held_out).unwrap()
    );

    model.forward(&inputs).unwrap();
    restored.forward(&inputs).unwrap();
    let original_grads = model.backward(&inputs, &targets).unwrap();
    let restored_grads = restored.backward(&inputs, &targets).unwrap();
    assert_eq!(original_grads, restored_grads);
    assert_eq!(model.parameters(), restored.parameters());
}

#[test]
fn test_backward_requires_forward() {
    let (inputs, targets) = separable_batch();
    let mut model = TextCnn::new(training_config()).unwrap();
    assert!(matches!(model.backward(&inputs, &targets), Err(Error::CacheNotReady)));

    model.forward(&inputs).unwrap();
    let before = model.parameters();
    let result = model.backward(&inputs[..4], &one_hot(&[0, 0, 0, 0], 2));
    assert!(matches!(result, Err(Error::BatchMismatch { expected: 8, found: 4 })));
    assert_eq!(model.parameters(), before);
}

#[test]
fn test_filter_wider_than_sequence_is_rejected() {
    let config = TextCnnConfig {
        filter_sizes: vec![2, 7],
        ..training_config()
    };
    assert!(matches!(TextCnn::new(config), Err(Error::InvalidConfig(_))));
}

#[test]
fn test_pipeline_from_json_dataset() {
    let mut data = Vec::new();
    for i in 0..10 {
        data.push(Example::new(
            format!("find the shortest path in grid number {i} using a queue"),
            "BFS",
        ));
        data.push(Example::new(
            format!("count ways to climb {i} stairs with memoized subproblems"),
            "Dynamic Programming(DP)",
        ));
        data.push(Example::new(
            format!("pick the largest coin first to make change {i}"),
            "Greedy Algorithm",
        ));
    }

    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("exercises.json");
    Dataset::new(data).save(&data_path).unwrap();
    let dataset = Dataset::load(&data_path).unwrap();
    assert_eq!(dataset.len(), 30);

    let config = TrainingConfig {
        epochs: 4,
        batch_size: 6,
        val_ratio: 0.2,
        max_len: 12,
        ..TrainingConfig::tiny()
    };
    let run = Trainer::new(config).unwrap().run(&dataset).unwrap();
    assert_eq!(run.report.history.len(), 4);
    assert_eq!(
        run.labels.labels(),
        &["BFS", "Dynamic Programming(DP)", "Greedy Algorithm"]
    );

    let artifacts = dir.path().join("artifacts");
    Predictor::new(run.vocab, run.labels, run.model)
        .unwrap()
        .save(&artifacts)
        .unwrap();
    let predictor = Predictor::load(&artifacts).unwrap();

    let prediction = predictor.predict("shortest path with a queue").unwrap();
    assert!(predictor.labels().labels().contains(&prediction.label));
    assert_relative_eq!(prediction.probabilities.iter().sum::<f32>(), 1.0, epsilon = 1e-5);

    let labels: LabelMap = LabelMap::load(artifacts.join("labels.json")).unwrap();
    assert_eq!(labels.decode(99), "unknown");
}

#[test]
fn test_bundled_config_and_dataset_load() {
    let root = env!("CARGO_MANIFEST_DIR");
    let config = TrainingConfig::from_json_file(format!("{root}/configs/tiny.json")).unwrap();
    assert_eq!(config.filter_sizes, vec![2, 3]);

    let dataset = Dataset::load(format!("{root}/data/sample_exercises.json")).unwrap();
    let stats = textcnn::DatasetStats::compute(&dataset.data);
    assert_eq!(stats.num_examples, dataset.len());
    assert_eq!(stats.label_distribution.len(), 10);
}
