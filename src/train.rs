//! Training Loop
//!
//! Drives [`TextCnn::train_on_batch`] over a training set for a number of
//! epochs, evaluates on a held-out set after each epoch, and keeps the
//! parameters with the lowest validation loss.
//!
//! ## Flow
//!
//! ```text
//! for epoch in 1..=epochs:
//!     for batch in train.shuffled_batches(batch_size, shuffle_seed + epoch):
//!         loss = model.train_on_batch(batch)       // forward + backward + SGD
//!     train_loss = mean loss, weighted by batch size
//!     val = evaluate(model, val)                   // no parameter changes
//!     if val.loss < best: remember parameters
//! restore best parameters (optional)
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use textcnn::{Dataset, TrainingConfig, Trainer};
//!
//! let dataset = Dataset::load("data/exercises.json")?;
//! let config = TrainingConfig::tiny();
//! let run = Trainer::new(config)?.run(&dataset)?;
//! println!("best validation loss: {:?}", run.report.best_val_loss);
//! # Ok::<(), textcnn::Error>(())
//! ```

use crate::dataset::{train_val_split, Dataset, EncodedDataset};
use crate::error::{Error, Result};
use crate::loss::{accuracy, cross_entropy_loss};
use crate::model::{TextCnn, TextCnnConfig, TextCnnParameters};
use crate::training_logger::TrainingLogger;
use crate::vocab::{LabelMap, Vocabulary};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hyperparameters of a training run
///
/// Missing fields in a JSON file fall back to [`TrainingConfig::default`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    /// Fraction of examples held out for validation, in `[0, 1)`
    pub val_ratio: f64,
    pub split_seed: u64,
    /// Base seed for per-epoch batch shuffling
    pub shuffle_seed: u64,
    /// Tokens seen fewer times than this are left out of the vocabulary
    pub min_frequency: usize,
    /// Replace the final parameters with the best-validation ones
    pub restore_best: bool,

    pub embedding_dim: usize,
    pub max_len: usize,
    pub num_filters: usize,
    pub filter_sizes: Vec<usize>,
    pub learning_rate: f32,
    /// Seed for parameter initialization
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 32,
            val_ratio: 0.2,
            split_seed: 42,
            shuffle_seed: 0,
            min_frequency: 1,
            restore_best: true,
            embedding_dim: 50,
            max_len: 40,
            num_filters: 32,
            filter_sizes: vec![2, 3, 4],
            learning_rate: 0.01,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    /// A fast configuration for smoke tests and small datasets
    pub fn tiny() -> Self {
        Self {
            epochs: 5,
            batch_size: 8,
            embedding_dim: 16,
            max_len: 20,
            num_filters: 8,
            filter_sizes: vec![2, 3],
            learning_rate: 0.05,
            ..Self::default()
        }
    }

    /// Settings matching [`TextCnnConfig::small`]
    pub fn small() -> Self {
        Self {
            epochs: 20,
            batch_size: 16,
            embedding_dim: 50,
            max_len: 40,
            num_filters: 32,
            filter_sizes: vec![2, 3, 4],
            learning_rate: 0.01,
            ..Self::default()
        }
    }

    /// Load and validate a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the loop settings; model settings are checked by
    /// [`TextCnnConfig::validate`] once the vocabulary is known
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.val_ratio) {
            return Err(Error::InvalidConfig(format!(
                "val_ratio must be in [0, 1), got {}",
                self.val_ratio
            )));
        }
        Ok(())
    }

    /// Model configuration for a vocabulary and label set of the given sizes
    pub fn model_config(&self, vocab_size: usize, num_classes: usize) -> TextCnnConfig {
        TextCnnConfig {
            vocab_size,
            embedding_dim: self.embedding_dim,
            max_len: self.max_len,
            num_filters: self.num_filters,
            filter_sizes: self.filter_sizes.clone(),
            num_classes,
            learning_rate: self.learning_rate,
            seed: self.seed,
        }
    }
}

/// Loss and accuracy of a model on a dataset
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Evaluation {
    pub loss: f32,
    pub accuracy: f32,
    pub examples: usize,
}

/// Mean cross-entropy and accuracy over `dataset`, computed in batches
///
/// Uses [`TextCnn::predict_proba`], so the model and its cache are untouched.
///
/// # Errors
///
/// [`Error::InvalidData`] for an empty dataset.
pub fn evaluate(
    model: &TextCnn,
    dataset: &EncodedDataset,
    batch_size: usize,
) -> Result<Evaluation> {
    if dataset.is_empty() {
        return Err(Error::InvalidData("cannot evaluate on an empty dataset".into()));
    }

    let mut loss_sum = 0.0f64;
    let mut correct = 0.0f64;
    for batch in dataset.batches(batch_size) {
        let probs = model.predict_proba(&batch.inputs)?;
        let n = batch.len() as f64;
        loss_sum += cross_entropy_loss(&probs, &batch.targets) as f64 * n;
        correct += accuracy(&probs, &batch.labels) as f64 * n;
    }

    let n = dataset.len() as f64;
    Ok(Evaluation {
        loss: (loss_sum / n) as f32,
        accuracy: (correct / n) as f32,
        examples: dataset.len(),
    })
}

/// Metrics for one epoch
#[derive(Clone, Debug, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub train_loss: f32,
    pub validation: Option<Evaluation>,
}

/// Outcome of [`Trainer::fit`]
#[derive(Clone, Debug, Default)]
pub struct TrainingReport {
    pub history: Vec<EpochSummary>,
    /// Epoch with the lowest validation loss
    pub best_epoch: Option<usize>,
    pub best_val_loss: Option<f32>,
    pub best_parameters: Option<TextCnnParameters>,
}

impl TrainingReport {
    pub fn final_train_loss(&self) -> Option<f32> {
        self.history.last().map(|e| e.train_loss)
    }
}

/// Everything produced by [`Trainer::run`]
pub struct TrainingRun {
    pub model: TextCnn,
    pub vocab: Vocabulary,
    pub labels: LabelMap,
    pub report: TrainingReport,
}

/// Runs the epoch loop with a fixed [`TrainingConfig`]
pub struct Trainer {
    config: TrainingConfig,
    logger: Option<TrainingLogger>,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, logger: None })
    }

    /// Write per-epoch metrics to a CSV file as well
    pub fn with_logger(mut self, logger: TrainingLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Split, build vocabulary and labels, encode, initialize and fit
    ///
    /// The vocabulary is built from the training split only. The label map
    /// covers every label in `dataset`, so validation labels always encode.
    pub fn run(&mut self, dataset: &Dataset) -> Result<TrainingRun> {
        if dataset.is_empty() {
            return Err(Error::InvalidData("dataset has no examples".into()));
        }

        let (train, val) =
            train_val_split(&dataset.data, self.config.val_ratio, self.config.split_seed)?;
        if train.is_empty() {
            return Err(Error::InvalidData("training split is empty".into()));
        }

        let sentences: Vec<&str> = train.iter().map(|e| e.exercise.as_str()).collect();
        let vocab = Vocabulary::build(&sentences, self.config.min_frequency);
        let labels = LabelMap::from_labels(dataset.labels());

        let train_set = EncodedDataset::encode(&train, &vocab, &labels, self.config.max_len)?;
        let val_set = EncodedDataset::encode(&val, &vocab, &labels, self.config.max_len)?;
        tracing::info!(
            train = train_set.len(),
            val = val_set.len(),
            vocab = vocab.len(),
            classes = labels.len(),
            "prepared dataset"
        );

        let mut model = TextCnn::new(self.config.model_config(vocab.len(), labels.len()))?;
        let report = self.fit(&mut model, &train_set, &val_set)?;

        Ok(TrainingRun {
            model,
            vocab,
            labels,
            report,
        })
    }

    /// Train `model` on `train` for the configured number of epochs
    ///
    /// `val` may be empty, in which case no validation is done and the final
    /// parameters are kept.
    pub fn fit(
        &mut self,
        model: &mut TextCnn,
        train: &EncodedDataset,
        val: &EncodedDataset,
    ) -> Result<TrainingReport> {
        if train.is_empty() {
            return Err(Error::InvalidData("training set is empty".into()));
        }

        let mut report = TrainingReport::default();
        let learning_rate = model.config().learning_rate;

        for epoch in 1..=self.config.epochs {
            let seed = self.config.shuffle_seed.wrapping_add(epoch as u64);
            let mut loss_sum = 0.0f64;
            for batch in train.shuffled_batches(self.config.batch_size, seed) {
                let loss = model.train_on_batch(&batch.inputs, &batch.targets)?;
                loss_sum += loss as f64 * batch.len() as f64;
            }
            let train_loss = (loss_sum / train.len() as f64) as f32;

            let validation = if val.is_empty() {
                None
            } else {
                Some(evaluate(model, val, self.config.batch_size)?)
            };

            if let Some(v) = &validation {
                if report.best_val_loss.is_none_or(|best| v.loss < best) {
                    report.best_val_loss = Some(v.loss);
                    report.best_epoch = Some(epoch);
                    report.best_parameters = Some(model.parameters());
                }
            }

            match self.logger.as_mut() {
                Some(logger) => logger.log(epoch, learning_rate, train_loss, validation.as_ref())?,
                None => tracing::info!(
                    epoch,
                    train_loss,
                    val_loss = validation.map(|v| v.loss),
                    "epoch complete"
                ),
            }

            report.history.push(EpochSummary {
                epoch,
                train_loss,
                validation,
            });
        }

        if self.config.restore_best {
            if let Some(best) = &report.best_parameters {
                *model = TextCnn::from_parameters(model.config().clone(), best.clone())?;
                tracing::info!(epoch = report.best_epoch, "restored best parameters");
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Example;

    fn toy_dataset() -> Dataset {
        let mut data = Vec::new();
        for i in 0..12 {
            data.push(Example::new(format!("shortest path graph bfs level {i}"), "BFS"));
            data.push(Example::new(format!("subarray sum dp table state {i}"), "DP"));
        }
        Dataset::new(data)
    }

    fn quick_config() -> TrainingConfig {
        TrainingConfig {
            epochs: 3,
            batch_size: 4,
            val_ratio: 0.25,
            embedding_dim: 8,
            max_len: 8,
            num_filters: 4,
            filter_sizes: vec![2, 3],
            learning_rate: 0.1,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let bad = TrainingConfig {
            epochs: 0,
            ..TrainingConfig::default()
        };
        assert!(matches!(bad.validate(), Err(Error::InvalidConfig(_))));

        let bad = TrainingConfig {
            val_ratio: 1.0,
            ..TrainingConfig::default()
        };
        assert!(matches!(bad.validate(), Err(Error::InvalidConfig(_))));

        assert!(TrainingConfig::tiny().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TrainingConfig =
            serde_json::from_str(r#"{"epochs": 3, "filter_sizes": [2]}"#).unwrap();
        assert_eq!(config.epochs, 3);
        assert_eq!(config.filter_sizes, vec![2]);
        assert_eq!(config.batch_size, TrainingConfig::default().batch_size);
    }

    #[test]
    fn test_run_records_every_epoch() {
        let run = Trainer::new(quick_config()).unwrap().run(&toy_dataset()).unwrap();

        assert_eq!(run.report.history.len(), 3);
        assert_eq!(run.labels.len(), 2);
        assert!(run.report.best_val_loss.is_some());
        for summary in &run.report.history {
            assert!(summary.train_loss.is_finite());
            assert!(summary.validation.is_some());
        }
    }

    #[test]
    fn test_restore_best_keeps_best_parameters() {
        let run = Trainer::new(quick_config()).unwrap().run(&toy_dataset()).unwrap();
        let best = run.report.best_parameters.clone().unwrap();
        assert_eq!(run.model.parameters(), best);
    }

    #[test]
    fn test_evaluate_does_not_modify_model() {
        let run = Trainer::new(quick_config()).unwrap().run(&toy_dataset()).unwrap();
        let encoded =
            EncodedDataset::encode(&toy_dataset().data, &run.vocab, &run.labels, 8).unwrap();

        let before = run.model.parameters();
        let eval = evaluate(&run.model, &encoded, 5).unwrap();
        assert_eq!(run.model.parameters(), before);
        assert_eq!(eval.examples, 24);
        assert!(eval.loss >= 0.0);
        assert!((0.0..=1.0).contains(&eval.accuracy));
    }

    #[test]
    fn test_evaluate_rejects_empty_dataset() {
        let model = TextCnn::new(TextCnnConfig::tiny(10, 2)).unwrap();
        let empty = EncodedDataset {
            num_classes: 2,
            ..EncodedDataset::default()
        };
        assert!(matches!(evaluate(&model, &empty, 4), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_fit_without_validation() {
        let data = toy_dataset();
        let sentences = data.sentences();
        let vocab = Vocabulary::build(&sentences, 1);
        let labels = LabelMap::from_labels(data.labels());
        let train = EncodedDataset::encode(&data.data, &vocab, &labels, 8).unwrap();
        let val = EncodedDataset {
            num_classes: 2,
            ..EncodedDataset::default()
        };

        let config = quick_config();
        let mut model = TextCnn::new(config.model_config(vocab.len(), labels.len())).unwrap();
        let report = Trainer::new(config).unwrap().fit(&mut model, &train, &val).unwrap();

        assert!(report.best_parameters.is_none());
        assert!(report.history.iter().all(|e| e.validation.is_none()));
    }
}
