//! Labelled Exercise Datasets
//!
//! Datasets are JSON files of the form
//!
//! ```text
//! {"data": [{"Exercise": "Find the shortest path ...", "Label": "BFS"}, ...]}
//! ```
//!
//! This module loads and saves them, splits them into training and
//! validation sets, reports simple statistics, and turns encoded examples
//! into batches for the classifier.
//!
//! ## Batching
//!
//! ```text
//! inputs  [B][max_len]   token indices
//! targets [B, classes]   one-hot rows, same order as inputs
//! ```
//!
//! The batch loader walks the (optionally shuffled) example order in
//! `batch_size` steps. The last batch may be shorter.

use crate::error::{Error, Result};
use crate::tensor::Tensor;
use crate::vocab::{encode_labels, one_hot, tokenize, LabelMap, Vocabulary};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// One labelled exercise description
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    #[serde(rename = "Exercise")]
    pub exercise: String,
    #[serde(rename = "Label")]
    pub label: String,
}

impl Example {
    pub fn new(exercise: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            exercise: exercise.into(),
            label: label.into(),
        }
    }
}

/// A dataset file: `{"data": [...]}`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub data: Vec<Example>,
}

impl Dataset {
    pub fn new(data: Vec<Example>) -> Self {
        Self { data }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let dataset: Dataset = serde_json::from_str(&json)?;
        tracing::info!(
            path = %path.display(),
            examples = dataset.data.len(),
            "loaded dataset"
        );
        Ok(dataset)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn sentences(&self) -> Vec<&str> {
        self.data.iter().map(|e| e.exercise.as_str()).collect()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.data.iter().map(|e| e.label.as_str()).collect()
    }
}

/// Shuffle with a seeded generator, then cut at `floor(N * (1 - val_ratio))`
///
/// The first part is the training set and the remainder the validation set.
/// The same input order and seed always give the same partitions.
///
/// # Example
///
/// ```rust
/// # use textcnn::train_val_split;
/// let items: Vec<u32> = (0..10).collect();
/// let (train, val) = train_val_split(&items, 0.2, 42).unwrap();
/// assert_eq!(train.len(), 8);
/// assert_eq!(val.len(), 2);
/// ```
pub fn train_val_split<T: Clone>(
    examples: &[T],
    val_ratio: f64,
    seed: u64,
) -> Result<(Vec<T>, Vec<T>)> {
    if !(0.0..=1.0).contains(&val_ratio) {
        return Err(Error::InvalidConfig(format!(
            "val_ratio must be within [0, 1], got {val_ratio}"
        )));
    }

    let mut shuffled = examples.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);

    let split_idx = ((shuffled.len() as f64) * (1.0 - val_ratio)).floor() as usize;
    let split_idx = split_idx.min(shuffled.len());
    let val = shuffled.split_off(split_idx);

    tracing::debug!(train = shuffled.len(), val = val.len(), seed, "split dataset");
    Ok((shuffled, val))
}

/// Sentence-length, vocabulary and label statistics of a set of examples
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DatasetStats {
    pub num_examples: usize,
    pub min_sentence_length: usize,
    pub max_sentence_length: usize,
    pub avg_sentence_length: f64,
    /// Distinct lower-cased tokens, padding not included
    pub distinct_tokens: usize,
    pub label_distribution: BTreeMap<String, usize>,
}

impl DatasetStats {
    pub fn compute(examples: &[Example]) -> Self {
        let lengths: Vec<usize> = examples.iter().map(|e| tokenize(&e.exercise).len()).collect();

        let mut tokens = std::collections::HashSet::new();
        let mut label_distribution = BTreeMap::new();
        for example in examples {
            tokens.extend(tokenize(&example.exercise));
            *label_distribution.entry(example.label.clone()).or_insert(0) += 1;
        }

        let avg_sentence_length = if lengths.is_empty() {
            0.0
        } else {
            lengths.iter().sum::<usize>() as f64 / lengths.len() as f64
        };

        Self {
            num_examples: examples.len(),
            min_sentence_length: lengths.iter().copied().min().unwrap_or(0),
            max_sentence_length: lengths.iter().copied().max().unwrap_or(0),
            avg_sentence_length,
            distinct_tokens: tokens.len(),
            label_distribution,
        }
    }
}

impl fmt::Display for DatasetStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "examples:         {}", self.num_examples)?;
        writeln!(
            f,
            "sentence length:  min {} / avg {:.2} / max {}",
            self.min_sentence_length, self.avg_sentence_length, self.max_sentence_length
        )?;
        writeln!(f, "distinct tokens:  {}", self.distinct_tokens)?;
        writeln!(f, "labels:")?;
        for (label, count) in &self.label_distribution {
            writeln!(f, "  {label:<28} {count}")?;
        }
        Ok(())
    }
}

/// Examples after vocabulary and label encoding
#[derive(Clone, Debug, Default)]
pub struct EncodedDataset {
    pub inputs: Vec<Vec<usize>>,
    pub labels: Vec<usize>,
    pub num_classes: usize,
}

impl EncodedDataset {
    /// Encode sentences with `vocab` and labels with `label_map`
    ///
    /// # Errors
    ///
    /// [`Error::UnknownLabel`] if an example carries a label the map doesn't know.
    pub fn encode(
        examples: &[Example],
        vocab: &Vocabulary,
        label_map: &LabelMap,
        max_len: usize,
    ) -> Result<Self> {
        let sentences: Vec<&str> = examples.iter().map(|e| e.exercise.as_str()).collect();
        let labels: Vec<&str> = examples.iter().map(|e| e.label.as_str()).collect();

        Ok(Self {
            inputs: vocab.encode_batch(&sentences, max_len),
            labels: encode_labels(&labels, label_map)?,
            num_classes: label_map.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Batches in dataset order
    pub fn batches(&self, batch_size: usize) -> BatchLoader<'_> {
        BatchLoader::new(self, batch_size, None)
    }

    /// Batches in an order shuffled by `seed`
    pub fn shuffled_batches(&self, batch_size: usize, seed: u64) -> BatchLoader<'_> {
        BatchLoader::new(self, batch_size, Some(seed))
    }
}

/// A batch of encoded inputs with their targets, rows aligned
#[derive(Clone, Debug)]
pub struct Batch {
    /// `[B][max_len]` token indices
    pub inputs: Vec<Vec<usize>>,
    /// `[B, num_classes]` one-hot targets
    pub targets: Tensor,
    /// `[B]` class indices
    pub labels: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// Walks an [`EncodedDataset`] in fixed-size batches
pub struct BatchLoader<'a> {
    dataset: &'a EncodedDataset,
    order: Vec<usize>,
    batch_size: usize,
    position: usize,
}

impl<'a> BatchLoader<'a> {
    fn new(dataset: &'a EncodedDataset, batch_size: usize, seed: Option<u64>) -> Self {
        let mut order: Vec<usize> = (0..dataset.len()).collect();
        if let Some(seed) = seed {
            order.shuffle(&mut StdRng::seed_from_u64(seed));
        }
        Self {
            dataset,
            order,
            batch_size: batch_size.max(1),
            position: 0,
        }
    }

    /// Number of batches in one pass
    pub fn num_batches(&self) -> usize {
        self.order.len().div_ceil(self.batch_size)
    }

    /// Next batch, or `None` once every example has been served
    pub fn next_batch(&mut self) -> Option<Batch> {
        if self.position >= self.order.len() {
            return None;
        }

        let end = (self.position + self.batch_size).min(self.order.len());
        let rows = &self.order[self.position..end];
        self.position = end;

        let inputs = rows.iter().map(|&i| self.dataset.inputs[i].clone()).collect();
        let labels: Vec<usize> = rows.iter().map(|&i| self.dataset.labels[i]).collect();
        Some(Batch {
            targets: one_hot(&labels, self.dataset.num_classes),
            inputs,
            labels,
        })
    }
}

impl Iterator for BatchLoader<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        self.next_batch()
    }
}
