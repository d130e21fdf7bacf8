//! Inference
//!
//! A [`Predictor`] bundles a trained classifier with the vocabulary and label
//! map it was trained with, turning raw exercise text into a label.
//!
//! ## Artifact Directory
//!
//! ```text
//! <dir>/vocab.json    token -> index
//! <dir>/labels.json   label -> index
//! <dir>/model.bin     parameter snapshot
//! ```

use crate::checkpoint::{load_model, Checkpoint, CheckpointMetadata};
use crate::error::{Error, Result};
use crate::model::TextCnn;
use crate::vocab::{LabelMap, Vocabulary};
use std::fs;
use std::path::Path;

pub const VOCAB_FILE: &str = "vocab.json";
pub const LABELS_FILE: &str = "labels.json";
pub const MODEL_FILE: &str = "model.bin";

/// A classified sentence
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub index: usize,
    /// Probability of the predicted class
    pub confidence: f32,
    /// Probability of every class, in label-index order
    pub probabilities: Vec<f32>,
}

/// Trained classifier with its encoders
pub struct Predictor {
    vocab: Vocabulary,
    labels: LabelMap,
    model: TextCnn,
}

impl Predictor {
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if the vocabulary or label map size doesn't
    /// match the model.
    pub fn new(vocab: Vocabulary, labels: LabelMap, model: TextCnn) -> Result<Self> {
        let config = model.config();
        if vocab.len() != config.vocab_size {
            return Err(Error::InvalidConfig(format!(
                "vocabulary has {} entries, model expects {}",
                vocab.len(),
                config.vocab_size
            )));
        }
        if labels.len() != config.num_classes {
            return Err(Error::InvalidConfig(format!(
                "label map has {} labels, model expects {}",
                labels.len(),
                config.num_classes
            )));
        }
        Ok(Self { vocab, labels, model })
    }

    pub fn model(&self) -> &TextCnn {
        &self.model
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    /// Classify one sentence
    pub fn predict(&self, sentence: &str) -> Result<Prediction> {
        let mut predictions = self.predict_batch(&[sentence])?;
        predictions
            .pop()
            .ok_or_else(|| Error::InvalidData("no prediction produced".into()))
    }

    /// Classify several sentences in one forward pass
    pub fn predict_batch<S: AsRef<str> + Sync>(&self, sentences: &[S]) -> Result<Vec<Prediction>> {
        let inputs = self.vocab.encode_batch(sentences, self.model.config().max_len);
        let probs = self.model.predict_proba(&inputs)?;
        let indices = probs.argmax_rows();

        Ok(indices
            .into_iter()
            .enumerate()
            .map(|(row, index)| {
                let probabilities = probs.row(row).to_vec();
                Prediction {
                    label: self.labels.decode(index).to_string(),
                    index,
                    confidence: probabilities[index],
                    probabilities,
                }
            })
            .collect())
    }

    /// Write vocabulary, labels and model snapshot into `dir`
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        self.save_with_metadata(dir, CheckpointMetadata::default())
    }

    /// Like [`Predictor::save`], recording training progress in the snapshot
    pub fn save_with_metadata<P: AsRef<Path>>(
        &self,
        dir: P,
        metadata: CheckpointMetadata,
    ) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        self.vocab.save(dir.join(VOCAB_FILE))?;
        self.labels.save(dir.join(LABELS_FILE))?;
        Checkpoint {
            model: self.model.clone(),
            metadata,
        }
        .save(dir.join(MODEL_FILE))
    }

    /// Load a predictor written by [`Predictor::save`]
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let vocab = Vocabulary::load(dir.join(VOCAB_FILE))?;
        let labels = LabelMap::load(dir.join(LABELS_FILE))?;
        let model = load_model(dir.join(MODEL_FILE))?;
        Self::new(vocab, labels, model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TextCnnConfig;

    fn predictor() -> Predictor {
        let vocab = Vocabulary::build(&["graph shortest path", "subarray maximum sum"], 1);
        let labels = LabelMap::from_labels(["BFS", "DP", "Greedy"]);
        let mut config = TextCnnConfig::tiny(vocab.len(), labels.len());
        config.max_len = 6;
        let model = TextCnn::new(config).unwrap();
        Predictor::new(vocab, labels, model).unwrap()
    }

    #[test]
    fn test_prediction_is_consistent() {
        let p = predictor();
        let pred = p.predict("shortest path in a graph").unwrap();

        assert_eq!(pred.probabilities.len(), 3);
        let sum: f32 = pred.probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(pred.label, p.labels().decode(pred.index));
        assert!(pred.probabilities.iter().all(|&q| q <= pred.confidence));
    }

    #[test]
    fn test_batch_matches_single() {
        let p = predictor();
        let batch = p.predict_batch(&["maximum sum", "graph path"]).unwrap();
        let single = p.predict("graph path").unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].index, single.index);
        for (a, b) in batch[1].probabilities.iter().zip(&single.probabilities) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_rejects_mismatched_label_map() {
        let vocab = Vocabulary::build(&["a b c"], 1);
        let model = TextCnn::new(TextCnnConfig::tiny(vocab.len(), 2)).unwrap();
        let labels = LabelMap::from_labels(["x", "y", "z"]);
        assert!(matches!(
            Predictor::new(vocab, labels, model),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_save_and_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        let p = predictor();
        p.save(dir.path()).unwrap();

        let loaded = Predictor::load(dir.path()).unwrap();
        let a = p.predict("subarray sum").unwrap();
        let b = loaded.predict("subarray sum").unwrap();
        assert_eq!(a, b);
    }
}
