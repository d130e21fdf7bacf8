//! Vocabulary, Label Map and Sequence Encoding
//!
//! The classifier never sees raw text. Every exercise description goes through
//! three steps before it reaches the network:
//!
//! 1. **Tokenize**: lower-case the sentence and split it on whitespace
//! 2. **Look up**: map every token to its vocabulary index (unknown → 0)
//! 3. **Pad / truncate**: produce exactly `max_len` indices
//!
//! ```text
//! vocab  = {"<PAD>": 0, "cat": 1, "dog": 2, "sat": 3, "ran": 4}
//! "cat sat"       -> [1, 3, 0, 0]
//! "dog ran fast"  -> [2, 4, 0, 0]   ("fast" is unknown)
//! ```
//!
//! Index 0 is reserved for padding. Unknown tokens also map to 0, so an
//! unknown word and a padding slot look the same to the network.
//!
//! Labels follow a stricter rule: an unknown label while encoding training
//! targets is an error, while an unseen class index during decoding turns into
//! the [`UNKNOWN_LABEL`] sentinel.
//!
//! Both mappings are persisted as plain JSON objects (`token -> index`,
//! `label -> index`) and validated on load.

use crate::error::{Error, Result};
use crate::tensor::Tensor;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// Token reserved for padding
pub const PAD_TOKEN: &str = "<PAD>";
/// Index of the padding token (also used for unknown tokens)
pub const PAD_INDEX: usize = 0;
/// Label returned when decoding a class index the label map doesn't know
pub const UNKNOWN_LABEL: &str = "unknown";

/// Split a sentence into lower-cased whitespace-separated tokens
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Word → index mapping with index 0 reserved for `<PAD>`
///
/// Immutable once built: training and inference only read from it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, usize>",
    into = "BTreeMap<String, usize>"
)]
pub struct Vocabulary {
    token_to_id: HashMap<String, usize>,
}

impl Vocabulary {
    /// Build a vocabulary from a corpus of sentences
    ///
    /// Token frequencies are counted across the whole corpus; tokens seen at
    /// least `min_frequency` times are kept and numbered 1..N in sorted
    /// order, so the same corpus and threshold always produce the same
    /// mapping.
    ///
    /// # Example
    ///
    /// ```rust
    /// use textcnn::Vocabulary;
    ///
    /// let vocab = Vocabulary::build(&["the cat sat", "the dog"], 1);
    /// assert_eq!(vocab.get("<PAD>"), Some(0));
    /// assert_eq!(vocab.get("cat"), Some(1));
    /// assert_eq!(vocab.len(), 5);
    /// ```
    pub fn build<S: AsRef<str>>(corpus: &[S], min_frequency: usize) -> Self {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for sentence in corpus {
            for token in tokenize(sentence.as_ref()) {
                *counts.entry(token).or_insert(0) += 1;
            }
        }

        let mut kept: Vec<String> = counts
            .into_iter()
            .filter(|(_, count)| *count >= min_frequency)
            .map(|(token, _)| token)
            .collect();
        kept.sort();

        let mut token_to_id = HashMap::with_capacity(kept.len() + 1);
        token_to_id.insert(PAD_TOKEN.to_string(), PAD_INDEX);
        for (i, token) in kept.into_iter().enumerate() {
            token_to_id.insert(token, i + 1);
        }

        tracing::debug!(
            size = token_to_id.len(),
            min_frequency,
            "built vocabulary"
        );
        Self { token_to_id }
    }

    /// Wrap an existing mapping after checking it is well formed
    ///
    /// `<PAD>` must map to 0 and the indices must be exactly `0..len`.
    pub fn from_map(map: BTreeMap<String, usize>) -> Result<Self> {
        if map.get(PAD_TOKEN) != Some(&PAD_INDEX) {
            return Err(Error::InvalidData(format!(
                "vocabulary must map {PAD_TOKEN} to {PAD_INDEX}"
            )));
        }
        check_dense(map.values().copied(), map.len(), "vocabulary")?;
        Ok(Self {
            token_to_id: map.into_iter().collect(),
        })
    }

    /// Number of entries, padding included
    pub fn len(&self) -> usize {
        self.token_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }

    pub fn get(&self, token: &str) -> Option<usize> {
        self.token_to_id.get(token).copied()
    }

    /// Encode a sentence as exactly `max_len` indices
    ///
    /// Unknown tokens become [`PAD_INDEX`]; short sentences are right-padded
    /// with [`PAD_INDEX`] and long ones keep their first `max_len` tokens.
    /// Never fails, an empty sentence encodes to all zeros.
    pub fn encode(&self, sentence: &str, max_len: usize) -> Vec<usize> {
        let mut ids: Vec<usize> = tokenize(sentence)
            .iter()
            .take(max_len)
            .map(|token| self.get(token).unwrap_or(PAD_INDEX))
            .collect();
        ids.resize(max_len, PAD_INDEX);
        ids
    }

    /// Encode many sentences in parallel, preserving their order
    pub fn encode_batch<S: AsRef<str> + Sync>(
        &self,
        sentences: &[S],
        max_len: usize,
    ) -> Vec<Vec<usize>> {
        sentences
            .par_iter()
            .map(|s| self.encode(s.as_ref(), max_len))
            .collect()
    }

    /// Save the vocabulary as a JSON object `token -> index`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a vocabulary saved with [`Vocabulary::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl TryFrom<BTreeMap<String, usize>> for Vocabulary {
    type Error = Error;

    fn try_from(map: BTreeMap<String, usize>) -> Result<Self> {
        Self::from_map(map)
    }
}

impl From<Vocabulary> for BTreeMap<String, usize> {
    fn from(vocab: Vocabulary) -> Self {
        vocab.token_to_id.into_iter().collect()
    }
}

/// Label string ↔ dense class index
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, usize>",
    into = "BTreeMap<String, usize>"
)]
pub struct LabelMap {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelMap {
    /// Build a label map from the labels seen in a corpus
    ///
    /// Distinct labels are sorted before numbering so the mapping doesn't
    /// depend on the order of the examples.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut distinct: Vec<String> = labels
            .into_iter()
            .map(|l| l.as_ref().to_string())
            .collect();
        distinct.sort();
        distinct.dedup();

        let index = distinct
            .iter()
            .enumerate()
            .map(|(i, label)| (label.clone(), i))
            .collect();
        Self {
            labels: distinct,
            index,
        }
    }

    /// Wrap an existing `label -> index` mapping; indices must be `0..len`
    pub fn from_map(map: BTreeMap<String, usize>) -> Result<Self> {
        check_dense(map.values().copied(), map.len(), "label map")?;

        let mut labels = vec![String::new(); map.len()];
        for (label, &i) in &map {
            labels[i] = label.clone();
        }
        Ok(Self {
            labels,
            index: map.into_iter().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Class index of a label, failing loudly on labels never seen in training
    pub fn index_of(&self, label: &str) -> Result<usize> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| Error::UnknownLabel(label.to_string()))
    }

    /// Label of a class index, or [`UNKNOWN_LABEL`] for indices out of range
    pub fn decode(&self, index: usize) -> &str {
        self.labels.get(index).map_or(UNKNOWN_LABEL, String::as_str)
    }

    /// Labels in class-index order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl TryFrom<BTreeMap<String, usize>> for LabelMap {
    type Error = Error;

    fn try_from(map: BTreeMap<String, usize>) -> Result<Self> {
        Self::from_map(map)
    }
}

impl From<LabelMap> for BTreeMap<String, usize> {
    fn from(labels: LabelMap) -> Self {
        labels.index.into_iter().collect()
    }
}

/// Map every label to its class index
///
/// # Errors
///
/// [`Error::UnknownLabel`] for the first label missing from `label_map`.
pub fn encode_labels<S: AsRef<str>>(labels: &[S], label_map: &LabelMap) -> Result<Vec<usize>> {
    labels
        .iter()
        .map(|label| label_map.index_of(label.as_ref()))
        .collect()
}

/// One-hot matrix `[indices.len(), num_classes]`
///
/// # Panics
///
/// Panics if an index is not below `num_classes`.
pub fn one_hot(indices: &[usize], num_classes: usize) -> Tensor {
    let mut data = vec![0.0; indices.len() * num_classes];
    for (row, &class) in indices.iter().enumerate() {
        assert!(
            class < num_classes,
            "class index {class} out of range for {num_classes} classes"
        );
        data[row * num_classes + class] = 1.0;
    }
    Tensor::new(data, vec![indices.len(), num_classes])
}

fn check_dense(indices: impl Iterator<Item = usize>, len: usize, what: &str) -> Result<()> {
    let mut seen = vec![false; len];
    for i in indices {
        if i >= len || seen[i] {
            return Err(Error::InvalidData(format!(
                "{what} indices must be unique and cover 0..{len}, found {i}"
            )));
        }
        seen[i] = true;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn animal_vocab() -> Vocabulary {
        let pairs = [("<PAD>", 0), ("cat", 1), ("dog", 2), ("sat", 3), ("ran", 4)];
        let map: BTreeMap<String, usize> = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Vocabulary::from_map(map).unwrap()
    }

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        assert_eq!(
            tokenize("  Find the\tShortest   PATH\n"),
            vec!["find", "the", "shortest", "path"]
        );
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_build_sorted_and_padded() {
        let vocab = Vocabulary::build(&["b a", "C a"], 1);
        assert_eq!(vocab.get(PAD_TOKEN), Some(0));
        assert_eq!(vocab.get("a"), Some(1));
        assert_eq!(vocab.get("b"), Some(2));
        assert_eq!(vocab.get("c"), Some(3));
        assert_eq!(vocab.len(), 4);
    }

    #[test]
    fn test_build_min_frequency() {
        let vocab = Vocabulary::build(&["graph graph tree", "graph heap"], 2);
        assert_eq!(vocab.len(), 2);
        assert_eq!(vocab.get("graph"), Some(1));
        assert_eq!(vocab.get("tree"), None);
    }

    #[test]
    fn test_build_is_deterministic() {
        let corpus = ["find the kth largest element", "merge two sorted lists", "the end"];
        assert_eq!(Vocabulary::build(&corpus, 1), Vocabulary::build(&corpus, 1));
    }

    #[test]
    fn test_encode_pads_and_maps_unknown() {
        let vocab = animal_vocab();
        assert_eq!(vocab.encode("cat sat", 4), vec![1, 3, 0, 0]);
        assert_eq!(vocab.encode("dog ran fast", 4), vec![2, 4, 0, 0]);
        assert_eq!(vocab.encode("", 4), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_encode_truncates() {
        let vocab = animal_vocab();
        assert_eq!(vocab.encode("cat dog sat ran cat dog", 4), vec![1, 2, 3, 4]);
        assert_eq!(vocab.encode("Cat DOG", 1), vec![1]);
    }

    #[test]
    fn test_from_map_rejects_bad_padding() {
        let map: BTreeMap<String, usize> = [("<PAD>".to_string(), 1), ("cat".to_string(), 0)]
            .into_iter()
            .collect();
        assert!(Vocabulary::from_map(map).is_err());
    }

    #[test]
    fn test_from_map_rejects_gaps() {
        let map: BTreeMap<String, usize> = [("<PAD>".to_string(), 0), ("cat".to_string(), 2)]
            .into_iter()
            .collect();
        assert!(Vocabulary::from_map(map).is_err());
    }

    #[test]
    fn test_vocab_json_is_plain_mapping() {
        let vocab = animal_vocab();
        let json = serde_json::to_string(&vocab).unwrap();
        assert!(json.contains("\"<PAD>\":0"));
        let back: Vocabulary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vocab);
    }

    #[test]
    fn test_label_map_sorted_and_decode() {
        let labels = LabelMap::from_labels(["DFS", "BFS", "DFS", "Greedy Algorithm"]);
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.index_of("BFS").unwrap(), 0);
        assert_eq!(labels.decode(2), "Greedy Algorithm");
        assert_eq!(labels.decode(3), UNKNOWN_LABEL);
    }

    #[test]
    fn test_encode_labels_unknown_fails() {
        let labels = LabelMap::from_labels(["BFS", "DFS"]);
        assert_eq!(encode_labels(&["DFS", "BFS"], &labels).unwrap(), vec![1, 0]);
        match encode_labels(&["BFS", "Game Theory"], &labels) {
            Err(Error::UnknownLabel(label)) => assert_eq!(label, "Game Theory"),
            other => panic!("expected UnknownLabel, got {other:?}"),
        }
    }

    #[test]
    fn test_label_map_from_map_inverse() {
        let map: BTreeMap<String, usize> = [("N/A".to_string(), 1), ("BFS".to_string(), 0)]
            .into_iter()
            .collect();
        let labels = LabelMap::from_map(map).unwrap();
        assert_eq!(labels.labels(), &["BFS".to_string(), "N/A".to_string()]);
    }

    #[test]
    fn test_one_hot() {
        let y = one_hot(&[2, 0, 1], 3);
        assert_eq!(y.shape, vec![3, 3]);
        assert_eq!(y.data, vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        for i in 0..3 {
            assert_eq!(y.row(i).iter().sum::<f32>(), 1.0);
        }
    }
}
