//! TextCNN: Convolutional Text Classification from Scratch
//!
//! A small convolutional network that reads a programming exercise
//! description and predicts which algorithmic technique it calls for
//! (BFS, dynamic programming, greedy, ...). Every layer, its backward pass
//! and the training loop are implemented by hand on a plain CPU tensor.
//!
//! # Architecture
//!
//! ```text
//! token ids [B, L]
//!   → embedding            [B, L, D]
//!   → conv1d per width w   [B, L-w+1, F]  → ReLU → max over time [B, F]
//!   → concat               [B, F · widths]
//!   → linear               [B, classes]
//!   → softmax
//! ```
//!
//! # Modules
//!
//! - [`tensor`] - Row-major f32 tensor with the few operations the model needs
//! - [`vocab`] - Tokenization, vocabulary and label encoding
//! - [`dataset`] - JSON datasets, train/validation split, batching
//! - [`layers`] - Embedding, convolution, linear layer and activations
//! - [`loss`] - Softmax, cross-entropy and accuracy
//! - [`model`] - The classifier: forward, backward, SGD update
//! - [`checkpoint`] - Binary parameter snapshots
//! - [`train`] - Epoch loop, evaluation, best-model tracking
//! - [`training_logger`] - Per-epoch CSV metrics
//! - [`predict`] - Text in, label out
//!
//! # Example
//!
//! ```rust
//! use textcnn::{LabelMap, TextCnn, TextCnnConfig, Vocabulary};
//!
//! // Indices follow sorted token order: cat=1, dog=2, sat=3
//! let vocab = Vocabulary::build(&["cat sat", "dog sat"], 1);
//! assert_eq!(vocab.encode("cat sat", 4), vec![1, 3, 0, 0]);
//! assert_eq!(vocab.encode("dog ran fast", 4), vec![2, 0, 0, 0]);
//!
//! let labels = LabelMap::from_labels(["animal", "motion"]);
//! let model = TextCnn::new(TextCnnConfig::tiny(vocab.len(), labels.len()))?;
//! let probs = model.predict_proba(&[vocab.encode("dog ran", 20)])?;
//! assert_eq!(probs.shape, vec![1, 2]);
//! # Ok::<(), textcnn::Error>(())
//! ```

pub mod checkpoint;
pub mod dataset;
pub mod error;
pub mod layers;
pub mod loss;
pub mod model;
pub mod predict;
pub mod tensor;
pub mod train;
pub mod training_logger;
pub mod vocab;

// Re-export main types for convenience
pub use checkpoint::{load_model, Checkpoint, CheckpointMetadata};
pub use dataset::{
    train_val_split, Batch, BatchLoader, Dataset, DatasetStats, EncodedDataset, Example,
};
pub use error::{Error, Result};
pub use loss::{accuracy, cross_entropy_loss, softmax, softmax_cross_entropy_backward};
pub use model::{ForwardCache, TextCnn, TextCnnConfig, TextCnnGradients, TextCnnParameters};
pub use predict::{Prediction, Predictor};
pub use tensor::Tensor;
pub use train::{
    evaluate, EpochSummary, Evaluation, Trainer, TrainingConfig, TrainingReport, TrainingRun,
};
pub use training_logger::TrainingLogger;
pub use vocab::{
    encode_labels, one_hot, tokenize, LabelMap, Vocabulary, PAD_INDEX, PAD_TOKEN, UNKNOWN_LABEL,
};
