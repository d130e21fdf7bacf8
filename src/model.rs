//! Convolutional Text Classifier
//!
//! This module implements the TextCNN classifier: a single embedding table
//! shared by several convolution filter widths, max-pooled over time and
//! fed to a fully connected softmax layer. Forward and backward passes are
//! written out by hand.
//!
//! ## Architecture Overview
//!
//! ```text
//! Input indices [B, max_len]
//!     ↓
//! Embedding lookup [B, max_len, D]
//!     ├──────────────┬──────────────┐
//!     ↓              ↓              ↓
//! Conv width w1  Conv width w2  ...            [B, max_len - w + 1, F]
//! ReLU           ReLU
//! Max over time  Max over time                 [B, F]
//!     └──────────────┴──────────────┘
//!     ↓ concat
//! FC input [B, F · widths]
//!     ↓
//! Linear → softmax [B, num_classes]
//! ```
//!
//! ## Forward / Backward Protocol
//!
//! The classifier is in one of two states:
//!
//! - **no cache**: only [`TextCnn::forward`] may be called
//! - **cache ready**: [`TextCnn::forward`] again (overwrites the cache) or
//!   [`TextCnn::backward`] (consumes the cache)
//!
//! `backward` must receive the same inputs as the preceding `forward`. It
//! computes every gradient first and updates parameters last, so a call that
//! fails leaves the model unchanged.
//!
//! ## Parameter Update
//!
//! Plain gradient descent with the configured learning rate. Filter banks
//! and the fully connected layer take a dense step. The embedding table takes
//! one step per token occurrence in the batch (see
//! [`crate::layers::embedding`]).
//!
//! ## Example
//!
//! ```rust
//! use textcnn::{one_hot, TextCnn, TextCnnConfig};
//!
//! let config = TextCnnConfig::tiny(10, 2);
//! let mut model = TextCnn::new(config)?;
//!
//! let mut row = vec![0; 20];
//! row[..3].copy_from_slice(&[1, 2, 3]);
//! let inputs = vec![row];
//! let targets = one_hot(&[1], 2);
//! let loss = model.train_on_batch(&inputs, &targets)?;
//! assert!(loss > 0.0);
//! # Ok::<(), textcnn::Error>(())
//! ```

use crate::error::{Error, Result};
use crate::layers::{Conv1d, Conv1dCache, Embedding, Linear, LinearCache};
use crate::loss::{cross_entropy_loss, softmax, softmax_cross_entropy_backward};
use crate::tensor::Tensor;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn default_seed() -> u64 {
    42
}

/// Hyperparameters of the classifier
///
/// Everything needed to rebuild parameter shapes, plus the learning rate and
/// the initialization seed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextCnnConfig {
    pub vocab_size: usize,
    pub embedding_dim: usize,
    pub max_len: usize,
    pub num_filters: usize,
    pub filter_sizes: Vec<usize>,
    pub num_classes: usize,
    pub learning_rate: f32,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for TextCnnConfig {
    fn default() -> Self {
        Self {
            vocab_size: 5000,
            embedding_dim: 50,
            max_len: 40,
            num_filters: 64,
            filter_sizes: vec![2, 3, 4],
            num_classes: 10,
            learning_rate: 0.01,
            seed: default_seed(),
        }
    }
}

impl TextCnnConfig {
    /// Tiny model for tests and quick experiments
    pub fn tiny(vocab_size: usize, num_classes: usize) -> Self {
        Self {
            vocab_size,
            embedding_dim: 16,
            max_len: 20,
            num_filters: 8,
            filter_sizes: vec![2, 3],
            num_classes,
            learning_rate: 0.05,
            seed: default_seed(),
        }
    }

    /// Small model, a reasonable starting point for the exercise dataset
    pub fn small(vocab_size: usize, num_classes: usize) -> Self {
        Self {
            vocab_size,
            embedding_dim: 50,
            max_len: 40,
            num_filters: 32,
            filter_sizes: vec![2, 3, 4],
            num_classes,
            learning_rate: 0.01,
            seed: default_seed(),
        }
    }

    /// Width of the fully connected input: `num_filters · filter_sizes.len()`
    pub fn fc_input_dim(&self) -> usize {
        self.num_filters * self.filter_sizes.len()
    }

    /// Reject configurations whose shapes can't work
    ///
    /// In particular every filter width must fit in `max_len`, otherwise the
    /// convolution would have no valid positions.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("vocab_size", self.vocab_size),
            ("embedding_dim", self.embedding_dim),
            ("max_len", self.max_len),
            ("num_filters", self.num_filters),
            ("num_classes", self.num_classes),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{name} must be > 0")));
            }
        }

        if self.filter_sizes.is_empty() {
            return Err(Error::InvalidConfig("filter_sizes must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for &fs in &self.filter_sizes {
            if fs == 0 {
                return Err(Error::InvalidConfig("filter sizes must be > 0".into()));
            }
            if fs > self.max_len {
                return Err(Error::InvalidConfig(format!(
                    "filter size {fs} exceeds max_len {}",
                    self.max_len
                )));
            }
            if !seen.insert(fs) {
                return Err(Error::InvalidConfig(format!("duplicate filter size {fs}")));
            }
        }

        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning_rate must be finite and > 0, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

/// A full copy of the learned parameters
///
/// Filter banks are listed in the order of `filter_sizes`.
#[derive(Clone, Debug, PartialEq)]
pub struct TextCnnParameters {
    pub embeddings: Tensor,
    pub filters: Vec<Tensor>,
    pub fc_weight: Tensor,
    pub fc_bias: Tensor,
}

/// Everything the backward pass needs from one forward pass
#[derive(Clone, Debug)]
pub struct ForwardCache {
    pub inputs: Vec<Vec<usize>>,
    /// `[B, max_len, D]`
    pub embedded: Tensor,
    /// One per filter width: raw and activated outputs plus arg-max positions
    pub conv_caches: Vec<Conv1dCache>,
    /// One `[B, F]` block per filter width
    pub pooled: Vec<Tensor>,
    /// Holds the concatenated FC input `[B, F · widths]`
    pub fc_cache: LinearCache,
    pub probs: Tensor,
}

impl ForwardCache {
    pub fn batch_size(&self) -> usize {
        self.inputs.len()
    }
}

/// Gradients of the mean cross-entropy for one batch
#[derive(Clone, Debug, PartialEq)]
pub struct TextCnnGradients {
    /// Per-position gradient of the embedded batch `[B, max_len, D]`
    pub embedded: Tensor,
    /// One per filter width, same shapes as the filter banks
    pub filters: Vec<Tensor>,
    pub fc_weight: Tensor,
    pub fc_bias: Tensor,
}

impl TextCnnGradients {
    /// Global L2 norm over all gradients
    pub fn norm(&self) -> f32 {
        let filters: f32 = self.filters.iter().map(Tensor::sum_squares).sum();
        let dense = self.fc_weight.sum_squares() + self.fc_bias.sum_squares();
        (self.embedded.sum_squares() + filters + dense).sqrt()
    }
}

/// TextCNN classifier
///
/// Owns its parameters exclusively. They can be read through the getters
/// and changed only by [`TextCnn::backward`] / [`TextCnn::train_on_batch`].
#[derive(Clone, Debug)]
pub struct TextCnn {
    config: TextCnnConfig,
    embedding: Embedding,
    convs: Vec<Conv1d>,
    fc: Linear,
    cache: Option<ForwardCache>,
}

impl TextCnn {
    /// Build a randomly initialized classifier
    ///
    /// # Initialization
    ///
    /// All draws come from `StdRng::seed_from_u64(config.seed)`:
    ///
    /// ```text
    /// embeddings  N(0,1) · 0.01
    /// filters     N(0,1) · √(2 / (width · D))
    /// fc weight   N(0,1) · √(1 / fc_in)
    /// fc bias     0
    /// ```
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if the configuration fails validation, e.g. a
    /// filter width larger than `max_len`.
    pub fn new(config: TextCnnConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let embedding = Embedding::new(config.vocab_size, config.embedding_dim, &mut rng);
        let convs = config
            .filter_sizes
            .iter()
            .map(|&fs| Conv1d::new(fs, config.embedding_dim, config.num_filters, &mut rng))
            .collect();
        let fc = Linear::new(config.fc_input_dim(), config.num_classes, &mut rng);

        let model = Self {
            config,
            embedding,
            convs,
            fc,
            cache: None,
        };
        tracing::info!(
            parameters = model.num_parameters(),
            filter_sizes = ?model.config.filter_sizes,
            "initialized TextCNN"
        );
        Ok(model)
    }

    /// Rebuild a classifier from saved parameters
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] for a bad configuration, or
    /// [`Error::InvalidShape`] if a tensor doesn't match the configuration.
    pub fn from_parameters(config: TextCnnConfig, params: TextCnnParameters) -> Result<Self> {
        config.validate()?;

        let expect = |name: &str, tensor: &Tensor, shape: Vec<usize>| -> Result<()> {
            if tensor.shape != shape {
                return Err(Error::InvalidShape(format!(
                    "{name}: expected {shape:?}, found {:?}",
                    tensor.shape
                )));
            }
            Ok(())
        };

        expect("embeddings", &params.embeddings, vec![config.vocab_size, config.embedding_dim])?;
        if params.filters.len() != config.filter_sizes.len() {
            return Err(Error::InvalidShape(format!(
                "expected {} filter banks, found {}",
                config.filter_sizes.len(),
                params.filters.len()
            )));
        }
        for (&fs, bank) in config.filter_sizes.iter().zip(&params.filters) {
            expect(
                &format!("filters[{fs}]"),
                bank,
                vec![fs, config.embedding_dim, config.num_filters],
            )?;
        }
        expect("fc_weight", &params.fc_weight, vec![config.fc_input_dim(), config.num_classes])?;
        expect("fc_bias", &params.fc_bias, vec![1, config.num_classes])?;

        let convs = config
            .filter_sizes
            .iter()
            .zip(params.filters)
            .map(|(&width, filters)| Conv1d { width, filters })
            .collect();

        Ok(Self {
            embedding: Embedding {
                weight: params.embeddings,
            },
            convs,
            fc: Linear {
                weight: params.fc_weight,
                bias: params.fc_bias,
            },
            config,
            cache: None,
        })
    }

    pub fn config(&self) -> &TextCnnConfig {
        &self.config
    }

    pub fn embeddings(&self) -> &Tensor {
        &self.embedding.weight
    }

    /// Filter bank of the given width, if configured
    pub fn filters(&self, width: usize) -> Option<&Tensor> {
        self.convs.iter().find(|c| c.width == width).map(|c| &c.filters)
    }

    /// Filter banks in `filter_sizes` order
    pub fn filter_banks(&self) -> impl Iterator<Item = &Tensor> {
        self.convs.iter().map(|c| &c.filters)
    }

    pub fn fc_weight(&self) -> &Tensor {
        &self.fc.weight
    }

    pub fn fc_bias(&self) -> &Tensor {
        &self.fc.bias
    }

    /// Copy of every parameter, e.g. for serialization
    pub fn parameters(&self) -> TextCnnParameters {
        TextCnnParameters {
            embeddings: self.embedding.weight.clone(),
            filters: self.convs.iter().map(|c| c.filters.clone()).collect(),
            fc_weight: self.fc.weight.clone(),
            fc_bias: self.fc.bias.clone(),
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.embedding.weight.data.len()
            + self.convs.iter().map(|c| c.filters.data.len()).sum::<usize>()
            + self.fc.weight.data.len()
            + self.fc.bias.data.len()
    }

    /// Whether a forward cache is waiting for `backward`
    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    fn check_inputs(&self, inputs: &[Vec<usize>]) -> Result<()> {
        if inputs.is_empty() {
            return Err(Error::InvalidShape("empty batch".into()));
        }
        for (b, row) in inputs.iter().enumerate() {
            if row.len() != self.config.max_len {
                return Err(Error::InvalidShape(format!(
                    "example {b} has length {}, expected max_len {}",
                    row.len(),
                    self.config.max_len
                )));
            }
            if let Some(&id) = row.iter().find(|&&id| id >= self.config.vocab_size) {
                return Err(Error::InvalidData(format!(
                    "example {b} contains index {id} outside vocabulary of {}",
                    self.config.vocab_size
                )));
            }
        }
        Ok(())
    }

    fn check_targets(&self, targets: &Tensor, batch: usize) -> Result<()> {
        if targets.shape != [batch, self.config.num_classes] {
            return Err(Error::InvalidShape(format!(
                "targets must be [{batch}, {}], found {:?}",
                self.config.num_classes, targets.shape
            )));
        }
        Ok(())
    }

    /// Forward pass without touching the classifier state
    ///
    /// # Returns
    ///
    /// Tuple of (probabilities `[B, num_classes]`, cache)
    pub fn forward_cached(&self, inputs: &[Vec<usize>]) -> Result<(Tensor, ForwardCache)> {
        self.check_inputs(inputs)?;

        let embedded = self.embedding.forward(inputs);

        let mut conv_caches = Vec::with_capacity(self.convs.len());
        let mut pooled = Vec::with_capacity(self.convs.len());
        for conv in &self.convs {
            let (p, cache) = conv.forward(&embedded);
            pooled.push(p);
            conv_caches.push(cache);
        }

        let fc_input = Tensor::concat_cols(&pooled);
        let (logits, fc_cache) = self.fc.forward(&fc_input);
        let probs = softmax(&logits);

        let cache = ForwardCache {
            inputs: inputs.to_vec(),
            embedded,
            conv_caches,
            pooled,
            fc_cache,
            probs: probs.clone(),
        };
        Ok((probs, cache))
    }

    /// Forward pass that keeps its cache for the next [`TextCnn::backward`]
    pub fn forward(&mut self, inputs: &[Vec<usize>]) -> Result<Tensor> {
        let (probs, cache) = self.forward_cached(inputs)?;
        self.cache = Some(cache);
        Ok(probs)
    }

    /// Class probabilities for inference; leaves any pending cache alone
    pub fn predict_proba(&self, inputs: &[Vec<usize>]) -> Result<Tensor> {
        Ok(self.forward_cached(inputs)?.0)
    }

    /// Most probable class per example
    pub fn predict(&self, inputs: &[Vec<usize>]) -> Result<Vec<usize>> {
        Ok(self.predict_proba(inputs)?.argmax_rows())
    }

    /// All gradients for a batch, given the cache of its forward pass
    ///
    /// Pure: no parameter changes.
    ///
    /// ```text
    /// d_logits   = (probs - y) / B
    /// dW_fc      = fc_inᵀ · d_logits
    /// db_fc      = Σ_rows d_logits
    /// d_fc_in    = d_logits · W_fcᵀ   → split per filter width
    /// per width  → conv backward (max routing, relu', filters, embedded)
    /// ```
    pub fn gradients(
        &self,
        inputs: &[Vec<usize>],
        targets: &Tensor,
        cache: &ForwardCache,
    ) -> Result<TextCnnGradients> {
        if inputs.len() != cache.batch_size() {
            return Err(Error::BatchMismatch {
                expected: cache.batch_size(),
                found: inputs.len(),
            });
        }
        if inputs != cache.inputs.as_slice() {
            return Err(Error::InvalidData(
                "backward inputs differ from the cached forward batch".into(),
            ));
        }
        self.check_targets(targets, inputs.len())?;

        let d_logits = softmax_cross_entropy_backward(&cache.probs, targets);
        let fc_grads = self.fc.backward(&d_logits, &cache.fc_cache);

        let widths = vec![self.config.num_filters; self.convs.len()];
        let d_pooled = fc_grads.x.split_cols(&widths);

        let mut d_embedded = Tensor::zeros(cache.embedded.shape.clone());
        let mut d_filters = Vec::with_capacity(self.convs.len());
        let layers = self.convs.iter().zip(&cache.conv_caches);
        for ((conv, conv_cache), d_pool) in layers.zip(&d_pooled) {
            let grads = conv.backward(d_pool, &cache.embedded, conv_cache);
            for (acc, &g) in d_embedded.data.iter_mut().zip(&grads.embedded.data) {
                *acc += g;
            }
            d_filters.push(grads.filters);
        }

        Ok(TextCnnGradients {
            embedded: d_embedded,
            filters: d_filters,
            fc_weight: fc_grads.weight,
            fc_bias: fc_grads.bias,
        })
    }

    /// Dense `[vocab_size, D]` embedding gradient, duplicates summed
    pub fn embedding_gradient(&self, inputs: &[Vec<usize>], grads: &TextCnnGradients) -> Tensor {
        self.embedding.accumulate_grad(inputs, &grads.embedded)
    }

    fn apply_gradients(&mut self, inputs: &[Vec<usize>], grads: &TextCnnGradients) {
        let lr = self.config.learning_rate;
        for (conv, g) in self.convs.iter_mut().zip(&grads.filters) {
            conv.filters.sgd_step(g, lr);
        }
        self.embedding.sparse_update(inputs, &grads.embedded, lr);
        self.fc.weight.sgd_step(&grads.fc_weight, lr);
        self.fc.bias.sgd_step(&grads.fc_bias, lr);
    }

    /// Backward pass and gradient-descent update
    ///
    /// Consumes the cache of the preceding [`TextCnn::forward`].
    ///
    /// # Errors
    ///
    /// - [`Error::CacheNotReady`] without a preceding `forward`
    /// - [`Error::BatchMismatch`] if the batch size differs from the cached one
    /// - [`Error::InvalidData`] / [`Error::InvalidShape`] for other mismatches
    ///
    /// On error nothing is modified and the cache is kept.
    pub fn backward(
        &mut self,
        inputs: &[Vec<usize>],
        targets: &Tensor,
    ) -> Result<TextCnnGradients> {
        let cache = self.cache.as_ref().ok_or(Error::CacheNotReady)?;
        let grads = self.gradients(inputs, targets, cache)?;

        self.cache = None;
        self.apply_gradients(inputs, &grads);
        Ok(grads)
    }

    /// Forward, cross-entropy loss, backward and update on one batch
    ///
    /// # Returns
    ///
    /// The batch loss before the update
    pub fn train_on_batch(&mut self, inputs: &[Vec<usize>], targets: &Tensor) -> Result<f32> {
        self.check_targets(targets, inputs.len())?;
        let probs = self.forward(inputs)?;
        let loss = cross_entropy_loss(&probs, targets);
        let grads = self.backward(inputs, targets)?;
        tracing::trace!(loss, grad_norm = grads.norm(), batch = inputs.len(), "train_on_batch");
        Ok(loss)
    }
}
