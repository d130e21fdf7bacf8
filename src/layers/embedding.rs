//! Embedding Layer
//!
//! A learnable lookup table mapping each vocabulary index to a dense vector.
//!
//! ```text
//! Input:  [B][max_len]            token indices
//! Table:  [vocab_size, dim]
//! Output: [B, max_len, dim]       output[b, t] = table[input[b][t]]
//! ```
//!
//! ## Sparse update
//!
//! Only rows whose index occurs in the batch change. The update is applied
//! once per occurrence: for every `(b, t)` the row `input[b][t]` is moved by
//! `-lr · grad[b, t]`. A token that occurs several times in a batch is
//! therefore stepped several times, each with its own positional gradient.
//! Padding (row 0) is trainable like any other row.

use crate::tensor::Tensor;
use rand::Rng;
use rayon::prelude::*;

/// Token embedding table `[vocab_size, dim]`
#[derive(Clone, Debug)]
pub struct Embedding {
    pub weight: Tensor,
}

impl Embedding {
    /// Small random embeddings: `N(0, 1) · 0.01`
    pub fn new<R: Rng + ?Sized>(vocab_size: usize, dim: usize, rng: &mut R) -> Self {
        Self {
            weight: Tensor::randn(vec![vocab_size, dim], 0.01, rng),
        }
    }

    pub fn dim(&self) -> usize {
        self.weight.shape[1]
    }

    /// Look up every token of the batch
    ///
    /// Indices must already be checked against `vocab_size`.
    pub fn forward(&self, inputs: &[Vec<usize>]) -> Tensor {
        let batch = inputs.len();
        let seq_len = inputs.first().map_or(0, Vec::len);
        let dim = self.dim();

        let mut out = vec![0.0; batch * seq_len * dim];
        out.par_chunks_mut((seq_len * dim).max(1))
            .zip(inputs.par_iter())
            .for_each(|(chunk, ids)| {
                for (t, &id) in ids.iter().enumerate() {
                    chunk[t * dim..(t + 1) * dim]
                        .copy_from_slice(&self.weight.data[id * dim..(id + 1) * dim]);
                }
            });

        Tensor::new(out, vec![batch, seq_len, dim])
    }

    /// Per-occurrence sparse gradient step
    ///
    /// `grad_embedded` is `[B, max_len, dim]`, aligned with `inputs`.
    pub fn sparse_update(&mut self, inputs: &[Vec<usize>], grad_embedded: &Tensor, lr: f32) {
        let dim = self.dim();
        let seq_len = grad_embedded.shape[1];

        for (b, ids) in inputs.iter().enumerate() {
            for (t, &id) in ids.iter().enumerate() {
                let g = &grad_embedded.data[(b * seq_len + t) * dim..(b * seq_len + t + 1) * dim];
                let row = &mut self.weight.data[id * dim..(id + 1) * dim];
                for (w, &gv) in row.iter_mut().zip(g) {
                    *w -= lr * gv;
                }
            }
        }
    }

    /// Dense `[vocab_size, dim]` gradient: occurrences of the same token summed
    ///
    /// This is the true gradient of the loss with respect to the table. The
    /// sum of the per-occurrence steps in [`Embedding::sparse_update`] equals
    /// `lr` times this gradient.
    pub fn accumulate_grad(&self, inputs: &[Vec<usize>], grad_embedded: &Tensor) -> Tensor {
        let dim = self.dim();
        let seq_len = grad_embedded.shape[1];
        let mut grad = Tensor::zeros(self.weight.shape.clone());

        for (b, ids) in inputs.iter().enumerate() {
            for (t, &id) in ids.iter().enumerate() {
                let g = &grad_embedded.data[(b * seq_len + t) * dim..(b * seq_len + t + 1) * dim];
                for (acc, &gv) in grad.data[id * dim..(id + 1) * dim].iter_mut().zip(g) {
                    *acc += gv;
                }
            }
        }
        grad
    }
}
