//! 1-D Convolution over Time with Max-Pooling
//!
//! One filter bank slides a window of `width` consecutive token embeddings
//! along the sequence (stride 1, no padding), applies ReLU, and keeps the
//! largest activation of every filter.
//!
//! ## Forward Pass
//!
//! ```text
//! embedded: [B, L, D]
//! filters:  [w, D, F]
//! P = L - w + 1 positions
//!
//! raw[b, p, f]   = Σ_k Σ_d embedded[b, p + k, d] · filters[k, d, f]
//! act            = relu(raw)
//! pooled[b, f]   = max_p act[b, p, f]
//! argmax[b, f]   = first p reaching that maximum
//! ```
//!
//! ## Backward Pass
//!
//! ```text
//! d_conv[b, argmax[b,f], f] = d_pooled[b, f]      (all other positions 0)
//! d_conv                    *= relu'(raw)
//! d_filters[k, d, f]        = Σ_b Σ_p embedded[b, p + k, d] · d_conv[b, p, f]
//! d_embedded[b, p + k, d]  += Σ_f d_conv[b, p, f] · filters[k, d, f]
//! ```
//!
//! Overlapping windows add into the same embedded position, so one token
//! position can collect gradient from several window offsets.
//!
//! When several positions tie for the maximum, only the lowest one receives
//! gradient. The arg-max is recorded during the forward pass rather than
//! recovered by comparing values afterwards.

use crate::layers::activation::{d_relu, relu};
use crate::tensor::Tensor;
use rand::Rng;
use rayon::prelude::*;

/// Filter bank of one width `[width, dim, num_filters]`
#[derive(Clone, Debug)]
pub struct Conv1d {
    pub width: usize,
    pub filters: Tensor,
}

impl Conv1d {
    /// He-scaled random filters: `N(0, 1) · √(2 / (width · dim))`
    pub fn new<R: Rng + ?Sized>(width: usize, dim: usize, num_filters: usize, rng: &mut R) -> Self {
        let scale = (2.0 / (width * dim) as f32).sqrt();
        Self {
            width,
            filters: Tensor::randn(vec![width, dim, num_filters], scale, rng),
        }
    }

    pub fn num_filters(&self) -> usize {
        self.filters.shape[2]
    }

    /// Convolve, activate and max-pool a `[B, L, D]` batch
    ///
    /// # Returns
    ///
    /// Tuple of (pooled `[B, F]`, cache)
    ///
    /// # Panics
    ///
    /// Panics if `L < width`; the classifier rejects such configurations at
    /// construction.
    pub fn forward(&self, embedded: &Tensor) -> (Tensor, Conv1dCache) {
        let (batch, seq_len, dim) = (embedded.shape[0], embedded.shape[1], embedded.shape[2]);
        let num_filters = self.num_filters();
        assert!(
            seq_len >= self.width,
            "sequence length {} shorter than filter width {}",
            seq_len,
            self.width
        );
        let positions = seq_len - self.width + 1;

        // Each example convolves independently
        let mut raw = vec![0.0; batch * positions * num_filters];
        raw.par_chunks_mut(positions * num_filters)
            .enumerate()
            .for_each(|(b, out)| {
                let example = &embedded.data[b * seq_len * dim..(b + 1) * seq_len * dim];
                for p in 0..positions {
                    let acc = &mut out[p * num_filters..(p + 1) * num_filters];
                    for k in 0..self.width {
                        for d in 0..dim {
                            let x = example[(p + k) * dim + d];
                            let row = (k * dim + d) * num_filters;
                            let w = &self.filters.data[row..row + num_filters];
                            for (a, &wv) in acc.iter_mut().zip(w) {
                                *a += x * wv;
                            }
                        }
                    }
                }
            });
        let raw = Tensor::new(raw, vec![batch, positions, num_filters]);
        let activated = relu(&raw);

        let mut pooled = vec![0.0; batch * num_filters];
        let mut argmax = vec![0usize; batch * num_filters];
        for b in 0..batch {
            for f in 0..num_filters {
                let at = |p: usize| activated.data[(b * positions + p) * num_filters + f];
                let mut best = 0;
                for p in 1..positions {
                    if at(p) > at(best) {
                        best = p;
                    }
                }
                pooled[b * num_filters + f] = at(best);
                argmax[b * num_filters + f] = best;
            }
        }

        let cache = Conv1dCache {
            raw,
            activated,
            argmax,
        };
        (Tensor::new(pooled, vec![batch, num_filters]), cache)
    }

    /// Gradients for the filter bank and the embedded input
    ///
    /// # Arguments
    ///
    /// * `d_pooled` - Gradient with respect to the pooled output `[B, F]`
    /// * `embedded` - Input of the matching forward pass `[B, L, D]`
    /// * `cache` - Cache of the matching forward pass
    pub fn backward(
        &self,
        d_pooled: &Tensor,
        embedded: &Tensor,
        cache: &Conv1dCache,
    ) -> Conv1dGradients {
        let (batch, seq_len, dim) = (embedded.shape[0], embedded.shape[1], embedded.shape[2]);
        let num_filters = self.num_filters();
        let positions = cache.raw.shape[1];

        // Route each pooled gradient to its winning position, then gate by relu'
        let mut d_conv = Tensor::zeros(vec![batch, positions, num_filters]);
        for b in 0..batch {
            for f in 0..num_filters {
                let p = cache.argmax[b * num_filters + f];
                let at = (b * positions + p) * num_filters + f;
                d_conv.data[at] = d_pooled.data[b * num_filters + f];
            }
        }
        let gate = d_relu(&cache.raw);
        for (g, &m) in d_conv.data.iter_mut().zip(&gate.data) {
            *g *= m;
        }

        // Filter gradient, reduced over the batch in a fixed order
        let mut d_filters = vec![0.0; self.width * dim * num_filters];
        for b in 0..batch {
            for p in 0..positions {
                let start = (b * positions + p) * num_filters;
                let g = &d_conv.data[start..start + num_filters];
                for k in 0..self.width {
                    for d in 0..dim {
                        let x = embedded.data[(b * seq_len + p + k) * dim + d];
                        let row = (k * dim + d) * num_filters;
                        let out = &mut d_filters[row..row + num_filters];
                        for (o, &gv) in out.iter_mut().zip(g) {
                            *o += x * gv;
                        }
                    }
                }
            }
        }

        // Scatter-add into the embedded positions each window covered
        let mut d_embedded = vec![0.0; batch * seq_len * dim];
        d_embedded
            .par_chunks_mut(seq_len * dim)
            .enumerate()
            .for_each(|(b, out)| {
                for p in 0..positions {
                    let start = (b * positions + p) * num_filters;
                    let g = &d_conv.data[start..start + num_filters];
                    for k in 0..self.width {
                        for d in 0..dim {
                            let row = (k * dim + d) * num_filters;
                            let w = &self.filters.data[row..row + num_filters];
                            let contribution: f32 = g.iter().zip(w).map(|(&gv, &wv)| gv * wv).sum();
                            out[(p + k) * dim + d] += contribution;
                        }
                    }
                }
            });

        Conv1dGradients {
            filters: Tensor::new(d_filters, self.filters.shape.clone()),
            embedded: Tensor::new(d_embedded, embedded.shape.clone()),
        }
    }
}

/// Cache for the convolution backward pass
#[derive(Clone, Debug)]
pub struct Conv1dCache {
    /// Pre-activation outputs `[B, P, F]`
    pub raw: Tensor,
    /// `relu(raw)`
    pub activated: Tensor,
    /// Winning position per `(b, f)`, row-major `[B, F]`
    pub argmax: Vec<usize>,
}

/// Gradients for one filter bank
pub struct Conv1dGradients {
    pub filters: Tensor,
    pub embedded: Tensor, // Gradient to pass to the embedding layer
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_bank() -> Conv1d {
        // width 2, dim 1, one filter that sums the two window values
        Conv1d {
            width: 2,
            filters: Tensor::new(vec![1.0, 1.0], vec![2, 1, 1]),
        }
    }

    #[test]
    fn test_forward_window_sums_and_pool() {
        let conv = identity_bank();
        let embedded = Tensor::new(vec![1.0, 2.0, -5.0, 4.0], vec![1, 4, 1]);
        let (pooled, cache) = conv.forward(&embedded);

        assert_eq!(cache.raw.data, vec![3.0, -3.0, -1.0]);
        assert_eq!(cache.activated.data, vec![3.0, 0.0, 0.0]);
        assert_eq!(pooled.data, vec![3.0]);
        assert_eq!(cache.argmax, vec![0]);
    }

    #[test]
    fn test_tie_routes_to_first_position() {
        let conv = identity_bank();
        let embedded = Tensor::new(vec![1.0, 1.0, 1.0, 1.0], vec![1, 4, 1]);
        let (_, cache) = conv.forward(&embedded);
        assert_eq!(cache.argmax, vec![0]);

        let grads = conv.backward(&Tensor::new(vec![1.0], vec![1, 1]), &embedded, &cache);
        // only window 0 (positions 0 and 1) receives gradient
        assert_eq!(grads.embedded.data, vec![1.0, 1.0, 0.0, 0.0]);
        assert_eq!(grads.filters.data, vec![1.0, 1.0]);
    }

    #[test]
    fn test_dead_relu_blocks_gradient() {
        let conv = identity_bank();
        let embedded = Tensor::new(vec![-1.0, -2.0, -3.0], vec![1, 3, 1]);
        let (pooled, cache) = conv.forward(&embedded);
        assert_eq!(pooled.data, vec![0.0]);

        let grads = conv.backward(&Tensor::new(vec![5.0], vec![1, 1]), &embedded, &cache);
        assert!(grads.embedded.data.iter().all(|&g| g == 0.0));
        assert!(grads.filters.data.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_backward_routes_to_winning_window() {
        let conv = Conv1d {
            width: 2,
            filters: Tensor::new(vec![2.0, -1.0], vec![2, 1, 1]),
        };
        // raw = [2*0 - 1, 2*1 - 3, 2*3 - 0.5] = [-1, -1, 5.5]
        let embedded = Tensor::new(vec![0.0, 1.0, 3.0, 0.5], vec![1, 4, 1]);
        let (pooled, cache) = conv.forward(&embedded);
        assert_eq!(pooled.data, vec![5.5]);
        assert_eq!(cache.argmax, vec![2]);

        let grads = conv.backward(&Tensor::new(vec![1.0], vec![1, 1]), &embedded, &cache);
        assert_eq!(grads.embedded.data, vec![0.0, 0.0, 2.0, -1.0]);
        assert_eq!(grads.filters.data, vec![3.0, 0.5]);
    }
}
