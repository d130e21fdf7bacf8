//! Linear Layer (Fully Connected)
//!
//! Maps the concatenated pooled features to class logits: y = x @ W + b
//!
//! ## Forward Pass
//!
//! ```text
//! Input:  x [B, in_features]
//! Weight: W [in_features, out_features]
//! Bias:   b [1, out_features]
//! Output: y = x @ W + b [B, out_features]
//! ```
//!
//! ## Backward Pass
//!
//! Using the chain rule:
//! ```text
//! grad_W = x^T @ grad_y
//! grad_b = sum(grad_y, axis=0)
//! grad_x = grad_y @ W^T
//! ```
//!
//! ## Implementation Notes
//!
//! - Weights use scale √(1/in_features)
//! - Bias initialized to zero
//! - Caches input x for backward pass

use crate::tensor::Tensor;
use rand::Rng;

/// Linear layer (fully connected)
#[derive(Clone, Debug)]
pub struct Linear {
    pub weight: Tensor,
    pub bias: Tensor,
}

impl Linear {
    /// Create a new linear layer with weights `N(0, 1) · √(1/in_features)`
    pub fn new<R: Rng + ?Sized>(in_features: usize, out_features: usize, rng: &mut R) -> Self {
        let scale = (1.0 / in_features as f32).sqrt();
        Self {
            weight: Tensor::randn(vec![in_features, out_features], scale, rng),
            bias: Tensor::zeros(vec![1, out_features]),
        }
    }

    /// Forward pass
    ///
    /// # Returns
    ///
    /// Tuple of (output `[B, out_features]`, cache holding `x`)
    pub fn forward(&self, x: &Tensor) -> (Tensor, LinearCache) {
        let y = x.matmul(&self.weight).add_row(&self.bias);
        (y, LinearCache { x: x.clone() })
    }

    /// Backward pass
    ///
    /// # Arguments
    ///
    /// * `grad_out` - Gradient with respect to the output `[B, out_features]`
    /// * `cache` - Cached values from forward pass
    pub fn backward(&self, grad_out: &Tensor, cache: &LinearCache) -> LinearGradients {
        LinearGradients {
            weight: cache.x.transpose().matmul(grad_out),
            bias: grad_out.sum_rows(),
            x: grad_out.matmul(&self.weight.transpose()),
        }
    }
}

/// Cache for linear layer backward pass
#[derive(Clone, Debug)]
pub struct LinearCache {
    pub x: Tensor,
}

/// Gradients for linear layer
pub struct LinearGradients {
    pub weight: Tensor,
    pub bias: Tensor,
    pub x: Tensor, // Gradient to pass to previous layer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_adds_bias() {
        let layer = Linear {
            weight: Tensor::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], vec![3, 2]),
            bias: Tensor::new(vec![0.5, -0.5], vec![1, 2]),
        };
        let x = Tensor::new(vec![1.0, 2.0, 3.0], vec![1, 3]);
        let (y, _) = layer.forward(&x);
        assert_eq!(y.data, vec![4.5, 4.5]);
    }

    #[test]
    fn test_backward_shapes_and_values() {
        let layer = Linear {
            weight: Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]),
            bias: Tensor::zeros(vec![1, 2]),
        };
        let x = Tensor::new(vec![1.0, 0.0, 0.0, 1.0], vec![2, 2]);
        let (_, cache) = layer.forward(&x);
        let g = Tensor::new(vec![1.0, 0.0, 0.0, 1.0], vec![2, 2]);
        let grads = layer.backward(&g, &cache);

        assert_eq!(grads.weight.data, vec![1.0, 0.0, 0.0, 1.0]);
        assert_eq!(grads.bias.shape, vec![1, 2]);
        assert_eq!(grads.bias.data, vec![1.0, 1.0]);
        // grad_x = g @ W^T = W^T
        assert_eq!(grads.x.data, vec![1.0, 3.0, 2.0, 4.0]);
    }
}
