//! Activation Functions
//!
//! Element-wise nonlinearities and their derivatives for backpropagation.
//!
//! ## ReLU
//!
//! ```text
//! relu(x)   = max(0, x)
//! relu'(x)  = 1 if x > 0 else 0
//! ```
//!
//! The derivative is undefined at exactly 0; we treat it as 0. The classifier
//! applies ReLU to every convolution output before max-pooling.
//!
//! ## Leaky ReLU
//!
//! ```text
//! leaky_relu(x, α)  = x if x > 0 else α·x
//! leaky_relu'(x, α) = 1 if x > 0 else α
//! ```
//!
//! Keeps a small slope for negative inputs so units never stop receiving
//! gradient entirely.

use crate::tensor::Tensor;
use rayon::prelude::*;

/// Default negative slope for [`leaky_relu`]
pub const DEFAULT_LEAKY_ALPHA: f32 = 0.01;

/// ReLU activation (forward pass)
pub fn relu(x: &Tensor) -> Tensor {
    let result = x.data.par_iter().map(|&v| v.max(0.0)).collect();
    Tensor::new(result, x.shape.clone())
}

/// ReLU derivative evaluated at the pre-activation values `x`
pub fn d_relu(x: &Tensor) -> Tensor {
    let result = x
        .data
        .par_iter()
        .map(|&v| if v > 0.0 { 1.0 } else { 0.0 })
        .collect();
    Tensor::new(result, x.shape.clone())
}

/// Leaky ReLU activation (forward pass)
pub fn leaky_relu(x: &Tensor, alpha: f32) -> Tensor {
    let result = x
        .data
        .par_iter()
        .map(|&v| if v > 0.0 { v } else { alpha * v })
        .collect();
    Tensor::new(result, x.shape.clone())
}

/// Leaky ReLU derivative evaluated at the pre-activation values `x`
pub fn d_leaky_relu(x: &Tensor, alpha: f32) -> Tensor {
    let result = x
        .data
        .par_iter()
        .map(|&v| if v > 0.0 { 1.0 } else { alpha })
        .collect();
    Tensor::new(result, x.shape.clone())
}
