//! Softmax and Cross-Entropy
//!
//! The classifier ends in a softmax over class logits and is trained with
//! mean cross-entropy:
//!
//! ```text
//! p    = softmax(logits)                          (per row)
//! loss = -1/B · Σ_b Σ_c y[b,c] · ln(p[b,c] + ε)    ε = 1e-8
//! ```
//!
//! The gradient of the composition with respect to the logits collapses to
//!
//! ```text
//! d_logits = (p - y) / B
//! ```
//!
//! so no separate softmax Jacobian is ever formed.

use crate::tensor::Tensor;

/// Added to probabilities before the logarithm so a zero never yields -inf
pub const CROSS_ENTROPY_EPS: f32 = 1e-8;

/// Row-wise softmax of a `[B, classes]` tensor
pub fn softmax(logits: &Tensor) -> Tensor {
    logits.softmax_rows()
}

/// Mean cross-entropy between predicted probabilities and one-hot targets
///
/// Returns a non-negative scalar; it approaches 0 only when every row puts
/// its probability mass on the true class.
pub fn cross_entropy_loss(probs: &Tensor, one_hot: &Tensor) -> f32 {
    assert_eq!(probs.shape, one_hot.shape, "probs and targets must have the same shape");
    let batch = probs.rows().max(1) as f32;
    let total: f32 = probs
        .data
        .iter()
        .zip(&one_hot.data)
        .map(|(&p, &y)| y * (p + CROSS_ENTROPY_EPS).ln())
        .sum();
    (-total / batch).max(0.0)
}

/// Gradient of mean cross-entropy ∘ softmax with respect to the logits
pub fn softmax_cross_entropy_backward(probs: &Tensor, one_hot: &Tensor) -> Tensor {
    let batch = probs.rows().max(1) as f32;
    probs.sub(one_hot).mul_scalar(1.0 / batch)
}

/// Fraction of rows whose most probable class equals the label
pub fn accuracy(probs: &Tensor, labels: &[usize]) -> f32 {
    if labels.is_empty() {
        return 0.0;
    }
    let correct = probs
        .argmax_rows()
        .iter()
        .zip(labels)
        .filter(|(pred, label)| pred == label)
        .count();
    correct as f32 / labels.len() as f32
}
