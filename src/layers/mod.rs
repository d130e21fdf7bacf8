//! Neural Network Layers
//!
//! The pieces the text classifier is assembled from. Each layer provides both
//! forward and backward passes.
//!
//! ## Layers
//!
//! - **activation**: ReLU and leaky ReLU (forward and derivative)
//! - **embedding**: Token lookup table with sparse per-occurrence updates
//! - **conv1d**: Convolution over time, ReLU and max-pool for one filter width
//! - **linear**: Fully connected output layer
//!
//! ## Design Pattern
//!
//! Each trainable layer follows a consistent pattern:
//!
//! ```rust,ignore
//! pub struct Layer {
//!     // Parameters (weights, biases, etc.)
//! }
//!
//! impl Layer {
//!     pub fn new(..., rng: &mut impl Rng) -> Self { }
//!     pub fn forward(&self, x: &Tensor) -> (Tensor, Cache) { }
//!     pub fn backward(&self, grad: &Tensor, cache: &Cache) -> Gradients { }
//! }
//! ```
//!
//! Layers never update themselves during `backward`; the classifier applies
//! the gradients once every gradient of the step has been computed.

pub mod activation;
pub mod conv1d;
pub mod embedding;
pub mod linear;

pub use activation::{d_leaky_relu, d_relu, leaky_relu, relu, DEFAULT_LEAKY_ALPHA};
pub use conv1d::{Conv1d, Conv1dCache, Conv1dGradients};
pub use embedding::Embedding;
pub use linear::{Linear, LinearCache, LinearGradients};
