//! Tensor Operations for the Text Classifier
//!
//! This module provides the small tensor library the classifier is built on.
//! Tensors store a flat row-major `Vec<f32>` together with shape and stride
//! information.
//!
//! ## Core Concepts
//!
//! - **Data**: Flat `Vec<f32>` storing all elements in row-major order
//! - **Shape**: Dimensions of the tensor (e.g., `[batch, positions, filters]`)
//! - **Strides**: Step sizes for each dimension to compute flat indices
//!
//! Most of the network only needs 2-D operations: the fully connected layer is
//! a matrix product, softmax runs per row, and the concatenation of pooled
//! features is a column-wise join. The convolution layer reads the 3-D
//! embedded batch straight from `data`, computing row-major offsets itself.
//!
//! ## Example
//!
//! ```rust
//! use textcnn::Tensor;
//!
//! let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
//! let b = Tensor::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], vec![3, 2]);
//! let c = a.matmul(&b);
//! assert_eq!(c.shape, vec![2, 2]);
//! assert_eq!(c.data, vec![4.0, 5.0, 10.0, 11.0]);
//! ```
//!
//! ## Performance
//!
//! Element-wise operations and per-row softmax iterate in parallel via Rayon.
//! Matrix multiplication switches to a cache-blocked parallel kernel once the
//! amount of work is large enough to pay for the thread overhead.

use crate::error::{Error, Result};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

/// A multi-dimensional array of `f32` values in row-major layout
///
/// For shape `[2, 3]`, data is stored as
/// `[row0_col0, row0_col1, row0_col2, row1_col0, row1_col1, row1_col2]`
/// and the strides are `[3, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    /// Flat storage of all tensor elements
    pub data: Vec<f32>,
    /// Shape of the tensor (dimensions)
    pub shape: Vec<usize>,
    /// Strides for each dimension (computed from shape)
    pub strides: Vec<usize>,
}

impl Tensor {
    /// Create a new tensor with given data and shape
    ///
    /// # Panics
    ///
    /// Panics if the product of shape dimensions doesn't equal data length.
    /// Use [`Tensor::try_new`] when the data comes from outside the process.
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        let expected_size: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            expected_size,
            "Data length ({}) doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            expected_size
        );

        let strides = Self::compute_strides(&shape);
        Self {
            data,
            shape,
            strides,
        }
    }

    /// Fallible constructor for untrusted data (e.g. a snapshot on disk)
    pub fn try_new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self> {
        let expected_size: usize = shape.iter().product();
        if data.len() != expected_size {
            return Err(Error::InvalidShape(format!(
                "data length {} doesn't match shape {:?} (expected {})",
                data.len(),
                shape,
                expected_size
            )));
        }
        Ok(Self::new(data, shape))
    }

    /// Create a tensor filled with zeros
    pub fn zeros(shape: Vec<usize>) -> Self {
        let size: usize = shape.iter().product();
        Self::new(vec![0.0; size], shape)
    }

    /// Create a tensor of standard-normal samples multiplied by `scale`
    ///
    /// The caller owns the generator, so a seeded `StdRng` gives a
    /// reproducible initialization.
    pub fn randn<R: Rng + ?Sized>(shape: Vec<usize>, scale: f32, rng: &mut R) -> Self {
        let size: usize = shape.iter().product();
        let data = (0..size)
            .map(|_| {
                let z: f32 = StandardNormal.sample(rng);
                z * scale
            })
            .collect();
        Self::new(data, shape)
    }

    /// Compute strides from shape (row-major layout)
    ///
    /// For shape `[d0, d1, d2]`, strides are `[d1*d2, d2, 1]`
    fn compute_strides(shape: &[usize]) -> Vec<usize> {
        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }

    /// Number of rows of a 2-D tensor
    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    /// Number of columns of a 2-D tensor
    pub fn cols(&self) -> usize {
        self.shape[1]
    }

    /// Borrow row `i` of a 2-D tensor
    pub fn row(&self, i: usize) -> &[f32] {
        let cols = self.cols();
        &self.data[i * cols..(i + 1) * cols]
    }

    /// Computes: result[j] += a_val * b[j] for all j
    ///
    /// Written as a plain zipped loop so LLVM can auto-vectorize it.
    #[inline(always)]
    fn matmul_inner(a_val: f32, b: &[f32], result: &mut [f32]) {
        for (r, &b_val) in result.iter_mut().zip(b.iter()) {
            *r += a_val * b_val;
        }
    }

    /// 2-D matrix multiplication
    ///
    /// For `A @ B` where `A` is `[m, k]` and `B` is `[k, n]` the result is
    /// `[m, n]` with `C[i,j] = sum_l A[i,l] * B[l,j]`.
    ///
    /// Small products (under 1K multiply-adds) run sequentially; larger ones
    /// use the parallel cache-blocked kernel.
    ///
    /// # Panics
    ///
    /// Panics if either operand is not 2-D or the inner dimensions differ.
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        assert!(
            self.shape.len() == 2 && other.shape.len() == 2,
            "Unsupported matmul shapes: {:?} @ {:?}",
            self.shape,
            other.shape
        );
        assert_eq!(
            self.shape[1], other.shape[0],
            "Matrix dimensions incompatible: [{}, {}] @ [{}, {}]",
            self.shape[0], self.shape[1], other.shape[0], other.shape[1]
        );

        let m = self.shape[0];
        let n = other.shape[1];
        let k = self.shape[1];

        if m * n * k >= 1_000 {
            return self.matmul_parallel_blocked(other, m, n, k);
        }

        let mut result = vec![0.0; m * n];
        for i in 0..m {
            for l in 0..k {
                let a_val = self.data[i * k + l];
                Self::matmul_inner(
                    a_val,
                    &other.data[l * n..(l + 1) * n],
                    &mut result[i * n..(i + 1) * n],
                );
            }
        }

        Tensor::new(result, vec![m, n])
    }

    /// Parallel cache-blocked matrix multiplication
    ///
    /// Output rows are processed in blocks of 8 on separate Rayon tasks; the
    /// column and inner dimensions are tiled in 8-wide blocks so each tile
    /// stays resident in L1 cache.
    fn matmul_parallel_blocked(&self, other: &Tensor, m: usize, n: usize, k: usize) -> Tensor {
        const BLOCK_SIZE: usize = 8;

        let mut result = vec![0.0; m * n];

        result
            .par_chunks_mut(BLOCK_SIZE * n)
            .enumerate()
            .for_each(|(block_i, result_block)| {
                let i_start = block_i * BLOCK_SIZE;
                let i_end = (i_start + BLOCK_SIZE).min(m);

                for j_start in (0..n).step_by(BLOCK_SIZE) {
                    let j_end = (j_start + BLOCK_SIZE).min(n);

                    for k_start in (0..k).step_by(BLOCK_SIZE) {
                        let k_end = (k_start + BLOCK_SIZE).min(k);

                        for i in i_start..i_end {
                            let row_offset = (i - i_start) * n;
                            for k_idx in k_start..k_end {
                                Self::matmul_inner(
                                    self.data[i * k + k_idx],
                                    &other.data[k_idx * n + j_start..k_idx * n + j_end],
                                    &mut result_block[row_offset + j_start..row_offset + j_end],
                                );
                            }
                        }
                    }
                }
            });

        Tensor::new(result, vec![m, n])
    }

    /// Transpose of a 2-D tensor
    pub fn transpose(&self) -> Tensor {
        assert_eq!(self.shape.len(), 2, "transpose expects a 2-D tensor");
        let rows = self.shape[0];
        let cols = self.shape[1];
        let mut result = vec![0.0; rows * cols];

        for i in 0..rows {
            for j in 0..cols {
                result[j * rows + i] = self.data[i * cols + j];
            }
        }

        Tensor::new(result, vec![cols, rows])
    }

    /// Row-wise softmax of a 2-D tensor
    ///
    /// ```text
    /// softmax(x)[i] = exp(x[i] - max(x)) / sum_j exp(x[j] - max(x))
    /// ```
    ///
    /// Subtracting the row maximum keeps `exp` from overflowing and leaves the
    /// result unchanged, so rows that are all equal or very negative still
    /// produce a valid distribution.
    pub fn softmax_rows(&self) -> Tensor {
        assert_eq!(self.shape.len(), 2, "softmax_rows expects a 2-D tensor");
        let cols = self.shape[1];

        let mut result = vec![0.0; self.data.len()];
        result
            .par_chunks_mut(cols.max(1))
            .zip(self.data.par_chunks(cols.max(1)))
            .for_each(|(out, row)| {
                let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
                let mut sum = 0.0;
                for (o, &x) in out.iter_mut().zip(row) {
                    *o = (x - max).exp();
                    sum += *o;
                }
                for o in out.iter_mut() {
                    *o /= sum;
                }
            });

        Tensor::new(result, self.shape.clone())
    }

    /// Add a `[1, n]` row to every row of an `[m, n]` tensor (bias addition)
    pub fn add_row(&self, row: &Tensor) -> Tensor {
        let cols = *self.shape.last().unwrap_or(&0);
        assert_eq!(
            row.data.len(),
            cols,
            "Unsupported broadcast for add_row: {:?} + {:?}",
            self.shape,
            row.shape
        );
        let result = self
            .data
            .par_iter()
            .enumerate()
            .map(|(i, &x)| x + row.data[i % cols])
            .collect();
        Tensor::new(result, self.shape.clone())
    }

    /// Element-wise subtraction
    pub fn sub(&self, other: &Tensor) -> Tensor {
        assert_eq!(self.shape, other.shape, "Shapes must match for subtraction");
        let result = self
            .data
            .par_iter()
            .zip(&other.data)
            .map(|(a, b)| a - b)
            .collect();
        Tensor::new(result, self.shape.clone())
    }

    /// Multiply all elements by scalar
    pub fn mul_scalar(&self, scalar: f32) -> Tensor {
        let result = self.data.par_iter().map(|&x| x * scalar).collect();
        Tensor::new(result, self.shape.clone())
    }

    /// Column sums of a 2-D tensor, returned with shape `[1, n]`
    pub fn sum_rows(&self) -> Tensor {
        let cols = self.cols();
        let mut result = vec![0.0; cols];
        for row in self.data.chunks(cols.max(1)) {
            for (acc, &x) in result.iter_mut().zip(row) {
                *acc += x;
            }
        }
        Tensor::new(result, vec![1, cols])
    }

    /// Join 2-D tensors with equal row counts side by side
    ///
    /// ```text
    /// [B, n1] ++ [B, n2] ++ ... -> [B, n1 + n2 + ...]
    /// ```
    pub fn concat_cols(parts: &[Tensor]) -> Tensor {
        let rows = parts.first().map_or(0, |p| p.rows());
        let total_cols: usize = parts.iter().map(|p| p.cols()).sum();
        let mut result = Vec::with_capacity(rows * total_cols);

        for i in 0..rows {
            for part in parts {
                assert_eq!(part.rows(), rows, "concat_cols: row counts differ");
                result.extend_from_slice(part.row(i));
            }
        }

        Tensor::new(result, vec![rows, total_cols])
    }

    /// Inverse of [`Tensor::concat_cols`]: cut a 2-D tensor into column blocks
    pub fn split_cols(&self, widths: &[usize]) -> Vec<Tensor> {
        let rows = self.rows();
        assert_eq!(
            widths.iter().sum::<usize>(),
            self.cols(),
            "split_cols: widths {:?} don't cover {} columns",
            widths,
            self.cols()
        );

        let mut offset = 0;
        widths
            .iter()
            .map(|&width| {
                let mut block = Vec::with_capacity(rows * width);
                for i in 0..rows {
                    block.extend_from_slice(&self.row(i)[offset..offset + width]);
                }
                offset += width;
                Tensor::new(block, vec![rows, width])
            })
            .collect()
    }

    /// Index of the largest value in every row; ties go to the lowest index
    pub fn argmax_rows(&self) -> Vec<usize> {
        (0..self.rows())
            .map(|i| {
                let row = self.row(i);
                let mut best = 0;
                for (j, &x) in row.iter().enumerate().skip(1) {
                    if x > row[best] {
                        best = j;
                    }
                }
                best
            })
            .collect()
    }

    /// In-place gradient descent step: `self -= lr * grad`
    pub fn sgd_step(&mut self, grad: &Tensor, lr: f32) {
        assert_eq!(self.shape, grad.shape, "sgd_step: gradient shape mismatch");
        self.data
            .par_iter_mut()
            .zip(&grad.data)
            .for_each(|(p, &g)| *p -= lr * g);
    }

    /// Sum of squared elements
    pub fn sum_squares(&self) -> f32 {
        self.data.par_iter().map(|&x| x * x).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_strides_row_major() {
        let t = Tensor::zeros(vec![2, 3, 4]);
        assert_eq!(t.strides, vec![12, 4, 1]);
    }

    #[test]
    fn test_try_new_rejects_bad_length() {
        assert!(Tensor::try_new(vec![1.0, 2.0, 3.0], vec![2, 2]).is_err());
        assert!(Tensor::try_new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).is_ok());
    }

    #[test]
    fn test_matmul_small() {
        let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
        let b = Tensor::new(vec![5.0, 6.0, 7.0, 8.0], vec![2, 2]);
        assert_eq!(a.matmul(&b).data, vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_matmul_blocked_matches_sequential() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = Tensor::randn(vec![17, 13], 1.0, &mut rng);
        let b = Tensor::randn(vec![13, 11], 1.0, &mut rng);
        let fast = a.matmul(&b);

        for i in 0..17 {
            for j in 0..11 {
                let expected: f32 = (0..13).map(|l| a.data[i * 13 + l] * b.data[l * 11 + j]).sum();
                assert!((fast.data[i * 11 + j] - expected).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_transpose() {
        let t = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
        let tt = t.transpose();
        assert_eq!(tt.shape, vec![3, 2]);
        assert_eq!(tt.data, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let t = Tensor::new(
            vec![1.0, 2.0, 3.0, 5.0, 5.0, 5.0, -1000.0, -1001.0, -999.0],
            vec![3, 3],
        );
        let s = t.softmax_rows();
        for i in 0..3 {
            let sum: f32 = s.row(i).iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
            assert!(s.row(i).iter().all(|&p| p >= 0.0));
        }
        assert!((s.data[3] - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_add_row_broadcasts_bias() {
        let t = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
        let bias = Tensor::new(vec![10.0, 20.0], vec![1, 2]);
        assert_eq!(t.add_row(&bias).data, vec![11.0, 22.0, 13.0, 24.0]);
    }

    #[test]
    fn test_split_inverts_concat() {
        let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
        let b = Tensor::new(vec![5.0, 6.0], vec![2, 1]);
        let joined = Tensor::concat_cols(&[a.clone(), b.clone()]);
        assert_eq!(joined.data, vec![1.0, 2.0, 5.0, 3.0, 4.0, 6.0]);

        let parts = joined.split_cols(&[2, 1]);
        assert_eq!(parts[0], a);
        assert_eq!(parts[1], b);
    }

    #[test]
    fn test_argmax_first_max_wins() {
        let t = Tensor::new(vec![0.5, 0.5, 0.1, 0.0, 0.2, 0.2], vec![2, 3]);
        assert_eq!(t.argmax_rows(), vec![0, 1]);
    }

    #[test]
    fn test_sum_rows_and_sgd_step() {
        let g = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
        let s = g.sum_rows();
        assert_eq!(s.shape, vec![1, 2]);
        assert_eq!(s.data, vec![4.0, 6.0]);

        let mut p = Tensor::new(vec![1.0, 1.0], vec![1, 2]);
        p.sgd_step(&s, 0.5);
        assert_eq!(p.data, vec![-1.0, -2.0]);
    }
}
