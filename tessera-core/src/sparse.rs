//! Global linear-algebra backends.
//!
//! The assembly loop only talks to [`MatrixBackend`] / [`VectorBackend`]:
//! `add(row, col, value)` and `add(row, value)`. The shipped backends are a
//! COO triplet builder converted to CSR (Compressed Sparse Row) for the
//! solvers, and a dense residual vector.

use nalgebra::DMatrix;
use nalgebra_sparse::csr::CsrMatrix as NalgebraCsr;
use std::collections::HashSet;
use std::ops::AddAssign;

/// Compressed Sparse Row matrix.
pub type CsrMatrix = NalgebraCsr<f64>;

/// Sink for global Jacobian contributions.
pub trait MatrixBackend {
    fn add(&mut self, row: usize, col: usize, value: f64);

    /// Scatter a dense local block through row/column index maps.
    fn add_block(&mut self, rows: &[usize], cols: &[usize], block: &DMatrix<f64>) {
        debug_assert_eq!(block.nrows(), rows.len());
        debug_assert_eq!(block.ncols(), cols.len());
        for (i, &r) in rows.iter().enumerate() {
            for (j, &c) in cols.iter().enumerate() {
                self.add(r, c, block[(i, j)]);
            }
        }
    }
}

/// Sink for global residual contributions.
pub trait VectorBackend {
    fn add(&mut self, row: usize, value: f64);

    fn add_block(&mut self, rows: &[usize], values: &[f64]) {
        debug_assert_eq!(rows.len(), values.len());
        for (&r, &v) in rows.iter().zip(values) {
            self.add(r, v);
        }
    }
}

/// Builder for assembling a sparse matrix from triplets (COO format).
///
/// Accumulates (row, col, value) triplets and converts to CSR when complete.
/// Exact zeros are skipped; NaN and Inf are kept so they reach the solver.
#[derive(Debug, Clone, Default)]
pub struct TripletMatrix {
    n_rows: usize,
    n_cols: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
}

impl TripletMatrix {
    /// Create a new triplet matrix builder.
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            ..Self::default()
        }
    }

    /// Create with estimated capacity.
    pub fn with_capacity(n_rows: usize, n_cols: usize, nnz_estimate: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            rows: Vec::with_capacity(nnz_estimate),
            cols: Vec::with_capacity(nnz_estimate),
            values: Vec::with_capacity(nnz_estimate),
        }
    }

    /// Number of stored triplets.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Append all triplets of `other`, keeping their order.
    pub fn append(&mut self, other: &TripletMatrix) {
        self.n_rows = self.n_rows.max(other.n_rows);
        self.n_cols = self.n_cols.max(other.n_cols);
        self.rows.extend_from_slice(&other.rows);
        self.cols.extend_from_slice(&other.cols);
        self.values.extend_from_slice(&other.values);
    }

    /// Drop every triplet in the given rows (used for Dirichlet rows).
    pub fn zero_rows(&mut self, rows: &HashSet<usize>) {
        let mut keep = 0;
        for k in 0..self.values.len() {
            if !rows.contains(&self.rows[k]) {
                self.rows[keep] = self.rows[k];
                self.cols[keep] = self.cols[k];
                self.values[keep] = self.values[k];
                keep += 1;
            }
        }
        self.rows.truncate(keep);
        self.cols.truncate(keep);
        self.values.truncate(keep);
    }

    /// Convert to CSR format, summing duplicate entries.
    pub fn to_csr(&self) -> CsrMatrix {
        use nalgebra_sparse::coo::CooMatrix;

        let mut coo = CooMatrix::new(self.n_rows, self.n_cols);
        for k in 0..self.values.len() {
            coo.push(self.rows[k], self.cols[k], self.values[k]);
        }

        CsrMatrix::from(&coo)
    }
}

impl MatrixBackend for TripletMatrix {
    fn add(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.n_rows, "Row index out of bounds");
        debug_assert!(col < self.n_cols, "Column index out of bounds");

        if value != 0.0 {
            self.rows.push(row);
            self.cols.push(col);
            self.values.push(value);
        }
    }
}

/// Dense global residual vector.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVector {
    values: Vec<f64>,
}

impl GlobalVector {
    /// Create a zero vector of given size.
    pub fn zeros(size: usize) -> Self {
        Self {
            values: vec![0.0; size],
        }
    }

    /// Get the underlying dense vector.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Mutable access to the underlying vector.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Consume and return the dense vector.
    pub fn into_vec(self) -> Vec<f64> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean norm; NaN if any entry is NaN.
    pub fn norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum::<f64>().sqrt()
    }
}

impl VectorBackend for GlobalVector {
    fn add(&mut self, row: usize, value: f64) {
        self.values[row] += value;
    }
}

impl AddAssign<&GlobalVector> for GlobalVector {
    fn add_assign(&mut self, rhs: &GlobalVector) {
        debug_assert_eq!(self.values.len(), rhs.values.len());
        for (a, b) in self.values.iter_mut().zip(rhs.values.iter()) {
            *a += *b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triplet_to_csr() {
        let mut triplet = TripletMatrix::new(3, 3);
        triplet.add(0, 0, 1.0);
        triplet.add(1, 1, 2.0);
        triplet.add(2, 2, 3.0);
        triplet.add(0, 1, 0.5);
        triplet.add(1, 0, 0.5);
        triplet.add(2, 0, 0.0);

        let csr = triplet.to_csr();
        assert_eq!(csr.nrows(), 3);
        assert_eq!(csr.ncols(), 3);
        assert_eq!(csr.nnz(), 5);
    }

    #[test]
    fn test_duplicate_summation() {
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 0, 1.0);
        triplet.add(0, 0, 2.0);
        triplet.add(0, 0, 3.0);

        let dense = DMatrix::from(&triplet.to_csr());
        assert!((dense[(0, 0)] - 6.0).abs() < 1e-10);
    }

    #[test]
    fn test_nan_is_not_dropped() {
        let mut triplet = TripletMatrix::new(1, 1);
        triplet.add(0, 0, f64::NAN);
        assert_eq!(triplet.nnz(), 1);
        let dense = DMatrix::from(&triplet.to_csr());
        assert!(dense[(0, 0)].is_nan());
    }

    #[test]
    fn test_block_assembly_and_row_zeroing() {
        let mut triplet = TripletMatrix::new(6, 6);

        // 4x4 local block scattered into dofs [0, 1, 3, 4]
        let dofs = vec![0, 1, 3, 4];
        let ke = DMatrix::from_row_slice(4, 4, &[
            1.0, 0.5, 0.1, 0.0,
            0.5, 2.0, 0.0, 0.2,
            0.1, 0.0, 1.5, 0.3,
            0.0, 0.2, 0.3, 2.5,
        ]);

        triplet.add_block(&dofs, &dofs, &ke);

        let dense = DMatrix::from(&triplet.to_csr());
        assert!((dense[(0, 0)] - 1.0).abs() < 1e-10);
        assert!((dense[(0, 3)] - 0.1).abs() < 1e-10);
        assert!((dense[(3, 4)] - 0.3).abs() < 1e-10);

        triplet.zero_rows(&HashSet::from([3]));
        let dense = DMatrix::from(&triplet.to_csr());
        assert_eq!(dense[(3, 3)], 0.0);
        assert_eq!(dense[(3, 0)], 0.0);
        assert!((dense[(0, 3)] - 0.1).abs() < 1e-10);
    }

    #[test]
    fn test_global_vector() {
        let mut vec = GlobalVector::zeros(5);
        vec.add(0, 1.0);
        vec.add(2, 3.0);
        vec.add_block(&[1, 3], &[2.0, 4.0]);

        assert_eq!(vec.as_slice(), &[1.0, 2.0, 3.0, 4.0, 0.0]);
        assert!((vec.norm() - 30.0_f64.sqrt()).abs() < 1e-12);

        let other = vec.clone();
        vec += &other;
        assert_eq!(vec.as_slice()[3], 8.0);
    }
}
