//! Linear system solvers for the Newton update `J du = -r`.
//!
//! # Solver Backends
//!
//! - [`DenseLuSolver`]: nalgebra dense LU with partial pivoting. Handles any
//!   non-singular Jacobian; meant for small and moderate problems.
//! - [`FaerCholeskySolver`]: sparse Cholesky factorization using the faer
//!   library. Requires a symmetric positive definite matrix, which diffusion
//!   Jacobians are once Dirichlet rows are eliminated with
//!   [`eliminate_identity_rows`].

use crate::error::{Error, Result};
use crate::sparse::CsrMatrix;
use faer::linalg::cholesky::llt::factor::LltError;
use faer::prelude::*;
use faer::sparse::linalg::solvers::{Llt, SymbolicLlt};
use faer::sparse::linalg::LltError as SparseLltError;
use faer::sparse::{SparseColMat, SymbolicSparseColMat};
use serde::{Deserialize, Serialize};

/// Linear solver interface.
pub trait Solver: Send + Sync {
    /// Solve the linear system Ax = b.
    fn solve(&self, matrix: &CsrMatrix, rhs: &[f64]) -> Result<Vec<f64>>;

    /// Solver name for diagnostics.
    fn name(&self) -> &str;
}

/// Which linear solver the Newton driver uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearSolverKind {
    #[default]
    DenseLu,
    SparseCholesky,
}

impl LinearSolverKind {
    /// Whether the solver needs a symmetric matrix.
    pub fn needs_symmetry(self) -> bool {
        matches!(self, LinearSolverKind::SparseCholesky)
    }
}

pub fn create_solver(kind: LinearSolverKind) -> Box<dyn Solver> {
    match kind {
        LinearSolverKind::DenseLu => Box::new(DenseLuSolver::new()),
        LinearSolverKind::SparseCholesky => Box::new(FaerCholeskySolver::new()),
    }
}

fn check_sizes(matrix: &CsrMatrix, rhs: &[f64]) -> Result<()> {
    if matrix.nrows() != matrix.ncols() {
        return Err(Error::Solver("Matrix must be square".into()));
    }
    if matrix.nrows() != rhs.len() {
        return Err(Error::Solver(format!(
            "RHS size mismatch: matrix has {} rows, rhs {} entries",
            matrix.nrows(),
            rhs.len()
        )));
    }
    Ok(())
}

/// Dense LU solver (nalgebra).
#[derive(Debug, Default)]
pub struct DenseLuSolver;

impl DenseLuSolver {
    pub fn new() -> Self {
        Self
    }
}

impl Solver for DenseLuSolver {
    fn solve(&self, matrix: &CsrMatrix, rhs: &[f64]) -> Result<Vec<f64>> {
        use nalgebra::{DMatrix, DVector};

        check_sizes(matrix, rhs)?;
        if rhs.is_empty() {
            return Ok(vec![]);
        }

        let dense = DMatrix::from(matrix);
        let b = DVector::from_column_slice(rhs);
        let solution = dense
            .lu()
            .solve(&b)
            .ok_or_else(|| Error::SingularMatrix("LU factorization failed".into()))?;

        Ok(solution.as_slice().to_vec())
    }

    fn name(&self) -> &str {
        "nalgebra dense LU"
    }
}

/// Convert a nalgebra-sparse CSR matrix to faer's CSC format.
fn csr_to_faer_csc(csr: &CsrMatrix) -> SparseColMat<usize, f64> {
    let nrows = csr.nrows();
    let ncols = csr.ncols();
    let row_offsets = csr.row_offsets();
    let col_indices = csr.col_indices();
    let values = csr.values();

    let mut col_offsets = vec![0usize; ncols + 1];
    for &col in col_indices {
        col_offsets[col + 1] += 1;
    }
    for i in 0..ncols {
        col_offsets[i + 1] += col_offsets[i];
    }

    let nnz = values.len();
    let mut csc_row_indices = vec![0usize; nnz];
    let mut csc_values = vec![0.0f64; nnz];
    let mut col_positions = col_offsets[..ncols].to_vec();

    for row in 0..nrows {
        for idx in row_offsets[row]..row_offsets[row + 1] {
            let col = col_indices[idx];
            let pos = col_positions[col];
            csc_row_indices[pos] = row;
            csc_values[pos] = values[idx];
            col_positions[col] += 1;
        }
    }

    // SAFETY: offsets are monotone and end at nnz; rows are visited in
    // increasing order, so row indices within each column are sorted.
    unsafe {
        SparseColMat::new(
            SymbolicSparseColMat::new_unchecked(nrows, ncols, col_offsets, None, csc_row_indices),
            csc_values,
        )
    }
}

/// Sparse Cholesky solver using the faer library.
///
/// Only the lower triangle is read, so the matrix must be symmetric.
#[derive(Debug, Default)]
pub struct FaerCholeskySolver;

impl FaerCholeskySolver {
    pub fn new() -> Self {
        Self
    }
}

impl Solver for FaerCholeskySolver {
    fn solve(&self, matrix: &CsrMatrix, rhs: &[f64]) -> Result<Vec<f64>> {
        check_sizes(matrix, rhs)?;
        let n = rhs.len();
        if n == 0 {
            return Ok(vec![]);
        }

        let csc = csr_to_faer_csc(matrix);
        let csc_ref = csc.as_ref();

        let symbolic = SymbolicLlt::try_new(csc_ref.symbolic(), faer::Side::Lower)
            .map_err(|_| Error::Solver("Symbolic Cholesky analysis failed".into()))?;

        let llt = Llt::try_new_with_symbolic(symbolic, csc_ref, faer::Side::Lower).map_err(|e| match e {
            SparseLltError::Generic(err) => Error::Solver(format!("Sparse Cholesky error: {:?}", err)),
            SparseLltError::Numeric(LltError::NonPositivePivot { index }) => {
                Error::SingularMatrix(format!("Matrix is not positive definite at pivot {}", index))
            }
        })?;

        let mut x = faer::Mat::from_fn(n, 1, |i, _| rhs[i]);
        llt.solve_in_place(x.as_mut());

        Ok((0..n).map(|i| x[(i, 0)]).collect())
    }

    fn name(&self) -> &str {
        "faer sparse Cholesky (LLᵀ)"
    }
}

/// Eliminate Dirichlet columns so the matrix regains its symmetry.
///
/// Rows whose only entry is a unit diagonal fix their unknown to the rhs
/// value. Those columns are moved to the right-hand side of every other row
/// and dropped from the matrix; the unit rows themselves stay.
pub fn eliminate_identity_rows(matrix: &CsrMatrix, rhs: &mut [f64]) -> Result<CsrMatrix> {
    check_sizes(matrix, rhs)?;
    let n = matrix.nrows();
    let offsets = matrix.row_offsets();
    let cols = matrix.col_indices();
    let vals = matrix.values();

    let fixed: Vec<bool> = (0..n)
        .map(|r| {
            let (s, e) = (offsets[r], offsets[r + 1]);
            e - s == 1 && cols[s] == r && vals[s] == 1.0
        })
        .collect();

    let mut new_offsets = Vec::with_capacity(n + 1);
    let mut new_cols = Vec::with_capacity(cols.len());
    let mut new_vals = Vec::with_capacity(vals.len());
    new_offsets.push(0);
    for r in 0..n {
        for k in offsets[r]..offsets[r + 1] {
            let c = cols[k];
            if !fixed[r] && fixed[c] {
                rhs[r] -= vals[k] * rhs[c];
                continue;
            }
            new_cols.push(c);
            new_vals.push(vals[k]);
        }
        new_offsets.push(new_cols.len());
    }

    CsrMatrix::try_from_csr_data(n, n, new_offsets, new_cols, new_vals)
        .map_err(|e| Error::Solver(format!("eliminated matrix is malformed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::sparse::{MatrixBackend, TripletMatrix};
    use approx::assert_relative_eq;

    #[test]
    fn test_dense_lu_nonsymmetric() {
        // [2 1; 0 3] x = [3; 6] -> x = [0.5, 2]
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 0, 2.0);
        triplet.add(0, 1, 1.0);
        triplet.add(1, 1, 3.0);

        let solution = DenseLuSolver::new().solve(&triplet.to_csr(), &[3.0, 6.0]).unwrap();
        assert_relative_eq!(solution[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(solution[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_dense_lu_singular() {
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 0, 1.0);
        triplet.add(0, 1, 2.0);
        triplet.add(1, 0, 2.0);
        triplet.add(1, 1, 4.0);
        let err = DenseLuSolver::new().solve(&triplet.to_csr(), &[1.0, 1.0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SingularMatrix);
    }

    #[test]
    fn test_empty_system() {
        let matrix = TripletMatrix::new(0, 0).to_csr();
        assert!(DenseLuSolver::new().solve(&matrix, &[]).unwrap().is_empty());
        assert!(FaerCholeskySolver::new().solve(&matrix, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_faer_cholesky_3x3_spd() {
        // A = [4 2 0; 2 5 2; 0 2 3], b = [2; 8; 5] -> x = [-3/16, 11/8, 3/4]
        let mut triplet = TripletMatrix::new(3, 3);
        triplet.add(0, 0, 4.0);
        triplet.add(0, 1, 2.0);
        triplet.add(1, 0, 2.0);
        triplet.add(1, 1, 5.0);
        triplet.add(1, 2, 2.0);
        triplet.add(2, 1, 2.0);
        triplet.add(2, 2, 3.0);

        let solution = FaerCholeskySolver::new()
            .solve(&triplet.to_csr(), &[2.0, 8.0, 5.0])
            .unwrap();
        let expected = [-0.1875, 1.375, 0.75];
        for i in 0..3 {
            assert_relative_eq!(solution[i], expected[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_faer_cholesky_not_positive_definite() {
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 0, 1.0);
        triplet.add(0, 1, 2.0);
        triplet.add(1, 0, 2.0);
        triplet.add(1, 1, 1.0);
        assert!(FaerCholeskySolver::new().solve(&triplet.to_csr(), &[1.0, 1.0]).is_err());
    }

    #[test]
    fn test_rhs_mismatch() {
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 0, 1.0);
        triplet.add(1, 1, 1.0);
        let err = FaerCholeskySolver::new()
            .solve(&triplet.to_csr(), &[1.0, 2.0, 3.0])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Solver);
    }

    #[test]
    fn test_elimination_restores_symmetry() {
        // 1-D Laplacian on 3 nodes with the first row constrained.
        let mut triplet = TripletMatrix::new(3, 3);
        triplet.add(0, 0, 1.0);
        triplet.add(1, 0, -1.0);
        triplet.add(1, 1, 2.0);
        triplet.add(1, 2, -1.0);
        triplet.add(2, 1, -1.0);
        triplet.add(2, 2, 1.0);
        triplet.add(2, 2, 0.5);
        let matrix = triplet.to_csr();
        let mut rhs = vec![2.0, 0.0, 1.0];

        let reduced = eliminate_identity_rows(&matrix, &mut rhs).unwrap();
        assert_relative_eq!(rhs[1], 2.0);

        let lu = DenseLuSolver::new().solve(&matrix, &[2.0, 0.0, 1.0]).unwrap();
        let chol = FaerCholeskySolver::new().solve(&reduced, &rhs).unwrap();
        for i in 0..3 {
            assert_relative_eq!(lu[i], chol[i], epsilon = 1e-10);
        }
    }
}
