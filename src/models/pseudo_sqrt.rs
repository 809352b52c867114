// src/models/pseudo_sqrt.rs
//! Rank-Reduced Pseudo Square Root
//!
//! Finds `A` (n × F) with `A·Aᵗ ≈ C` from the spectral decomposition
//! `C = V Λ Vᵗ`:
//!
//! 1. Eigenvalues are sorted in decreasing order and negatives floored at 0
//! 2. The leading `k ≤ F` eigenpairs are kept, stopping early once their share
//!    of the total variance reaches the requested percentage
//! 3. `A[:, r] = √λ_r v_r`, columns `k..F` left at zero
//! 4. Each row is rescaled so that `(A·Aᵗ)_ii = C_ii`
//!
//! Rows whose kept components vanish (e.g. expired rates) stay zero.

use crate::error::{LmmError, LmmResult};
use nalgebra::{DMatrix, SymmetricEigen};

const SYMMETRY_TOLERANCE: f64 = 1e-12;
const EIGEN_MAX_ITERATIONS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct PseudoSqrt {
    pub root: DMatrix<f64>,
    /// Share of the total (floored) variance carried by the kept eigenpairs
    pub retained_fraction: f64,
    pub rank: usize,
}

pub fn rank_reduced_sqrt(
    matrix: &DMatrix<f64>,
    max_rank: usize,
    component_retained_percentage: f64,
) -> LmmResult<PseudoSqrt> {
    let n = matrix.nrows();
    if n == 0 || matrix.ncols() != n {
        return Err(LmmError::invalid_argument(
            "matrix",
            format!("must be square and non-empty, got {}x{}", n, matrix.ncols()),
        ));
    }
    if max_rank == 0 {
        return Err(LmmError::invalid_argument("max_rank", "must be at least 1"));
    }
    if !(component_retained_percentage > 0.0 && component_retained_percentage <= 1.0) {
        return Err(LmmError::invalid_argument(
            "component_retained_percentage",
            format!("{} must be in (0, 1]", component_retained_percentage),
        ));
    }
    let scale = matrix.iter().fold(0.0f64, |m, x| m.max(x.abs()));
    for i in 0..n {
        for j in 0..n {
            let x = matrix[(i, j)];
            if !x.is_finite() {
                return Err(LmmError::invalid_argument(
                    "matrix",
                    format!("non-finite entry at ({}, {})", i, j),
                ));
            }
            if (x - matrix[(j, i)]).abs() > SYMMETRY_TOLERANCE * scale.max(1.0) {
                return Err(LmmError::invalid_argument(
                    "matrix",
                    format!("not symmetric at ({}, {})", i, j),
                ));
            }
        }
    }

    let width = max_rank;
    if scale == 0.0 {
        return Ok(PseudoSqrt {
            root: DMatrix::zeros(n, width),
            retained_fraction: 1.0,
            rank: 0,
        });
    }

    let eigen = SymmetricEigen::try_new(matrix.clone(), f64::EPSILON, EIGEN_MAX_ITERATIONS)
        .ok_or_else(|| {
            LmmError::numerical("rank_reduced_sqrt", "eigen-decomposition did not converge")
        })?;

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
    let eigenvalues: Vec<f64> = order.iter().map(|&k| eigen.eigenvalues[k].max(0.0)).collect();
    let total: f64 = eigenvalues.iter().sum();

    let mut root = DMatrix::zeros(n, width);
    if total <= 0.0 {
        return Ok(PseudoSqrt {
            root,
            retained_fraction: 1.0,
            rank: 0,
        });
    }

    let cap = width.min(n);
    let mut rank = 0;
    let mut retained = 0.0;
    while rank < cap && eigenvalues[rank] > 0.0 {
        retained += eigenvalues[rank];
        rank += 1;
        if retained >= component_retained_percentage * total {
            break;
        }
    }

    for (r, &k) in order.iter().take(rank).enumerate() {
        let sqrt_lambda = eigenvalues[r].sqrt();
        for i in 0..n {
            root[(i, r)] = eigen.eigenvectors[(i, k)] * sqrt_lambda;
        }
    }

    for i in 0..n {
        let norm_sq: f64 = (0..rank).map(|r| root[(i, r)] * root[(i, r)]).sum();
        if norm_sq > 0.0 {
            let factor = (matrix[(i, i)].max(0.0) / norm_sq).sqrt();
            for r in 0..rank {
                root[(i, r)] *= factor;
            }
        }
    }

    if root.iter().any(|x| !x.is_finite()) {
        return Err(LmmError::numerical(
            "rank_reduced_sqrt",
            "non-finite entries in pseudo square root",
        ));
    }

    Ok(PseudoSqrt {
        root,
        retained_fraction: retained / total,
        rank,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use approx::assert_abs_diff_eq;

    fn exp_corr(n: usize, beta: f64) -> DMatrix<f64> {
        DMatrix::from_fn(n, n, |i, j| (-beta * (i as f64 - j as f64).abs()).exp())
    }

    #[test]
    fn test_full_rank_reproduces_matrix() {
        let c = exp_corr(5, 0.3) * 0.04;
        let sqrt = rank_reduced_sqrt(&c, 5, 1.0).unwrap();
        let rebuilt = &sqrt.root * sqrt.root.transpose();
        for i in 0..5 {
            for j in 0..5 {
                assert_abs_diff_eq!(rebuilt[(i, j)], c[(i, j)], epsilon = 1e-12);
            }
        }
        assert_eq!(sqrt.rank, 5);
        assert_abs_diff_eq!(sqrt.retained_fraction, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_reduced_rank_preserves_diagonal() {
        let c = exp_corr(8, 0.1);
        let sqrt = rank_reduced_sqrt(&c, 2, 1.0).unwrap();
        assert_eq!(sqrt.root.shape(), (8, 2));
        let rebuilt = &sqrt.root * sqrt.root.transpose();
        for i in 0..8 {
            assert_abs_diff_eq!(rebuilt[(i, i)], 1.0, epsilon = 1e-12);
        }
        assert!(sqrt.retained_fraction < 1.0);
        assert!(sqrt.retained_fraction > 0.8);
    }

    #[test]
    fn test_retained_percentage_stops_early() {
        let c = exp_corr(6, 0.01);
        let sqrt = rank_reduced_sqrt(&c, 6, 0.9).unwrap();
        assert_eq!(sqrt.rank, 1);
        assert_eq!(sqrt.root.ncols(), 6);
        assert!((0..6).all(|i| sqrt.root[(i, 3)] == 0.0));
    }

    #[test]
    fn test_zero_rows_stay_zero() {
        let mut c = exp_corr(4, 0.2) * 0.01;
        for k in 0..4 {
            c[(0, k)] = 0.0;
            c[(k, 0)] = 0.0;
        }
        let sqrt = rank_reduced_sqrt(&c, 2, 1.0).unwrap();
        assert!((0..2).all(|r| sqrt.root[(0, r)].abs() < 1e-12));

        let zero = rank_reduced_sqrt(&DMatrix::zeros(3, 3), 2, 1.0).unwrap();
        assert!(zero.root.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_invalid_input() {
        let asym = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.4, 1.0]);
        assert_eq!(
            rank_reduced_sqrt(&asym, 2, 1.0).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert!(rank_reduced_sqrt(&DMatrix::zeros(2, 3), 2, 1.0).is_err());
        assert!(rank_reduced_sqrt(&exp_corr(2, 0.1), 0, 1.0).is_err());
        assert!(rank_reduced_sqrt(&exp_corr(2, 0.1), 1, 1.5).is_err());
    }
}
