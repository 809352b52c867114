// src/models/correlation.rs
//! Instantaneous correlation structures of the log-rates
//!
//! ```text
//! exponential:       ρ_ij = L + (1 - L) exp(-β |t_i - t_j|)
//! time-homogeneous:  ρ_ij(t) = R[i - k][j - k],  k = rates expired by t
//! ```

use crate::error::{validation::*, LmmError, LmmResult};
use nalgebra::DMatrix;
use std::fmt::Debug;

pub trait CorrelationStructure: Send + Sync + Debug {
    fn number_of_rates(&self) -> usize;

    /// Correlation of every rate during the step starting at `time`; rows of
    /// expired rates are unit vectors
    fn correlation(&self, time: f64) -> DMatrix<f64>;
}

#[derive(Debug, Clone)]
pub struct ExponentialCorrelation {
    long_term: f64,
    beta: f64,
    reset_times: Vec<f64>,
}

impl ExponentialCorrelation {
    pub fn new(long_term: f64, beta: f64, reset_times: &[f64]) -> LmmResult<Self> {
        validate_correlation("long_term_correlation", long_term)?;
        if long_term < 0.0 {
            return Err(LmmError::invalid_argument(
                "long_term_correlation",
                format!("{} must be in [0, 1]", long_term),
            ));
        }
        validate_non_negative("beta", beta)?;
        validate_finite("beta", beta)?;
        validate_strictly_increasing("reset_times", reset_times)?;
        Ok(Self {
            long_term,
            beta,
            reset_times: reset_times.to_vec(),
        })
    }
}

impl CorrelationStructure for ExponentialCorrelation {
    fn number_of_rates(&self) -> usize {
        self.reset_times.len()
    }

    fn correlation(&self, time: f64) -> DMatrix<f64> {
        let n = self.reset_times.len();
        let t = &self.reset_times;
        DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                1.0
            } else if t[i] <= time || t[j] <= time {
                0.0
            } else {
                self.long_term + (1.0 - self.long_term) * (-self.beta * (t[i] - t[j]).abs()).exp()
            }
        })
    }
}

/// A forward-looking correlation matrix indexed by "rates from now" that is
/// shifted down the diagonal as rates expire
#[derive(Debug, Clone)]
pub struct TimeHomogeneousForwardCorrelation {
    forward_correlation: DMatrix<f64>,
    reset_times: Vec<f64>,
}

impl TimeHomogeneousForwardCorrelation {
    pub fn new(forward_correlation: DMatrix<f64>, reset_times: &[f64]) -> LmmResult<Self> {
        let n = reset_times.len();
        validate_strictly_increasing("reset_times", reset_times)?;
        validate_len("forward_correlation rows", forward_correlation.nrows(), n)?;
        validate_len("forward_correlation columns", forward_correlation.ncols(), n)?;
        for i in 0..n {
            if (forward_correlation[(i, i)] - 1.0).abs() > 1e-12 {
                return Err(LmmError::invalid_argument(
                    "forward_correlation",
                    format!("diagonal entry {} is {}, expected 1", i, forward_correlation[(i, i)]),
                ));
            }
            for j in 0..i {
                let rho = forward_correlation[(i, j)];
                validate_correlation("forward_correlation", rho)?;
                if (rho - forward_correlation[(j, i)]).abs() > 1e-12 {
                    return Err(LmmError::invalid_argument(
                        "forward_correlation",
                        format!("not symmetric at ({}, {})", i, j),
                    ));
                }
            }
        }
        Ok(Self {
            forward_correlation,
            reset_times: reset_times.to_vec(),
        })
    }
}

impl CorrelationStructure for TimeHomogeneousForwardCorrelation {
    fn number_of_rates(&self) -> usize {
        self.reset_times.len()
    }

    fn correlation(&self, time: f64) -> DMatrix<f64> {
        let n = self.reset_times.len();
        let expired = self.reset_times.iter().take_while(|&&t| t <= time).count();
        DMatrix::from_fn(n, n, |i, j| {
            if i < expired || j < expired {
                if i == j {
                    1.0
                } else {
                    0.0
                }
            } else {
                self.forward_correlation[(i - expired, j - expired)]
            }
        })
    }
}

fn validate_correlation(name: &str, rho: f64) -> LmmResult<()> {
    if !rho.is_finite() || !(-1.0..=1.0).contains(&rho) {
        Err(LmmError::invalid_argument(
            name,
            format!("{} must be a correlation in [-1, 1]", rho),
        ))
    } else {
        Ok(())
    }
}
