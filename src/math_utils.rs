// src/math_utils.rs
use nalgebra::DMatrix;
use statrs::function::erf;
use std::f64::consts::SQRT_2;

pub fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf::erf(x / SQRT_2))
}

/// Dot product of row `row` of `m` with `v` over the first `v.len()` columns
#[inline]
pub fn row_dot(m: &DMatrix<f64>, row: usize, v: &[f64]) -> f64 {
    v.iter()
        .enumerate()
        .map(|(k, x)| m[(row, k)] * x)
        .sum()
}

/// Dot product of two rows of the same matrix
#[inline]
pub fn rows_dot(m: &DMatrix<f64>, a: usize, b: usize) -> f64 {
    (0..m.ncols()).map(|k| m[(a, k)] * m[(b, k)]).sum()
}

pub struct Timer {
    start_time: std::time::Instant,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Timer {
        Timer {
            start_time: std::time::Instant::now(),
        }
    }

    pub fn start(&mut self) {
        self.start_time = std::time::Instant::now();
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64() * 1000.0
    }
}
