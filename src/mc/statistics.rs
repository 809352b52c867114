// src/mc/statistics.rs
//! Running Statistics over Path Values
//!
//! # Welford Updates
//!
//! ```text
//! δ  = x - μ
//! μ += δ / n
//! M2 += δ (x - μ)
//! ```
//!
//! # Chan Merge
//!
//! Partial accumulators built on different workers combine as
//!
//! ```text
//! δ  = μ_b - μ_a
//! μ  = μ_a + δ n_b / n
//! M2 = M2_a + M2_b + δ² n_a n_b / n
//! ```
//!
//! Both forms leave `M2` at exactly zero when every sample is identical, so a
//! deterministic run reports a standard error of exactly 0.

use crate::error::{validation::*, LmmResult};

/// Per-dimension mean and variance of a stream of sample vectors
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceStatistics {
    samples: usize,
    means: Vec<f64>,
    m2: Vec<f64>,
}

impl SequenceStatistics {
    pub fn new(dimension: usize) -> Self {
        Self {
            samples: 0,
            means: vec![0.0; dimension],
            m2: vec![0.0; dimension],
        }
    }

    pub fn dimension(&self) -> usize {
        self.means.len()
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn reset(&mut self) {
        self.samples = 0;
        self.means.iter_mut().for_each(|m| *m = 0.0);
        self.m2.iter_mut().for_each(|m| *m = 0.0);
    }

    pub fn add(&mut self, values: &[f64]) -> LmmResult<()> {
        validate_len("values", values.len(), self.dimension())?;
        self.samples += 1;
        let n = self.samples as f64;
        for ((mean, m2), &x) in self.means.iter_mut().zip(&mut self.m2).zip(values) {
            let delta = x - *mean;
            *mean += delta / n;
            *m2 += delta * (x - *mean);
        }
        Ok(())
    }

    pub fn merge(&mut self, other: &SequenceStatistics) -> LmmResult<()> {
        validate_len("statistics dimension", other.dimension(), self.dimension())?;
        if other.samples == 0 {
            return Ok(());
        }
        if self.samples == 0 {
            *self = other.clone();
            return Ok(());
        }
        let na = self.samples as f64;
        let nb = other.samples as f64;
        let n = na + nb;
        for i in 0..self.dimension() {
            let delta = other.means[i] - self.means[i];
            self.means[i] += delta * nb / n;
            self.m2[i] += other.m2[i] + delta * delta * na * nb / n;
        }
        self.samples += other.samples;
        Ok(())
    }

    pub fn mean(&self) -> &[f64] {
        &self.means
    }

    /// Unbiased sample variance; zero with fewer than two samples
    pub fn variance(&self) -> Vec<f64> {
        if self.samples < 2 {
            return vec![0.0; self.dimension()];
        }
        let denominator = (self.samples - 1) as f64;
        self.m2.iter().map(|m2| m2 / denominator).collect()
    }

    /// Standard error of the mean, `sqrt(variance / n)`
    pub fn error_estimate(&self) -> Vec<f64> {
        let n = self.samples.max(1) as f64;
        self.variance().into_iter().map(|v| (v / n).sqrt()).collect()
    }
}

/// Per-dimension correlation between the two halves of antithetic pairs
#[derive(Debug, Clone, PartialEq)]
pub struct PairStatistics {
    samples: usize,
    means_a: Vec<f64>,
    means_b: Vec<f64>,
    m2_a: Vec<f64>,
    m2_b: Vec<f64>,
    co_moment: Vec<f64>,
}

impl PairStatistics {
    pub fn new(dimension: usize) -> Self {
        Self {
            samples: 0,
            means_a: vec![0.0; dimension],
            means_b: vec![0.0; dimension],
            m2_a: vec![0.0; dimension],
            m2_b: vec![0.0; dimension],
            co_moment: vec![0.0; dimension],
        }
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn add(&mut self, a: &[f64], b: &[f64]) -> LmmResult<()> {
        let dimension = self.means_a.len();
        validate_len("a", a.len(), dimension)?;
        validate_len("b", b.len(), dimension)?;
        self.samples += 1;
        let n = self.samples as f64;
        for i in 0..dimension {
            let delta_a = a[i] - self.means_a[i];
            let delta_b = b[i] - self.means_b[i];
            self.means_a[i] += delta_a / n;
            self.means_b[i] += delta_b / n;
            self.m2_a[i] += delta_a * (a[i] - self.means_a[i]);
            self.m2_b[i] += delta_b * (b[i] - self.means_b[i]);
            self.co_moment[i] += delta_a * (b[i] - self.means_b[i]);
        }
        Ok(())
    }

    pub fn merge(&mut self, other: &PairStatistics) -> LmmResult<()> {
        validate_len("statistics dimension", other.means_a.len(), self.means_a.len())?;
        if other.samples == 0 {
            return Ok(());
        }
        if self.samples == 0 {
            *self = other.clone();
            return Ok(());
        }
        let na = self.samples as f64;
        let nb = other.samples as f64;
        let n = na + nb;
        for i in 0..self.means_a.len() {
            let delta_a = other.means_a[i] - self.means_a[i];
            let delta_b = other.means_b[i] - self.means_b[i];
            self.means_a[i] += delta_a * nb / n;
            self.means_b[i] += delta_b * nb / n;
            self.m2_a[i] += other.m2_a[i] + delta_a * delta_a * na * nb / n;
            self.m2_b[i] += other.m2_b[i] + delta_b * delta_b * na * nb / n;
            self.co_moment[i] += other.co_moment[i] + delta_a * delta_b * na * nb / n;
        }
        self.samples += other.samples;
        Ok(())
    }

    /// Pearson correlation per dimension; NaN where either half has no variance
    pub fn correlation(&self) -> Vec<f64> {
        (0..self.means_a.len())
            .map(|i| {
                let denominator = (self.m2_a[i] * self.m2_b[i]).sqrt();
                if denominator > 0.0 {
                    self.co_moment[i] / denominator
                } else {
                    f64::NAN
                }
            })
            .collect()
    }
}
