// src/models/model.rs
use crate::market::evolution::EvolutionDescription;
use nalgebra::DMatrix;
use std::fmt::Debug;

/// Per-step factor loadings of the displaced log-rates
///
/// `pseudo_root(step)` is an `N × F` matrix whose product with its transpose
/// is the covariance of the log-rate increments over that step.
pub trait MarketModel: Send + Sync + Debug {
    fn initial_rates(&self) -> &[f64];
    fn displacements(&self) -> &[f64];
    fn evolution(&self) -> &EvolutionDescription;
    fn number_of_factors(&self) -> usize;
    fn pseudo_root(&self, step: usize) -> &DMatrix<f64>;

    fn number_of_rates(&self) -> usize {
        self.initial_rates().len()
    }

    fn number_of_steps(&self) -> usize {
        self.evolution().number_of_steps()
    }

    fn covariance(&self, step: usize) -> DMatrix<f64> {
        let root = self.pseudo_root(step);
        root * root.transpose()
    }

    /// Covariance accumulated over steps `0..=end_step`
    fn total_covariance(&self, end_step: usize) -> DMatrix<f64> {
        let n = self.number_of_rates();
        (0..=end_step).fold(DMatrix::zeros(n, n), |acc, step| acc + self.covariance(step))
    }
}
