// src/models/factor_model.rs
//! Factor-reduced market model built from a volatility model and a
//! correlation structure
//!
//! For every evolution step `[e_{j-1}, e_j]` the full covariance
//!
//! ```text
//! C_ik = ρ_ik(e_{j-1}) ∫_{e_{j-1}}^{e_j} σ_i(t) σ_k(t) dt
//! ```
//!
//! is reduced once, at construction, to an `N × F` pseudo square root.

use super::correlation::{CorrelationStructure, ExponentialCorrelation};
use super::model::MarketModel;
use super::pseudo_sqrt::rank_reduced_sqrt;
use super::volatility::{AbcdParams, AbcdVolatility, FlatVolatility, VolatilityModel};
use crate::error::{validation::*, LmmError, LmmResult};
use crate::market::evolution::EvolutionDescription;
use nalgebra::DMatrix;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FactorMarketModel {
    evolution: EvolutionDescription,
    initial_rates: Vec<f64>,
    displacements: Vec<f64>,
    factors: usize,
    pseudo_roots: Vec<DMatrix<f64>>,
    retained_fractions: Vec<f64>,
}

impl FactorMarketModel {
    pub fn new(
        volatility: &dyn VolatilityModel,
        correlation: &dyn CorrelationStructure,
        evolution: &EvolutionDescription,
        factors: usize,
        initial_rates: &[f64],
        displacements: &[f64],
    ) -> LmmResult<Self> {
        let n = evolution.number_of_rates();
        validate_len("initial_rates", initial_rates.len(), n)?;
        validate_len("displacements", displacements.len(), n)?;
        validate_len("volatility rates", volatility.number_of_rates(), n)?;
        validate_len("correlation rates", correlation.number_of_rates(), n)?;
        if factors == 0 || factors > n {
            return Err(LmmError::invalid_argument(
                "factors",
                format!("{} must be in [1, {}]", factors, n),
            ));
        }
        for (i, (&f, &d)) in initial_rates.iter().zip(displacements).enumerate() {
            validate_finite("initial_rates", f)?;
            validate_finite("displacements", d)?;
            if f + d <= 0.0 {
                return Err(LmmError::invalid_argument(
                    "initial_rates",
                    format!("displaced rate {} is not positive ({} + {})", i, f, d),
                ));
            }
        }

        let mut pseudo_roots = Vec::with_capacity(evolution.number_of_steps());
        let mut retained_fractions = Vec::with_capacity(evolution.number_of_steps());
        for (step, &end) in evolution.evolution_times().iter().enumerate() {
            let start = evolution.step_start(step);
            let rho = correlation.correlation(start);
            let covariance = DMatrix::from_fn(n, n, |i, k| {
                rho[(i, k)] * volatility.covariance(i, k, start, end)
            });
            let sqrt = rank_reduced_sqrt(&covariance, factors, 1.0)?;
            debug!(
                step,
                rank = sqrt.rank,
                retained = sqrt.retained_fraction,
                "rank-reduced step covariance"
            );
            retained_fractions.push(sqrt.retained_fraction);
            pseudo_roots.push(sqrt.root);
        }

        Ok(Self {
            evolution: evolution.clone(),
            initial_rates: initial_rates.to_vec(),
            displacements: displacements.to_vec(),
            factors,
            pseudo_roots,
            retained_fractions,
        })
    }

    /// Flat volatilities with exponential correlation
    pub fn exp_corr_flat_vol(
        long_term_correlation: f64,
        beta: f64,
        volatilities: &[f64],
        evolution: &EvolutionDescription,
        factors: usize,
        initial_rates: &[f64],
        displacements: &[f64],
    ) -> LmmResult<Self> {
        let resets = reset_times(evolution);
        let volatility = FlatVolatility::new(volatilities, resets)?;
        let correlation = ExponentialCorrelation::new(long_term_correlation, beta, resets)?;
        Self::new(
            &volatility,
            &correlation,
            evolution,
            factors,
            initial_rates,
            displacements,
        )
    }

    /// Abcd volatility scaled by `ks` with exponential correlation
    #[allow(clippy::too_many_arguments)]
    pub fn exp_corr_abcd_vol(
        abcd: AbcdParams,
        ks: &[f64],
        long_term_correlation: f64,
        beta: f64,
        evolution: &EvolutionDescription,
        factors: usize,
        initial_rates: &[f64],
        displacements: &[f64],
    ) -> LmmResult<Self> {
        let resets = reset_times(evolution);
        let volatility = AbcdVolatility::new(abcd, ks, resets)?;
        let correlation = ExponentialCorrelation::new(long_term_correlation, beta, resets)?;
        Self::new(
            &volatility,
            &correlation,
            evolution,
            factors,
            initial_rates,
            displacements,
        )
    }

    /// Variance share kept by the rank reduction at each step
    pub fn retained_fractions(&self) -> &[f64] {
        &self.retained_fractions
    }
}

fn reset_times(evolution: &EvolutionDescription) -> &[f64] {
    let times = evolution.rate_times().times();
    &times[..times.len() - 1]
}

impl MarketModel for FactorMarketModel {
    fn initial_rates(&self) -> &[f64] {
        &self.initial_rates
    }

    fn displacements(&self) -> &[f64] {
        &self.displacements
    }

    fn evolution(&self) -> &EvolutionDescription {
        &self.evolution
    }

    fn number_of_factors(&self) -> usize {
        self.factors
    }

    fn pseudo_root(&self, step: usize) -> &DMatrix<f64> {
        &self.pseudo_roots[step]
    }
}
