// src/evolvers/coterminal_pc.rs
//! Log-Normal Coterminal Swap-Rate Predictor-Corrector
//!
//! Same scheme as [`LogNormalFwdRatePc`](super::LogNormalFwdRatePc) with the
//! coterminal swap rates `S_j` as state variables:
//!
//! ```text
//! x_j = log(S_j + d_j)
//! predictor:  x̂_j = x_j + μ_j(S) - ½ C_jj + A_j · z
//! corrector:  x'_j = x̂_j + ½ (μ_j(Ŝ) - μ_j(S))
//! ```
//!
//! with drifts from [`SmmDriftCalculator`](crate::drift::SmmDriftCalculator).
//! The model's initial rates, displacements and volatilities are read as
//! those of the swap rates. After each step the curve state is rebuilt with
//! `set_on_coterminal_swap_rates`; a swap rate implying a non-positive bond
//! fails the path with `NumericalInstability`.

use super::evolver::{
    delegate_to_path_state, EvolvedRates, EvolverSetup, MarketModelEvolver, PathState,
};
use super::pc::predictor_corrector_step;
use crate::error::LmmResult;
use crate::models::model::MarketModel;
use crate::rng::BrownianGeneratorFactory;
use std::sync::Arc;

const METHOD: &str = "CoterminalSwapRatePc::advance_step";

#[derive(Debug, Clone)]
pub struct CoterminalSwapRatePc {
    setup: Arc<EvolverSetup>,
    path: PathState,
}

impl CoterminalSwapRatePc {
    pub fn new(
        model: &dyn MarketModel,
        factory: &BrownianGeneratorFactory,
        numeraires: &[usize],
    ) -> LmmResult<Self> {
        Self::with_initial_step(model, factory, numeraires, 0)
    }

    pub fn with_initial_step(
        model: &dyn MarketModel,
        factory: &BrownianGeneratorFactory,
        numeraires: &[usize],
        initial_step: usize,
    ) -> LmmResult<Self> {
        let setup = Arc::new(EvolverSetup::new(
            model,
            numeraires,
            EvolvedRates::CoterminalSwapRates,
            initial_step,
        )?);
        let path = PathState::new(&setup, factory);
        Ok(Self { setup, path })
    }

    pub fn setup(&self) -> &EvolverSetup {
        &self.setup
    }
}

impl MarketModelEvolver for CoterminalSwapRatePc {
    delegate_to_path_state!();

    fn advance_step(&mut self) -> LmmResult<f64> {
        predictor_corrector_step(&self.setup, &mut self.path, METHOD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::market::curve_state::CurveState;
    use crate::market::evolution::{money_market_measure, terminal_measure, EvolutionDescription};
    use crate::models::FactorMarketModel;
    use approx::assert_relative_eq;

    const SWAP_RATES: [f64; 4] = [0.043, 0.044, 0.045, 0.046];

    fn model(vol: f64) -> FactorMarketModel {
        let rate_times: Vec<f64> = (1..=5).map(|i| 0.5 * i as f64).collect();
        let evolution = EvolutionDescription::at_reset_times(&rate_times).unwrap();
        FactorMarketModel::exp_corr_flat_vol(
            0.5,
            0.2,
            &[vol; 4],
            &evolution,
            2,
            &SWAP_RATES,
            &[0.0; 4],
        )
        .unwrap()
    }

    #[test]
    fn test_initial_state_is_built_from_swap_rates() {
        let model = model(0.2);
        let numeraires = terminal_measure(model.evolution());
        let mut evolver =
            CoterminalSwapRatePc::new(&model, &BrownianGeneratorFactory::new(1), &numeraires)
                .unwrap();
        evolver.start_new_path();
        for (i, &rate) in SWAP_RATES.iter().enumerate() {
            assert_relative_eq!(
                evolver.current_state().coterminal_swap_rate(i).unwrap(),
                rate,
                max_relative = 1e-14
            );
        }
        // the last coterminal swap is the last forward
        assert_relative_eq!(
            evolver.current_state().forward_rate(3).unwrap(),
            SWAP_RATES[3],
            max_relative = 1e-14
        );
    }

    #[test]
    fn test_zero_volatility_keeps_swap_rates() {
        let model = model(0.0);
        let numeraires = money_market_measure(model.evolution());
        let mut evolver =
            CoterminalSwapRatePc::new(&model, &BrownianGeneratorFactory::new(4), &numeraires)
                .unwrap();
        evolver.start_new_path();
        for step in 0..evolver.number_of_steps() {
            evolver.advance_step().unwrap();
            let state = evolver.current_state();
            assert_eq!(state.first_valid_index(), step);
            for i in step..4 {
                assert_relative_eq!(
                    state.coterminal_swap_rate(i).unwrap(),
                    SWAP_RATES[i],
                    max_relative = 1e-13
                );
            }
        }
        assert_eq!(
            evolver.advance_step().unwrap_err().kind(),
            ErrorKind::PreconditionViolation
        );
    }

    #[test]
    fn test_last_swap_rate_matches_forward_rate_evolver() {
        // under the terminal measure the last swap rate and the last forward
        // are the same driftless quantity, driven by the same loadings
        let model = model(0.2);
        let numeraires = terminal_measure(model.evolution());
        let factory = BrownianGeneratorFactory::new(13);
        let mut swaps = CoterminalSwapRatePc::new(&model, &factory, &numeraires).unwrap();
        let mut forwards =
            crate::evolvers::LogNormalFwdRatePc::new(&model, &factory, &numeraires).unwrap();
        for _ in 0..5 {
            swaps.start_new_path();
            forwards.start_new_path();
            for _ in 0..swaps.number_of_steps() {
                swaps.advance_step().unwrap();
                forwards.advance_step().unwrap();
            }
            assert_relative_eq!(
                swaps.current_state().coterminal_swap_rate(3).unwrap(),
                forwards.current_state().forward_rate(3).unwrap(),
                max_relative = 1e-12
            );
        }
    }

    #[test]
    fn test_set_initial_state_reads_swap_rates() {
        let model = model(0.2);
        let numeraires = terminal_measure(model.evolution());
        let mut evolver =
            CoterminalSwapRatePc::new(&model, &BrownianGeneratorFactory::new(6), &numeraires)
                .unwrap();
        let mut state = CurveState::new(model.evolution().rate_times().clone());
        state.set_on_forward_rates(&[0.03, 0.035, 0.04, 0.045], 0).unwrap();
        let expected = state.coterminal_swap_rates().unwrap().to_vec();

        evolver.set_initial_state(&state).unwrap();
        evolver.start_new_path();
        for (i, rate) in expected.iter().enumerate() {
            assert_relative_eq!(
                evolver.current_state().coterminal_swap_rate(i).unwrap(),
                *rate,
                max_relative = 1e-13
            );
        }
    }
}
