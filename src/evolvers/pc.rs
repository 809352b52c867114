// src/evolvers/pc.rs
//! Log-Normal Forward-Rate Predictor-Corrector
//!
//! # Scheme
//!
//! With `x_i = log(f_i + d_i)` and step loadings `A`:
//!
//! ```text
//! predictor:  x̂_i = x_i + μ_i(f) - ½ C_ii + A_i · z
//! corrector:  x'_i = x̂_i + ½ (μ_i(f̂) - μ_i(f))
//! ```
//!
//! i.e. the drift used over the step is the average of the drifts evaluated
//! on the start-of-step curve and on the predicted end-of-step curve. Only
//! rates still alive during the step move.

use super::evolver::{
    delegate_to_path_state, EvolvedRates, EvolverSetup, MarketModelEvolver, PathState,
};
use crate::error::LmmResult;
use crate::math_utils::row_dot;
use crate::models::model::MarketModel;
use crate::rng::BrownianGeneratorFactory;
use std::sync::Arc;

const METHOD: &str = "LogNormalFwdRatePc::advance_step";

#[derive(Debug, Clone)]
pub struct LogNormalFwdRatePc {
    setup: Arc<EvolverSetup>,
    path: PathState,
}

impl LogNormalFwdRatePc {
    pub fn new(
        model: &dyn MarketModel,
        factory: &BrownianGeneratorFactory,
        numeraires: &[usize],
    ) -> LmmResult<Self> {
        Self::with_initial_step(model, factory, numeraires, 0)
    }

    /// Paths start at `initial_step` instead of the first evolution step
    pub fn with_initial_step(
        model: &dyn MarketModel,
        factory: &BrownianGeneratorFactory,
        numeraires: &[usize],
        initial_step: usize,
    ) -> LmmResult<Self> {
        let setup = Arc::new(EvolverSetup::new(
            model,
            numeraires,
            EvolvedRates::ForwardRates,
            initial_step,
        )?);
        let path = PathState::new(&setup, factory);
        Ok(Self { setup, path })
    }

    pub fn setup(&self) -> &EvolverSetup {
        &self.setup
    }
}

/// One predictor-corrector step of whichever rates `setup` evolves
pub(crate) fn predictor_corrector_step(
    setup: &EvolverSetup,
    path: &mut PathState,
    method: &str,
) -> LmmResult<f64> {
    path.check_can_advance(method, setup.number_of_steps())?;

    let step = path.current_step;
    let alive = setup.alive[step];
    let n = setup.number_of_rates();

    path.start_of_step_drifts(setup);

    let weight = path.generator.next_step(&mut path.brownians);
    let root = &setup.pseudo_roots[step];
    let fixed = &setup.fixed_drifts[step];
    for i in alive..n {
        path.log_rates[i] += path.drifts1[i] + fixed[i] + row_dot(root, i, &path.brownians);
    }
    path.exponentiate(setup, alive, method)?;

    setup.calculators[step].compute(&path.rates, &mut path.drifts2);
    for i in alive..n {
        path.log_rates[i] += 0.5 * (path.drifts2[i] - path.drifts1[i]);
    }
    path.exponentiate(setup, alive, method)?;
    path.publish(setup, alive, method)?;

    path.current_step += 1;
    Ok(weight)
}

impl MarketModelEvolver for LogNormalFwdRatePc {
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

    fn model(factors: usize) -> FactorMarketModel {
        let rate_times: Vec<f64> = (1..=5).map(|i| 0.5 * i as f64).collect();
        let evolution = EvolutionDescription::at_reset_times(&rate_times).unwrap();
        FactorMarketModel::exp_corr_flat_vol(
            0.5,
            0.2,
            &[0.2; 4],
            &evolution,
            factors,
            &[0.04, 0.042, 0.044, 0.046],
            &[0.0; 4],
        )
        .unwrap()
    }

    #[test]
    fn test_step_count_and_terminal_precondition() {
        let model = model(2);
        let numeraires = terminal_measure(model.evolution());
        let mut evolver =
            LogNormalFwdRatePc::new(&model, &BrownianGeneratorFactory::new(1), &numeraires).unwrap();

        assert_eq!(
            evolver.advance_step().unwrap_err().kind(),
            ErrorKind::PreconditionViolation
        );

        evolver.start_new_path();
        for _ in 0..evolver.number_of_steps() {
            evolver.advance_step().unwrap();
        }
        assert_eq!(evolver.current_step(), evolver.number_of_steps());
        assert_eq!(
            evolver.advance_step().unwrap_err().kind(),
            ErrorKind::PreconditionViolation
        );
    }

    #[test]
    fn test_first_valid_index_follows_alive_rates() {
        let model = model(4);
        let numeraires = money_market_measure(model.evolution());
        let mut evolver =
            LogNormalFwdRatePc::new(&model, &BrownianGeneratorFactory::new(3), &numeraires).unwrap();
        evolver.start_new_path();
        let alive = model.evolution().first_alive_rate().to_vec();
        let mut last = 0;
        for step in 0..evolver.number_of_steps() {
            evolver.advance_step().unwrap();
            let first = evolver.current_state().first_valid_index();
            assert_eq!(first, alive[step]);
            assert!(first >= last);
            last = first;
        }
    }

    #[test]
    fn test_seek_reproduces_path() {
        let model = model(2);
        let numeraires = terminal_measure(model.evolution());
        let factory = BrownianGeneratorFactory::new(11);
        let mut a = LogNormalFwdRatePc::new(&model, &factory, &numeraires).unwrap();
        let mut b = a.clone();

        for _ in 0..3 {
            a.start_new_path();
            while a.current_step() < a.number_of_steps() {
                a.advance_step().unwrap();
            }
        }
        b.seek_path(2);
        b.start_new_path();
        while b.current_step() < b.number_of_steps() {
            b.advance_step().unwrap();
        }
        assert_eq!(
            a.current_state().forward_rates().unwrap(),
            b.current_state().forward_rates().unwrap()
        );
    }

    #[test]
    fn test_set_initial_state() {
        let model = model(2);
        let numeraires = terminal_measure(model.evolution());
        let mut evolver =
            LogNormalFwdRatePc::new(&model, &BrownianGeneratorFactory::new(5), &numeraires).unwrap();
        let mut state = CurveState::new(model.evolution().rate_times().clone());
        state.set_on_forward_rates(&[0.03; 4], 0).unwrap();
        evolver.set_initial_state(&state).unwrap();
        evolver.start_new_path();
        assert_eq!(evolver.current_state().forward_rate(2).unwrap(), 0.03);
    }

    #[test]
    fn test_initial_step_shortens_paths() {
        let model = model(2);
        let numeraires = terminal_measure(model.evolution());
        let factory = BrownianGeneratorFactory::new(8);
        let steps = model.evolution().number_of_steps();
        for k in 0..steps {
            let mut evolver =
                LogNormalFwdRatePc::with_initial_step(&model, &factory, &numeraires, k).unwrap();
            assert_eq!(evolver.initial_step(), k);
            for _ in 0..2 {
                evolver.start_new_path();
                assert_eq!(evolver.current_step(), k);
                let mut advances = 0;
                while evolver.current_step() < evolver.number_of_steps() {
                    evolver.advance_step().unwrap();
                    advances += 1;
                }
                assert_eq!(advances, steps - k);
                assert_eq!(
                    evolver.advance_step().unwrap_err().kind(),
                    ErrorKind::PreconditionViolation
                );
            }
        }
        let err = LogNormalFwdRatePc::with_initial_step(&model, &factory, &numeraires, steps)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_initial_drifts_use_initial_step_numeraire() {
        let model = model(4);
        let numeraires = money_market_measure(model.evolution());
        let evolver = LogNormalFwdRatePc::with_initial_step(
            &model,
            &BrownianGeneratorFactory::new(2),
            &numeraires,
            2,
        )
        .unwrap();
        let setup = evolver.setup();
        let mut at_step_two = vec![0.0; 4];
        let mut at_step_zero = vec![0.0; 4];
        setup.calculators[2].compute(&setup.initial_rates, &mut at_step_two);
        setup.calculators[0].compute(&setup.initial_rates, &mut at_step_zero);
        assert_eq!(setup.initial_drifts[2..], at_step_two[2..]);
        assert_ne!(setup.initial_drifts[3], at_step_zero[3]);
    }

    #[test]
    fn test_set_initial_state_from_partially_valid_curve() {
        let model = model(2);
        let numeraires = terminal_measure(model.evolution());
        let factory = BrownianGeneratorFactory::new(5);
        let mut state = CurveState::new(model.evolution().rate_times().clone());
        state
            .set_on_forward_rates(&[0.0, 0.031, 0.032, 0.033], 1)
            .unwrap();

        // rate 0 is still alive during step 0
        let mut from_start = LogNormalFwdRatePc::new(&model, &factory, &numeraires).unwrap();
        assert_eq!(
            from_start.set_initial_state(&state).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );

        let mut evolver =
            LogNormalFwdRatePc::with_initial_step(&model, &factory, &numeraires, 1).unwrap();
        evolver.set_initial_state(&state).unwrap();
        evolver.start_new_path();
        assert_eq!(evolver.current_state().first_valid_index(), 1);
        assert_eq!(evolver.current_state().forward_rate(1).unwrap(), 0.031);
        assert!(evolver.current_state().forward_rate(0).is_err());
        evolver.advance_step().unwrap();
        assert_eq!(evolver.current_state().first_valid_index(), 1);
        assert!(evolver.current_state().forward_rate(3).unwrap() > 0.0);
    }
}
