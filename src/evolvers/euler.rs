// src/evolvers/euler.rs
//! Log-Normal Forward-Rate Euler
//!
//! Plain log-Euler step, drift frozen at the start of the step:
//!
//! ```text
//! x'_i = x_i + μ_i(f) - ½ C_ii + A_i · z,     x_i = log(f_i + d_i)
//! ```
//!
//! One drift evaluation per step; cheaper and more biased than the
//! predictor-corrector for long steps.

use super::evolver::{
    delegate_to_path_state, EvolvedRates, EvolverSetup, MarketModelEvolver, PathState,
};
use crate::error::LmmResult;
use crate::math_utils::row_dot;
use crate::models::model::MarketModel;
use crate::rng::BrownianGeneratorFactory;
use std::sync::Arc;

const METHOD: &str = "LogNormalFwdRateEuler::advance_step";

#[derive(Debug, Clone)]
pub struct LogNormalFwdRateEuler {
    setup: Arc<EvolverSetup>,
    path: PathState,
}

impl LogNormalFwdRateEuler {
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
            EvolvedRates::ForwardRates,
            initial_step,
        )?);
        let path = PathState::new(&setup, factory);
        Ok(Self { setup, path })
    }
}

impl MarketModelEvolver for LogNormalFwdRateEuler {
    delegate_to_path_state!();

    fn advance_step(&mut self) -> LmmResult<f64> {
        let setup = &*self.setup;
        let path = &mut self.path;
        path.check_can_advance(METHOD, setup.number_of_steps())?;

        let step = path.current_step;
        let alive = setup.alive[step];

        path.start_of_step_drifts(setup);
        let weight = path.generator.next_step(&mut path.brownians);
        let root = &setup.pseudo_roots[step];
        let fixed = &setup.fixed_drifts[step];
        for i in alive..setup.number_of_rates() {
            path.log_rates[i] += path.drifts1[i] + fixed[i] + row_dot(root, i, &path.brownians);
        }
        path.exponentiate(setup, alive, METHOD)?;
        path.publish(setup, alive, METHOD)?;

        path.current_step += 1;
        Ok(weight)
    }
}
