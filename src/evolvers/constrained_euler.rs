// src/evolvers/constrained_euler.rs
//! Log-Normal Forward-Rate Euler with Rate Constraints
//!
//! # Importance Sampling
//!
//! At a constrained step the Euler update of rate `c` is forced onto a target
//! `x*_c = log(f*_c + d_c)` by shifting the factor draws along the loadings
//! of `c`:
//!
//! ```text
//! m    = (x*_c - x_c) / C_cc
//! x_i += m C_ic                     (all alive i)
//! s_k  = m A_ck                     (shift applied to draw z_k)
//! ```
//!
//! The path is then drawn under a shifted measure; the likelihood ratio back
//! to the original one is
//!
//! ```text
//! w = Π_k φ(z_k + s_k) / φ(z_k) = exp( Σ_k (-z_k s_k - ½ s_k²) )
//! ```
//!
//! # Weight Conditioning
//!
//! The ratio is accumulated in log space. A non-finite log-weight, or one
//! whose magnitude exceeds [`MAX_LOG_WEIGHT`], fails the path with
//! `NumericalInstability`; weights are never clamped.

use super::evolver::{
    delegate_to_path_state, EvolvedRates, EvolverSetup, MarketModelEvolver, PathState,
};
use crate::error::{validation::*, LmmError, LmmResult};
use crate::math_utils::{row_dot, rows_dot};
use crate::models::model::MarketModel;
use crate::rng::BrownianGeneratorFactory;
use std::sync::Arc;

const METHOD: &str = "LogNormalFwdRateEulerConstrained::advance_step";

/// Largest accepted `|log w|` for a single step
pub const MAX_LOG_WEIGHT: f64 = 700.0;

#[derive(Debug, Clone)]
struct ConstraintType {
    rates: Vec<usize>,
    /// Covariance of every rate with the constrained one, per step
    covariances: Vec<Vec<f64>>,
}

#[derive(Debug, Clone)]
pub struct LogNormalFwdRateEulerConstrained {
    setup: Arc<EvolverSetup>,
    constraint_type: Option<Arc<ConstraintType>>,
    target_log_rates: Vec<f64>,
    active: Vec<bool>,
    path: PathState,
}

impl LogNormalFwdRateEulerConstrained {
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
        let steps = setup.number_of_steps();
        Ok(Self {
            setup,
            constraint_type: None,
            target_log_rates: vec![0.0; steps],
            active: vec![false; steps],
            path,
        })
    }

    /// Choose, once, which rate each step may constrain
    ///
    /// Only single forward rates are supported: `end[s]` must equal
    /// `start[s] + 1`. Clears any active constraints.
    pub fn set_constraint_type(&mut self, start: &[usize], end: &[usize]) -> LmmResult<()> {
        let steps = self.setup.number_of_steps();
        let n = self.setup.number_of_rates();
        validate_len("start_indices", start.len(), steps)?;
        validate_len("end_indices", end.len(), steps)?;

        let mut covariances = Vec::with_capacity(steps);
        for (step, (&s, &e)) in start.iter().zip(end).enumerate() {
            validate_index("start_indices", s, n)?;
            if e != s + 1 {
                return Err(LmmError::invalid_argument(
                    "end_indices",
                    format!(
                        "step {}: only forward-rate constraints are supported (start {}, end {})",
                        step, s, e
                    ),
                ));
            }
            let root = &self.setup.pseudo_roots[step];
            covariances.push((0..n).map(|i| rows_dot(root, s, i)).collect());
        }

        self.constraint_type = Some(Arc::new(ConstraintType {
            rates: start.to_vec(),
            covariances,
        }));
        self.active.iter_mut().for_each(|a| *a = false);
        Ok(())
    }

    /// Set the target rates of the following paths and which steps enforce them
    pub fn set_this_constraint(&mut self, rates: &[f64], active: &[bool]) -> LmmResult<()> {
        let constraint_type = self.constraint_type.as_ref().ok_or_else(|| {
            LmmError::precondition(
                "LogNormalFwdRateEulerConstrained::set_this_constraint",
                "set_constraint_type has not been called",
            )
        })?;
        let steps = self.setup.number_of_steps();
        validate_len("rate_constraints", rates.len(), steps)?;
        validate_len("is_constraint_active", active.len(), steps)?;

        let mut targets = vec![0.0; steps];
        for step in 0..steps {
            if !active[step] {
                continue;
            }
            let rate = constraint_type.rates[step];
            if rate < self.setup.alive[step] {
                return Err(LmmError::invalid_argument(
                    "rate_constraints",
                    format!("step {}: constrained rate {} has already reset", step, rate),
                ));
            }
            if constraint_type.covariances[step][rate] <= 0.0 {
                return Err(LmmError::invalid_argument(
                    "rate_constraints",
                    format!("step {}: constrained rate {} has no variance", step, rate),
                ));
            }
            let displaced = rates[step] + self.setup.displacements[rate];
            if !displaced.is_finite() || displaced <= 0.0 {
                return Err(LmmError::invalid_argument(
                    "rate_constraints",
                    format!("step {}: displaced target {} must be positive", step, displaced),
                ));
            }
            targets[step] = displaced.ln();
        }

        self.target_log_rates = targets;
        self.active = active.to_vec();
        Ok(())
    }
}

impl MarketModelEvolver for LogNormalFwdRateEulerConstrained {
    delegate_to_path_state!();

    fn advance_step(&mut self) -> LmmResult<f64> {
        let setup = &*self.setup;
        let path = &mut self.path;
        path.check_can_advance(METHOD, setup.number_of_steps())?;

        let step = path.current_step;
        let alive = setup.alive[step];
        let n = setup.number_of_rates();

        path.start_of_step_drifts(setup);
        let mut weight = path.generator.next_step(&mut path.brownians);
        let root = &setup.pseudo_roots[step];
        let fixed = &setup.fixed_drifts[step];
        for i in alive..n {
            path.log_rates[i] +=
                path.drifts1[i] + fixed[i] + row_dot(root, i, &path.brownians);
        }

        if let (true, Some(constraint)) = (self.active[step], self.constraint_type.as_deref()) {
            let rate = constraint.rates[step];
            let covariance = &constraint.covariances[step];
            let multiplier =
                (self.target_log_rates[step] - path.log_rates[rate]) / covariance[rate];
            for i in alive..n {
                path.log_rates[i] += multiplier * covariance[i];
            }

            let log_weight: f64 = path
                .brownians
                .iter()
                .enumerate()
                .map(|(k, &z)| {
                    let shift = multiplier * root[(rate, k)];
                    -z * shift - 0.5 * shift * shift
                })
                .sum();
            if !log_weight.is_finite() || log_weight.abs() > MAX_LOG_WEIGHT {
                return Err(LmmError::numerical(
                    METHOD,
                    format!(
                        "likelihood ratio out of range at step {} (log-weight {})",
                        step, log_weight
                    ),
                ));
            }
            weight *= log_weight.exp();
        }

        path.exponentiate(setup, alive, METHOD)?;
        path.publish(setup, alive, METHOD)?;

        path.current_step += 1;
        Ok(weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::evolvers::LogNormalFwdRateEuler;
    use crate::market::evolution::{terminal_measure, EvolutionDescription};
    use crate::models::model::MarketModel;
    use crate::models::FactorMarketModel;
    use approx::assert_relative_eq;

    fn model() -> FactorMarketModel {
        let rate_times: Vec<f64> = (1..=5).map(|i| 0.5 * i as f64).collect();
        let evolution = EvolutionDescription::at_reset_times(&rate_times).unwrap();
        FactorMarketModel::exp_corr_flat_vol(
            0.5,
            0.2,
            &[0.2; 4],
            &evolution,
            3,
            &[0.04; 4],
            &[0.0; 4],
        )
        .unwrap()
    }

    fn evolver(model: &FactorMarketModel, seed: u64) -> LogNormalFwdRateEulerConstrained {
        let numeraires = terminal_measure(model.evolution());
        LogNormalFwdRateEulerConstrained::new(model, &BrownianGeneratorFactory::new(seed), &numeraires)
            .unwrap()
    }

    #[test]
    fn test_constraint_hits_target() {
        let model = model();
        let mut evolver = evolver(&model, 17);
        evolver.set_constraint_type(&[0, 1, 2, 3], &[1, 2, 3, 4]).unwrap();
        evolver
            .set_this_constraint(&[0.05, 0.045, 0.0, 0.0], &[true, true, false, false])
            .unwrap();

        for path in 0..10 {
            evolver.seek_path(path);
            evolver.start_new_path();
            let w0 = evolver.advance_step().unwrap();
            assert_relative_eq!(evolver.current_state().forward_rate(0).unwrap(), 0.05, max_relative = 1e-12);
            let w1 = evolver.advance_step().unwrap();
            assert_relative_eq!(evolver.current_state().forward_rate(1).unwrap(), 0.045, max_relative = 1e-12);
            assert!(w0 > 0.0 && w0.is_finite());
            assert!(w1 > 0.0 && w1.is_finite());
        }
    }

    #[test]
    fn test_inactive_constraint_matches_euler() {
        let model = model();
        let numeraires = terminal_measure(model.evolution());
        let factory = BrownianGeneratorFactory::new(4);
        let mut euler = LogNormalFwdRateEuler::new(&model, &factory, &numeraires).unwrap();
        let mut constrained = evolver(&model, 4);
        constrained.set_constraint_type(&[0, 1, 2, 3], &[1, 2, 3, 4]).unwrap();

        euler.start_new_path();
        constrained.start_new_path();
        for _ in 0..2 {
            assert_eq!(euler.advance_step().unwrap(), 1.0);
            assert_eq!(constrained.advance_step().unwrap(), 1.0);
        }
        assert_eq!(
            euler.current_state().forward_rates().unwrap(),
            constrained.current_state().forward_rates().unwrap()
        );
    }

    #[test]
    fn test_constraint_setup_errors() {
        let model = model();
        let mut evolver = evolver(&model, 1);
        assert_eq!(
            evolver
                .set_this_constraint(&[0.05; 4], &[true; 4])
                .unwrap_err()
                .kind(),
            ErrorKind::PreconditionViolation
        );
        assert!(evolver.set_constraint_type(&[0, 1, 2, 3], &[2, 2, 3, 4]).is_err());
        assert!(evolver.set_constraint_type(&[0, 1, 2], &[1, 2, 3]).is_err());

        evolver.set_constraint_type(&[0, 0, 2, 3], &[1, 1, 3, 4]).unwrap();
        // rate 0 resets at the end of step 0 and cannot be constrained in step 1
        assert!(evolver
            .set_this_constraint(&[0.05; 4], &[false, true, false, false])
            .is_err());
        assert!(evolver
            .set_this_constraint(&[-0.05; 4], &[true, false, false, false])
            .is_err());
    }

    #[test]
    fn test_huge_shift_is_numerical_instability() {
        let model = model();
        let mut evolver = evolver(&model, 2);
        evolver.set_constraint_type(&[0, 1, 2, 3], &[1, 2, 3, 4]).unwrap();
        // a target 1e30 times the current rate needs a shift of ~700 standard deviations
        evolver
            .set_this_constraint(&[4.0e28, 0.0, 0.0, 0.0], &[true, false, false, false])
            .unwrap();
        evolver.start_new_path();
        let err = evolver.advance_step().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NumericalInstability);
    }

    #[test]
    fn test_weight_matches_likelihood_ratio() {
        let model = model();
        let numeraires = terminal_measure(model.evolution());
        let factory = BrownianGeneratorFactory::new(31);
        let mut constrained =
            LogNormalFwdRateEulerConstrained::new(&model, &factory, &numeraires).unwrap();
        constrained.set_constraint_type(&[0, 1, 2, 3], &[1, 2, 3, 4]).unwrap();
        constrained
            .set_this_constraint(&[0.05, 0.0, 0.0, 0.0], &[true, false, false, false])
            .unwrap();
        let mut euler = LogNormalFwdRateEuler::new(&model, &factory, &numeraires).unwrap();
        let mut generator = factory.create(model.number_of_factors(), model.number_of_steps());
        let root = model.pseudo_root(0);
        let variance: f64 = (0..root.ncols()).map(|k| root[(0, k)] * root[(0, k)]).sum();

        for path in [0u64, 5, 12] {
            constrained.seek_path(path);
            constrained.start_new_path();
            let weight = constrained.advance_step().unwrap();

            euler.seek_path(path);
            euler.start_new_path();
            euler.advance_step().unwrap();
            let unconstrained = euler.current_state().forward_rate(0).unwrap().ln();

            generator.seek_path(path);
            generator.next_path();
            let mut z = vec![0.0; root.ncols()];
            generator.next_step(&mut z);

            let multiplier = (0.05f64.ln() - unconstrained) / variance;
            let log_weight: f64 = z
                .iter()
                .enumerate()
                .map(|(k, &z)| {
                    let shift = multiplier * root[(0, k)];
                    -z * shift - 0.5 * shift * shift
                })
                .sum();
            assert_relative_eq!(weight, log_weight.exp(), max_relative = 1e-9);
            assert!((weight - 1.0).abs() > 1e-6);
        }
    }

    #[test]
    fn test_target_on_unconstrained_draw_has_unit_weight() {
        let model = model();
        let numeraires = terminal_measure(model.evolution());
        let factory = BrownianGeneratorFactory::new(9);
        let mut euler = LogNormalFwdRateEuler::new(&model, &factory, &numeraires).unwrap();
        euler.seek_path(3);
        euler.start_new_path();
        euler.advance_step().unwrap();
        let free = euler.current_state().forward_rates().unwrap().to_vec();

        let mut constrained =
            LogNormalFwdRateEulerConstrained::new(&model, &factory, &numeraires).unwrap();
        constrained.set_constraint_type(&[0, 1, 2, 3], &[1, 2, 3, 4]).unwrap();
        constrained
            .set_this_constraint(&[free[0], 0.0, 0.0, 0.0], &[true, false, false, false])
            .unwrap();
        constrained.seek_path(3);
        constrained.start_new_path();
        let weight = constrained.advance_step().unwrap();

        // the target only differs from the free draw by the exp/ln round trip
        assert!((weight - 1.0).abs() < 1e-12, "weight {}", weight);
        for (i, f) in free.iter().enumerate() {
            assert_relative_eq!(
                constrained.current_state().forward_rate(i).unwrap(),
                *f,
                max_relative = 1e-13
            );
        }
    }
}
