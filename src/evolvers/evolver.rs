// src/evolvers/evolver.rs
//! Evolver Interface and Shared Step Data
//!
//! # Path State Machine
//!
//! ```text
//! NotStarted --start_new_path--> AtStep(k0) --advance_step--> ... --> AtStep(S) = Done
//!                                     ^                                    |
//!                                     +--------- start_new_path -----------+
//! ```
//!
//! `k0` is the evolver's initial step, 0 unless built with one.
//!
//! Everything that depends only on the market model and the numeraires
//! (pseudo-roots, covariances, `-½σ²` drifts, drift calculators, initial
//! drifts) is built once into an [`EvolverSetup`] and shared through an
//! `Arc` by every clone of an evolver. Clones own their path buffers, curve
//! state and Brownian generator, so one clone per worker can run paths
//! concurrently.

use crate::drift::{LmmDriftCalculator, SmmDriftCalculator};
use crate::error::{validation::*, LmmError, LmmResult};
use crate::market::curve_state::CurveState;
use crate::market::evolution::{check_compatibility, EvolutionDescription};
use crate::models::model::MarketModel;
use crate::rng::{BrownianGenerator, BrownianGeneratorFactory};
use nalgebra::DMatrix;

/// Advances a [`CurveState`] through the evolution times of one path
pub trait MarketModelEvolver {
    /// Numeraire bond index used at each step
    fn numeraires(&self) -> &[usize];

    /// Reset to the initial curve and return the path weight
    fn start_new_path(&mut self) -> f64;

    /// Evolve one step and return the step's likelihood-ratio weight
    fn advance_step(&mut self) -> LmmResult<f64>;

    fn current_step(&self) -> usize;

    /// Step every path starts from
    fn initial_step(&self) -> usize;

    fn number_of_steps(&self) -> usize;

    fn current_state(&self) -> &CurveState;

    /// Replace the initial curve used by subsequent paths
    fn set_initial_state(&mut self, state: &CurveState) -> LmmResult<()>;

    /// Make the next `start_new_path` draw path `path_index`
    fn seek_path(&mut self, path_index: u64);

    /// Whether paths `2k` and `2k+1` are drawn as an antithetic pair
    fn is_antithetic(&self) -> bool;

    fn evolution(&self) -> &EvolutionDescription;
}

/// The rates an evolver moves in log space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvolvedRates {
    ForwardRates,
    CoterminalSwapRates,
}

#[derive(Debug, Clone)]
pub(crate) enum DriftCalculator {
    Lmm(LmmDriftCalculator),
    Smm(SmmDriftCalculator),
}

impl DriftCalculator {
    #[inline]
    pub(crate) fn compute(&self, rates: &[f64], drifts: &mut [f64]) {
        match self {
            DriftCalculator::Lmm(calculator) => calculator.compute(rates, drifts),
            DriftCalculator::Smm(calculator) => calculator.compute(rates, drifts),
        }
    }
}

/// Immutable per-simulation data shared by evolver clones
#[derive(Debug, Clone)]
pub struct EvolverSetup {
    pub(crate) evolution: EvolutionDescription,
    pub(crate) rates: EvolvedRates,
    pub(crate) numeraires: Vec<usize>,
    pub(crate) initial_step: usize,
    pub(crate) displacements: Vec<f64>,
    pub(crate) taus: Vec<f64>,
    pub(crate) alive: Vec<usize>,
    pub(crate) factors: usize,
    pub(crate) pseudo_roots: Vec<DMatrix<f64>>,
    pub(crate) covariances: Vec<DMatrix<f64>>,
    pub(crate) fixed_drifts: Vec<Vec<f64>>,
    pub(crate) calculators: Vec<DriftCalculator>,
    pub(crate) initial_state: CurveState,
    pub(crate) initial_rates: Vec<f64>,
    pub(crate) initial_log_rates: Vec<f64>,
    pub(crate) initial_drifts: Vec<f64>,
}

impl EvolverSetup {
    /// The model's initial rates and displacements are read as `rates`
    pub fn new(
        model: &dyn MarketModel,
        numeraires: &[usize],
        rates: EvolvedRates,
        initial_step: usize,
    ) -> LmmResult<Self> {
        let evolution = model.evolution().clone();
        check_compatibility(&evolution, numeraires)?;
        let n = evolution.number_of_rates();
        let steps = evolution.number_of_steps();
        validate_index("initial_step", initial_step, steps)?;
        let factors = model.number_of_factors();
        let displacements = model.displacements().to_vec();
        let taus = evolution.rate_taus().to_vec();
        let alive = evolution.first_alive_rate().to_vec();
        validate_len("displacements", displacements.len(), n)?;
        validate_len("initial_rates", model.initial_rates().len(), n)?;

        let mut pseudo_roots = Vec::with_capacity(steps);
        let mut covariances = Vec::with_capacity(steps);
        let mut fixed_drifts = Vec::with_capacity(steps);
        let mut calculators = Vec::with_capacity(steps);
        for step in 0..steps {
            let root = model.pseudo_root(step);
            if root.nrows() != n || root.ncols() != factors {
                return Err(LmmError::invalid_argument(
                    "pseudo_root",
                    format!(
                        "step {}: expected {}x{}, got {}x{}",
                        step,
                        n,
                        factors,
                        root.nrows(),
                        root.ncols()
                    ),
                ));
            }
            let covariance = root * root.transpose();
            fixed_drifts.push((0..n).map(|i| -0.5 * covariance[(i, i)]).collect());
            calculators.push(match rates {
                EvolvedRates::ForwardRates => DriftCalculator::Lmm(LmmDriftCalculator::new(
                    root,
                    &displacements,
                    &taus,
                    numeraires[step],
                    alive[step],
                )?),
                EvolvedRates::CoterminalSwapRates => DriftCalculator::Smm(SmmDriftCalculator::new(
                    root,
                    &displacements,
                    &taus,
                    numeraires[step],
                    alive[step],
                )?),
            });
            pseudo_roots.push(root.clone());
            covariances.push(covariance);
        }

        let mut setup = Self {
            initial_state: CurveState::new(evolution.rate_times().clone()),
            evolution,
            rates,
            numeraires: numeraires.to_vec(),
            initial_step,
            displacements,
            taus,
            alive,
            factors,
            pseudo_roots,
            covariances,
            fixed_drifts,
            calculators,
            initial_rates: vec![0.0; n],
            initial_log_rates: vec![0.0; n],
            initial_drifts: vec![0.0; n],
        };
        setup.set_initial_rates(model.initial_rates(), 0)?;
        Ok(setup)
    }

    /// Start paths from `state`, reading forwards or coterminal swap rates
    /// from its first valid index on
    pub(crate) fn set_initial_state(&mut self, state: &CurveState) -> LmmResult<()> {
        if state.rate_times() != self.evolution.rate_times() {
            return Err(LmmError::invalid_argument(
                "state",
                "rate times differ from the evolution's",
            ));
        }
        let rates = match self.rates {
            EvolvedRates::ForwardRates => state.forward_rates()?,
            EvolvedRates::CoterminalSwapRates => state.coterminal_swap_rates()?,
        };
        self.set_initial_rates(rates, state.first_valid_index())
    }

    /// Entries below `first_valid` are ignored; every rate alive during the
    /// initial step must be at or above it
    pub(crate) fn set_initial_rates(&mut self, rates: &[f64], first_valid: usize) -> LmmResult<()> {
        let n = self.number_of_rates();
        validate_len("initial_rates", rates.len(), n)?;
        let alive = self.alive[self.initial_step];
        if first_valid > alive {
            return Err(LmmError::invalid_argument(
                "first_valid_index",
                format!(
                    "rate {} is alive at initial step {} but the state starts at rate {}",
                    alive, self.initial_step, first_valid
                ),
            ));
        }

        let mut values = vec![0.0; n];
        let mut log_rates = vec![0.0; n];
        for i in first_valid..n {
            let (r, d) = (rates[i], self.displacements[i]);
            if !r.is_finite() || r + d <= 0.0 {
                return Err(LmmError::invalid_argument(
                    "initial_rates",
                    format!("displaced rate {} must be positive and finite ({} + {})", i, r, d),
                ));
            }
            values[i] = r;
            log_rates[i] = (r + d).ln();
        }

        let mut state = CurveState::new(self.evolution.rate_times().clone());
        match self.rates {
            EvolvedRates::ForwardRates => state.set_on_forward_rates(&values, first_valid)?,
            EvolvedRates::CoterminalSwapRates => {
                state.set_on_coterminal_swap_rates(&values, first_valid)?
            }
        }
        let mut drifts = vec![0.0; n];
        self.calculators[self.initial_step].compute(&values, &mut drifts);

        self.initial_state = state;
        self.initial_rates = values;
        self.initial_log_rates = log_rates;
        self.initial_drifts = drifts;
        Ok(())
    }

    pub fn evolution(&self) -> &EvolutionDescription {
        &self.evolution
    }

    pub fn evolved_rates(&self) -> EvolvedRates {
        self.rates
    }

    pub fn numeraires(&self) -> &[usize] {
        &self.numeraires
    }

    pub fn initial_step(&self) -> usize {
        self.initial_step
    }

    pub fn number_of_rates(&self) -> usize {
        self.taus.len()
    }

    pub fn number_of_steps(&self) -> usize {
        self.evolution.number_of_steps()
    }

    pub fn number_of_factors(&self) -> usize {
        self.factors
    }
}

/// Per-path buffers owned by each evolver clone
#[derive(Debug, Clone)]
pub(crate) struct PathState {
    pub(crate) generator: BrownianGenerator,
    pub(crate) curve_state: CurveState,
    pub(crate) rates: Vec<f64>,
    pub(crate) log_rates: Vec<f64>,
    pub(crate) drifts1: Vec<f64>,
    pub(crate) drifts2: Vec<f64>,
    pub(crate) brownians: Vec<f64>,
    pub(crate) current_step: usize,
    pub(crate) started: bool,
}

impl PathState {
    pub(crate) fn new(setup: &EvolverSetup, factory: &BrownianGeneratorFactory) -> Self {
        let n = setup.number_of_rates();
        Self {
            generator: factory.create(setup.factors, setup.number_of_steps() - setup.initial_step),
            curve_state: setup.initial_state.clone(),
            rates: setup.initial_rates.clone(),
            log_rates: setup.initial_log_rates.clone(),
            drifts1: vec![0.0; n],
            drifts2: vec![0.0; n],
            brownians: vec![0.0; setup.factors],
            current_step: setup.initial_step,
            started: false,
        }
    }

    pub(crate) fn start(&mut self, setup: &EvolverSetup) -> f64 {
        self.current_step = setup.initial_step;
        self.started = true;
        self.rates.copy_from_slice(&setup.initial_rates);
        self.log_rates.copy_from_slice(&setup.initial_log_rates);
        self.curve_state.clone_from(&setup.initial_state);
        self.generator.next_path()
    }

    pub(crate) fn check_can_advance(&self, context: &str, steps: usize) -> LmmResult<()> {
        if !self.started {
            return Err(LmmError::precondition(context, "start_new_path has not been called"));
        }
        if self.current_step >= steps {
            return Err(LmmError::precondition(
                context,
                format!("all {} steps already evolved", steps),
            ));
        }
        Ok(())
    }

    /// Drifts at the start of the current step
    pub(crate) fn start_of_step_drifts(&mut self, setup: &EvolverSetup) {
        let step = self.current_step;
        if step == setup.initial_step {
            self.drifts1.copy_from_slice(&setup.initial_drifts);
        } else {
            setup.calculators[step].compute(&self.rates, &mut self.drifts1);
        }
    }

    /// Map `log(r + d)` back to rates `alive..N`
    pub(crate) fn exponentiate(
        &mut self,
        setup: &EvolverSetup,
        alive: usize,
        method: &str,
    ) -> LmmResult<()> {
        for i in alive..self.rates.len() {
            self.rates[i] = checked_rate(setup, i, self.log_rates[i], method)?;
        }
        Ok(())
    }

    /// Push rates into the curve state; `alive` becomes its first valid index
    pub(crate) fn publish(&mut self, setup: &EvolverSetup, alive: usize, method: &str) -> LmmResult<()> {
        match setup.rates {
            EvolvedRates::ForwardRates => self.curve_state.set_on_forward_rates(&self.rates, alive),
            EvolvedRates::CoterminalSwapRates => self
                .curve_state
                .set_on_coterminal_swap_rates(&self.rates, alive)
                .map_err(|e| LmmError::numerical(method, e.to_string())),
        }
    }
}

/// The [`MarketModelEvolver`] methods that only read the shared setup and
/// the path buffers, for evolvers holding them as `setup` and `path`
macro_rules! delegate_to_path_state {
    () => {
        fn numeraires(&self) -> &[usize] {
            self.setup.numeraires()
        }

        fn start_new_path(&mut self) -> f64 {
            self.path.start(&self.setup)
        }

        fn current_step(&self) -> usize {
            self.path.current_step
        }

        fn initial_step(&self) -> usize {
            self.setup.initial_step()
        }

        fn number_of_steps(&self) -> usize {
            self.setup.number_of_steps()
        }

        fn current_state(&self) -> &$crate::market::curve_state::CurveState {
            &self.path.curve_state
        }

        fn set_initial_state(
            &mut self,
            state: &$crate::market::curve_state::CurveState,
        ) -> $crate::error::LmmResult<()> {
            std::sync::Arc::make_mut(&mut self.setup).set_initial_state(state)
        }

        fn seek_path(&mut self, path_index: u64) {
            self.path.generator.seek_path(path_index);
        }

        fn is_antithetic(&self) -> bool {
            self.path.generator.is_antithetic()
        }

        fn evolution(&self) -> &$crate::market::evolution::EvolutionDescription {
            self.setup.evolution()
        }
    };
}
pub(crate) use delegate_to_path_state;

/// `exp(log_rate) - d` with the checks a step needs before the curve is
/// rebuilt from it
#[inline]
pub(crate) fn checked_rate(
    setup: &EvolverSetup,
    rate: usize,
    log_rate: f64,
    method: &str,
) -> LmmResult<f64> {
    if !log_rate.is_finite() {
        return Err(LmmError::numerical(
            method,
            format!("log-rate {} is not finite ({})", rate, log_rate),
        ));
    }
    let displaced = log_rate.exp();
    if !displaced.is_finite() {
        return Err(LmmError::numerical(
            method,
            format!("exp overflow for rate {} (log-rate {})", rate, log_rate),
        ));
    }
    let value = displaced - setup.displacements[rate];
    // swap rates are checked through the bonds they imply when published
    if setup.rates == EvolvedRates::ForwardRates && 1.0 + setup.taus[rate] * value <= 0.0 {
        return Err(LmmError::numerical(
            method,
            format!("1 + τf is not positive for rate {} (f = {})", rate, value),
        ));
    }
    Ok(value)
}
