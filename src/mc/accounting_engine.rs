// src/mc/accounting_engine.rs
//! Accounting Engine
//!
//! # Numeraire Accounting
//!
//! Every cash flow is converted, at the step it is fixed, into a number of
//! numeraire bonds and added to a per-product portfolio. When the numeraire
//! changes between steps the portfolio is rolled into the next bond:
//!
//! ```text
//! held_p    += w · X · P(T)/P(t_n) / principal        for each flow X of product p
//! principal *= P(t_n)/P(t_m)                           numeraire n → m
//! value_p    = held_p · P_0(t_{n_0})
//! ```
//!
//! where `w` is the product of the likelihood-ratio weights returned by the
//! evolver up to and including the current step.
//!
//! # Parallel Reduction
//!
//! [`AccountingEngine::run`] splits the path range across rayon workers. Each
//! worker owns a clone of the evolver and product (the evolver's setup data
//! is shared) and a partial [`SequenceStatistics`]; partials are merged once
//! at the end. Sample `s` always draws path `s` (or the antithetic pair
//! `2s, 2s+1`), so results do not depend on the number of threads.
//!
//! # Path Failures
//!
//! A `NumericalInstability` raised while simulating a path never reaches the
//! statistics. Under [`PathFailurePolicy::Abort`] it fails the run; under
//! [`PathFailurePolicy::Resample`] the sample is redrawn from replacement
//! path `paths + s · max_attempts + (a - 1)` on attempt `a`, and the run
//! fails once the attempts are exhausted. Other errors always fail the run.

use crate::error::{validation::*, ErrorKind, LmmError, LmmResult};
use crate::evolvers::MarketModelEvolver;
use crate::math_utils::Timer;
use crate::mc::discounter::MarketModelDiscounter;
use crate::mc::products::{CashFlow, Product};
use crate::mc::statistics::{PairStatistics, SequenceStatistics};
use bitflags::bitflags;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Diagnostics: u32 {
        const NONE                   = 0;
        const RAW_VALUES             = 1 << 0;
        const ANTITHETIC_CORRELATION = 1 << 1;
    }
}

/// What to do with a path whose evolution fails numerically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathFailurePolicy {
    /// Fail the whole run with the path's error
    #[default]
    Abort,
    /// Redraw the path from a replacement substream, at most `max_attempts` times
    Resample { max_attempts: usize },
}

#[derive(Debug, Clone)]
pub struct AccountingConfig {
    /// Number of samples; with antithetic sampling each sample is a pair of paths
    pub paths: usize,
    pub parallel: bool,
    pub antithetic: bool,
    pub failure_policy: PathFailurePolicy,
    pub diagnostics: Diagnostics,
    /// Checked once before every sample
    pub cancellation: Option<Arc<AtomicBool>>,
}

impl AccountingConfig {
    pub fn validate(&self) -> LmmResult<()> {
        validate_paths(self.paths)?;
        if let PathFailurePolicy::Resample { max_attempts: 0 } = self.failure_policy {
            return Err(LmmError::InvalidConfiguration {
                field: "failure_policy".to_string(),
                reason: "resampling needs at least one attempt".to_string(),
            });
        }
        if self.diagnostics.contains(Diagnostics::ANTITHETIC_CORRELATION) && !self.antithetic {
            return Err(LmmError::InvalidConfiguration {
                field: "diagnostics".to_string(),
                reason: "antithetic correlation requires antithetic sampling".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for AccountingConfig {
    fn default() -> Self {
        AccountingConfig {
            paths: 32_767,
            parallel: true,
            antithetic: false,
            failure_policy: PathFailurePolicy::Abort,
            diagnostics: Diagnostics::NONE,
            cancellation: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceEstimate {
    pub mean: f64,
    pub standard_error: f64,
    pub paths: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricingResult {
    pub means: Vec<f64>,
    pub errors: Vec<f64>,
    pub paths: usize,
    /// Number of discarded path attempts under [`PathFailurePolicy::Resample`]
    pub resampled_paths: usize,
    pub antithetic_correlation: Option<Vec<f64>>,
    /// One row of product values per sample, in sample order
    pub raw_values: Option<Vec<Vec<f64>>>,
    pub elapsed_ms: f64,
}

impl PricingResult {
    pub fn estimate(&self, product: usize) -> LmmResult<PriceEstimate> {
        validate_index("product", product, self.means.len())?;
        Ok(PriceEstimate {
            mean: self.means[product],
            standard_error: self.errors[product],
            paths: self.paths,
        })
    }
}

#[derive(Debug, Clone)]
struct PathScratch {
    numeraires_held: Vec<f64>,
    counts: Vec<usize>,
    flows: Vec<Vec<CashFlow>>,
}

impl PathScratch {
    fn new(product: &Product) -> Self {
        let products = product.number_of_products();
        let flows = product.max_number_of_cash_flows_per_product_per_step().max(1);
        Self {
            numeraires_held: vec![0.0; products],
            counts: vec![0; products],
            flows: vec![vec![CashFlow::default(); flows]; products],
        }
    }
}

/// Drives an evolver through paths and values a product on them
#[derive(Debug, Clone)]
pub struct AccountingEngine<E> {
    evolver: E,
    product: Product,
    discounters: Arc<[MarketModelDiscounter]>,
    initial_numeraire_value: f64,
    config: AccountingConfig,
    scratch: PathScratch,
}

impl<E: MarketModelEvolver> AccountingEngine<E> {
    /// # Errors
    ///
    /// `InvalidArgument` if the product and evolver disagree on the
    /// evolution, the evolver starts past step 0, or the initial numeraire
    /// value is not positive;
    /// `InvalidConfiguration` for an invalid config, or antithetic sampling
    /// requested from an evolver whose generator does not pair paths.
    pub fn new(
        evolver: E,
        product: Product,
        initial_numeraire_value: f64,
        config: AccountingConfig,
    ) -> LmmResult<Self> {
        validate_positive("initial_numeraire_value", initial_numeraire_value)?;
        validate_finite("initial_numeraire_value", initial_numeraire_value)?;
        config.validate()?;
        if evolver.evolution() != product.evolution() {
            return Err(LmmError::invalid_argument(
                "product",
                "product evolution differs from the evolver's",
            ));
        }
        if evolver.initial_step() != 0 {
            return Err(LmmError::invalid_argument(
                "evolver",
                format!(
                    "paths start at step {} but products are evolved from step 0",
                    evolver.initial_step()
                ),
            ));
        }
        if config.antithetic && !evolver.is_antithetic() {
            return Err(LmmError::InvalidConfiguration {
                field: "antithetic".to_string(),
                reason: "evolver was not built from an antithetic generator factory".to_string(),
            });
        }

        let rate_times = product.evolution().rate_times();
        let discounters = product
            .possible_cash_flow_times()
            .iter()
            .map(|&t| MarketModelDiscounter::new(t, rate_times))
            .collect::<LmmResult<Vec<_>>>()?;
        let scratch = PathScratch::new(&product);

        Ok(Self {
            evolver,
            product,
            discounters: Arc::from(discounters),
            initial_numeraire_value,
            config,
            scratch,
        })
    }

    pub fn evolver(&self) -> &E {
        &self.evolver
    }

    /// Mutable access, e.g. to set per-path constraints between runs
    pub fn evolver_mut(&mut self) -> &mut E {
        &mut self.evolver
    }

    pub fn product(&self) -> &Product {
        &self.product
    }

    pub fn config(&self) -> &AccountingConfig {
        &self.config
    }

    pub fn number_of_products(&self) -> usize {
        self.product.number_of_products()
    }

    /// Simulate the next path and write every product's value into `values`
    ///
    /// Values already include the path's likelihood-ratio weight, which is
    /// also returned.
    pub fn single_path_values(&mut self, values: &mut [f64]) -> LmmResult<f64> {
        validate_len("values", values.len(), self.product.number_of_products())?;
        simulate_path(
            &mut self.evolver,
            &mut self.product,
            &self.discounters,
            self.initial_numeraire_value,
            &mut self.scratch,
            values,
        )
    }

    /// Value of product 0 on the next path
    pub fn single_path_value(&mut self) -> LmmResult<f64> {
        let mut values = vec![0.0; self.product.number_of_products()];
        self.single_path_values(&mut values)?;
        Ok(values[0])
    }

    /// Serially add `paths` consecutive paths to `statistics`
    ///
    /// Paths continue from the evolver's current generator position and the
    /// first failing path aborts the loop; `run` applies the configured
    /// policies instead.
    pub fn multiple_path_values(
        &mut self,
        statistics: &mut SequenceStatistics,
        paths: usize,
    ) -> LmmResult<()> {
        validate_len(
            "statistics dimension",
            statistics.dimension(),
            self.product.number_of_products(),
        )?;
        let mut values = vec![0.0; self.product.number_of_products()];
        for _ in 0..paths {
            self.single_path_values(&mut values)?;
            statistics.add(&values)?;
        }
        Ok(())
    }
}

impl<E: MarketModelEvolver + Clone + Send + Sync> AccountingEngine<E> {
    /// Price every product over `config.paths` samples
    pub fn run(&self) -> LmmResult<PricingResult> {
        let mut timer = Timer::new();
        timer.start();
        let paths = self.config.paths;
        info!(
            paths,
            products = self.number_of_products(),
            parallel = self.config.parallel,
            antithetic = self.config.antithetic,
            threads = rayon::current_num_threads(),
            "starting accounting run"
        );

        let context = RunContext {
            discounters: &self.discounters,
            initial_numeraire_value: self.initial_numeraire_value,
            config: &self.config,
            completed: AtomicUsize::new(0),
        };

        let outcome = if self.config.parallel {
            (0..paths)
                .into_par_iter()
                .try_fold(
                    || self.worker(),
                    |mut worker, sample| {
                        worker.run_sample(&context, sample)?;
                        Ok(worker)
                    },
                )
                .map(|worker: LmmResult<Worker<E>>| worker.map(Worker::into_partial))
                .try_reduce(
                    || self.empty_partial(),
                    |mut a, b| {
                        a.merge(b)?;
                        Ok(a)
                    },
                )
        } else {
            let mut worker = self.worker();
            (0..paths)
                .try_for_each(|sample| worker.run_sample(&context, sample))
                .map(|_| worker.into_partial())
        };

        let partial = match outcome {
            Ok(partial) => partial,
            Err(err) => {
                if err.kind() == ErrorKind::Cancelled {
                    warn!(
                        completed = context.completed.load(Ordering::Relaxed),
                        "accounting run cancelled"
                    );
                } else {
                    warn!(error = %err, "accounting run failed");
                }
                return Err(err);
            }
        };

        let raw_values = partial.raw.map(|mut rows| {
            rows.sort_unstable_by_key(|(sample, _)| *sample);
            rows.into_iter().map(|(_, values)| values).collect()
        });
        let result = PricingResult {
            means: partial.stats.mean().to_vec(),
            errors: partial.stats.error_estimate(),
            paths: partial.stats.samples(),
            resampled_paths: partial.resampled,
            antithetic_correlation: partial.pairs.map(|pairs| pairs.correlation()),
            raw_values,
            elapsed_ms: timer.elapsed_ms(),
        };
        info!(
            paths = result.paths,
            resampled = result.resampled_paths,
            elapsed_ms = result.elapsed_ms,
            "accounting run finished"
        );
        Ok(result)
    }

    fn worker(&self) -> Worker<E> {
        let products = self.product.number_of_products();
        Worker {
            evolver: self.evolver.clone(),
            product: self.product.clone(),
            scratch: PathScratch::new(&self.product),
            values: vec![0.0; products],
            mirror: vec![0.0; products],
            partial: self.empty_partial(),
        }
    }

    fn empty_partial(&self) -> Partial {
        let products = self.product.number_of_products();
        let diagnostics = self.config.diagnostics;
        Partial {
            stats: SequenceStatistics::new(products),
            pairs: diagnostics
                .contains(Diagnostics::ANTITHETIC_CORRELATION)
                .then(|| PairStatistics::new(products)),
            raw: diagnostics.contains(Diagnostics::RAW_VALUES).then(Vec::new),
            resampled: 0,
        }
    }
}

struct RunContext<'a> {
    discounters: &'a [MarketModelDiscounter],
    initial_numeraire_value: f64,
    config: &'a AccountingConfig,
    completed: AtomicUsize,
}

impl RunContext<'_> {
    fn is_cancelled(&self) -> bool {
        self.config
            .cancellation
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn max_attempts(&self) -> usize {
        match self.config.failure_policy {
            PathFailurePolicy::Abort => 0,
            PathFailurePolicy::Resample { max_attempts } => max_attempts,
        }
    }

    /// Substream of sample `sample` on attempt `attempt`
    fn path_id(&self, sample: usize, attempt: usize) -> u64 {
        if attempt == 0 {
            sample as u64
        } else {
            (self.config.paths + sample * self.max_attempts() + attempt - 1) as u64
        }
    }
}

struct Partial {
    stats: SequenceStatistics,
    pairs: Option<PairStatistics>,
    raw: Option<Vec<(usize, Vec<f64>)>>,
    resampled: usize,
}

impl Partial {
    fn merge(&mut self, other: Partial) -> LmmResult<()> {
        self.stats.merge(&other.stats)?;
        if let (Some(pairs), Some(other)) = (&mut self.pairs, &other.pairs) {
            pairs.merge(other)?;
        }
        if let (Some(raw), Some(other)) = (&mut self.raw, other.raw) {
            raw.extend(other);
        }
        self.resampled += other.resampled;
        Ok(())
    }
}

struct Worker<E> {
    evolver: E,
    product: Product,
    scratch: PathScratch,
    values: Vec<f64>,
    mirror: Vec<f64>,
    partial: Partial,
}

impl<E: MarketModelEvolver> Worker<E> {
    fn into_partial(self) -> Partial {
        self.partial
    }

    fn run_sample(&mut self, context: &RunContext<'_>, sample: usize) -> LmmResult<()> {
        if context.is_cancelled() {
            return Err(LmmError::Cancelled {
                completed_paths: context.completed.load(Ordering::Relaxed),
            });
        }

        let max_attempts = context.max_attempts();
        let mut attempt = 0;
        loop {
            match self.evaluate(context, context.path_id(sample, attempt)) {
                Ok(()) => break,
                Err(err) if err.kind() == ErrorKind::NumericalInstability && max_attempts > 0 => {
                    if attempt == max_attempts {
                        return Err(LmmError::MonteCarloError {
                            paths: context.config.paths,
                            reason: format!(
                                "sample {} failed after {} replacement paths: {}",
                                sample, max_attempts, err
                            ),
                        });
                    }
                    warn!(sample, attempt, error = %err, "discarding failed path");
                    self.partial.resampled += 1;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }

        self.partial.stats.add(&self.values)?;
        if let Some(raw) = &mut self.partial.raw {
            raw.push((sample, self.values.clone()));
        }
        context.completed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn evaluate(&mut self, context: &RunContext<'_>, path_id: u64) -> LmmResult<()> {
        if !context.config.antithetic {
            self.evolver.seek_path(path_id);
            return self.simulate(context, false);
        }

        self.evolver.seek_path(2 * path_id);
        self.simulate(context, false)?;
        self.evolver.seek_path(2 * path_id + 1);
        self.simulate(context, true)?;
        if let Some(pairs) = &mut self.partial.pairs {
            pairs.add(&self.values, &self.mirror)?;
        }
        for (value, mirror) in self.values.iter_mut().zip(&self.mirror) {
            *value = 0.5 * (*value + mirror);
        }
        Ok(())
    }

    fn simulate(&mut self, context: &RunContext<'_>, mirror: bool) -> LmmResult<()> {
        let values = if mirror {
            &mut self.mirror
        } else {
            &mut self.values
        };
        simulate_path(
            &mut self.evolver,
            &mut self.product,
            context.discounters,
            context.initial_numeraire_value,
            &mut self.scratch,
            values,
        )
        .map(|_| ())
    }
}

fn simulate_path<E: MarketModelEvolver>(
    evolver: &mut E,
    product: &mut Product,
    discounters: &[MarketModelDiscounter],
    initial_numeraire_value: f64,
    scratch: &mut PathScratch,
    values: &mut [f64],
) -> LmmResult<f64> {
    const METHOD: &str = "AccountingEngine::single_path_values";

    scratch.numeraires_held.iter_mut().for_each(|held| *held = 0.0);
    let mut weight = evolver.start_new_path();
    product.reset();
    let mut principal = 1.0;

    loop {
        let step = evolver.current_step();
        weight *= evolver.advance_step()?;
        let state = evolver.current_state();
        let done = product.next_time_step(state, &mut scratch.counts, &mut scratch.flows)?;
        let numeraire = evolver.numeraires()[step];

        for (p, held) in scratch.numeraires_held.iter_mut().enumerate() {
            for flow in &scratch.flows[p][..scratch.counts[p]] {
                let bonds = discounters[flow.time_index].numeraire_bonds(state, numeraire)?;
                *held += weight * flow.amount * bonds / principal;
            }
        }

        if done {
            break;
        }
        let next = evolver.numeraires()[step + 1];
        if next != numeraire {
            principal *= state.discount_ratio(numeraire, next)?;
        }
    }

    for (value, held) in values.iter_mut().zip(&scratch.numeraires_held) {
        *value = held * initial_numeraire_value;
        if !value.is_finite() {
            return Err(LmmError::numerical(
                METHOD,
                format!("path value is not finite ({})", value),
            ));
        }
    }
    Ok(weight)
}
