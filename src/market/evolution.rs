// src/market/evolution.rs
//! Rate Times and Evolution Descriptions
//!
//! # Layout
//!
//! ```text
//!   |-----|-----|-----|-----|          rate times   t0 < t1 < ... < tN
//!   t0    t1    t2    t3    t4
//!   f0    f1    f2    f3               forward rates (one per period)
//!     ^        ^          ^            evolution times e0 < e1 < ... < e(S-1)
//! ```
//!
//! Rate `i` resets at `t_i` and pays at `t_{i+1}`. It is alive during an
//! evolution step as long as its reset time lies strictly after the start of
//! the step. Numeraire index `k` designates the discount bond maturing at
//! `t_k`; index `N` is the terminal bond.

use crate::error::{validation::*, LmmError, LmmResult};
use std::sync::Arc;

/// Strictly increasing rate times `t0 < t1 < ... < tN`, shared by every
/// curve state and evolver of one simulation
#[derive(Debug, Clone, PartialEq)]
pub struct RateTimes {
    times: Arc<[f64]>,
    taus: Arc<[f64]>,
}

impl RateTimes {
    pub fn new(times: &[f64]) -> LmmResult<Self> {
        if times.len() < 2 {
            return Err(LmmError::invalid_argument(
                "rate_times",
                format!("at least 2 rate times required, {} provided", times.len()),
            ));
        }
        validate_strictly_increasing("rate_times", times)?;
        validate_non_negative("rate_times[0]", times[0])?;

        let taus: Vec<f64> = times.windows(2).map(|w| w[1] - w[0]).collect();
        Ok(Self {
            times: Arc::from(times),
            taus: Arc::from(taus),
        })
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Accrual fractions `t_{i+1} - t_i`
    pub fn taus(&self) -> &[f64] {
        &self.taus
    }

    pub fn number_of_rates(&self) -> usize {
        self.taus.len()
    }
}

/// Immutable per-simulation description of rate times, evolution times and
/// which rates are alive at each step
#[derive(Debug, Clone, PartialEq)]
pub struct EvolutionDescription {
    rate_times: RateTimes,
    evolution_times: Arc<[f64]>,
    first_alive_rate: Arc<[usize]>,
}

impl EvolutionDescription {
    pub fn new(rate_times: &[f64], evolution_times: &[f64]) -> LmmResult<Self> {
        Self::from_rate_times(RateTimes::new(rate_times)?, evolution_times)
    }

    pub fn from_rate_times(rate_times: RateTimes, evolution_times: &[f64]) -> LmmResult<Self> {
        validate_steps(evolution_times.len())?;
        validate_strictly_increasing("evolution_times", evolution_times)?;
        validate_positive("evolution_times[0]", evolution_times[0])?;

        let times = rate_times.times();
        let n = rate_times.number_of_rates();
        let last_reset = times[n - 1];
        let last_evolution = evolution_times[evolution_times.len() - 1];
        if last_evolution > last_reset {
            return Err(LmmError::invalid_argument(
                "evolution_times",
                format!(
                    "last evolution time ({}) is after the last rate reset time ({})",
                    last_evolution, last_reset
                ),
            ));
        }

        let mut first_alive_rate = Vec::with_capacity(evolution_times.len());
        let mut step_start = 0.0;
        let mut alive = 0;
        for &evolution_time in evolution_times {
            while alive < n && times[alive] <= step_start {
                alive += 1;
            }
            first_alive_rate.push(alive);
            step_start = evolution_time;
        }

        Ok(Self {
            rate_times,
            evolution_times: Arc::from(evolution_times),
            first_alive_rate: Arc::from(first_alive_rate),
        })
    }

    /// Evolution on every reset time `t0 .. t(N-1)` that is strictly positive
    pub fn at_reset_times(rate_times: &[f64]) -> LmmResult<Self> {
        let rt = RateTimes::new(rate_times)?;
        let n = rt.number_of_rates();
        let evolution: Vec<f64> = rt.times()[..n].iter().copied().filter(|&t| t > 0.0).collect();
        Self::from_rate_times(rt, &evolution)
    }

    pub fn rate_times(&self) -> &RateTimes {
        &self.rate_times
    }

    pub fn rate_taus(&self) -> &[f64] {
        self.rate_times.taus()
    }

    pub fn evolution_times(&self) -> &[f64] {
        &self.evolution_times
    }

    /// First rate alive during each step
    pub fn first_alive_rate(&self) -> &[usize] {
        &self.first_alive_rate
    }

    pub fn number_of_rates(&self) -> usize {
        self.rate_times.number_of_rates()
    }

    pub fn number_of_steps(&self) -> usize {
        self.evolution_times.len()
    }

    /// Start time of `step`
    pub fn step_start(&self, step: usize) -> f64 {
        if step == 0 {
            0.0
        } else {
            self.evolution_times[step - 1]
        }
    }
}

/// Terminal bond `P(t_N)` as numeraire at every step
pub fn terminal_measure(evolution: &EvolutionDescription) -> Vec<usize> {
    vec![evolution.number_of_rates(); evolution.number_of_steps()]
}

/// Discretely compounded money market account: at each step the numeraire is
/// the first bond maturing at or after the end of the step
pub fn money_market_measure(evolution: &EvolutionDescription) -> Vec<usize> {
    money_market_plus_measure(evolution, 0)
}

/// Money market measure shifted `offset` bonds further out, capped at `N`
pub fn money_market_plus_measure(evolution: &EvolutionDescription, offset: usize) -> Vec<usize> {
    let times = evolution.rate_times().times();
    let n = evolution.number_of_rates();
    let mut j = 0;
    evolution
        .evolution_times()
        .iter()
        .map(|&t| {
            while j < n && times[j] < t {
                j += 1;
            }
            (j + offset).min(n)
        })
        .collect()
}

pub fn is_in_terminal_measure(evolution: &EvolutionDescription, numeraires: &[usize]) -> bool {
    numeraires.iter().all(|&k| k == evolution.number_of_rates())
}

pub fn is_in_money_market_measure(
    evolution: &EvolutionDescription,
    numeraires: &[usize],
) -> bool {
    numeraires == money_market_measure(evolution).as_slice()
}

pub fn is_in_money_market_plus_measure(
    evolution: &EvolutionDescription,
    numeraires: &[usize],
    offset: usize,
) -> bool {
    numeraires == money_market_plus_measure(evolution, offset).as_slice()
}

/// Check that a numeraire assignment is usable with `evolution`
///
/// Every step needs a numeraire, and the numeraire bond of a step must not
/// mature before the end of that step.
pub fn check_compatibility(evolution: &EvolutionDescription, numeraires: &[usize]) -> LmmResult<()> {
    validate_len("numeraires", numeraires.len(), evolution.number_of_steps())?;
    let n = evolution.number_of_rates();
    let times = evolution.rate_times().times();
    for (step, (&numeraire, &t)) in numeraires
        .iter()
        .zip(evolution.evolution_times())
        .enumerate()
    {
        if numeraire > n {
            return Err(LmmError::invalid_argument(
                "numeraires",
                format!("step {}: numeraire {} exceeds number of rates {}", step, numeraire, n),
            ));
        }
        if times[numeraire] < t {
            return Err(LmmError::invalid_argument(
                "numeraires",
                format!(
                    "step {}: numeraire bond maturing at {} expires before step end {}",
                    step, times[numeraire], t
                ),
            ));
        }
    }
    Ok(())
}
