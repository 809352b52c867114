// src/mc/products.rs
//! Multi-Step Products
//!
//! # Cash-Flow Interface
//!
//! A product is observed once per evolution step, after the curve has been
//! evolved to the end of that step. It reports, per sub-product, the cash
//! flows fixed during the step as `(time_index, amount)` pairs, where
//! `time_index` points into [`Product::possible_cash_flow_times`]:
//!
//! ```text
//! reset()                                       start of a path
//! next_time_step(state, counts, flows) -> done  once per step
//! ```
//!
//! # Contracts
//!
//! All products evolve on the reset times `t0 .. t(N-1)`; at step `i` rate
//! `i` fixes. With `τ_i` the accrual of period `i`:
//!
//! - **Forwards**: one FRA per rate, `τ_i (f_i - K_i)` paid at `t_{i+1}`
//! - **Optionlets**: one caplet/floorlet per rate, `τ_i max(ω(f_i - K_i), 0)`
//!   paid at `t_{i+1}`
//! - **Swap**: a single payer (receiver) swap, `±τ_i (f_i - K)` paid at `t_{i+1}`
//! - **CoterminalSwaptions**: one European swaption per rate on the
//!   coterminal swap rate `SR_i`, exercised at `t_i` for
//!   `A_i/P_i · max(ω(SR_i - K_i), 0)` paid at `t_i`
//! - **Nothing**: no cash flows, used to drive an evolver through a path

use crate::analytics::OptionType;
use crate::error::{validation::*, LmmError, LmmResult};
use crate::market::curve_state::CurveState;
use crate::market::evolution::{terminal_measure, EvolutionDescription};

/// A single amount fixed during a step
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CashFlow {
    pub time_index: usize,
    pub amount: f64,
}

/// Closed set of payoff shapes the accounting engine prices
#[derive(Debug, Clone, PartialEq)]
pub enum ProductKind {
    Forwards {
        strikes: Vec<f64>,
    },
    Optionlets {
        option_type: OptionType,
        strikes: Vec<f64>,
    },
    Swap {
        fixed_rate: f64,
        payer: bool,
    },
    CoterminalSwaptions {
        option_type: OptionType,
        strikes: Vec<f64>,
    },
    Nothing {
        products: usize,
    },
}

/// A product together with its evolution and per-path cursor
#[derive(Debug, Clone)]
pub struct Product {
    kind: ProductKind,
    evolution: EvolutionDescription,
    payment_times: Vec<f64>,
    current_index: usize,
}

impl Product {
    pub fn forwards(rate_times: &[f64], strikes: &[f64]) -> LmmResult<Self> {
        Self::validate_strikes(rate_times, strikes)?;
        Self::on_reset_times(
            rate_times,
            ProductKind::Forwards {
                strikes: strikes.to_vec(),
            },
        )
    }

    pub fn optionlets(rate_times: &[f64], option_type: OptionType, strikes: &[f64]) -> LmmResult<Self> {
        Self::validate_strikes(rate_times, strikes)?;
        Self::on_reset_times(
            rate_times,
            ProductKind::Optionlets {
                option_type,
                strikes: strikes.to_vec(),
            },
        )
    }

    pub fn swap(rate_times: &[f64], fixed_rate: f64, payer: bool) -> LmmResult<Self> {
        validate_finite("fixed_rate", fixed_rate)?;
        Self::on_reset_times(rate_times, ProductKind::Swap { fixed_rate, payer })
    }

    pub fn coterminal_swaptions(
        rate_times: &[f64],
        option_type: OptionType,
        strikes: &[f64],
    ) -> LmmResult<Self> {
        Self::validate_strikes(rate_times, strikes)?;
        Self::on_reset_times(
            rate_times,
            ProductKind::CoterminalSwaptions {
                option_type,
                strikes: strikes.to_vec(),
            },
        )
    }

    /// A product without cash flows on an arbitrary evolution
    pub fn nothing(evolution: EvolutionDescription, products: usize) -> LmmResult<Self> {
        if products == 0 {
            return Err(LmmError::invalid_argument("products", "must be at least 1"));
        }
        Ok(Self {
            kind: ProductKind::Nothing { products },
            evolution,
            payment_times: Vec::new(),
            current_index: 0,
        })
    }

    fn validate_strikes(rate_times: &[f64], strikes: &[f64]) -> LmmResult<()> {
        validate_len("strikes", strikes.len(), rate_times.len().saturating_sub(1))?;
        for &k in strikes {
            validate_finite("strikes", k)?;
        }
        Ok(())
    }

    fn on_reset_times(rate_times: &[f64], kind: ProductKind) -> LmmResult<Self> {
        let evolution = EvolutionDescription::at_reset_times(rate_times)?;
        let n = evolution.number_of_rates();
        if evolution.number_of_steps() != n {
            return Err(LmmError::invalid_argument(
                "rate_times",
                format!("first reset time must be positive, got {}", rate_times[0]),
            ));
        }
        let times = evolution.rate_times().times();
        let payment_times = match kind {
            ProductKind::CoterminalSwaptions { .. } => times[..n].to_vec(),
            _ => times[1..].to_vec(),
        };
        Ok(Self {
            kind,
            evolution,
            payment_times,
            current_index: 0,
        })
    }

    pub fn kind(&self) -> &ProductKind {
        &self.kind
    }

    pub fn evolution(&self) -> &EvolutionDescription {
        &self.evolution
    }

    /// Numeraires the product is naturally priced under
    pub fn suggested_numeraires(&self) -> Vec<usize> {
        terminal_measure(&self.evolution)
    }

    pub fn possible_cash_flow_times(&self) -> &[f64] {
        &self.payment_times
    }

    /// Times at which the product must be observed
    pub fn relevant_times(&self) -> &[f64] {
        self.evolution.evolution_times()
    }

    pub fn number_of_products(&self) -> usize {
        match &self.kind {
            ProductKind::Forwards { strikes }
            | ProductKind::Optionlets { strikes, .. }
            | ProductKind::CoterminalSwaptions { strikes, .. } => strikes.len(),
            ProductKind::Swap { .. } => 1,
            ProductKind::Nothing { products } => *products,
        }
    }

    pub fn max_number_of_cash_flows_per_product_per_step(&self) -> usize {
        match self.kind {
            ProductKind::Nothing { .. } => 0,
            _ => 1,
        }
    }

    pub fn reset(&mut self) {
        self.current_index = 0;
    }

    pub fn done(&self) -> bool {
        self.current_index >= self.evolution.number_of_steps()
    }

    /// Collect the cash flows fixed on the curve at the end of the current step
    ///
    /// `counts[p]` receives the number of flows product `p` generated and
    /// `flows[p][..counts[p]]` the flows themselves. Returns `true` once the
    /// last step has been observed.
    pub fn next_time_step(
        &mut self,
        state: &CurveState,
        counts: &mut [usize],
        flows: &mut [Vec<CashFlow>],
    ) -> LmmResult<bool> {
        if self.done() {
            return Err(LmmError::precondition(
                "Product::next_time_step",
                "product already observed on every step",
            ));
        }
        let i = self.current_index;
        counts.iter_mut().for_each(|c| *c = 0);

        match &self.kind {
            ProductKind::Forwards { strikes } => {
                let tau = self.evolution.rate_taus()[i];
                let amount = tau * (state.forward_rate(i)? - strikes[i]);
                flows[i][0] = CashFlow { time_index: i, amount };
                counts[i] = 1;
            }
            ProductKind::Optionlets { option_type, strikes } => {
                let tau = self.evolution.rate_taus()[i];
                let amount = tau * option_type.payoff(state.forward_rate(i)?, strikes[i]);
                if amount != 0.0 {
                    flows[i][0] = CashFlow { time_index: i, amount };
                    counts[i] = 1;
                }
            }
            ProductKind::Swap { fixed_rate, payer } => {
                let tau = self.evolution.rate_taus()[i];
                let sign = if *payer { 1.0 } else { -1.0 };
                let amount = sign * tau * (state.forward_rate(i)? - fixed_rate);
                flows[0][0] = CashFlow { time_index: i, amount };
                counts[0] = 1;
            }
            ProductKind::CoterminalSwaptions { option_type, strikes } => {
                let intrinsic = option_type.payoff(state.coterminal_swap_rate(i)?, strikes[i]);
                if intrinsic > 0.0 {
                    let annuity = state.coterminal_swap_annuity_in(i, i)?;
                    flows[i][0] = CashFlow {
                        time_index: i,
                        amount: annuity * intrinsic,
                    };
                    counts[i] = 1;
                }
            }
            ProductKind::Nothing { .. } => {}
        }

        self.current_index += 1;
        Ok(self.done())
    }
}
