//! # fast-lmm: Monte Carlo Market-Model Evolution for Interest-Rate Curves
//!
//! A Rust library that evolves a discretized yield curve (forward rates,
//! discount ratios and coterminal swap rates) through time under
//! no-arbitrage drifts, with factor-reduced log-normal dynamics, and values
//! path-dependent cash flows by numeraire rebasing.
//!
//! ## Key Features
//!
//! - **Curve State**: three dual representations of one curve, kept
//!   consistent with lazily derived coterminal swap rates
//! - **Factor Models**: exponential/time-homogeneous correlation, flat and
//!   abcd volatility, rank-reduced pseudo square roots
//! - **Drift Calculators**: exact and factor-reduced LMM drifts, and
//!   coterminal swap-rate drifts, under any discrete-bond numeraire
//! - **Evolvers**: log-Euler, predictor-corrector, iterated
//!   predictor-corrector, rate-constrained Euler with likelihood ratios, and
//!   a coterminal swap-rate predictor-corrector
//! - **Accounting Engine**: parallel path reduction with reproducible
//!   per-path substreams, antithetic pairs, and an explicit path-failure policy
//!
//! ## Quick Start
//!
//! ```rust
//! use fast_lmm::evolvers::LogNormalFwdRatePc;
//! use fast_lmm::market::evolution::terminal_measure;
//! use fast_lmm::mc::{AccountingConfig, AccountingEngine, Product};
//! use fast_lmm::models::FactorMarketModel;
//! use fast_lmm::analytics::OptionType;
//! use fast_lmm::rng::BrownianGeneratorFactory;
//!
//! let rate_times = [0.5, 1.0, 1.5, 2.0, 2.5];
//! let forwards = [0.04, 0.042, 0.044, 0.046];
//!
//! // Caplets struck at the money
//! let product = Product::optionlets(&rate_times, OptionType::Call, &forwards).unwrap();
//! let model = FactorMarketModel::exp_corr_flat_vol(
//!     0.5,              // long-term correlation
//!     0.2,              // correlation decay
//!     &[0.2; 4],        // volatilities
//!     product.evolution(),
//!     2,                // factors
//!     &forwards,
//!     &[0.0; 4],        // displacements
//! ).unwrap();
//!
//! let numeraires = terminal_measure(product.evolution());
//! let evolver =
//!     LogNormalFwdRatePc::new(&model, &BrownianGeneratorFactory::new(42), &numeraires).unwrap();
//!
//! // Present values scale with the initial numeraire, here the terminal
//! // bond P(0, t_4) on a curve discounted at 4% up to t_0
//! let p_0 = (-0.04_f64 * rate_times[0]).exp();
//! let p_n = forwards.iter().fold(p_0, |p, f| p / (1.0 + 0.5 * f));
//!
//! let config = AccountingConfig { paths: 2_000, ..Default::default() };
//! let engine = AccountingEngine::new(evolver, product, p_n, config).unwrap();
//! let result = engine.run().unwrap();
//! println!("caplet 0: {:.6} ± {:.6}", result.means[0], result.errors[0]);
//! ```
//!
//! ## Mathematical Foundation
//!
//! Rate `i` accrues over `[t_i, t_{i+1}]` and is evolved in log space,
//! `x_i = ln(f_i + d_i)`, with step covariance `C = A·Aᵗ` from the factor
//! loadings `A`. Under the measure of the bond maturing at `t_n` the drift of
//! `x_i` is
//!
//! ```text
//! μ_i =  Σ_{k=n}^{i}     g_k C_ik      i ≥ n
//! μ_i = -Σ_{k=i+1}^{n-1} g_k C_ik      i < n,     g_k = τ_k (f_k + d_k) / (1 + τ_k f_k)
//! ```

pub mod analytics;
pub mod drift;
pub mod error;
pub mod evolvers;
pub mod market;
pub mod math_utils;
pub mod mc;
pub mod models;
pub mod output;
pub mod rng;

pub use error::{ErrorKind, LmmError, LmmResult};
