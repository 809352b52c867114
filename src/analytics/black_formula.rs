// src/analytics/black_formula.rs
//! Black-76 formula for displaced-diffusion forwards
//!
//! # Formula
//!
//! With `F' = F + d`, `K' = K + d` and total standard deviation `s`:
//!
//! ```text
//! call = D [F' Φ(d₁) - K' Φ(d₂)]
//! put  = D [K' Φ(-d₂) - F' Φ(-d₁)]
//!
//! d₁ = ln(F'/K') / s + s/2
//! d₂ = d₁ - s
//! ```
//!
//! A caplet on a log-normal forward rate with flat volatility `σ` resetting at
//! `T` is `τ · call` with `s = σ√T`, which is what simulated optionlets are
//! checked against.

use crate::error::{validation::*, LmmError, LmmResult};
use crate::math_utils::norm_cdf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// +1 for calls, -1 for puts
    pub fn sign(self) -> f64 {
        match self {
            OptionType::Call => 1.0,
            OptionType::Put => -1.0,
        }
    }

    /// Intrinsic value `max(ω(x - K), 0)`
    pub fn payoff(self, underlying: f64, strike: f64) -> f64 {
        (self.sign() * (underlying - strike)).max(0.0)
    }
}

/// Undiscounted-by-accrual Black price of an option on a displaced forward
///
/// # Errors
///
/// `InvalidArgument` for a negative standard deviation, a non-positive
/// discount or displaced forward, or a negative displaced strike.
pub fn black_formula(
    option_type: OptionType,
    strike: f64,
    forward: f64,
    std_dev: f64,
    discount: f64,
    displacement: f64,
) -> LmmResult<f64> {
    validate_non_negative("std_dev", std_dev)?;
    validate_positive("discount", discount)?;
    validate_finite("strike", strike)?;
    let displaced_forward = forward + displacement;
    let displaced_strike = strike + displacement;
    validate_positive("forward + displacement", displaced_forward)?;
    if displaced_strike < 0.0 {
        return Err(LmmError::invalid_argument(
            "strike + displacement",
            format!("{} must be non-negative", displaced_strike),
        ));
    }

    if std_dev == 0.0 || displaced_strike == 0.0 {
        return Ok(discount * option_type.payoff(displaced_forward, displaced_strike));
    }

    let w = option_type.sign();
    let d1 = (displaced_forward / displaced_strike).ln() / std_dev + 0.5 * std_dev;
    let d2 = d1 - std_dev;
    Ok(discount * w * (displaced_forward * norm_cdf(w * d1) - displaced_strike * norm_cdf(w * d2)))
}

/// Black caplet (or floorlet) on a forward rate resetting at `expiry` and
/// accruing over `accrual`
#[allow(clippy::too_many_arguments)]
pub fn black_caplet_price(
    option_type: OptionType,
    forward: f64,
    strike: f64,
    volatility: f64,
    expiry: f64,
    accrual: f64,
    discount: f64,
    displacement: f64,
) -> LmmResult<f64> {
    validate_non_negative("volatility", volatility)?;
    validate_non_negative("expiry", expiry)?;
    validate_positive("accrual", accrual)?;
    let std_dev = volatility * expiry.sqrt();
    Ok(accrual * black_formula(option_type, strike, forward, std_dev, discount, displacement)?)
}
