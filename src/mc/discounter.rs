// src/mc/discounter.rs
//! Conversion of a cash flow paid at an arbitrary time into numeraire bonds
//!
//! For a payment at `T` with `t_b ≤ T ≤ t_{b+1}` the bond price is
//! interpolated geometrically between the neighbouring rate times:
//!
//! ```text
//! P(T)/P(t_n) = (P_b/P_n)^w · (P_{b+1}/P_n)^(1-w),    w = 1 - (T - t_b)/τ_b
//! ```

use crate::error::{validation::*, LmmError, LmmResult};
use crate::market::curve_state::CurveState;
use crate::market::evolution::RateTimes;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketModelDiscounter {
    before: usize,
    before_weight: f64,
}

impl MarketModelDiscounter {
    pub fn new(payment_time: f64, rate_times: &RateTimes) -> LmmResult<Self> {
        validate_finite("payment_time", payment_time)?;
        let times = rate_times.times();
        let n = rate_times.number_of_rates();
        if payment_time < times[0] || payment_time > times[n] {
            return Err(LmmError::invalid_argument(
                "payment_time",
                format!(
                    "{} outside the rate-time range [{}, {}]",
                    payment_time, times[0], times[n]
                ),
            ));
        }
        let before = times
            .partition_point(|&t| t <= payment_time)
            .saturating_sub(1)
            .min(n - 1);
        let before_weight = 1.0 - (payment_time - times[before]) / rate_times.taus()[before];
        Ok(Self {
            before,
            before_weight,
        })
    }

    /// Number of numeraire bonds worth one unit paid at the payment time
    pub fn numeraire_bonds(&self, state: &CurveState, numeraire: usize) -> LmmResult<f64> {
        if self.before_weight == 0.0 {
            return state.discount_ratio(self.before + 1, numeraire);
        }
        let pre = state.discount_ratio(self.before, numeraire)?;
        if self.before_weight == 1.0 {
            return Ok(pre);
        }
        let post = state.discount_ratio(self.before + 1, numeraire)?;
        Ok(pre.powf(self.before_weight) * post.powf(1.0 - self.before_weight))
    }
}
