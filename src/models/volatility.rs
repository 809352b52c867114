// src/models/volatility.rs
//! Instantaneous volatility models of the displaced log-rates
//!
//! Rate `i` stops diffusing at its reset time `T_i`, so every integrated
//! covariance is truncated:
//!
//! ```text
//! C_ij(t1, t2) = ∫_{t1}^{min(t2, T_i, T_j)} σ_i(t) σ_j(t) dt
//! ```

use crate::error::{validation::*, LmmError, LmmResult};
use std::fmt::Debug;

pub trait VolatilityModel: Send + Sync + Debug {
    fn number_of_rates(&self) -> usize;

    /// Volatility of rate `rate` at time `t`; zero once the rate has reset
    fn instantaneous_volatility(&self, rate: usize, t: f64) -> f64;

    /// Integrated `σ_i σ_j` over `[t1, t2]`, truncated at each rate's reset
    fn covariance(&self, i: usize, j: usize, t1: f64, t2: f64) -> f64;
}

#[derive(Debug, Clone)]
pub struct FlatVolatility {
    volatilities: Vec<f64>,
    reset_times: Vec<f64>,
}

impl FlatVolatility {
    pub fn new(volatilities: &[f64], reset_times: &[f64]) -> LmmResult<Self> {
        validate_len("volatilities", volatilities.len(), reset_times.len())?;
        validate_strictly_increasing("reset_times", reset_times)?;
        for &v in volatilities {
            validate_non_negative("volatilities", v)?;
            validate_finite("volatilities", v)?;
        }
        Ok(Self {
            volatilities: volatilities.to_vec(),
            reset_times: reset_times.to_vec(),
        })
    }
}

impl VolatilityModel for FlatVolatility {
    fn number_of_rates(&self) -> usize {
        self.volatilities.len()
    }

    fn instantaneous_volatility(&self, rate: usize, t: f64) -> f64 {
        if t < self.reset_times[rate] {
            self.volatilities[rate]
        } else {
            0.0
        }
    }

    fn covariance(&self, i: usize, j: usize, t1: f64, t2: f64) -> f64 {
        let end = t2.min(self.reset_times[i]).min(self.reset_times[j]);
        self.volatilities[i] * self.volatilities[j] * (end - t1).max(0.0)
    }
}

/// Parameters of the `(a + bτ) e^{-cτ} + d` time-to-reset volatility shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbcdParams {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl AbcdParams {
    pub fn validate(&self) -> LmmResult<()> {
        validate_finite("a", self.a)?;
        validate_finite("b", self.b)?;
        validate_non_negative("c", self.c)?;
        validate_non_negative("d", self.d)?;
        validate_finite("c", self.c)?;
        validate_finite("d", self.d)?;
        if self.a + self.d < 0.0 {
            return Err(LmmError::invalid_argument(
                "a",
                format!("a + d ({} + {}) must be non-negative", self.a, self.d),
            ));
        }
        Ok(())
    }

    /// Volatility at time-to-reset `tau`
    #[inline]
    pub fn value(&self, tau: f64) -> f64 {
        (self.a + self.b * tau) * (-self.c * tau).exp() + self.d
    }
}

/// Abcd volatility scaled per rate: `σ_i(t) = k_i f(T_i - t)`
#[derive(Debug, Clone)]
pub struct AbcdVolatility {
    params: AbcdParams,
    ks: Vec<f64>,
    reset_times: Vec<f64>,
    intervals: usize,
}

impl AbcdVolatility {
    pub fn new(params: AbcdParams, ks: &[f64], reset_times: &[f64]) -> LmmResult<Self> {
        params.validate()?;
        validate_len("ks", ks.len(), reset_times.len())?;
        validate_strictly_increasing("reset_times", reset_times)?;
        for &k in ks {
            validate_non_negative("ks", k)?;
            validate_finite("ks", k)?;
        }
        Ok(Self {
            params,
            ks: ks.to_vec(),
            reset_times: reset_times.to_vec(),
            intervals: 64,
        })
    }

    /// Number of Simpson sub-intervals per integration (rounded up to even)
    pub fn with_integration_intervals(mut self, intervals: usize) -> Self {
        self.intervals = (intervals.max(2) + 1) & !1;
        self
    }

    pub fn params(&self) -> AbcdParams {
        self.params
    }
}

impl VolatilityModel for AbcdVolatility {
    fn number_of_rates(&self) -> usize {
        self.ks.len()
    }

    fn instantaneous_volatility(&self, rate: usize, t: f64) -> f64 {
        let reset = self.reset_times[rate];
        if t < reset {
            self.ks[rate] * self.params.value(reset - t)
        } else {
            0.0
        }
    }

    fn covariance(&self, i: usize, j: usize, t1: f64, t2: f64) -> f64 {
        let (ti, tj) = (self.reset_times[i], self.reset_times[j]);
        let end = t2.min(ti).min(tj);
        if end <= t1 {
            return 0.0;
        }
        let integrand = |t: f64| self.params.value(ti - t) * self.params.value(tj - t);
        self.ks[i] * self.ks[j] * simpson(integrand, t1, end, self.intervals)
    }
}

fn simpson<F: Fn(f64) -> f64>(f: F, a: f64, b: f64, intervals: usize) -> f64 {
    let h = (b - a) / intervals as f64;
    let mut sum = f(a) + f(b);
    for k in 1..intervals {
        let weight = if k % 2 == 1 { 4.0 } else { 2.0 };
        sum += weight * f(a + k as f64 * h);
    }
    sum * h / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_flat_covariance_truncates_at_reset() {
        let vol = FlatVolatility::new(&[0.2, 0.3], &[0.5, 1.0]).unwrap();
        assert_abs_diff_eq!(vol.covariance(0, 1, 0.0, 1.0), 0.2 * 0.3 * 0.5, epsilon = 1e-15);
        assert_abs_diff_eq!(vol.covariance(1, 1, 0.5, 1.0), 0.09 * 0.5, epsilon = 1e-15);
        assert_eq!(vol.covariance(0, 0, 0.5, 1.0), 0.0);
        assert_eq!(vol.instantaneous_volatility(0, 0.6), 0.0);
    }

    #[test]
    fn test_abcd_reduces_to_flat() {
        let flat_shape = AbcdParams { a: 0.0, b: 0.0, c: 1.0, d: 1.0 };
        let abcd = AbcdVolatility::new(flat_shape, &[0.2, 0.25], &[1.0, 2.0]).unwrap();
        let flat = FlatVolatility::new(&[0.2, 0.25], &[1.0, 2.0]).unwrap();
        for (t1, t2) in [(0.0, 1.0), (0.0, 2.0), (1.0, 2.0), (0.3, 0.7)] {
            assert_abs_diff_eq!(
                abcd.covariance(0, 1, t1, t2),
                flat.covariance(0, 1, t1, t2),
                epsilon = 1e-14
            );
        }
    }

    #[test]
    fn test_abcd_variance_against_closed_form() {
        // a = d = 0, b = 1, c = 0: σ(τ) = τ, ∫_0^T (T - t)² dt = T³/3
        let params = AbcdParams { a: 0.0, b: 1.0, c: 0.0, d: 0.0 };
        let vol = AbcdVolatility::new(params, &[1.0], &[2.0]).unwrap();
        assert_abs_diff_eq!(vol.covariance(0, 0, 0.0, 5.0), 8.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_abcd_validation() {
        let params = AbcdParams { a: -0.5, b: 0.1, c: 0.5, d: 0.1 };
        assert!(AbcdVolatility::new(params, &[1.0], &[1.0]).is_err());
        let params = AbcdParams { a: -0.0597, b: 0.1677, c: 0.5403, d: 0.1710 };
        assert!(AbcdVolatility::new(params, &[1.0, 1.0], &[1.0]).is_err());
        assert!(AbcdVolatility::new(params, &[1.0], &[1.0]).is_ok());
    }
}
