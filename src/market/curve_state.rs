// src/market/curve_state.rs
//! Curve State: One Snapshot of a Discretized Yield Curve
//!
//! # Dual Representations
//!
//! The same curve is held in three equivalent bases over the rate times
//! `t0 < ... < tN` with accruals `τ_i = t_{i+1} - t_i`:
//!
//! ```text
//! forwards        f_i,  i = first..N-1
//! discount ratios P_i / P_first,  i = first..N
//! coterminal      SR_i = (P_i - P_N) / A_i,   A_i = Σ_{k=i}^{N-1} τ_k P_{k+1}
//! ```
//!
//! Conversions:
//! ```text
//! forward  → discount:  P_{i+1} = P_i / (1 + τ_i f_i)
//! discount → forward:   f_i = (P_i / P_{i+1} - 1) / τ_i
//! swap     → discount:  A_i = A_{i+1} + τ_i P_{i+1},  P_i = P_N + SR_i A_i   (backward from N)
//! ```
//!
//! Forwards and discount ratios are always kept in sync eagerly. The
//! coterminal swap rates and annuities are derived on first access after a
//! mutation and memoized until the next one.

use crate::error::{validation::*, LmmError, LmmResult};
use crate::market::evolution::RateTimes;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq)]
struct CoterminalSwaps {
    rates: Vec<f64>,
    annuities: Vec<f64>,
}

/// Forward rates, discount ratios and coterminal swaps for one evolution time
#[derive(Debug, Clone)]
pub struct CurveState {
    rate_times: RateTimes,
    first: usize,
    initialized: bool,
    forward_rates: Vec<f64>,
    discount_ratios: Vec<f64>,
    coterminal: OnceLock<CoterminalSwaps>,
}

impl CurveState {
    pub fn new(rate_times: RateTimes) -> Self {
        let n = rate_times.number_of_rates();
        Self {
            rate_times,
            first: n,
            initialized: false,
            forward_rates: vec![0.0; n],
            discount_ratios: vec![1.0; n + 1],
            coterminal: OnceLock::new(),
        }
    }

    pub fn rate_times(&self) -> &RateTimes {
        &self.rate_times
    }

    pub fn number_of_rates(&self) -> usize {
        self.rate_times.number_of_rates()
    }

    /// First rate that has not expired
    pub fn first_valid_index(&self) -> usize {
        self.first
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn set_on_forward_rates(&mut self, forwards: &[f64], first_valid: usize) -> LmmResult<()> {
        let n = self.number_of_rates();
        validate_len("forwards", forwards.len(), n)?;
        validate_index("first_valid_index", first_valid, n)?;

        let taus = self.rate_times.taus();
        for i in first_valid..n {
            validate_finite("forwards", forwards[i])?;
            let growth = 1.0 + forwards[i] * taus[i];
            if growth <= 0.0 {
                return Err(LmmError::invalid_argument(
                    "forwards",
                    format!("1 + τf must be positive at rate {} (f = {})", i, forwards[i]),
                ));
            }
        }

        self.forward_rates[first_valid..].copy_from_slice(&forwards[first_valid..]);
        self.discount_ratios[first_valid] = 1.0;
        for i in first_valid..n {
            self.discount_ratios[i + 1] =
                self.discount_ratios[i] / (1.0 + self.forward_rates[i] * taus[i]);
        }
        self.mark_mutated(first_valid);
        Ok(())
    }

    /// Set the curve from discount ratios `P_i / P_j` for any common `j`;
    /// the stored ratios are rebased so that the first valid one is 1
    pub fn set_on_discount_ratios(&mut self, ratios: &[f64], first_valid: usize) -> LmmResult<()> {
        let n = self.number_of_rates();
        validate_len("discount_ratios", ratios.len(), n + 1)?;
        validate_index("first_valid_index", first_valid, n)?;
        for &ratio in &ratios[first_valid..] {
            validate_positive("discount_ratios", ratio)?;
            validate_finite("discount_ratios", ratio)?;
        }

        let base = ratios[first_valid];
        for i in first_valid..=n {
            self.discount_ratios[i] = ratios[i] / base;
        }
        self.forwards_from_discount_ratios(first_valid);
        self.mark_mutated(first_valid);
        Ok(())
    }

    pub fn set_on_coterminal_swap_rates(
        &mut self,
        swap_rates: &[f64],
        first_valid: usize,
    ) -> LmmResult<()> {
        let n = self.number_of_rates();
        validate_len("swap_rates", swap_rates.len(), n)?;
        validate_index("first_valid_index", first_valid, n)?;
        for &rate in &swap_rates[first_valid..] {
            validate_finite("swap_rates", rate)?;
        }

        // bonds in units of P_N, built backward
        let taus = self.rate_times.taus();
        let mut bonds = vec![1.0; n + 1];
        let mut annuities = vec![0.0; n];
        let mut annuity = 0.0;
        for i in (first_valid..n).rev() {
            annuity += taus[i] * bonds[i + 1];
            annuities[i] = annuity;
            let bond = 1.0 + swap_rates[i] * annuity;
            if !(bond > 0.0 && bond.is_finite()) {
                return Err(LmmError::invalid_argument(
                    "swap_rates",
                    format!("swap rate {} at index {} implies a non-positive bond", swap_rates[i], i),
                ));
            }
            bonds[i] = bond;
        }

        let base = bonds[first_valid];
        for i in first_valid..=n {
            self.discount_ratios[i] = bonds[i] / base;
        }
        for annuity in annuities[first_valid..].iter_mut() {
            *annuity /= base;
        }
        self.forwards_from_discount_ratios(first_valid);
        self.mark_mutated(first_valid);

        let mut rates = vec![0.0; n];
        rates[first_valid..].copy_from_slice(&swap_rates[first_valid..]);
        let _ = self.coterminal.set(CoterminalSwaps { rates, annuities });
        Ok(())
    }

    fn forwards_from_discount_ratios(&mut self, first_valid: usize) {
        let taus = self.rate_times.taus();
        for i in first_valid..self.number_of_rates() {
            self.forward_rates[i] =
                (self.discount_ratios[i] / self.discount_ratios[i + 1] - 1.0) / taus[i];
        }
    }

    fn mark_mutated(&mut self, first_valid: usize) {
        self.first = first_valid;
        self.initialized = true;
        self.coterminal.take();
    }

    fn coterminal_swaps(&self) -> &CoterminalSwaps {
        self.coterminal.get_or_init(|| {
            let n = self.number_of_rates();
            let taus = self.rate_times.taus();
            let dr = &self.discount_ratios;
            let mut rates = vec![0.0; n];
            let mut annuities = vec![0.0; n];
            let mut annuity = 0.0;
            for i in (self.first..n).rev() {
                annuity += taus[i] * dr[i + 1];
                annuities[i] = annuity;
                rates[i] = (dr[i] - dr[n]) / annuity;
            }
            CoterminalSwaps { rates, annuities }
        })
    }

    fn check_rate_index(&self, context: &str, i: usize) -> LmmResult<()> {
        if !self.initialized {
            return Err(LmmError::precondition(context, "curve state not initialized"));
        }
        if i < self.first || i >= self.number_of_rates() {
            return Err(LmmError::precondition(
                context,
                format!(
                    "index {} outside valid range [{}, {})",
                    i,
                    self.first,
                    self.number_of_rates()
                ),
            ));
        }
        Ok(())
    }

    fn check_bond_index(&self, context: &str, i: usize) -> LmmResult<()> {
        if !self.initialized {
            return Err(LmmError::precondition(context, "curve state not initialized"));
        }
        if i < self.first || i > self.number_of_rates() {
            return Err(LmmError::precondition(
                context,
                format!(
                    "bond index {} outside valid range [{}, {}]",
                    i,
                    self.first,
                    self.number_of_rates()
                ),
            ));
        }
        Ok(())
    }

    fn check_initialized(&self, context: &str) -> LmmResult<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(LmmError::precondition(context, "curve state not initialized"))
        }
    }

    pub fn forward_rate(&self, i: usize) -> LmmResult<f64> {
        self.check_rate_index("CurveState::forward_rate", i)?;
        Ok(self.forward_rates[i])
    }

    /// `P(t_i) / P(t_j)`
    pub fn discount_ratio(&self, i: usize, j: usize) -> LmmResult<f64> {
        self.check_bond_index("CurveState::discount_ratio", i)?;
        self.check_bond_index("CurveState::discount_ratio", j)?;
        Ok(self.discount_ratios[i] / self.discount_ratios[j])
    }

    pub fn coterminal_swap_rate(&self, i: usize) -> LmmResult<f64> {
        self.check_rate_index("CurveState::coterminal_swap_rate", i)?;
        Ok(self.coterminal_swaps().rates[i])
    }

    /// Annuity of the coterminal swap starting at `t_i`, in units of the
    /// first valid bond
    pub fn coterminal_swap_annuity(&self, i: usize) -> LmmResult<f64> {
        self.check_rate_index("CurveState::coterminal_swap_annuity", i)?;
        Ok(self.coterminal_swaps().annuities[i])
    }

    /// Annuity of the coterminal swap starting at `t_i`, in units of the bond
    /// maturing at `t_numeraire`
    pub fn coterminal_swap_annuity_in(&self, i: usize, numeraire: usize) -> LmmResult<f64> {
        self.check_rate_index("CurveState::coterminal_swap_annuity_in", i)?;
        self.check_bond_index("CurveState::coterminal_swap_annuity_in", numeraire)?;
        Ok(self.coterminal_swaps().annuities[i] / self.discount_ratios[numeraire])
    }

    /// Annuity of the swap starting at `t_i` spanning `spanning` periods,
    /// truncated at `t_N`
    pub fn cm_swap_annuity(&self, i: usize, spanning: usize) -> LmmResult<f64> {
        self.check_rate_index("CurveState::cm_swap_annuity", i)?;
        if spanning == 0 {
            return Err(LmmError::invalid_argument("spanning", "must be at least 1"));
        }
        let end = i.saturating_add(spanning).min(self.number_of_rates());
        let taus = self.rate_times.taus();
        Ok((i..end).map(|k| taus[k] * self.discount_ratios[k + 1]).sum())
    }

    /// Constant-maturity swap rate starting at `t_i` spanning `spanning`
    /// periods, truncated at `t_N`
    pub fn cm_swap_rate(&self, i: usize, spanning: usize) -> LmmResult<f64> {
        let annuity = self.cm_swap_annuity(i, spanning)?;
        let end = i.saturating_add(spanning).min(self.number_of_rates());
        Ok((self.discount_ratios[i] - self.discount_ratios[end]) / annuity)
    }

    /// All forward rates; entries below the first valid index are stale
    pub fn forward_rates(&self) -> LmmResult<&[f64]> {
        self.check_initialized("CurveState::forward_rates")?;
        Ok(&self.forward_rates)
    }

    /// All `N + 1` discount ratios relative to the first valid bond; entries
    /// below the first valid index are stale
    pub fn discount_ratios(&self) -> LmmResult<&[f64]> {
        self.check_initialized("CurveState::discount_ratios")?;
        Ok(&self.discount_ratios)
    }

    pub fn coterminal_swap_rates(&self) -> LmmResult<&[f64]> {
        self.check_initialized("CurveState::coterminal_swap_rates")?;
        Ok(&self.coterminal_swaps().rates)
    }

    pub fn coterminal_swap_annuities(&self) -> LmmResult<&[f64]> {
        self.check_initialized("CurveState::coterminal_swap_annuities")?;
        Ok(&self.coterminal_swaps().annuities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn state(times: &[f64]) -> CurveState {
        CurveState::new(RateTimes::new(times).unwrap())
    }

    #[test]
    fn test_forward_to_discount_recursion() {
        let mut cs = state(&[0.5, 1.0, 1.5, 2.0]);
        cs.set_on_forward_rates(&[0.04, 0.05, 0.06], 0).unwrap();
        let dr = cs.discount_ratios().unwrap();
        assert_eq!(dr[0], 1.0);
        assert_relative_eq!(dr[1], 1.0 / 1.02, max_relative = 1e-15);
        assert_relative_eq!(dr[2], 1.0 / (1.02 * 1.025), max_relative = 1e-15);
        assert_relative_eq!(cs.discount_ratio(3, 1).unwrap(), 1.0 / (1.025 * 1.03), max_relative = 1e-14);
    }

    #[test]
    fn test_coterminal_swap_rate_matches_annuity_weighted_sum() {
        let times = [0.0, 0.5, 1.25, 2.0, 3.0];
        let forwards = [0.031, 0.047, 0.052, 0.044];
        let mut cs = state(&times);
        cs.set_on_forward_rates(&forwards, 0).unwrap();

        let mut p = vec![1.0];
        for i in 0..4 {
            let tau = times[i + 1] - times[i];
            let next = p[i] / (1.0 + forwards[i] * tau);
            p.push(next);
        }
        let annuity: f64 = (0..4).map(|k| (times[k + 1] - times[k]) * p[k + 1]).sum();
        let expected = (p[0] - p[4]) / annuity;

        assert!((cs.coterminal_swap_rate(0).unwrap() - expected).abs() < 1e-10);
        assert!((cs.coterminal_swap_annuity(0).unwrap() - annuity).abs() < 1e-10);
    }

    #[test]
    fn test_last_coterminal_equals_last_forward() {
        let mut cs = state(&[1.0, 2.0, 3.0]);
        cs.set_on_forward_rates(&[0.03, 0.05], 0).unwrap();
        assert_relative_eq!(cs.coterminal_swap_rate(1).unwrap(), 0.05, max_relative = 1e-12);
        assert_relative_eq!(cs.cm_swap_rate(0, 1).unwrap(), 0.03, max_relative = 1e-12);
        assert_relative_eq!(
            cs.cm_swap_rate(0, 5).unwrap(),
            cs.coterminal_swap_rate(0).unwrap(),
            max_relative = 1e-14
        );
    }

    #[test]
    fn test_cm_swap_span_is_truncated_at_last_rate() {
        let mut cs = state(&[0.5, 1.0, 1.5, 2.0]);
        cs.set_on_forward_rates(&[0.04, 0.05, 0.06], 0).unwrap();
        for spanning in [3, 4, usize::MAX] {
            assert_relative_eq!(
                cs.cm_swap_rate(1, spanning).unwrap(),
                cs.coterminal_swap_rate(1).unwrap(),
                max_relative = 1e-14
            );
            assert_relative_eq!(
                cs.cm_swap_annuity(1, spanning).unwrap(),
                cs.coterminal_swap_annuity(1).unwrap(),
                max_relative = 1e-14
            );
        }
        assert!(cs.cm_swap_rate(1, 0).is_err());
    }

    #[test]
    fn test_expired_and_uninitialized_access() {
        let mut cs = state(&[0.5, 1.0, 1.5, 2.0]);
        assert_eq!(
            cs.forward_rate(0).unwrap_err().kind(),
            ErrorKind::PreconditionViolation
        );

        cs.set_on_forward_rates(&[0.04, 0.05, 0.06], 1).unwrap();
        assert_eq!(cs.first_valid_index(), 1);
        assert_eq!(cs.discount_ratio(1, 1).unwrap(), 1.0);
        assert_eq!(
            cs.forward_rate(0).unwrap_err().kind(),
            ErrorKind::PreconditionViolation
        );
        assert_eq!(
            cs.coterminal_swap_rate(3).unwrap_err().kind(),
            ErrorKind::PreconditionViolation
        );
        assert_eq!(
            cs.discount_ratio(0, 2).unwrap_err().kind(),
            ErrorKind::PreconditionViolation
        );
        assert!(cs.discount_ratio(3, 1).is_ok());
    }

    #[test]
    fn test_setter_argument_checks() {
        let mut cs = state(&[0.5, 1.0, 1.5]);
        let err = cs.set_on_forward_rates(&[0.04], 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = cs.set_on_forward_rates(&[0.04, 0.05], 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(cs.set_on_discount_ratios(&[1.0, 0.99], 0).is_err());
        assert!(cs.set_on_coterminal_swap_rates(&[0.04, 0.05], 2).is_err());
        assert!(!cs.is_initialized());
    }

    #[test]
    fn test_mutation_invalidates_cached_swaps() {
        let mut cs = state(&[0.5, 1.0, 1.5]);
        cs.set_on_forward_rates(&[0.04, 0.04], 0).unwrap();
        let before = cs.coterminal_swap_rate(0).unwrap();
        cs.set_on_forward_rates(&[0.06, 0.06], 0).unwrap();
        let after = cs.coterminal_swap_rate(0).unwrap();
        assert_relative_eq!(before, 0.04, max_relative = 1e-12);
        assert_relative_eq!(after, 0.06, max_relative = 1e-12);
    }

    #[test]
    fn test_annuity_in_other_numeraire() {
        let mut cs = state(&[1.0, 2.0, 3.0, 4.0]);
        cs.set_on_forward_rates(&[0.05, 0.05, 0.05], 0).unwrap();
        let in_first = cs.coterminal_swap_annuity(1).unwrap();
        let in_terminal = cs.coterminal_swap_annuity_in(1, 3).unwrap();
        assert_relative_eq!(in_terminal, in_first * 1.05f64.powi(3), max_relative = 1e-13);
    }

    fn rate_times_and_forwards() -> impl Strategy<Value = (Vec<f64>, Vec<f64>, usize)> {
        prop::collection::vec((0.1f64..1.5, 0.001f64..0.15), 1..20).prop_flat_map(|periods| {
            let n = periods.len();
            let mut times = vec![0.25];
            let mut forwards = Vec::with_capacity(n);
            for (tau, f) in periods {
                let last = times[times.len() - 1];
                times.push(last + tau);
                forwards.push(f);
            }
            (Just(times), Just(forwards), 0..n)
        })
    }

    proptest! {
        #[test]
        fn prop_representations_round_trip((times, forwards, first) in rate_times_and_forwards()) {
            let mut cs = state(&times);
            cs.set_on_forward_rates(&forwards, first).unwrap();
            let ratios = cs.discount_ratios().unwrap().to_vec();

            let mut via_discount = state(&times);
            via_discount.set_on_discount_ratios(&ratios, first).unwrap();
            let swaps = via_discount.coterminal_swap_rates().unwrap().to_vec();

            let mut via_swaps = state(&times);
            via_swaps.set_on_coterminal_swap_rates(&swaps, first).unwrap();
            let round_trip = via_swaps.forward_rates().unwrap();

            for i in first..forwards.len() {
                let tolerance = 1e-10 * forwards[i].abs().max(1e-3);
                prop_assert!(
                    (round_trip[i] - forwards[i]).abs() <= tolerance,
                    "rate {}: {} vs {}", i, round_trip[i], forwards[i]
                );
            }
        }

        #[test]
        fn prop_discount_ratios_non_increasing((times, forwards, first) in rate_times_and_forwards()) {
            let mut cs = state(&times);
            cs.set_on_forward_rates(&forwards, first).unwrap();
            let dr = cs.discount_ratios().unwrap();
            for i in first..forwards.len() {
                prop_assert!(dr[i + 1] <= dr[i]);
            }
        }
    }
}
