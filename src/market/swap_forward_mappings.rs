// src/market/swap_forward_mappings.rs
//! Swap-Rate / Forward-Rate Jacobians
//!
//! # Derivation
//!
//! With bonds rebased so that `P_first = 1`, the coterminal swap rate is
//!
//! ```text
//! SR_i = (P_i - P_N) / A_i,     A_i = Σ_{k=i}^{N-1} τ_k P_{k+1}
//! ```
//!
//! A bump in `f_j` scales every bond maturing after `t_j`:
//! `∂P_k/∂f_j = -g_j P_k` for `k > j`, with `g_j = τ_j / (1 + τ_j f_j)`.
//! Hence for `j ≥ i`, `∂P_N/∂f_j = -g_j P_N` and `∂A_i/∂f_j = -g_j A_j`, and
//!
//! ```text
//! ∂SR_i/∂f_j = g_j (P_N + SR_i A_j) / A_i     (j ≥ i)
//! ∂SR_i/∂f_j = 0                              (j < i)
//! ```

use crate::error::{validation::*, LmmError, LmmResult};
use crate::market::curve_state::CurveState;
use crate::market::evolution::RateTimes;
use nalgebra::DMatrix;

/// `J_ij = ∂SR_i/∂f_j`; rows and columns below the first valid index are zero
pub fn coterminal_swap_forward_jacobian(cs: &CurveState) -> LmmResult<DMatrix<f64>> {
    let n = cs.number_of_rates();
    let first = cs.first_valid_index();
    let taus = cs.rate_times().taus();
    let forwards = cs.forward_rates()?;
    let dr = cs.discount_ratios()?;
    let swap_rates = cs.coterminal_swap_rates()?;
    let annuities = cs.coterminal_swap_annuities()?;

    let mut jacobian = DMatrix::zeros(n, n);
    for i in first..n {
        for j in i..n {
            let g = taus[j] / (1.0 + taus[j] * forwards[j]);
            jacobian[(i, j)] = g * (dr[n] + swap_rates[i] * annuities[j]) / annuities[i];
        }
    }
    Ok(jacobian)
}

/// Jacobian of displaced log swap rates against displaced log forwards:
/// `Z_ij = J_ij (f_j + d_j) / (SR_i + d_i)`
pub fn coterminal_swap_zed_matrix(cs: &CurveState, displacements: &[f64]) -> LmmResult<DMatrix<f64>> {
    let n = cs.number_of_rates();
    validate_len("displacements", displacements.len(), n)?;
    for &d in displacements {
        validate_finite("displacements", d)?;
    }
    let first = cs.first_valid_index();
    let forwards = cs.forward_rates()?;
    let swap_rates = cs.coterminal_swap_rates()?;

    let mut zed = coterminal_swap_forward_jacobian(cs)?;
    for i in first..n {
        for j in i..n {
            zed[(i, j)] *= (forwards[j] + displacements[j]) / (swap_rates[i] + displacements[i]);
        }
    }
    Ok(zed)
}

/// Covariance of the displaced log coterminal swap rates of the sub-curve
/// `t_expiry..t_maturity`, implied by a covariance of displaced log forwards
/// with the zed matrix frozen at `cs`: `Z C Zᵗ`
///
/// The result is `(maturity - expiry)` square; row `k` is the swap rate
/// starting at `t_{expiry + k}` and ending at `t_maturity`.
pub fn swap_covariance(
    cs: &CurveState,
    expiry: usize,
    maturity: usize,
    displacements: &[f64],
    forward_covariance: &DMatrix<f64>,
) -> LmmResult<DMatrix<f64>> {
    let n = cs.number_of_rates();
    validate_len("displacements", displacements.len(), n)?;
    validate_len("forward_covariance rows", forward_covariance.nrows(), n)?;
    validate_len("forward_covariance columns", forward_covariance.ncols(), n)?;
    if maturity > n || expiry >= maturity {
        return Err(LmmError::invalid_argument(
            "maturity",
            format!("need expiry < maturity <= {} (expiry {}, maturity {})", n, expiry, maturity),
        ));
    }
    if expiry < cs.first_valid_index() {
        return Err(LmmError::invalid_argument(
            "expiry",
            format!("rate {} has already reset", expiry),
        ));
    }

    let forwards = cs.forward_rates()?;
    let times = cs.rate_times().times();
    let mut sub_curve = CurveState::new(RateTimes::new(&times[expiry..=maturity])?);
    sub_curve.set_on_forward_rates(&forwards[expiry..maturity], 0)?;
    let zed = coterminal_swap_zed_matrix(&sub_curve, &displacements[expiry..maturity])?;

    let m = maturity - expiry;
    let covariance = forward_covariance.slice((expiry, expiry), (m, m)).into_owned();
    Ok(&zed * &covariance * zed.transpose())
}
