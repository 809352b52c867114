// src/drift.rs
//! No-Arbitrage Drifts of Displaced Log-Forward Rates
//!
//! # Mathematical Framework
//!
//! Under the measure whose numeraire is the bond maturing at `t_n`, the drift
//! of `log(f_i + d_i)` (before the `-½σ²` Itô term) is
//!
//! ```text
//! i ≥ n:   μ_i =  Σ_{k=n}^{i}     g_k C_ik
//! i < n:   μ_i = -Σ_{k=i+1}^{n-1} g_k C_ik
//!
//! g_k  = τ_k (f_k + d_k) / (1 + τ_k f_k)
//! C_ik = Σ_r A_ir A_kr
//! ```
//!
//! Both sums start at the numeraire and run towards `i`.
//!
//! # Factor Reduction
//!
//! With `F < N` factors the reduced form keeps one running sum per factor,
//! `e_r(i) = Σ_k g_k A_kr` accumulated outward from the numeraire, giving
//! `μ_i = ± Σ_r e_r(i) A_ir` in `O(N·F)` instead of `O(N²)`.
//!
//! # Coterminal Swap Rates
//!
//! [`SmmDriftCalculator`] gives the drift of `x_j = log(S_j + d_j)` for the
//! coterminal swap rates. `S_j` is driftless under its annuity measure, so
//! under the bond-`n` measure
//!
//! ```text
//! μ_j = -Σ_r A_jr ( V_r[a_j] / a_j - V_r[q_n] / q_n )
//!
//! q_j = P_j / P_N = 1 + S_j a_j          a_j = A_j / P_N = τ_j q_{j+1} + a_{j+1}
//! V_r[q_j] = (S_j + d_j) A_jr a_j + S_j V_r[a_j]
//! V_r[a_j] = τ_j V_r[q_{j+1}] + V_r[a_{j+1}]
//! ```
//!
//! where `V_r[X]` is the loading of `X` on factor `r`. Both recursions run
//! backward from `q_N = 1`, one factor at a time, in `O(N·F)`.

use crate::error::{validation::*, LmmError, LmmResult};
use nalgebra::DMatrix;

#[derive(Debug, Clone)]
pub struct LmmDriftCalculator {
    pseudo_root: DMatrix<f64>,
    covariance: DMatrix<f64>,
    displacements: Vec<f64>,
    taus: Vec<f64>,
    numeraire: usize,
    alive: usize,
    full_factor: bool,
}

impl LmmDriftCalculator {
    pub fn new(
        pseudo_root: &DMatrix<f64>,
        displacements: &[f64],
        taus: &[f64],
        numeraire: usize,
        alive: usize,
    ) -> LmmResult<Self> {
        check_inputs(pseudo_root, displacements, taus, numeraire, alive)?;
        Ok(Self {
            covariance: pseudo_root * pseudo_root.transpose(),
            pseudo_root: pseudo_root.clone(),
            displacements: displacements.to_vec(),
            taus: taus.to_vec(),
            numeraire,
            alive,
            full_factor: pseudo_root.ncols() == taus.len(),
        })
    }

    pub fn numeraire(&self) -> usize {
        self.numeraire
    }

    pub fn alive(&self) -> usize {
        self.alive
    }

    pub fn number_of_factors(&self) -> usize {
        self.pseudo_root.ncols()
    }

    #[inline]
    fn g(&self, forwards: &[f64], k: usize) -> f64 {
        let tau = self.taus[k];
        tau * (forwards[k] + self.displacements[k]) / (1.0 + tau * forwards[k])
    }

    /// Drifts of rates `alive..N`; entries below `alive` are left untouched
    pub fn compute(&self, forwards: &[f64], drifts: &mut [f64]) {
        if self.full_factor {
            self.compute_plain(forwards, drifts);
        } else {
            self.compute_reduced(forwards, drifts);
        }
    }

    /// Row sums against the full covariance
    pub fn compute_plain(&self, forwards: &[f64], drifts: &mut [f64]) {
        let n = self.taus.len();
        debug_assert_eq!(forwards.len(), n);
        debug_assert_eq!(drifts.len(), n);
        for i in self.alive..n {
            drifts[i] = if i >= self.numeraire {
                (self.numeraire..=i)
                    .map(|k| self.g(forwards, k) * self.covariance[(i, k)])
                    .sum()
            } else {
                -(i + 1..self.numeraire)
                    .rev()
                    .map(|k| self.g(forwards, k) * self.covariance[(i, k)])
                    .sum::<f64>()
            };
        }
    }

    /// Factor-wise running sums, accumulated in place in `drifts`
    pub fn compute_reduced(&self, forwards: &[f64], drifts: &mut [f64]) {
        let n = self.taus.len();
        debug_assert_eq!(forwards.len(), n);
        debug_assert_eq!(drifts.len(), n);
        let a = &self.pseudo_root;
        drifts[self.alive..n].iter_mut().for_each(|d| *d = 0.0);

        for r in 0..a.ncols() {
            let mut e = 0.0;
            for i in self.numeraire..n {
                e += self.g(forwards, i) * a[(i, r)];
                drifts[i] += e * a[(i, r)];
            }
            if self.numeraire >= self.alive + 2 {
                let mut e = 0.0;
                for i in (self.alive..self.numeraire - 1).rev() {
                    e += self.g(forwards, i + 1) * a[(i + 1, r)];
                    drifts[i] -= e * a[(i, r)];
                }
            }
        }
    }
}

fn check_inputs(
    pseudo_root: &DMatrix<f64>,
    displacements: &[f64],
    taus: &[f64],
    numeraire: usize,
    alive: usize,
) -> LmmResult<()> {
    let n = taus.len();
    validate_len("pseudo_root rows", pseudo_root.nrows(), n)?;
    validate_len("displacements", displacements.len(), n)?;
    if pseudo_root.ncols() == 0 || pseudo_root.ncols() > n {
        return Err(LmmError::invalid_argument(
            "pseudo_root",
            format!("number of factors {} must be in [1, {}]", pseudo_root.ncols(), n),
        ));
    }
    validate_index("alive", alive, n)?;
    if numeraire > n {
        return Err(LmmError::invalid_argument(
            "numeraire",
            format!("{} exceeds number of rates {}", numeraire, n),
        ));
    }
    if numeraire < alive {
        return Err(LmmError::invalid_argument(
            "numeraire",
            format!("bond {} has matured before first alive rate {}", numeraire, alive),
        ));
    }
    for &tau in taus {
        validate_positive("taus", tau)?;
    }
    Ok(())
}

/// Drifts of displaced log coterminal swap rates
#[derive(Debug, Clone)]
pub struct SmmDriftCalculator {
    pseudo_root: DMatrix<f64>,
    displacements: Vec<f64>,
    taus: Vec<f64>,
    numeraire: usize,
    alive: usize,
}

impl SmmDriftCalculator {
    pub fn new(
        pseudo_root: &DMatrix<f64>,
        displacements: &[f64],
        taus: &[f64],
        numeraire: usize,
        alive: usize,
    ) -> LmmResult<Self> {
        check_inputs(pseudo_root, displacements, taus, numeraire, alive)?;
        Ok(Self {
            pseudo_root: pseudo_root.clone(),
            displacements: displacements.to_vec(),
            taus: taus.to_vec(),
            numeraire,
            alive,
        })
    }

    pub fn numeraire(&self) -> usize {
        self.numeraire
    }

    pub fn alive(&self) -> usize {
        self.alive
    }

    pub fn number_of_factors(&self) -> usize {
        self.pseudo_root.ncols()
    }

    /// Drifts of swap rates `alive..N`; entries below `alive` are left untouched
    pub fn compute(&self, swap_rates: &[f64], drifts: &mut [f64]) {
        let n = self.taus.len();
        debug_assert_eq!(swap_rates.len(), n);
        debug_assert_eq!(drifts.len(), n);
        let a = &self.pseudo_root;
        drifts[self.alive..n].iter_mut().for_each(|d| *d = 0.0);

        for r in 0..a.ncols() {
            // q_{j+1}, a_{j+1} and their loadings, starting from q_N = 1
            let (mut bond, mut bond_loading) = (1.0, 0.0);
            let (mut annuity, mut annuity_loading) = (0.0, 0.0);
            let (mut numeraire_bond, mut numeraire_loading) = (1.0, 0.0);
            for j in (self.alive..n).rev() {
                annuity += self.taus[j] * bond;
                annuity_loading += self.taus[j] * bond_loading;
                drifts[j] -= a[(j, r)] * annuity_loading / annuity;

                let rate = swap_rates[j];
                bond_loading =
                    (rate + self.displacements[j]) * a[(j, r)] * annuity + rate * annuity_loading;
                bond = 1.0 + rate * annuity;
                if j == self.numeraire {
                    numeraire_bond = bond;
                    numeraire_loading = bond_loading;
                }
            }
            let shift = numeraire_loading / numeraire_bond;
            for j in self.alive..n {
                drifts[j] += a[(j, r)] * shift;
            }
        }
    }
}
