//! Stochastic reconfiguration over an enumerated basis.
//!
//! Instead of Monte Carlo estimates, every basis state enters with its
//! exact Born weight |Ψ(σ)|²/‖Ψ‖², and the covariance S is materialized
//! densely so the shifted system can be solved directly. Intended for
//! small systems and for validating the sampled path.

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::basis::word_to_sigma;
use crate::systems::Hamiltonian;
use crate::wavefunction::{Rbm, Scalar};

/// Exact SR statistics with a dense covariance.
pub struct SrExact<'a, T: Scalar> {
    machine: &'a Rbm<T>,
    basis: Vec<u32>,
    probs: Vec<f64>,
    /// Centered covariance S, dim × dim, without the diagonal shift.
    corr: DMatrix<T>,
    grad: DVector<T>,
    energy: T,
    eloc_var: f64,
    shift: f64,
}

impl<'a, T: Scalar> SrExact<'a, T> {
    /// Evaluate the full statistics of `machine` over `basis`.
    ///
    /// The basis must be closed under the Hamiltonian up to states of
    /// negligible weight; connected states outside it are evaluated from
    /// scratch rather than dropped.
    pub fn construct<H>(machine: &'a Rbm<T>, hamiltonian: &H, basis: &[u32]) -> Self
    where
        H: Hamiltonian + ?Sized,
    {
        assert!(!basis.is_empty(), "cannot build SR statistics from an empty basis");
        let n = machine.visible();
        let index: HashMap<u32, usize> =
            basis.iter().enumerate().map(|(k, &w)| (w, k)).collect();

        let log_amps: Vec<T> = basis
            .par_iter()
            .map(|&word| {
                let sigma = word_to_sigma(n, word);
                machine.log_amplitude(&sigma, &machine.calc_theta(&sigma))
            })
            .collect();

        // Born weights, stabilized against overflow of exp(2 Re ln Ψ)
        let top = log_amps
            .iter()
            .map(|l| l.real())
            .fold(f64::NEG_INFINITY, f64::max);
        let mut probs: Vec<f64> = log_amps
            .iter()
            .map(|l| (2.0 * (l.real() - top)).exp())
            .collect();
        let total: f64 = probs.iter().sum();
        for p in &mut probs {
            *p /= total;
        }

        let rows: Vec<(T, DVector<T>)> = basis
            .par_iter()
            .enumerate()
            .map(|(k, &word)| {
                let sigma = word_to_sigma(n, word);
                let theta = machine.calc_theta(&sigma);
                let mut e = T::from_real(0.0);
                for (sp, mel) in hamiltonian.connected_states(&sigma) {
                    if sp == sigma {
                        e += T::from_real(mel);
                        continue;
                    }
                    let lp = match index.get(&crate::basis::sigma_to_word(&sp)) {
                        Some(&l) => log_amps[l],
                        None => machine.log_amplitude(&sp, &machine.calc_theta(&sp)),
                    };
                    e += T::from_real(mel) * (lp - log_amps[k]).exp();
                }
                let o = machine.log_derivatives(&sigma, &theta);
                (e, o)
            })
            .collect();

        let dim = machine.dim();
        let mut o_mean: DVector<T> = DVector::zeros(dim);
        let mut energy = T::from_real(0.0);
        for ((e, o), &p) in rows.iter().zip(&probs) {
            o_mean.axpy(T::from_real(p), o, T::from_real(1.0));
            energy += T::from_real(p) * *e;
        }

        let mut deltas = DMatrix::zeros(rows.len(), dim);
        let mut grad: DVector<T> = DVector::zeros(dim);
        let mut eloc_var = 0.0;
        for (k, ((e, o), &p)) in rows.iter().zip(&probs).enumerate() {
            let centered = o - &o_mean;
            let de = *e - energy;
            grad.axpy(
                T::from_real(p) * de,
                &centered.map(|c| c.conjugate()),
                T::from_real(1.0),
            );
            eloc_var += p * de.modulus_squared();
            deltas.set_row(k, &centered.scale(p.sqrt()).transpose());
        }
        let corr = deltas.ad_mul(&deltas);

        Self {
            machine,
            basis: basis.to_vec(),
            probs,
            corr,
            grad,
            energy,
            eloc_var,
            shift: 0.0,
        }
    }

    pub fn machine(&self) -> &Rbm<T> {
        self.machine
    }

    pub fn basis(&self) -> &[u32] {
        &self.basis
    }

    /// Exact Born weights of the basis states.
    pub fn probabilities(&self) -> &[f64] {
        &self.probs
    }

    /// ⟨Ψ|H|Ψ⟩ / ⟨Ψ|Ψ⟩ over the basis.
    pub fn energy(&self) -> T {
        self.energy
    }

    pub fn eloc_variance(&self) -> f64 {
        self.eloc_var
    }

    /// Energy gradient F = ∂⟨E⟩/∂p̄.
    pub fn gradient(&self) -> &DVector<T> {
        &self.grad
    }

    /// Dense covariance S without the shift.
    pub fn corr(&self) -> &DMatrix<T> {
        &self.corr
    }

    pub fn set_shift(&mut self, shift: f64) {
        assert!(shift >= 0.0);
        self.shift = shift;
    }

    pub fn shift(&self) -> f64 {
        self.shift
    }

    /// Solve (S + λI) x = F directly.
    ///
    /// Cholesky first; if the shifted matrix is not numerically positive
    /// definite, fall back to LU, and as a last resort to the plain
    /// gradient so the optimization step stays well-defined.
    pub fn solve(&self) -> DVector<T> {
        let dim = self.grad.len();
        let mut s = self.corr.clone();
        for i in 0..dim {
            s[(i, i)] += T::from_real(self.shift);
        }
        match nalgebra::Cholesky::new(s.clone()) {
            Some(chol) => chol.solve(&self.grad),
            None => {
                log::warn!("shifted covariance not positive definite, falling back to LU");
                s.lu().solve(&self.grad).unwrap_or_else(|| {
                    log::warn!("LU solve failed, using the bare gradient");
                    self.grad.clone()
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::{basis_jz, full_basis};
    use crate::sr::{LinearOperator, SrMatFree};
    use crate::systems::{to_dense, XxzChain};
    use crate::wavefunction::get_psi_over;
    use approx::assert_relative_eq;
    use num_complex::Complex64;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn complex_machine(n: usize, m: usize, seed: u64) -> Rbm<Complex64> {
        let mut qs = Rbm::new(n, m, true);
        qs.init_random(&mut StdRng::seed_from_u64(seed), 0.2);
        qs
    }

    fn rayleigh_energy(h: &DMatrix<f64>, qs: &Rbm<Complex64>, words: &[u32]) -> Complex64 {
        let psi = get_psi_over(qs, words, false);
        let hc = h.map(|x| Complex64::new(x, 0.0));
        psi.dotc(&(&hc * &psi)) / psi.norm_squared()
    }

    #[test]
    fn test_energy_is_rayleigh_quotient() {
        let n = 4;
        let qs = complex_machine(n, 3, 501);
        let ham = XxzChain::new(n, 1.0, 0.7);
        let words = full_basis(n);
        let sr = SrExact::construct(&qs, &ham, &words);
        let expect = rayleigh_energy(&to_dense(&ham, &words), &qs, &words);
        assert!((sr.energy() - expect).norm() < 1e-10);
        // Hermitian H over the full basis has a real expectation value
        assert!(sr.energy().im.abs() < 1e-10);
    }

    #[test]
    fn test_sector_basis_energy() {
        let n = 4;
        let qs = complex_machine(n, 3, 511);
        let ham = XxzChain::new(n, 1.0, 1.0);
        let words = basis_jz(n, 2);
        let sr = SrExact::construct(&qs, &ham, &words);
        let expect = rayleigh_energy(&to_dense(&ham, &words), &qs, &words);
        assert!((sr.energy() - expect).norm() < 1e-10);
    }

    #[test]
    fn test_agrees_with_matrix_free_path() {
        let n = 4;
        let qs = complex_machine(n, 3, 521);
        let ham = XxzChain::new(n, 1.0, 0.9);
        let words = full_basis(n);

        let mut exact = SrExact::construct(&qs, &ham, &words);
        exact.set_shift(0.02);
        let mut matfree =
            SrMatFree::construct_weighted(&qs, &ham, &words, exact.probabilities());
        matfree.set_shift(0.02);

        assert!((exact.energy() - matfree.eloc()).norm() < 1e-10);
        assert_relative_eq!(
            exact.eloc_variance(),
            matfree.eloc_variance(),
            epsilon = 1e-10
        );
        for i in 0..qs.dim() {
            assert!((exact.gradient()[i] - matfree.gradient()[i]).norm() < 1e-10);
        }

        let v = DVector::from_fn(qs.dim(), |i, _| {
            Complex64::new((i as f64).cos(), (i as f64 / 3.0).sin())
        });
        let dense = {
            let mut s = exact.corr().clone();
            for i in 0..qs.dim() {
                s[(i, i)] += Complex64::new(0.02, 0.0);
            }
            &s * &v
        };
        let fast = matfree.apply(&v);
        for i in 0..qs.dim() {
            assert!((dense[i] - fast[i]).norm() < 1e-10);
        }
    }

    #[test]
    fn test_corr_is_hermitian() {
        let qs = complex_machine(4, 3, 531);
        let ham = XxzChain::new(4, 1.0, 0.4);
        let sr = SrExact::construct(&qs, &ham, &full_basis(4));
        let asym = (sr.corr() - sr.corr().adjoint()).norm();
        assert!(asym < 1e-12, "asymmetry {}", asym);
    }

    #[test]
    fn test_solve_satisfies_shifted_system() {
        let qs = complex_machine(4, 3, 541);
        let ham = XxzChain::new(4, 1.0, 1.0);
        let mut sr = SrExact::construct(&qs, &ham, &full_basis(4));
        sr.set_shift(0.05);
        let x = sr.solve();
        let mut s = sr.corr().clone();
        for i in 0..qs.dim() {
            s[(i, i)] += Complex64::new(0.05, 0.0);
        }
        let back = &s * &x;
        assert!((back - sr.gradient()).norm() < 1e-8 * sr.gradient().norm().max(1.0));
    }
}
