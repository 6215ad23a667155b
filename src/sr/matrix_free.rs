//! Stochastic-reconfiguration statistics in matrix-free form.
//!
//! From an ensemble of configurations the pass extracts the energy
//! gradient F_i = ⟨E_loc O_i*⟩ − ⟨E_loc⟩⟨O_i*⟩ and the centered covariance
//!
//!   S_ij = ⟨O_i* O_j⟩ − ⟨O_i*⟩⟨O_j⟩,
//!
//! never materializing S: the √w-scaled centered derivative rows Δ are kept
//! and S·v is evaluated as Δᴴ(Δv) + λv. Weights are uniform 1/M for Monte
//! Carlo samples and exact Born probabilities for enumerated ensembles, so
//! both regimes share one code path.
//!
//! Per-sample work runs in parallel; the reductions run sequentially in
//! sample order, so results are reproducible for a fixed ensemble.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use super::cg::{conjugate_gradient, CgResult, LinearOperator};
use crate::basis::word_to_sigma;
use crate::systems::{local_energy, Hamiltonian};
use crate::wavefunction::{Rbm, Sample, Scalar, StateRef};

/// SR statistics of one ensemble against one fixed machine.
pub struct SrMatFree<'a, T: Scalar> {
    machine: &'a Rbm<T>,
    /// √w-scaled centered log-derivative rows, ensemble × dim.
    deltas: DMatrix<T>,
    grad: DVector<T>,
    eloc_mean: T,
    eloc_var: f64,
    shift: f64,
}

impl<'a, T: Scalar> SrMatFree<'a, T> {
    /// Build from Monte Carlo samples with uniform weights.
    pub fn construct_from_sampling<H>(
        machine: &'a Rbm<T>,
        hamiltonian: &H,
        samples: &[Sample<T>],
    ) -> Self
    where
        H: Hamiltonian + ?Sized,
    {
        assert!(!samples.is_empty(), "cannot build SR statistics from zero samples");
        let rows: Vec<(T, DVector<T>)> = samples
            .par_iter()
            .map(|s| {
                let st = StateRef::over_sample(machine, s);
                let e = local_energy(hamiltonian, &st);
                let o = machine.log_derivatives(&s.sigma, &s.theta);
                (e, o)
            })
            .collect();
        let weights = vec![1.0 / samples.len() as f64; samples.len()];
        Self::assemble(machine, rows, &weights)
    }

    /// Build from an enumerated basis with explicit (unnormalized) weights.
    pub fn construct_weighted<H>(
        machine: &'a Rbm<T>,
        hamiltonian: &H,
        basis: &[u32],
        weights: &[f64],
    ) -> Self
    where
        H: Hamiltonian + ?Sized,
    {
        assert!(!basis.is_empty(), "cannot build SR statistics from an empty basis");
        assert_eq!(basis.len(), weights.len());
        let n = machine.visible();
        let rows: Vec<(T, DVector<T>)> = basis
            .par_iter()
            .map(|&word| {
                let sigma = word_to_sigma(n, word);
                let theta = machine.calc_theta(&sigma);
                let st = StateRef::new(machine, &sigma, &theta);
                let e = local_energy(hamiltonian, &st);
                let o = machine.log_derivatives(&sigma, &theta);
                (e, o)
            })
            .collect();
        let total: f64 = weights.iter().sum();
        assert!(total > 0.0, "weights must have positive mass");
        let normalized: Vec<f64> = weights.iter().map(|w| w / total).collect();
        Self::assemble(machine, rows, &normalized)
    }

    fn assemble(machine: &'a Rbm<T>, rows: Vec<(T, DVector<T>)>, weights: &[f64]) -> Self {
        let dim = machine.dim();
        let mut o_mean: DVector<T> = DVector::zeros(dim);
        let mut eloc_mean = T::from_real(0.0);
        for ((e, o), &w) in rows.iter().zip(weights) {
            o_mean.axpy(T::from_real(w), o, T::from_real(1.0));
            eloc_mean += T::from_real(w) * *e;
        }

        let mut deltas = DMatrix::zeros(rows.len(), dim);
        let mut grad: DVector<T> = DVector::zeros(dim);
        let mut eloc_var = 0.0;
        for (k, ((e, o), &w)) in rows.iter().zip(weights).enumerate() {
            let centered = o - &o_mean;
            let de = *e - eloc_mean;
            grad.axpy(
                T::from_real(w) * de,
                &centered.map(|c| c.conjugate()),
                T::from_real(1.0),
            );
            eloc_var += w * de.modulus_squared();
            deltas.set_row(k, &centered.scale(w.sqrt()).transpose());
        }

        Self {
            machine,
            deltas,
            grad,
            eloc_mean,
            eloc_var,
            shift: 0.0,
        }
    }

    pub fn machine(&self) -> &Rbm<T> {
        self.machine
    }

    /// Energy gradient F = ∂⟨E⟩/∂p̄.
    pub fn gradient(&self) -> &DVector<T> {
        &self.grad
    }

    /// Ensemble mean of the local energy.
    pub fn eloc(&self) -> T {
        self.eloc_mean
    }

    /// Ensemble variance of the local energy; vanishes on an eigenstate.
    pub fn eloc_variance(&self) -> f64 {
        self.eloc_var
    }

    /// Set the diagonal regularization λ applied by [`LinearOperator::apply`].
    pub fn set_shift(&mut self, shift: f64) {
        assert!(shift >= 0.0);
        self.shift = shift;
    }

    pub fn shift(&self) -> f64 {
        self.shift
    }

    /// Solve (S + λI) x = F by conjugate gradient.
    pub fn solve_cg(&self, tol: f64, max_iter: usize) -> CgResult<T> {
        conjugate_gradient(self, &self.grad, tol, max_iter)
    }
}

impl<T: Scalar> LinearOperator<T> for SrMatFree<'_, T> {
    fn dim(&self) -> usize {
        self.grad.len()
    }

    /// (S + λI)·v through the two thin products Δᴴ(Δv) + λv.
    fn apply(&self, v: &DVector<T>) -> DVector<T> {
        let tmp = &self.deltas * v;
        let mut res = self.deltas.ad_mul(&tmp);
        res.axpy(T::from_real(self.shift), v, T::from_real(1.0));
        res
    }
}
