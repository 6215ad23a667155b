//! Systems module - spin Hamiltonians and local-energy evaluation.

mod ising;
mod xxz;

pub use ising::TransverseIsing;
pub use xxz::XxzChain;

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector};

use crate::basis::{sigma_to_word, word_to_sigma};
use crate::wavefunction::{Scalar, SpinState};

/// A spin Hamiltonian presented row by row in the σᶻ basis.
pub trait Hamiltonian: Send + Sync {
    /// Number of lattice sites.
    fn n_sites(&self) -> usize;

    /// All basis states ⟨σ′| with ⟨σ′|H|σ⟩ ≠ 0, with their matrix elements.
    /// The diagonal entry is reported with σ′ = σ.
    fn connected_states(&self, sigma: &DVector<i32>) -> Vec<(DVector<i32>, f64)>;

    /// Whether H commutes with total σᶻ (restricts sampling to a sector).
    fn conserves_magnetization(&self) -> bool;

    /// Site sets whose joint flip realizes an off-diagonal element; feeds
    /// [`crate::sampling::FlipListSweeper`]. Defaults to single-site flips.
    fn flip_list(&self) -> Vec<Vec<usize>> {
        (0..self.n_sites()).map(|k| vec![k]).collect()
    }
}

/// Local energy E_loc(σ) = Σ_σ′ ⟨σ|H|σ′⟩ Ψ(σ′)/Ψ(σ) from the flip cache.
pub fn local_energy<T, H, S>(hamiltonian: &H, state: &S) -> T
where
    T: Scalar,
    H: Hamiltonian + ?Sized,
    S: SpinState<T>,
{
    let mut res = T::from_real(0.0);
    for (sp, mel) in hamiltonian.connected_states(state.sigma()) {
        if sp == *state.sigma() {
            res += T::from_real(mel);
        } else {
            res += T::from_real(mel) * state.log_ratio_to(&sp).exp();
        }
    }
    res
}

/// Assemble the dense Hamiltonian matrix over an explicit basis.
///
/// Connected states outside the basis are dropped, so the basis must be
/// closed under H (the full basis, or a magnetization sector of a
/// sector-conserving H).
pub fn to_dense<H: Hamiltonian + ?Sized>(hamiltonian: &H, basis: &[u32]) -> DMatrix<f64> {
    let index: HashMap<u32, usize> = basis.iter().enumerate().map(|(k, &w)| (w, k)).collect();
    let mut mat = DMatrix::zeros(basis.len(), basis.len());
    for (k, &word) in basis.iter().enumerate() {
        let sigma = word_to_sigma(hamiltonian.n_sites(), word);
        for (sp, mel) in hamiltonian.connected_states(&sigma) {
            if let Some(&l) = index.get(&sigma_to_word(&sp)) {
                mat[(l, k)] += mel;
            }
        }
    }
    mat
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::full_basis;
    use crate::wavefunction::{Rbm, StateValue};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_local_energy_matches_dense_row() {
        let n = 4;
        let ham = XxzChain::new(n, 1.0, 0.7);
        let words = full_basis(n);
        let h = to_dense(&ham, &words);

        let mut qs = Rbm::<f64>::new(n, 5, true);
        qs.init_random(&mut StdRng::seed_from_u64(901), 0.2);
        let psi = crate::wavefunction::get_psi(&qs, false);

        for (k, &word) in words.iter().enumerate() {
            let st = StateValue::from_word(&qs, word);
            let mut expect = 0.0;
            for l in 0..words.len() {
                expect += h[(l, k)] * psi[l] / psi[k];
            }
            assert_relative_eq!(local_energy(&ham, &st), expect, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_dense_matrices_are_symmetric() {
        let words = full_basis(4);
        let xxz = to_dense(&XxzChain::new(4, 1.0, 0.5), &words);
        let tfi = to_dense(&TransverseIsing::new(4, 1.0, 0.8), &words);
        assert_relative_eq!((&xxz - xxz.transpose()).norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!((&tfi - tfi.transpose()).norm(), 0.0, epsilon = 1e-12);
    }
}
