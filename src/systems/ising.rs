//! Transverse-field Ising chain with periodic boundaries.
//!
//!   H = −J Σ_i σᶻ_i σᶻ_{i+1} − h Σ_i σˣ_i

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::Hamiltonian;

/// Transverse-field Ising chain parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransverseIsing {
    n: usize,
    /// Ising coupling J.
    j: f64,
    /// Transverse field h.
    h: f64,
}

impl TransverseIsing {
    pub fn new(n: usize, j: f64, h: f64) -> Self {
        assert!(n >= 2, "a chain needs at least two sites");
        Self { n, j, h }
    }

    pub fn j(&self) -> f64 {
        self.j
    }

    pub fn h(&self) -> f64 {
        self.h
    }
}

impl Hamiltonian for TransverseIsing {
    fn n_sites(&self) -> usize {
        self.n
    }

    fn connected_states(&self, sigma: &DVector<i32>) -> Vec<(DVector<i32>, f64)> {
        let mut res = Vec::with_capacity(self.n + 1);
        let mut diag = 0.0;
        for i in 0..self.n {
            diag -= self.j * (sigma[i] * sigma[(i + 1) % self.n]) as f64;
            let mut sp = sigma.clone();
            sp[i] = -sp[i];
            res.push((sp, -self.h));
        }
        res.push((sigma.clone(), diag));
        res
    }

    fn conserves_magnetization(&self) -> bool {
        false
    }
}
