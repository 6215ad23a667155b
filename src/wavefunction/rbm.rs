//! Restricted-Boltzmann-Machine wavefunction ansatz.
//!
//! The machine maps a spin configuration σ ∈ {−1,+1}ⁿ to a coefficient
//!
//!   Ψ(σ) = exp(a·σ) · Π_j cosh(θ_j),   θ = Wσ + b,
//!
//! with a weight matrix W (hidden × visible) and optional visible/hidden
//! biases a, b. All optimization machinery works on the flattened parameter
//! vector: the W columns first (visible site 0 upward), then a, then b.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::Normal;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::scalar::Scalar;
use crate::basis::{full_basis, word_to_sigma};

/// RBM wavefunction parameters.
///
/// Parameters are read-only during a sampling/statistics pass and mutated
/// exactly once per outer optimization iteration via [`Rbm::update_params`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rbm<T: Scalar> {
    /// Number of visible units (spin sites).
    n: usize,
    /// Number of hidden units.
    m: usize,
    /// Whether the bias vectors a, b are variational parameters.
    use_bias: bool,
    /// Weight matrix, hidden × visible.
    w: DMatrix<T>,
    /// Visible bias, length n.
    a: DVector<T>,
    /// Hidden bias, length m.
    b: DVector<T>,
}

impl<T: Scalar> Rbm<T> {
    /// Create a zero-initialized machine.
    pub fn new(n_visible: usize, n_hidden: usize, use_bias: bool) -> Self {
        assert!(n_visible >= 1 && n_hidden >= 1);
        Self {
            n: n_visible,
            m: n_hidden,
            use_bias,
            w: DMatrix::zeros(n_hidden, n_visible),
            a: DVector::zeros(n_visible),
            b: DVector::zeros(n_hidden),
        }
    }

    /// Reassemble a machine from its stored blocks (snapshot loading).
    pub fn from_parts(
        use_bias: bool,
        w: DMatrix<T>,
        a: DVector<T>,
        b: DVector<T>,
    ) -> Self {
        let (m, n) = w.shape();
        assert_eq!(a.len(), n, "visible bias length does not match W");
        assert_eq!(b.len(), m, "hidden bias length does not match W");
        Self { n, m, use_bias, w, a, b }
    }

    /// Fill all parameters with N(0, sigma) draws; complex machines draw
    /// independent real and imaginary components.
    pub fn init_random<R: Rng + ?Sized>(&mut self, rng: &mut R, sigma: f64) {
        assert!(sigma.is_finite() && sigma > 0.0);
        let normal = Normal::new(0.0, sigma).unwrap();
        if self.use_bias {
            for i in 0..self.n {
                self.a[i] = T::draw_normal(rng, &normal);
            }
            for j in 0..self.m {
                self.b[j] = T::draw_normal(rng, &normal);
            }
        }
        for i in 0..self.n {
            for j in 0..self.m {
                self.w[(j, i)] = T::draw_normal(rng, &normal);
            }
        }
    }

    /// Number of visible units.
    pub fn visible(&self) -> usize {
        self.n
    }

    /// Number of hidden units.
    pub fn hidden(&self) -> usize {
        self.m
    }

    /// Whether biases are variational parameters.
    pub fn uses_bias(&self) -> bool {
        self.use_bias
    }

    /// Total number of variational parameters.
    pub fn dim(&self) -> usize {
        if self.use_bias {
            self.n * self.m + self.n + self.m
        } else {
            self.n * self.m
        }
    }

    /// Single weight W[j, i] (hidden j, visible i).
    pub fn w(&self, j: usize, i: usize) -> T {
        self.w[(j, i)]
    }

    /// Single visible bias a[i].
    pub fn a(&self, i: usize) -> T {
        self.a[i]
    }

    /// Single hidden bias b[j].
    pub fn b(&self, j: usize) -> T {
        self.b[j]
    }

    /// Weight matrix view.
    pub fn get_w(&self) -> &DMatrix<T> {
        &self.w
    }

    /// Visible bias view.
    pub fn get_a(&self) -> &DVector<T> {
        &self.a
    }

    /// Hidden bias view.
    pub fn get_b(&self) -> &DVector<T> {
        &self.b
    }

    /// Flat index of weight (visible i, hidden j) in the parameter vector.
    pub fn weight_index(&self, i: usize, j: usize) -> usize {
        i * self.m + j
    }

    /// Hidden-side field θ = Wσ + b.
    pub fn calc_theta(&self, sigma: &DVector<i32>) -> DVector<T> {
        let s = sigma.map(|x| T::from_real(x as f64));
        &self.w * s + &self.b
    }

    /// Visible-side field γ = Wᵀh + a.
    pub fn calc_gamma(&self, hidden: &DVector<i32>) -> DVector<T> {
        let h = hidden.map(|x| T::from_real(x as f64));
        self.w.tr_mul(&h) + &self.a
    }

    /// ln Ψ(σ) given the matching field θ.
    pub fn log_amplitude(&self, sigma: &DVector<i32>, theta: &DVector<T>) -> T {
        let mut s = T::from_real(0.0);
        for i in 0..self.n {
            s += self.a[i] * T::from_real(sigma[i] as f64);
        }
        for j in 0..self.m {
            s += theta[j].log_cosh();
        }
        s
    }

    /// Ψ(σ) given the matching field θ.
    pub fn amplitude(&self, sigma: &DVector<i32>, theta: &DVector<T>) -> T {
        self.log_amplitude(sigma, theta).exp()
    }

    /// Per-parameter gradient of ln Ψ: O_i = ∂ ln Ψ / ∂ p_i.
    ///
    /// Weight entry (visible i, hidden j) is σ_i·tanh θ_j; the visible-bias
    /// block is σ; the hidden-bias block is tanh θ.
    pub fn log_derivatives(&self, sigma: &DVector<i32>, theta: &DVector<T>) -> DVector<T> {
        let tanhs = theta.map(|t| t.tanh());
        let mut res = DVector::zeros(self.dim());
        for i in 0..self.n {
            let si = T::from_real(sigma[i] as f64);
            for j in 0..self.m {
                res[i * self.m + j] = si * tanhs[j];
            }
        }
        if !self.use_bias {
            return res;
        }
        let nm = self.n * self.m;
        for i in 0..self.n {
            res[nm + i] = T::from_real(sigma[i] as f64);
        }
        for j in 0..self.m {
            res[nm + self.n + j] = tanhs[j];
        }
        res
    }

    /// Flatten (W, a, b) into one parameter vector.
    pub fn get_params(&self) -> DVector<T> {
        let nm = self.n * self.m;
        let mut res = DVector::zeros(self.dim());
        res.as_mut_slice()[..nm].copy_from_slice(self.w.as_slice());
        if !self.use_bias {
            return res;
        }
        res.as_mut_slice()[nm..nm + self.n].copy_from_slice(self.a.as_slice());
        res.as_mut_slice()[nm + self.n..].copy_from_slice(self.b.as_slice());
        res
    }

    /// Inverse of [`Rbm::get_params`]; the vector length must equal `dim()`.
    pub fn set_params(&mut self, params: &DVector<T>) {
        assert_eq!(
            params.len(),
            self.dim(),
            "parameter vector length {} does not match dim {}",
            params.len(),
            self.dim()
        );
        let nm = self.n * self.m;
        self.w.as_mut_slice().copy_from_slice(&params.as_slice()[..nm]);
        if !self.use_bias {
            return;
        }
        self.a
            .as_mut_slice()
            .copy_from_slice(&params.as_slice()[nm..nm + self.n]);
        self.b
            .as_mut_slice()
            .copy_from_slice(&params.as_slice()[nm + self.n..]);
    }

    /// Add `delta` (same layout as `get_params`) to the parameters in place.
    pub fn update_params(&mut self, delta: &DVector<T>) {
        assert_eq!(
            delta.len(),
            self.dim(),
            "update vector length {} does not match dim {}",
            delta.len(),
            self.dim()
        );
        let nm = self.n * self.m;
        let d = delta.as_slice();
        for (w, dv) in self.w.as_mut_slice().iter_mut().zip(&d[..nm]) {
            *w += *dv;
        }
        if !self.use_bias {
            return;
        }
        for (a, dv) in self.a.as_mut_slice().iter_mut().zip(&d[nm..nm + self.n]) {
            *a += *dv;
        }
        for (b, dv) in self.b.as_mut_slice().iter_mut().zip(&d[nm + self.n..]) {
            *b += *dv;
        }
    }

    /// True if any parameter has turned NaN (post-update blow-up check).
    pub fn has_nan(&self) -> bool {
        self.w.iter().any(|x| x.is_nan())
            || self.a.iter().any(|x| x.is_nan())
            || self.b.iter().any(|x| x.is_nan())
    }

    /// Grow the hidden layer to `new_hidden` units, keeping the trained
    /// blocks and zero-filling the new rows. Zero rows leave every amplitude
    /// unchanged (cosh 0 = 1), so the represented state is preserved.
    pub fn conservative_resize(&mut self, new_hidden: usize) {
        assert!(new_hidden >= self.m);
        let mut b = DVector::zeros(new_hidden);
        b.rows_mut(0, self.m).copy_from(&self.b);
        let mut w = DMatrix::zeros(new_hidden, self.n);
        w.view_mut((0, 0), (self.m, self.n)).copy_from(&self.w);
        self.m = new_hidden;
        self.b = b;
        self.w = w;
    }
}

impl<T: Scalar> PartialEq for Rbm<T> {
    /// Machines are equal only when shape, bias flag, and all three
    /// parameter blocks match.
    fn eq(&self, other: &Self) -> bool {
        self.n == other.n
            && self.m == other.m
            && self.use_bias == other.use_bias
            && self.w == other.w
            && self.a == other.a
            && self.b == other.b
    }
}

/// Enumerate Ψ over the full 2ⁿ basis, optionally normalized.
///
/// Basis indices are computed independently in parallel; the machine is only
/// read.
pub fn get_psi<T: Scalar>(machine: &Rbm<T>, normalize: bool) -> DVector<T> {
    let words = full_basis(machine.visible());
    get_psi_over(machine, &words, normalize)
}

/// Enumerate Ψ over an explicit list of basis words.
pub fn get_psi_over<T: Scalar>(machine: &Rbm<T>, basis: &[u32], normalize: bool) -> DVector<T> {
    let amps: Vec<T> = basis
        .par_iter()
        .map(|&word| {
            let sigma = word_to_sigma(machine.visible(), word);
            let theta = machine.calc_theta(&sigma);
            machine.amplitude(&sigma, &theta)
        })
        .collect();
    let mut psi = DVector::from_vec(amps);
    if normalize {
        let norm = psi.norm();
        if norm > 0.0 {
            psi.unscale_mut(norm);
        }
    }
    psi
}
