//! Single-chain Metropolis sampler targeting |Ψ|^{2β}.
//!
//! The walker state carries the incremental field cache, so every proposal
//! is scored from the closed-form flip ratios without recomputing Wσ. The
//! machine is only borrowed; parameter updates happen between sampling
//! passes, never during one.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::sweeper::{Proposal, Sweeper};
use crate::wavefunction::{Rbm, Sample, Scalar, SpinState, StateValue};

/// SplitMix64 finalizer; decorrelates per-chain seeds derived from one
/// master seed.
fn split_mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

/// Deterministic sub-seed for chain or iteration `stream` of `seed`.
pub fn chain_seed(seed: u64, stream: u64) -> u64 {
    split_mix(seed.wrapping_add(stream.wrapping_mul(0x9e3779b97f4a7c15)))
}

/// Metropolis walker over one Markov chain.
pub struct Sampler<'a, T: Scalar, S: Sweeper> {
    state: StateValue<'a, T>,
    sweeper: S,
    beta: f64,
    rng: StdRng,
    accepted: u64,
    attempted: u64,
}

impl<'a, T: Scalar, S: Sweeper> Sampler<'a, T, S> {
    /// Start a chain at a uniformly random configuration.
    pub fn new(machine: &'a Rbm<T>, sweeper: S, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let state = StateValue::new_random(machine, &mut rng);
        Self {
            state,
            sweeper,
            beta: 1.0,
            rng,
            accepted: 0,
            attempted: 0,
        }
    }

    /// Inverse-temperature exponent: the chain targets |Ψ|^{2β}.
    pub fn with_beta(mut self, beta: f64) -> Self {
        assert!(beta > 0.0 && beta <= 1.0);
        self.beta = beta;
        self
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Current walker state.
    pub fn state(&self) -> &StateValue<'a, T> {
        &self.state
    }

    /// Restart from a uniformly random configuration.
    pub fn randomize(&mut self) {
        let sigma = crate::basis::random_sigma(self.state.machine().visible(), &mut self.rng);
        self.state.set_sigma(sigma);
    }

    /// Restart from a random configuration with `n_up` up spins.
    pub fn randomize_jz(&mut self, n_up: usize) {
        let sigma =
            crate::basis::random_sigma_jz(self.state.machine().visible(), n_up, &mut self.rng);
        self.state.set_sigma(sigma);
    }

    /// One proposal, accepted with min(1, |R|^{2β}). An empty proposal
    /// means the sweeper found no admissible move; it counts as rejected.
    pub fn attempt_move(&mut self) -> bool {
        let proposal = self.sweeper.propose(self.state.sigma(), &mut self.rng);
        self.attempted += 1;
        if matches!(&proposal, Proposal::Set(sites) if sites.is_empty()) {
            return false;
        }
        let log_ratio = match &proposal {
            Proposal::Site(k) => self.state.log_ratio(*k),
            Proposal::Pair(k, l) => self.state.log_ratio_pair(*k, *l),
            Proposal::Set(sites) => self.state.log_ratio_set(sites),
        };
        let log_accept = 2.0 * self.beta * log_ratio.real();
        // draw only when the move can actually be rejected
        if log_accept >= 0.0 || self.rng.gen::<f64>() < log_accept.exp() {
            match proposal {
                Proposal::Site(k) => self.state.flip(k),
                Proposal::Pair(k, l) => self.state.flip_pair(k, l),
                Proposal::Set(sites) => self.state.flip_set(&sites),
            }
            self.accepted += 1;
            true
        } else {
            false
        }
    }

    /// One sweep = one proposal per lattice site.
    pub fn sweep(&mut self) -> usize {
        let mut accepted = 0;
        for _ in 0..self.state.machine().visible() {
            if self.attempt_move() {
                accepted += 1;
            }
        }
        accepted
    }

    /// Thermalize, then record one sample per sweep.
    pub fn sample(&mut self, n_therm: usize, n_sweeps: usize) -> Vec<Sample<T>> {
        for _ in 0..n_therm {
            self.sweep();
        }
        let mut out = Vec::with_capacity(n_sweeps);
        for _ in 0..n_sweeps {
            self.sweep();
            out.push(self.state.to_sample());
        }
        out
    }

    /// Fraction of proposals accepted since construction.
    pub fn acceptance(&self) -> f64 {
        if self.attempted == 0 {
            return 0.0;
        }
        self.accepted as f64 / self.attempted as f64
    }

    /// Re ln Ψ of the current configuration (= ln |Ψ|).
    pub(crate) fn log_amplitude_re(&self) -> f64 {
        self.state.log_amplitude().real()
    }

    pub(crate) fn uniform(&mut self) -> f64 {
        self.rng.gen()
    }

    /// Hand this chain's walker to another chain, keeping both caches
    /// intact. The β values stay with their slots.
    pub(crate) fn exchange_with(&mut self, other: &mut Self) {
        self.state.exchange(&mut other.state);
    }
}
