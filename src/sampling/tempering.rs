//! Parallel tempering over a ladder of flattened distributions.
//!
//! Chain i targets |Ψ|^{2β_i} with β_i = 1 − i/num_chains, so chain 0 is
//! the physical distribution and later chains mix faster. After every sweep
//! an exchange pass walks adjacent pairs with alternating parity and swaps
//! walkers with the tempering acceptance rule. Only chain 0 is recorded.

use rayon::prelude::*;

use super::sampler::{chain_seed, Sampler};
use super::sweeper::Sweeper;
use crate::wavefunction::{Rbm, Sample, Scalar, StateValue};

/// Replica-exchange Metropolis sampler.
pub struct SamplerPt<'a, T: Scalar, S: Sweeper + Clone> {
    chains: Vec<Sampler<'a, T, S>>,
    /// Starting offset of the next exchange pass, alternating 0/1.
    parity: bool,
    swaps_accepted: u64,
    swaps_attempted: u64,
}

impl<'a, T: Scalar, S: Sweeper + Clone> SamplerPt<'a, T, S> {
    /// Build `num_chains` chains with deterministically derived sub-seeds.
    pub fn new(machine: &'a Rbm<T>, sweeper: S, num_chains: usize, seed: u64) -> Self {
        assert!(num_chains >= 2, "tempering needs at least two chains");
        let chains = (0..num_chains)
            .map(|i| {
                let beta = 1.0 - i as f64 / num_chains as f64;
                Sampler::new(machine, sweeper.clone(), chain_seed(seed, i as u64))
                    .with_beta(beta)
            })
            .collect();
        Self {
            chains,
            parity: false,
            swaps_accepted: 0,
            swaps_attempted: 0,
        }
    }

    pub fn num_chains(&self) -> usize {
        self.chains.len()
    }

    pub fn chains(&self) -> &[Sampler<'a, T, S>] {
        &self.chains
    }

    /// Physical-chain walker state.
    pub fn state(&self) -> &StateValue<'a, T> {
        self.chains[0].state()
    }

    /// Restart every chain from an independent random configuration.
    pub fn randomize(&mut self) {
        for chain in &mut self.chains {
            chain.randomize();
        }
    }

    /// Restart every chain in the fixed-magnetization sector.
    pub fn randomize_jz(&mut self, n_up: usize) {
        for chain in &mut self.chains {
            chain.randomize_jz(n_up);
        }
    }

    /// One sweep on every chain, then one exchange pass.
    ///
    /// Chains touch disjoint state and own their generators, so the
    /// parallel phase is deterministic for a fixed seed.
    pub fn sweep(&mut self) {
        self.chains.par_iter_mut().for_each(|chain| {
            chain.sweep();
        });
        self.exchange_pass();
    }

    fn exchange_pass(&mut self) {
        let start = usize::from(self.parity);
        self.parity = !self.parity;
        let mut i = start;
        while i + 1 < self.chains.len() {
            let (left, right) = self.chains.split_at_mut(i + 1);
            let a = &mut left[i];
            let b = &mut right[0];
            // min(1, exp(2(β_i − β_{i+1})(ln|Ψ(σ_{i+1})| − ln|Ψ(σ_i)|)))
            let log_accept =
                2.0 * (a.beta() - b.beta()) * (b.log_amplitude_re() - a.log_amplitude_re());
            self.swaps_attempted += 1;
            if log_accept >= 0.0 || a.uniform() < log_accept.exp() {
                a.exchange_with(b);
                self.swaps_accepted += 1;
            }
            i += 2;
        }
    }

    /// Thermalize, then record one physical-chain sample per sweep.
    pub fn sample(&mut self, n_therm: usize, n_sweeps: usize) -> Vec<Sample<T>> {
        for _ in 0..n_therm {
            self.sweep();
        }
        let mut out = Vec::with_capacity(n_sweeps);
        for _ in 0..n_sweeps {
            self.sweep();
            out.push(self.chains[0].state().to_sample());
        }
        out
    }

    /// Move acceptance of the physical chain.
    pub fn acceptance(&self) -> f64 {
        self.chains[0].acceptance()
    }

    /// Fraction of attempted replica exchanges that were accepted.
    pub fn swap_acceptance(&self) -> f64 {
        if self.swaps_attempted == 0 {
            return 0.0;
        }
        self.swaps_accepted as f64 / self.swaps_attempted as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::{full_basis, sigma_to_word};
    use crate::sampling::sweeper::LocalSweeper;
    use crate::wavefunction::get_psi;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn trained_machine(n: usize, m: usize, seed: u64) -> Rbm<f64> {
        let mut qs = Rbm::new(n, m, true);
        qs.init_random(&mut StdRng::seed_from_u64(seed), 0.4);
        qs
    }

    #[test]
    fn test_beta_ladder() {
        let qs = trained_machine(4, 4, 301);
        let pt = SamplerPt::new(&qs, LocalSweeper::new(4), 4, 302);
        let betas: Vec<f64> = pt.chains().iter().map(|c| c.beta()).collect();
        assert_relative_eq!(betas[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(betas[1], 0.75, epsilon = 1e-12);
        assert_relative_eq!(betas[2], 0.5, epsilon = 1e-12);
        assert_relative_eq!(betas[3], 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_exchange_preserves_cache_invariant() {
        let qs = trained_machine(6, 6, 311);
        let mut pt = SamplerPt::new(&qs, LocalSweeper::new(6), 4, 312);
        for _ in 0..25 {
            pt.sweep();
        }
        assert!(pt.swaps_attempted > 0);
        for chain in pt.chains() {
            let st = chain.state();
            let fresh = qs.calc_theta(st.sigma());
            for j in 0..6 {
                assert_relative_eq!(st.theta()[j], fresh[j], epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_physical_chain_matches_born_rule() {
        let n = 3;
        let qs = trained_machine(n, 4, 321);
        let psi = get_psi(&qs, true);
        let p_exact: Vec<f64> = psi.iter().map(|a| a * a).collect();

        let mut pt = SamplerPt::new(&qs, LocalSweeper::new(n), 3, 322);
        let total = 40_000;
        let samples = pt.sample(500, total);
        let mut counts = vec![0usize; 1 << n];
        for s in &samples {
            counts[sigma_to_word(&s.sigma) as usize] += 1;
        }

        let mut tv = 0.0;
        for (k, _) in full_basis(n).iter().enumerate() {
            tv += (counts[k] as f64 / total as f64 - p_exact[k]).abs();
        }
        assert!(tv / 2.0 < 0.02, "total variation distance too large: {}", tv / 2.0);
    }

    #[test]
    fn test_same_seed_reproduces_samples() {
        let qs = trained_machine(5, 5, 331);
        let mut a = SamplerPt::new(&qs, LocalSweeper::new(5), 3, 332);
        let mut b = SamplerPt::new(&qs, LocalSweeper::new(5), 3, 332);
        let sa = a.sample(20, 50);
        let sb = b.sample(20, 50);
        for (x, y) in sa.iter().zip(&sb) {
            assert_eq!(x.sigma, y.sigma);
        }
    }

    #[test]
    fn test_swap_rate_is_positive() {
        let qs = trained_machine(5, 5, 341);
        let mut pt = SamplerPt::new(&qs, LocalSweeper::new(5), 4, 342);
        pt.sample(50, 200);
        let rate = pt.swap_acceptance();
        assert!(rate > 0.0 && rate <= 1.0, "swap rate {}", rate);
    }
}
