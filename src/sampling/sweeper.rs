//! Move proposal strategies for the Metropolis samplers.
//!
//! A sweeper only proposes; acceptance and state mutation stay in the
//! sampler. Proposal distributions must be symmetric so the plain
//! Metropolis acceptance rule applies.

use nalgebra::DVector;
use rand::Rng;

/// A proposed spin move, expressed as the set of sites to flip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proposal {
    /// Flip one site.
    Site(usize),
    /// Flip two distinct sites together.
    Pair(usize, usize),
    /// Flip an arbitrary set of sites; empty means no admissible move.
    Set(Vec<usize>),
}

/// Proposal strategy over configurations of a fixed number of sites.
pub trait Sweeper: Send + Sync {
    fn propose<R: Rng + ?Sized>(&self, sigma: &DVector<i32>, rng: &mut R) -> Proposal;
}

/// Uniform single-site flips; explores the full 2ⁿ configuration space.
#[derive(Debug, Clone)]
pub struct LocalSweeper {
    n: usize,
}

impl LocalSweeper {
    pub fn new(n: usize) -> Self {
        assert!(n >= 1);
        Self { n }
    }
}

impl Sweeper for LocalSweeper {
    fn propose<R: Rng + ?Sized>(&self, _sigma: &DVector<i32>, rng: &mut R) -> Proposal {
        Proposal::Site(rng.gen_range(0..self.n))
    }
}

/// Exchange moves: flip one up and one down spin together, conserving
/// total magnetization. Used with sector-conserving Hamiltonians.
#[derive(Debug, Clone)]
pub struct SwapSweeper {
    n: usize,
}

impl SwapSweeper {
    pub fn new(n: usize) -> Self {
        assert!(n >= 2);
        Self { n }
    }
}

impl Sweeper for SwapSweeper {
    fn propose<R: Rng + ?Sized>(&self, sigma: &DVector<i32>, rng: &mut R) -> Proposal {
        // a fully polarized configuration has no exchange move at all
        let first = sigma[0];
        if sigma.iter().all(|&s| s == first) {
            return Proposal::Set(Vec::new());
        }
        loop {
            let k = rng.gen_range(0..self.n);
            let l = rng.gen_range(0..self.n);
            if sigma[k] != sigma[l] {
                return Proposal::Pair(k, l);
            }
        }
    }
}

/// Moves drawn uniformly from a fixed list of flip sets, typically a
/// Hamiltonian's [`flip_list`](crate::systems::Hamiltonian::flip_list).
/// The list must connect the configuration space of interest.
#[derive(Debug, Clone)]
pub struct FlipListSweeper {
    flips: Vec<Vec<usize>>,
}

impl FlipListSweeper {
    pub fn new(flips: Vec<Vec<usize>>) -> Self {
        assert!(!flips.is_empty(), "the flip list may not be empty");
        Self { flips }
    }
}

impl Sweeper for FlipListSweeper {
    fn propose<R: Rng + ?Sized>(&self, _sigma: &DVector<i32>, rng: &mut R) -> Proposal {
        let pick = &self.flips[rng.gen_range(0..self.flips.len())];
        match pick.as_slice() {
            &[k] => Proposal::Site(k),
            &[k, l] => Proposal::Pair(k, l),
            set => Proposal::Set(set.to_vec()),
        }
    }
}
