//! Spin-basis enumeration and word/configuration conversions.
//!
//! A configuration of n ≤ 31 Ising spins is packed into a `u32` word, bit i
//! set meaning σ_i = +1. Full-basis enumeration walks all 2ⁿ words; the
//! magnetization-resolved [`BasisJz`] iterator walks only the words with a
//! fixed number of up spins, in ascending word order.

use nalgebra::DVector;
use rand::Rng;

/// Unpack a basis word into a ±1 spin vector.
pub fn word_to_sigma(n: usize, word: u32) -> DVector<i32> {
    DVector::from_fn(n, |i, _| if word >> i & 1 == 1 { 1 } else { -1 })
}

/// Pack a ±1 spin vector into a basis word.
pub fn sigma_to_word(sigma: &DVector<i32>) -> u32 {
    assert!(sigma.len() < 32);
    let mut word = 0u32;
    for i in 0..sigma.len() {
        if sigma[i] > 0 {
            word |= 1 << i;
        }
    }
    word
}

/// All 2ⁿ basis words in ascending order.
pub fn full_basis(n: usize) -> Vec<u32> {
    assert!(n >= 1 && n < 32);
    (0..1u32 << n).collect()
}

/// Iterator over basis words with exactly `n_up` up spins, ascending.
///
/// Successors are generated with Gosper's hack, so the walk is O(1) per word
/// with no allocation.
pub struct BasisJz {
    n: usize,
    next: Option<u32>,
}

impl BasisJz {
    pub fn new(n: usize, n_up: usize) -> Self {
        assert!(n >= 1 && n < 32);
        assert!(n_up <= n, "cannot place {} up spins on {} sites", n_up, n);
        let first = if n_up == 0 { 0 } else { (1u32 << n_up) - 1 };
        Self { n, next: Some(first) }
    }
}

impl Iterator for BasisJz {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let cur = self.next?;
        self.next = if cur == 0 {
            None
        } else {
            let c = cur & cur.wrapping_neg();
            let r = cur + c;
            let candidate = (((r ^ cur) >> 2) / c) | r;
            if candidate < 1u32 << self.n {
                Some(candidate)
            } else {
                None
            }
        };
        Some(cur)
    }
}

/// Collect the fixed-magnetization sector into a vector.
pub fn basis_jz(n: usize, n_up: usize) -> Vec<u32> {
    BasisJz::new(n, n_up).collect()
}

/// Draw a uniformly random ±1 configuration.
pub fn random_sigma<R: Rng + ?Sized>(n: usize, rng: &mut R) -> DVector<i32> {
    DVector::from_fn(n, |_, _| if rng.gen::<bool>() { 1 } else { -1 })
}

/// Draw a random configuration with exactly `n_up` up spins.
pub fn random_sigma_jz<R: Rng + ?Sized>(n: usize, n_up: usize, rng: &mut R) -> DVector<i32> {
    assert!(n_up <= n, "cannot place {} up spins on {} sites", n_up, n);
    let mut sigma = DVector::from_element(n, -1);
    for idx in rand::seq::index::sample(rng, n, n_up) {
        sigma[idx] = 1;
    }
    sigma
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn binomial(n: usize, k: usize) -> usize {
        if k > n {
            return 0;
        }
        let mut num = 1usize;
        let mut den = 1usize;
        for i in 0..k.min(n - k) {
            num *= n - i;
            den *= i + 1;
        }
        num / den
    }

    #[test]
    fn test_word_sigma_round_trip() {
        for word in full_basis(5) {
            let sigma = word_to_sigma(5, word);
            assert!(sigma.iter().all(|&s| s == 1 || s == -1));
            assert_eq!(sigma_to_word(&sigma), word);
        }
    }

    #[test]
    fn test_full_basis_size_and_order() {
        let words = full_basis(6);
        assert_eq!(words.len(), 64);
        assert!(words.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_basis_jz_counts() {
        for n in 1..8 {
            for n_up in 0..=n {
                let words = basis_jz(n, n_up);
                assert_eq!(words.len(), binomial(n, n_up), "n={} n_up={}", n, n_up);
                assert!(words.iter().all(|w| w.count_ones() as usize == n_up));
                assert!(words.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }

    #[test]
    fn test_basis_jz_edge_sectors() {
        assert_eq!(basis_jz(5, 0), vec![0]);
        assert_eq!(basis_jz(5, 5), vec![0b11111]);
    }

    #[test]
    fn test_random_sigma_jz_magnetization() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let sigma = random_sigma_jz(8, 3, &mut rng);
            let ups = sigma.iter().filter(|&&s| s == 1).count();
            assert_eq!(ups, 3);
        }
    }
}
