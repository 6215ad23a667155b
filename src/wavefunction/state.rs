//! Incremental RBM evaluation state.
//!
//! A state pins a machine reference together with a configuration σ and the
//! cached hidden field θ = Wσ + b. Flips update θ in O(hidden) per site
//! instead of recomputing the full matrix product, and amplitude ratios for
//! proposed flips come from closed forms evaluated on the cache alone.
//!
//! [`StateValue`] owns its σ/θ pair and is the mutable walker state used by
//! the samplers; [`StateRef`] borrows σ/θ from collected samples so the
//! estimator passes can reuse the same ratio formulas without copying.

use nalgebra::DVector;
use rand::Rng;

use super::rbm::Rbm;
use super::scalar::Scalar;
use crate::basis::{random_sigma, random_sigma_jz, sigma_to_word, word_to_sigma};

/// One recorded walker configuration with its hidden field.
#[derive(Debug, Clone)]
pub struct Sample<T: Scalar> {
    pub sigma: DVector<i32>,
    pub theta: DVector<T>,
}

/// Read access to a (σ, θ) pair plus the flip-ratio closed forms.
pub trait SpinState<T: Scalar> {
    fn machine(&self) -> &Rbm<T>;
    fn sigma(&self) -> &DVector<i32>;
    fn theta_at(&self, j: usize) -> T;

    fn sigma_at(&self, k: usize) -> i32 {
        self.sigma()[k]
    }

    fn n_sites(&self) -> usize {
        self.machine().visible()
    }

    fn n_hidden(&self) -> usize {
        self.machine().hidden()
    }

    /// ln [Ψ(σ with site k flipped) / Ψ(σ)].
    fn log_ratio(&self, k: usize) -> T {
        let qs = self.machine();
        let sk = T::from_real(-2.0 * self.sigma_at(k) as f64);
        let mut res = sk * qs.a(k);
        for j in 0..self.n_hidden() {
            let t = self.theta_at(j);
            res += (t + sk * qs.w(j, k)).log_cosh() - t.log_cosh();
        }
        res
    }

    /// Ψ(σ with site k flipped) / Ψ(σ).
    fn ratio(&self, k: usize) -> T {
        self.log_ratio(k).exp()
    }

    /// ln ratio for flipping two distinct sites together.
    fn log_ratio_pair(&self, k: usize, l: usize) -> T {
        let qs = self.machine();
        let sk = T::from_real(-2.0 * self.sigma_at(k) as f64);
        let sl = T::from_real(-2.0 * self.sigma_at(l) as f64);
        let mut res = sk * qs.a(k) + sl * qs.a(l);
        for j in 0..self.n_hidden() {
            let t = self.theta_at(j);
            res += (t + sk * qs.w(j, k) + sl * qs.w(j, l)).log_cosh() - t.log_cosh();
        }
        res
    }

    /// Ψ ratio for flipping two distinct sites together.
    fn ratio_pair(&self, k: usize, l: usize) -> T {
        self.log_ratio_pair(k, l).exp()
    }

    /// ln ratio for flipping an arbitrary set of distinct sites.
    fn log_ratio_set(&self, sites: &[usize]) -> T {
        let qs = self.machine();
        let mut res = T::from_real(0.0);
        for &k in sites {
            res += T::from_real(-2.0 * self.sigma_at(k) as f64) * qs.a(k);
        }
        for j in 0..self.n_hidden() {
            let t = self.theta_at(j);
            let mut shifted = t;
            for &k in sites {
                shifted += T::from_real(-2.0 * self.sigma_at(k) as f64) * qs.w(j, k);
            }
            res += shifted.log_cosh() - t.log_cosh();
        }
        res
    }

    /// ln [Ψ(target) / Ψ(σ)] for any configuration, via its flip set.
    fn log_ratio_to(&self, target: &DVector<i32>) -> T {
        let diff: Vec<usize> = (0..self.n_sites())
            .filter(|&i| self.sigma_at(i) != target[i])
            .collect();
        self.log_ratio_set(&diff)
    }
}

/// Owning evaluation state: the walker of a Markov chain.
#[derive(Debug, Clone)]
pub struct StateValue<'a, T: Scalar> {
    machine: &'a Rbm<T>,
    sigma: DVector<i32>,
    theta: DVector<T>,
}

impl<'a, T: Scalar> StateValue<'a, T> {
    /// Pin a machine to a configuration, computing the field from scratch.
    pub fn new(machine: &'a Rbm<T>, sigma: DVector<i32>) -> Self {
        assert_eq!(sigma.len(), machine.visible());
        let theta = machine.calc_theta(&sigma);
        Self { machine, sigma, theta }
    }

    /// Start from a packed basis word.
    pub fn from_word(machine: &'a Rbm<T>, word: u32) -> Self {
        Self::new(machine, word_to_sigma(machine.visible(), word))
    }

    /// Start from a uniformly random configuration.
    pub fn new_random<R: Rng + ?Sized>(machine: &'a Rbm<T>, rng: &mut R) -> Self {
        Self::new(machine, random_sigma(machine.visible(), rng))
    }

    /// Start from a random configuration with fixed magnetization.
    pub fn new_random_jz<R: Rng + ?Sized>(
        machine: &'a Rbm<T>,
        n_up: usize,
        rng: &mut R,
    ) -> Self {
        Self::new(machine, random_sigma_jz(machine.visible(), n_up, rng))
    }

    /// Current configuration.
    pub fn sigma(&self) -> &DVector<i32> {
        &self.sigma
    }

    /// Cached hidden field.
    pub fn theta(&self) -> &DVector<T> {
        &self.theta
    }

    /// Current configuration as a packed word.
    pub fn word(&self) -> u32 {
        sigma_to_word(&self.sigma)
    }

    /// Flip site k, updating the field incrementally.
    pub fn flip(&mut self, k: usize) {
        let sk = T::from_real(-2.0 * self.sigma[k] as f64);
        for j in 0..self.machine.hidden() {
            self.theta[j] += sk * self.machine.w(j, k);
        }
        self.sigma[k] = -self.sigma[k];
    }

    /// Flip two distinct sites, updating the field incrementally.
    pub fn flip_pair(&mut self, k: usize, l: usize) {
        debug_assert_ne!(k, l);
        let sk = T::from_real(-2.0 * self.sigma[k] as f64);
        let sl = T::from_real(-2.0 * self.sigma[l] as f64);
        for j in 0..self.machine.hidden() {
            self.theta[j] += sk * self.machine.w(j, k) + sl * self.machine.w(j, l);
        }
        self.sigma[k] = -self.sigma[k];
        self.sigma[l] = -self.sigma[l];
    }

    /// Flip an arbitrary set of distinct sites.
    pub fn flip_set(&mut self, sites: &[usize]) {
        for j in 0..self.machine.hidden() {
            let mut shift = T::from_real(0.0);
            for &k in sites {
                shift += T::from_real(-2.0 * self.sigma[k] as f64) * self.machine.w(j, k);
            }
            self.theta[j] += shift;
        }
        for &k in sites {
            self.sigma[k] = -self.sigma[k];
        }
    }

    /// Replace the configuration wholesale, recomputing the field.
    pub fn set_sigma(&mut self, sigma: DVector<i32>) {
        assert_eq!(sigma.len(), self.machine.visible());
        self.theta = self.machine.calc_theta(&sigma);
        self.sigma = sigma;
    }

    /// Replace the configuration from a packed word.
    pub fn set_word(&mut self, word: u32) {
        self.set_sigma(word_to_sigma(self.machine.visible(), word));
    }

    /// ln Ψ of the current configuration.
    pub fn log_amplitude(&self) -> T {
        self.machine.log_amplitude(&self.sigma, &self.theta)
    }

    /// Ψ of the current configuration.
    pub fn amplitude(&self) -> T {
        self.machine.amplitude(&self.sigma, &self.theta)
    }

    /// Swap configurations and fields with another state of the same machine.
    ///
    /// Both caches stay consistent because σ and θ move together.
    pub fn exchange(&mut self, other: &mut Self) {
        assert!(
            std::ptr::eq(self.machine, other.machine),
            "cannot exchange states of different machines"
        );
        std::mem::swap(&mut self.sigma, &mut other.sigma);
        std::mem::swap(&mut self.theta, &mut other.theta);
    }

    /// Clone the current (σ, θ) pair out of the walker.
    pub fn to_sample(&self) -> Sample<T> {
        Sample {
            sigma: self.sigma.clone(),
            theta: self.theta.clone(),
        }
    }
}

impl<T: Scalar> SpinState<T> for StateValue<'_, T> {
    fn machine(&self) -> &Rbm<T> {
        self.machine
    }

    fn sigma(&self) -> &DVector<i32> {
        &self.sigma
    }

    fn theta_at(&self, j: usize) -> T {
        self.theta[j]
    }
}

/// Borrowing evaluation state over a recorded sample.
#[derive(Debug, Clone, Copy)]
pub struct StateRef<'a, T: Scalar> {
    machine: &'a Rbm<T>,
    sigma: &'a DVector<i32>,
    theta: &'a DVector<T>,
}

impl<'a, T: Scalar> StateRef<'a, T> {
    pub fn new(machine: &'a Rbm<T>, sigma: &'a DVector<i32>, theta: &'a DVector<T>) -> Self {
        Self { machine, sigma, theta }
    }

    pub fn over_sample(machine: &'a Rbm<T>, sample: &'a Sample<T>) -> Self {
        Self::new(machine, &sample.sigma, &sample.theta)
    }
}

impl<T: Scalar> SpinState<T> for StateRef<'_, T> {
    fn machine(&self) -> &Rbm<T> {
        self.machine
    }

    fn sigma(&self) -> &DVector<i32> {
        self.sigma
    }

    fn theta_at(&self, j: usize) -> T {
        self.theta[j]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use num_complex::Complex64;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn real_machine(n: usize, m: usize, seed: u64) -> Rbm<f64> {
        let mut qs = Rbm::new(n, m, true);
        qs.init_random(&mut StdRng::seed_from_u64(seed), 0.2);
        qs
    }

    fn complex_machine(n: usize, m: usize, seed: u64) -> Rbm<Complex64> {
        let mut qs = Rbm::new(n, m, true);
        qs.init_random(&mut StdRng::seed_from_u64(seed), 0.2);
        qs
    }

    #[test]
    fn test_flip_chain_keeps_cache_consistent() {
        let qs = real_machine(6, 8, 101);
        let mut rng = StdRng::seed_from_u64(102);
        let mut st = StateValue::new_random(&qs, &mut rng);
        for _ in 0..50 {
            st.flip(rng.gen_range(0..6));
            let fresh = qs.calc_theta(st.sigma());
            for j in 0..8 {
                assert_relative_eq!(st.theta()[j], fresh[j], epsilon = 1e-10);
            }
            assert_relative_eq!(
                st.log_amplitude(),
                qs.log_amplitude(st.sigma(), &fresh),
                epsilon = 1e-10
            );
        }
    }

    #[test]
    fn test_flip_chain_complex_cache() {
        let qs = complex_machine(5, 6, 111);
        let mut rng = StdRng::seed_from_u64(112);
        let mut st = StateValue::new_random(&qs, &mut rng);
        for _ in 0..40 {
            st.flip(rng.gen_range(0..5));
        }
        let fresh = qs.calc_theta(st.sigma());
        for j in 0..6 {
            assert!((st.theta()[j] - fresh[j]).norm() < 1e-10);
        }
    }

    #[test]
    fn test_log_ratio_matches_amplitude_difference() {
        let qs = real_machine(5, 7, 121);
        let mut rng = StdRng::seed_from_u64(122);
        let st = StateValue::new_random(&qs, &mut rng);
        for k in 0..5 {
            let mut flipped = st.clone();
            flipped.flip(k);
            let expect = flipped.log_amplitude() - st.log_amplitude();
            assert_relative_eq!(st.log_ratio(k), expect, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_log_ratio_pair_and_set() {
        let qs = real_machine(6, 5, 131);
        let mut rng = StdRng::seed_from_u64(132);
        let st = StateValue::new_random(&qs, &mut rng);

        let mut flipped = st.clone();
        flipped.flip_pair(1, 4);
        let expect = flipped.log_amplitude() - st.log_amplitude();
        assert_relative_eq!(st.log_ratio_pair(1, 4), expect, epsilon = 1e-10);

        let sites = [0, 2, 5];
        let mut flipped = st.clone();
        flipped.flip_set(&sites);
        let expect = flipped.log_amplitude() - st.log_amplitude();
        assert_relative_eq!(st.log_ratio_set(&sites), expect, epsilon = 1e-10);
    }

    #[test]
    fn test_complex_ratio_matches_amplitude_quotient() {
        // compare through exp() so ln-branch offsets cannot trip the test
        let qs = complex_machine(5, 5, 141);
        let mut rng = StdRng::seed_from_u64(142);
        let st = StateValue::new_random(&qs, &mut rng);
        for k in 0..5 {
            let mut flipped = st.clone();
            flipped.flip(k);
            let expect = flipped.amplitude() / st.amplitude();
            assert!((st.ratio(k) - expect).norm() < 1e-10 * expect.norm().max(1.0));
        }
    }

    #[test]
    fn test_flip_pair_equals_two_flips() {
        let qs = real_machine(6, 6, 151);
        let mut rng = StdRng::seed_from_u64(152);
        let mut a = StateValue::new_random(&qs, &mut rng);
        let mut b = a.clone();
        a.flip_pair(2, 5);
        b.flip(2);
        b.flip(5);
        assert_eq!(a.sigma(), b.sigma());
        for j in 0..6 {
            assert_relative_eq!(a.theta()[j], b.theta()[j], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_log_ratio_to_arbitrary_target() {
        let qs = real_machine(7, 4, 161);
        let mut rng = StdRng::seed_from_u64(162);
        let st = StateValue::new_random(&qs, &mut rng);
        let target = crate::basis::random_sigma(7, &mut rng);
        let fresh = StateValue::new(&qs, target.clone());
        let expect = fresh.log_amplitude() - st.log_amplitude();
        assert_relative_eq!(st.log_ratio_to(&target), expect, epsilon = 1e-10);
        // identical target gives exactly zero
        assert_eq!(st.log_ratio_to(st.sigma()), 0.0);
    }

    #[test]
    fn test_exchange_swaps_whole_cache() {
        let qs = real_machine(5, 5, 171);
        let mut rng = StdRng::seed_from_u64(172);
        let mut a = StateValue::new_random(&qs, &mut rng);
        let mut b = StateValue::new_random(&qs, &mut rng);
        let (wa, wb) = (a.word(), b.word());
        a.exchange(&mut b);
        assert_eq!(a.word(), wb);
        assert_eq!(b.word(), wa);
        // both caches still match their configurations
        let fa = qs.calc_theta(a.sigma());
        let fb = qs.calc_theta(b.sigma());
        for j in 0..5 {
            assert_relative_eq!(a.theta()[j], fa[j], epsilon = 1e-12);
            assert_relative_eq!(b.theta()[j], fb[j], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_state_ref_agrees_with_state_value() {
        let qs = real_machine(5, 6, 181);
        let mut rng = StdRng::seed_from_u64(182);
        let st = StateValue::new_random(&qs, &mut rng);
        let sample = st.to_sample();
        let r = StateRef::over_sample(&qs, &sample);
        for k in 0..5 {
            assert_relative_eq!(r.log_ratio(k), st.log_ratio(k), epsilon = 1e-14);
        }
    }

    #[test]
    fn test_set_sigma_recomputes_field() {
        let qs = real_machine(5, 5, 191);
        let mut rng = StdRng::seed_from_u64(192);
        let mut st = StateValue::new_random(&qs, &mut rng);
        let target = crate::basis::random_sigma(5, &mut rng);
        st.set_sigma(target.clone());
        assert_eq!(st.sigma(), &target);
        let fresh = qs.calc_theta(&target);
        for j in 0..5 {
            assert_relative_eq!(st.theta()[j], fresh[j], epsilon = 1e-12);
        }
    }
}
