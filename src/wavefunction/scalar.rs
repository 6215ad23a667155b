//! Scalar abstraction over real and complex wavefunction coefficients.
//!
//! The RBM machinery is generic over the coefficient field: `f64` for
//! positive-definite (Marshall-sign) wavefunctions and `Complex64` for
//! genuinely complex ones. Both share the exact same formulas; only random
//! initialization and conjugation differ.

use nalgebra::ComplexField;
use num_complex::Complex64;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::LN_2;

/// Coefficient scalar of an RBM wavefunction.
///
/// Implemented for `f64` and [`Complex64`]. The `ComplexField` supertrait
/// supplies the shared arithmetic (`exp`, `ln`, `tanh`, `conjugate`, ...);
/// this trait adds the few operations where the real and complex cases
/// genuinely differ.
pub trait Scalar:
    nalgebra::Scalar + ComplexField<RealField = f64> + Copy + Send + Sync
{
    /// Number of real components (1 for `f64`, 2 for `Complex64`).
    const COMPONENTS: usize;

    /// Draw one coefficient for random initialization: a single normal
    /// deviate for reals, an independent pair for complex.
    fn draw_normal<R: Rng + ?Sized>(rng: &mut R, normal: &Normal<f64>) -> Self;

    /// Numerically stable ln cosh.
    fn log_cosh(self) -> Self;

    /// True if any component is NaN.
    fn is_nan(self) -> bool;

    /// Decompose into (re, im); im is zero for reals.
    fn to_parts(self) -> (f64, f64);

    /// Rebuild from (re, im); the imaginary part must be zero for reals.
    fn from_parts(re: f64, im: f64) -> Self;
}

impl Scalar for f64 {
    const COMPONENTS: usize = 1;

    fn draw_normal<R: Rng + ?Sized>(rng: &mut R, normal: &Normal<f64>) -> Self {
        normal.sample(rng)
    }

    fn log_cosh(self) -> Self {
        // ln cosh x = |x| + ln(1 + e^(-2|x|)) - ln 2, overflow-free for any x
        let t = self.abs();
        t + (-2.0 * t).exp().ln_1p() - LN_2
    }

    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }

    fn to_parts(self) -> (f64, f64) {
        (self, 0.0)
    }

    fn from_parts(re: f64, _im: f64) -> Self {
        re
    }
}

impl Scalar for Complex64 {
    const COMPONENTS: usize = 2;

    fn draw_normal<R: Rng + ?Sized>(rng: &mut R, normal: &Normal<f64>) -> Self {
        Complex64::new(normal.sample(rng), normal.sample(rng))
    }

    fn log_cosh(self) -> Self {
        // cosh is even, so mirror into Re z >= 0 where e^(-2z) cannot overflow
        let z = if self.re >= 0.0 { self } else { -self };
        z + ((-2.0 * z).exp() + 1.0).ln() - LN_2
    }

    fn is_nan(self) -> bool {
        self.re.is_nan() || self.im.is_nan()
    }

    fn to_parts(self) -> (f64, f64) {
        (self.re, self.im)
    }

    fn from_parts(re: f64, im: f64) -> Self {
        Complex64::new(re, im)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_log_cosh_real_matches_naive() {
        for &x in &[0.0, 0.3, -0.7, 2.5, -4.0] {
            assert_relative_eq!(x.log_cosh(), x.cosh().ln(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_log_cosh_real_large_argument() {
        // naive cosh overflows near 710; the stable form must not
        let x = 1000.0_f64;
        assert_relative_eq!(x.log_cosh(), x - LN_2, epsilon = 1e-12);
        assert_relative_eq!((-x).log_cosh(), x - LN_2, epsilon = 1e-12);
    }

    #[test]
    fn test_log_cosh_complex_matches_naive() {
        for &(re, im) in &[(0.2, 0.5), (-1.0, 0.3), (2.0, -2.0), (0.0, 1.0)] {
            let z = Complex64::new(re, im);
            let naive = z.cosh().ln();
            let stable = z.log_cosh();
            assert_relative_eq!(stable.re, naive.re, epsilon = 1e-12);
            assert_relative_eq!(stable.im, naive.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_log_cosh_complex_large_real_part() {
        let z = Complex64::new(800.0, 0.25);
        let stable = z.log_cosh();
        assert!(stable.re.is_finite() && stable.im.is_finite());
        assert_relative_eq!(stable.re, 800.0 - LN_2, epsilon = 1e-12);
        assert_relative_eq!(stable.im, 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_draw_normal_components() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;
        let normal = Normal::new(0.0, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let x = f64::draw_normal(&mut rng, &normal);
        assert_eq!(x.to_parts().1, 0.0);
        let z = Complex64::draw_normal(&mut rng, &normal);
        // both components drawn independently, almost surely distinct
        assert_ne!(z.re, z.im);
    }

    #[test]
    fn test_nan_detection() {
        assert!(f64::NAN.is_nan());
        assert!(!1.5_f64.is_nan());
        assert!(Scalar::is_nan(Complex64::new(f64::NAN, 0.0)));
        assert!(Scalar::is_nan(Complex64::new(0.0, f64::NAN)));
        assert!(!Scalar::is_nan(Complex64::new(1.0, -1.0)));
    }
}
