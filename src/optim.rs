//! Parameter-update rules and the regularization schedule.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::wavefunction::Scalar;

/// First-order update rule: maps a (natural) gradient to the step Δp.
///
/// The step carries its own sign; callers add it to the parameters as-is.
pub trait Optimizer<T: Scalar> {
    fn get_update(&mut self, gradient: &DVector<T>) -> DVector<T>;
}

/// Gradient descent with an optional heavy-ball momentum term:
/// v ← μ v − η g, step = v.
#[derive(Debug, Clone)]
pub struct Sgd<T: Scalar> {
    learning_rate: f64,
    momentum: f64,
    velocity: DVector<T>,
}

impl<T: Scalar> Sgd<T> {
    pub fn new(learning_rate: f64) -> Self {
        Self::with_momentum(learning_rate, 0.0)
    }

    pub fn with_momentum(learning_rate: f64, momentum: f64) -> Self {
        assert!(learning_rate > 0.0);
        assert!((0.0..1.0).contains(&momentum));
        Self {
            learning_rate,
            momentum,
            velocity: DVector::zeros(0),
        }
    }
}

impl<T: Scalar> Optimizer<T> for Sgd<T> {
    fn get_update(&mut self, gradient: &DVector<T>) -> DVector<T> {
        if self.momentum == 0.0 {
            return -gradient.scale(self.learning_rate);
        }
        if self.velocity.len() != gradient.len() {
            self.velocity = DVector::zeros(gradient.len());
        }
        self.velocity = self.velocity.scale(self.momentum) - gradient.scale(self.learning_rate);
        self.velocity.clone()
    }
}

/// Adam with per-component moment tracking.
///
/// For complex parameters the second moment uses |g|², so the step keeps
/// the gradient's phase and only its magnitude is adapted.
#[derive(Debug, Clone)]
pub struct Adam<T: Scalar> {
    alpha: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    m: DVector<T>,
    v: DVector<f64>,
    t: i32,
}

impl<T: Scalar> Adam<T> {
    pub fn new(alpha: f64) -> Self {
        Self::with_betas(alpha, 0.9, 0.999, 1e-8)
    }

    pub fn with_betas(alpha: f64, beta1: f64, beta2: f64, eps: f64) -> Self {
        assert!(alpha > 0.0);
        assert!((0.0..1.0).contains(&beta1) && (0.0..1.0).contains(&beta2));
        assert!(eps > 0.0);
        Self {
            alpha,
            beta1,
            beta2,
            eps,
            m: DVector::zeros(0),
            v: DVector::zeros(0),
            t: 0,
        }
    }
}

impl<T: Scalar> Optimizer<T> for Adam<T> {
    fn get_update(&mut self, gradient: &DVector<T>) -> DVector<T> {
        let dim = gradient.len();
        if self.m.len() != dim {
            self.m = DVector::zeros(dim);
            self.v = DVector::zeros(dim);
            self.t = 0;
        }
        self.t += 1;
        let bc1 = 1.0 - self.beta1.powi(self.t);
        let bc2 = 1.0 - self.beta2.powi(self.t);

        let mut res = DVector::zeros(dim);
        for i in 0..dim {
            let g = gradient[i];
            self.m[i] = self.m[i].scale(self.beta1) + g.scale(1.0 - self.beta1);
            self.v[i] = self.beta2 * self.v[i] + (1.0 - self.beta2) * g.modulus_squared();
            let m_hat = self.m[i].unscale(bc1);
            let v_hat = self.v[i] / bc2;
            res[i] = -m_hat.unscale(v_hat.sqrt() + self.eps).scale(self.alpha);
        }
        res
    }
}

/// Geometric decay of the SR diagonal shift with a floor:
/// λ_l = max(λ_ini · r^l, λ_min).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LambdaSchedule {
    initial: f64,
    decay: f64,
    min: f64,
}

impl LambdaSchedule {
    pub fn new(initial: f64, decay: f64, min: f64) -> Self {
        assert!(initial > 0.0 && min > 0.0);
        assert!(decay > 0.0 && decay <= 1.0);
        Self { initial, decay, min }
    }

    /// Shift for outer iteration `iteration` (0-based).
    pub fn shift_at(&self, iteration: usize) -> f64 {
        (self.initial * self.decay.powi(iteration as i32)).max(self.min)
    }
}

impl Default for LambdaSchedule {
    fn default() -> Self {
        Self::new(1e-3, 0.9, 1e-4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use num_complex::Complex64;

    #[test]
    fn test_sgd_step_is_scaled_negative_gradient() {
        let mut opt = Sgd::new(0.05);
        let g = DVector::from_vec(vec![1.0, -2.0, 4.0]);
        let step: DVector<f64> = opt.get_update(&g);
        assert_relative_eq!(step[0], -0.05, epsilon = 1e-14);
        assert_relative_eq!(step[1], 0.10, epsilon = 1e-14);
        assert_relative_eq!(step[2], -0.20, epsilon = 1e-14);
    }

    #[test]
    fn test_sgd_momentum_accumulates() {
        let mut opt = Sgd::with_momentum(0.1, 0.5);
        let g = DVector::from_vec(vec![1.0]);
        let s1: DVector<f64> = opt.get_update(&g);
        assert_relative_eq!(s1[0], -0.1, epsilon = 1e-14);
        // v2 = 0.5 v1 − 0.1 g
        let s2 = opt.get_update(&g);
        assert_relative_eq!(s2[0], -0.15, epsilon = 1e-14);
        let s3 = opt.get_update(&g);
        assert_relative_eq!(s3[0], -0.175, epsilon = 1e-14);
    }

    #[test]
    fn test_adam_first_step_magnitude() {
        // with bias correction the first step is ≈ −α·g/|g| per component
        let mut opt = Adam::<f64>::new(0.01);
        let g = DVector::from_vec(vec![10.0, -0.3, 2.0]);
        let step = opt.get_update(&g);
        for i in 0..3 {
            assert_relative_eq!(step[i].abs(), 0.01, epsilon = 1e-5);
            assert!(step[i] * g[i] < 0.0, "step must oppose the gradient");
        }
    }

    #[test]
    fn test_adam_keeps_complex_phase() {
        let mut opt = Adam::<Complex64>::new(0.02);
        let g = DVector::from_vec(vec![Complex64::new(3.0, 4.0)]);
        let step = opt.get_update(&g);
        // step direction is −g/|g|
        let dir = step[0] / step[0].norm();
        let expect = -g[0] / g[0].norm();
        assert!((dir - expect).norm() < 1e-6);
    }

    #[test]
    fn test_adam_resets_on_dimension_change() {
        let mut opt = Adam::<f64>::new(0.01);
        let _ = opt.get_update(&DVector::from_vec(vec![1.0, 1.0]));
        let step = opt.get_update(&DVector::from_vec(vec![5.0, 5.0, 5.0]));
        assert_eq!(step.len(), 3);
        // fresh moments: first-step magnitude again
        assert_relative_eq!(step[0].abs(), 0.01, epsilon = 1e-5);
    }

    #[test]
    fn test_lambda_schedule_decays_to_floor() {
        let sched = LambdaSchedule::new(1e-2, 0.5, 1e-3);
        assert_relative_eq!(sched.shift_at(0), 1e-2, epsilon = 1e-15);
        assert_relative_eq!(sched.shift_at(1), 5e-3, epsilon = 1e-15);
        assert_relative_eq!(sched.shift_at(2), 2.5e-3, epsilon = 1e-15);
        // floor reached after four halvings
        assert_relative_eq!(sched.shift_at(4), 1e-3, epsilon = 1e-15);
        assert_relative_eq!(sched.shift_at(100), 1e-3, epsilon = 1e-15);
        // never increases
        for l in 0..50 {
            assert!(sched.shift_at(l + 1) <= sched.shift_at(l) + 1e-18);
        }
    }
}
