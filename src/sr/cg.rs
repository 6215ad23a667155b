//! Conjugate-gradient solver over an abstract Hermitian operator.
//!
//! The SR covariance is only ever needed through matrix-vector products,
//! so the solver takes a [`LinearOperator`] instead of a matrix. Complex
//! scalars use the conjugated inner product throughout; for a Hermitian
//! positive-definite operator all CG step sizes stay real.

use nalgebra::{DMatrix, DVector};

use crate::wavefunction::Scalar;

/// Matrix-vector product interface for iterative solvers.
pub trait LinearOperator<T: Scalar> {
    fn dim(&self) -> usize;
    fn apply(&self, v: &DVector<T>) -> DVector<T>;
}

impl<T: Scalar> LinearOperator<T> for DMatrix<T> {
    fn dim(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, v: &DVector<T>) -> DVector<T> {
        self * v
    }
}

/// Outcome of a CG solve. Non-convergence is reported, not raised: the
/// caller decides whether a partially converged update is usable.
#[derive(Debug, Clone)]
pub struct CgResult<T: Scalar> {
    pub solution: DVector<T>,
    pub iterations: usize,
    /// Relative residual ‖Ax − b‖ / ‖b‖ at exit.
    pub residual: f64,
    pub converged: bool,
}

/// Solve A x = b for Hermitian positive-definite A.
pub fn conjugate_gradient<T, A>(op: &A, rhs: &DVector<T>, tol: f64, max_iter: usize) -> CgResult<T>
where
    T: Scalar,
    A: LinearOperator<T> + ?Sized,
{
    assert_eq!(op.dim(), rhs.len());
    assert!(tol > 0.0);

    let rhs_norm = rhs.norm();
    if rhs_norm == 0.0 {
        return CgResult {
            solution: DVector::zeros(rhs.len()),
            iterations: 0,
            residual: 0.0,
            converged: true,
        };
    }

    let mut x = DVector::zeros(rhs.len());
    let mut r = rhs.clone();
    let mut p = r.clone();
    let mut rs_old = r.norm_squared();

    for i in 0..max_iter {
        let ap = op.apply(&p);
        let denom = p.dotc(&ap).real();
        if denom <= 0.0 {
            // lost positive definiteness, bail with what we have
            return CgResult {
                solution: x,
                iterations: i,
                residual: rs_old.sqrt() / rhs_norm,
                converged: false,
            };
        }
        let alpha = rs_old / denom;
        x.axpy(T::from_real(alpha), &p, T::from_real(1.0));
        r.axpy(T::from_real(-alpha), &ap, T::from_real(1.0));
        let rs_new = r.norm_squared();
        if rs_new.sqrt() / rhs_norm < tol {
            return CgResult {
                solution: x,
                iterations: i + 1,
                residual: rs_new.sqrt() / rhs_norm,
                converged: true,
            };
        }
        p.axpy(T::from_real(1.0), &r, T::from_real(rs_new / rs_old));
        rs_old = rs_new;
    }

    CgResult {
        solution: x,
        iterations: max_iter,
        residual: rs_old.sqrt() / rhs_norm,
        converged: false,
    }
}
