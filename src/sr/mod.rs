//! Stochastic reconfiguration - natural-gradient statistics and solvers.

mod cg;
mod exact;
mod matrix_free;

pub use cg::{conjugate_gradient, CgResult, LinearOperator};
pub use exact::SrExact;
pub use matrix_free::SrMatFree;
