//! Wavefunction module - RBM ansatz, scalar abstraction, and evaluation state.

mod rbm;
mod scalar;
mod state;

pub use rbm::{get_psi, get_psi_over, Rbm};
pub use scalar::Scalar;
pub use state::{Sample, SpinState, StateRef, StateValue};
