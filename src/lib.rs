//! Neural quantum states in Rust - RBM wavefunctions optimized by
//! stochastic reconfiguration.
//!
//! This crate provides an RBM ansatz over spin-1/2 lattices with an
//! incremental evaluation cache, Metropolis and replica-exchange sampling
//! of |Ψ|², and natural-gradient (SR) optimization in both matrix-free and
//! exactly enumerated form.

pub mod basis;
pub mod io;
pub mod optim;
pub mod runner;
pub mod sampling;
pub mod sr;
pub mod systems;
pub mod wavefunction;

// Re-export commonly used types at crate root
pub use basis::{basis_jz, full_basis, BasisJz};
pub use io::{load_settings, RunSettings};
pub use optim::{Adam, LambdaSchedule, Optimizer, Sgd};
pub use runner::{run_exact, run_sampled, ExactRunOptions, IterationStats, RunOptions, RunSummary};
pub use sampling::{FlipListSweeper, LocalSweeper, Sampler, SamplerPt, SwapSweeper, Sweeper};
pub use sr::{conjugate_gradient, CgResult, LinearOperator, SrExact, SrMatFree};
pub use systems::{local_energy, to_dense, Hamiltonian, TransverseIsing, XxzChain};
pub use wavefunction::{get_psi, get_psi_over, Rbm, Sample, Scalar, SpinState, StateRef, StateValue};
