//! Sampling module - Metropolis chains over RBM amplitudes.

mod sampler;
mod sweeper;
mod tempering;

pub use sampler::{chain_seed, Sampler};
pub use sweeper::{FlipListSweeper, LocalSweeper, Proposal, SwapSweeper, Sweeper};
pub use tempering::SamplerPt;
