//! XXZ chain optimized from Metropolis samples with parallel tempering.
//!
//! Samples are drawn in the zero-magnetization sector with pair-exchange
//! moves; replica exchange keeps the chains mixing once the distribution
//! sharpens around the ground state.
//!
//! Usage:
//!   cargo run --example xxz_sampled --release -- [OPTIONS]

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;

use nqs_rbm::optim::{LambdaSchedule, Sgd};
use nqs_rbm::runner::{run_sampled, RunOptions};
use nqs_rbm::systems::XxzChain;
use nqs_rbm::wavefunction::Rbm;

/// Sampled SR optimization of an XXZ spin chain
#[derive(Parser, Debug)]
#[command(version, about = "Sampled SR optimization of an XXZ spin chain")]
struct Args {
    /// Number of lattice sites
    #[arg(short = 'n', long, default_value_t = 8)]
    sites: usize,

    /// Hidden units of the RBM
    #[arg(short = 'm', long, default_value_t = 16)]
    hidden: usize,

    /// Anisotropy of the z-z coupling
    #[arg(long, default_value_t = 1.0)]
    delta: f64,

    /// Samples recorded per iteration
    #[arg(short, long, default_value_t = 2000)]
    samples: usize,

    /// Optimization iterations
    #[arg(short, long, default_value_t = 300)]
    iterations: usize,

    /// Parallel-tempering chains
    #[arg(short, long, default_value_t = 4)]
    chains: usize,

    /// RNG seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!("XXZ chain, sampled SR optimization");
    println!("==================================\n");
    println!("  sites:    {}", args.sites);
    println!("  hidden:   {}", args.hidden);
    println!("  delta:    {}", args.delta);
    println!("  samples:  {} per iteration, {} chains", args.samples, args.chains);
    println!();

    let ham = XxzChain::new(args.sites, 1.0, args.delta).with_sign_rule(true);
    let mut machine: Rbm<f64> = Rbm::new(args.sites, args.hidden, true);
    machine.init_random(&mut StdRng::seed_from_u64(args.seed), 0.01);

    let options = RunOptions {
        iterations: args.iterations,
        samples: args.samples,
        thermalization: 200,
        chains: args.chains,
        exchange_moves: true,
        magnetization_up: Some(args.sites / 2),
        seed: args.seed,
        schedule: LambdaSchedule::new(1e-2, 0.9, 1e-4),
        ..RunOptions::default()
    };
    let mut opt = Sgd::new(0.02);

    let summary = run_sampled(&mut machine, &ham, &mut opt, &options, |st| {
        if st.iteration % 10 == 0 {
            println!(
                "  iter {:4}   E = {:+.6}   var = {:.3e}   acc = {:.2}",
                st.iteration,
                st.energy,
                st.energy_variance,
                st.acceptance.unwrap_or(f64::NAN)
            );
        }
    })?;

    println!();
    println!("Final energy:    {:+.6}", summary.final_energy);
    println!("Final variance:  {:.4e}", summary.final_variance);
    println!();
    println!("Reference (delta = 1, exact diagonalization):");
    println!("  N = 4:  -8.0000");
    println!("  N = 6:  -11.2111");
    println!("  N = 8:  -14.6044");
    Ok(())
}
