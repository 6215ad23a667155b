//! Outer optimization loop: sample, estimate, solve, update.
//!
//! Each iteration is phase-separated. The machine is read-only while the
//! sampler and the SR statistics hold a borrow of it; the single parameter
//! update happens only after those borrows end. Sampler state is rebuilt
//! from a fresh iteration-derived seed every round, so a run is a pure
//! function of (initial machine, settings, seed).

use anyhow::{bail, Result};
use log::{debug, info, warn};

use crate::basis::{basis_jz, full_basis};
use crate::optim::{LambdaSchedule, Optimizer};
use crate::sampling::{chain_seed, LocalSweeper, Sampler, SamplerPt, SwapSweeper, Sweeper};
use crate::sr::{SrExact, SrMatFree};
use crate::systems::Hamiltonian;
use crate::wavefunction::{Rbm, Sample, Scalar};

/// Per-iteration diagnostics handed to the reporting callback.
#[derive(Debug, Clone)]
pub struct IterationStats {
    pub iteration: usize,
    /// Re ⟨E_loc⟩ of this iteration's ensemble.
    pub energy: f64,
    /// Ensemble variance of E_loc.
    pub energy_variance: f64,
    /// Norm of the solved natural-gradient direction v.
    pub natural_norm: f64,
    /// Diagonal shift λ used this iteration.
    pub shift: f64,
    /// Physical-chain move acceptance; absent on the exact path.
    pub acceptance: Option<f64>,
}

/// Final state of a finished run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub final_energy: f64,
    pub final_variance: f64,
}

/// Knobs of the sampled optimization loop.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub iterations: usize,
    /// Global index of the first iteration; lets a checkpointed run resume
    /// with the same shift schedule and iteration seeds it would have used.
    pub start_iteration: usize,
    /// Samples recorded per iteration (one per sweep).
    pub samples: usize,
    /// Thermalization sweeps discarded after each restart.
    pub thermalization: usize,
    /// Markov chains; more than one enables replica exchange.
    pub chains: usize,
    /// Magnetization-conserving pair proposals instead of single flips.
    pub exchange_moves: bool,
    /// Restart chains in a fixed-magnetization sector.
    pub magnetization_up: Option<usize>,
    pub seed: u64,
    pub schedule: LambdaSchedule,
    pub cg_tol: f64,
    pub cg_max_iter: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            iterations: 200,
            start_iteration: 0,
            samples: 500,
            thermalization: 100,
            chains: 1,
            exchange_moves: false,
            magnetization_up: None,
            seed: 42,
            schedule: LambdaSchedule::default(),
            cg_tol: 1e-6,
            cg_max_iter: 1000,
        }
    }
}

/// Knobs of the exact (enumerated-basis) optimization loop.
#[derive(Debug, Clone)]
pub struct ExactRunOptions {
    pub iterations: usize,
    /// Global index of the first iteration, as in [`RunOptions`].
    pub start_iteration: usize,
    /// Restrict the basis to a fixed-magnetization sector.
    pub magnetization_up: Option<usize>,
    pub schedule: LambdaSchedule,
}

impl Default for ExactRunOptions {
    fn default() -> Self {
        Self {
            iterations: 200,
            start_iteration: 0,
            magnetization_up: None,
            schedule: LambdaSchedule::default(),
        }
    }
}

fn drive<T: Scalar, S: Sweeper + Clone>(
    machine: &Rbm<T>,
    sweeper: S,
    options: &RunOptions,
    seed: u64,
) -> (Vec<Sample<T>>, f64) {
    if options.chains > 1 {
        let mut pt = SamplerPt::new(machine, sweeper, options.chains, seed);
        if let Some(n_up) = options.magnetization_up {
            pt.randomize_jz(n_up);
        }
        let samples = pt.sample(options.thermalization, options.samples);
        let acceptance = pt.acceptance();
        (samples, acceptance)
    } else {
        let mut sampler = Sampler::new(machine, sweeper, seed);
        if let Some(n_up) = options.magnetization_up {
            sampler.randomize_jz(n_up);
        }
        let samples = sampler.sample(options.thermalization, options.samples);
        let acceptance = sampler.acceptance();
        (samples, acceptance)
    }
}

fn collect_samples<T: Scalar>(
    machine: &Rbm<T>,
    options: &RunOptions,
    seed: u64,
) -> (Vec<Sample<T>>, f64) {
    let n = machine.visible();
    if options.exchange_moves {
        drive(machine, SwapSweeper::new(n), options, seed)
    } else {
        drive(machine, LocalSweeper::new(n), options, seed)
    }
}

/// Optimize `machine` towards the ground state of `hamiltonian` using
/// Monte Carlo estimates of the SR statistics.
pub fn run_sampled<T, H, O, F>(
    machine: &mut Rbm<T>,
    hamiltonian: &H,
    optimizer: &mut O,
    options: &RunOptions,
    mut report: F,
) -> Result<RunSummary>
where
    T: Scalar,
    H: Hamiltonian + ?Sized,
    O: Optimizer<T> + ?Sized,
    F: FnMut(&IterationStats),
{
    if machine.visible() != hamiltonian.n_sites() {
        bail!(
            "machine has {} sites but the Hamiltonian has {}",
            machine.visible(),
            hamiltonian.n_sites()
        );
    }
    if options.iterations == 0 || options.samples == 0 {
        bail!("iterations and samples must both be positive");
    }
    if options.exchange_moves && !hamiltonian.conserves_magnetization() {
        bail!("exchange moves require a magnetization-conserving Hamiltonian");
    }
    if options.magnetization_up.is_some() && !options.exchange_moves {
        bail!("a fixed magnetization sector requires exchange moves");
    }

    info!(
        "sampled optimization: {} iterations, {} samples x {} chain(s), dim {}",
        options.iterations,
        options.samples,
        options.chains,
        machine.dim()
    );

    let mut last = RunSummary { final_energy: f64::NAN, final_variance: f64::NAN };
    for l in 0..options.iterations {
        let ll = options.start_iteration + l;
        let shift = options.schedule.shift_at(ll);
        let iter_seed = chain_seed(options.seed, ll as u64);

        let (samples, acceptance) = collect_samples(&*machine, options, iter_seed);

        // read phase: statistics borrow the machine
        let (energy, variance, natural) = {
            let mut sr = SrMatFree::construct_from_sampling(&*machine, hamiltonian, &samples);
            sr.set_shift(shift);
            let cg = sr.solve_cg(options.cg_tol, options.cg_max_iter);
            if !cg.converged {
                warn!(
                    "iteration {}: CG stopped after {} iterations, relative residual {:.3e}",
                    ll, cg.iterations, cg.residual
                );
            }
            (sr.eloc().real(), sr.eloc_variance(), cg.solution)
        };
        if !energy.is_finite() {
            bail!("energy estimate became non-finite at iteration {}", ll);
        }

        // write phase: the one parameter update of this iteration
        let natural_norm = natural.norm();
        let delta = optimizer.get_update(&natural);
        machine.update_params(&delta);
        if machine.has_nan() {
            bail!("parameters became NaN at iteration {}", ll);
        }

        debug!(
            "iter {:4}  E = {:+.8}  var = {:.3e}  |v| = {:.3e}  lambda = {:.2e}  acc = {:.2}",
            ll, energy, variance, natural_norm, shift, acceptance
        );
        report(&IterationStats {
            iteration: ll,
            energy,
            energy_variance: variance,
            natural_norm,
            shift,
            acceptance: Some(acceptance),
        });
        last = RunSummary { final_energy: energy, final_variance: variance };
    }

    info!(
        "finished: E = {:+.8}, var = {:.3e}",
        last.final_energy, last.final_variance
    );
    Ok(last)
}

/// Optimize `machine` with exactly enumerated SR statistics. Only viable
/// for small systems; mainly used to validate the sampled path.
pub fn run_exact<T, H, O, F>(
    machine: &mut Rbm<T>,
    hamiltonian: &H,
    optimizer: &mut O,
    options: &ExactRunOptions,
    mut report: F,
) -> Result<RunSummary>
where
    T: Scalar,
    H: Hamiltonian + ?Sized,
    O: Optimizer<T> + ?Sized,
    F: FnMut(&IterationStats),
{
    if machine.visible() != hamiltonian.n_sites() {
        bail!(
            "machine has {} sites but the Hamiltonian has {}",
            machine.visible(),
            hamiltonian.n_sites()
        );
    }
    if options.iterations == 0 {
        bail!("iterations must be positive");
    }
    let basis = match options.magnetization_up {
        Some(n_up) => {
            if !hamiltonian.conserves_magnetization() {
                bail!("a fixed magnetization sector requires a conserving Hamiltonian");
            }
            basis_jz(machine.visible(), n_up)
        }
        None => full_basis(machine.visible()),
    };

    info!(
        "exact optimization: {} iterations over {} basis states, dim {}",
        options.iterations,
        basis.len(),
        machine.dim()
    );

    let mut last = RunSummary { final_energy: f64::NAN, final_variance: f64::NAN };
    for l in 0..options.iterations {
        let ll = options.start_iteration + l;
        let shift = options.schedule.shift_at(ll);

        let (energy, variance, natural) = {
            let mut sr = SrExact::construct(&*machine, hamiltonian, &basis);
            sr.set_shift(shift);
            (sr.energy().real(), sr.eloc_variance(), sr.solve())
        };
        if !energy.is_finite() {
            bail!("energy became non-finite at iteration {}", ll);
        }

        let natural_norm = natural.norm();
        let delta = optimizer.get_update(&natural);
        machine.update_params(&delta);
        if machine.has_nan() {
            bail!("parameters became NaN at iteration {}", ll);
        }

        debug!(
            "iter {:4}  E = {:+.8}  var = {:.3e}  |v| = {:.3e}  lambda = {:.2e}",
            ll, energy, variance, natural_norm, shift
        );
        report(&IterationStats {
            iteration: ll,
            energy,
            energy_variance: variance,
            natural_norm,
            shift,
            acceptance: None,
        });
        last = RunSummary { final_energy: energy, final_variance: variance };
    }

    info!(
        "finished: E = {:+.8}, var = {:.3e}",
        last.final_energy, last.final_variance
    );
    Ok(last)
}
