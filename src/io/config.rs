//! Run settings, read from a YAML file.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::optim::LambdaSchedule;
use crate::runner::{ExactRunOptions, RunOptions};
use crate::systems::{Hamiltonian, TransverseIsing, XxzChain};

/// Everything one optimization run needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    pub model: ModelSettings,
    pub machine: MachineSettings,
    pub sampling: SamplingSettings,
    pub optimization: OptimizationSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSettings {
    Xxz {
        sites: usize,
        coupling: f64,
        anisotropy: f64,
        #[serde(default)]
        sign_rule: bool,
    },
    TransverseIsing {
        sites: usize,
        coupling: f64,
        field: f64,
    },
}

impl ModelSettings {
    pub fn sites(&self) -> usize {
        match *self {
            ModelSettings::Xxz { sites, .. } => sites,
            ModelSettings::TransverseIsing { sites, .. } => sites,
        }
    }

    pub fn build(&self) -> Box<dyn Hamiltonian> {
        match *self {
            ModelSettings::Xxz { sites, coupling, anisotropy, sign_rule } => {
                Box::new(XxzChain::new(sites, coupling, anisotropy).with_sign_rule(sign_rule))
            }
            ModelSettings::TransverseIsing { sites, coupling, field } => {
                Box::new(TransverseIsing::new(sites, coupling, field))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineSettings {
    /// Number of hidden units.
    pub hidden: usize,
    /// Whether visible/hidden biases are variational.
    #[serde(default = "default_true")]
    pub bias: bool,
    /// Width of the Gaussian parameter initialization.
    #[serde(default = "default_init_sigma")]
    pub init_sigma: f64,
    /// Complex parameters; needed whenever amplitudes carry a phase.
    #[serde(default)]
    pub complex: bool,
    /// Resume from this snapshot instead of a random initialization.
    #[serde(default)]
    pub resume: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingSettings {
    /// Samples recorded per outer iteration (one per sweep).
    pub samples: usize,
    /// Thermalization sweeps discarded before recording.
    pub thermalization: usize,
    /// Markov chains; 1 runs plain Metropolis, more runs tempering.
    #[serde(default = "default_chains")]
    pub chains: usize,
    /// Propose magnetization-conserving pair flips instead of single flips.
    #[serde(default)]
    pub exchange_moves: bool,
    /// Fix the number of up spins when using exchange moves.
    #[serde(default)]
    pub magnetization_up: Option<usize>,
    /// Master seed; chain and iteration sub-seeds derive from it.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Sgd,
    Adam,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftSettings {
    pub initial: f64,
    pub decay: f64,
    pub min: f64,
}

impl Default for ShiftSettings {
    fn default() -> Self {
        Self { initial: 1e-3, decay: 0.9, min: 1e-4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationSettings {
    /// Outer iterations.
    pub iterations: usize,
    pub learning_rate: f64,
    #[serde(default = "default_optimizer")]
    pub optimizer: OptimizerKind,
    #[serde(default)]
    pub shift: ShiftSettings,
    /// Enumerate the basis instead of sampling (small systems only).
    #[serde(default)]
    pub exact: bool,
    #[serde(default = "default_cg_tol")]
    pub cg_tol: f64,
    #[serde(default = "default_cg_max_iter")]
    pub cg_max_iter: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Snapshot path; written at the end of the run.
    #[serde(default)]
    pub snapshot: Option<PathBuf>,
    /// Also snapshot every this many iterations (0 = only at the end).
    #[serde(default)]
    pub snapshot_every: usize,
}

fn default_true() -> bool {
    true
}

fn default_init_sigma() -> f64 {
    0.01
}

fn default_chains() -> usize {
    1
}

fn default_seed() -> u64 {
    42
}

fn default_optimizer() -> OptimizerKind {
    OptimizerKind::Sgd
}

fn default_cg_tol() -> f64 {
    1e-6
}

fn default_cg_max_iter() -> usize {
    1000
}

impl RunSettings {
    pub fn lambda_schedule(&self) -> LambdaSchedule {
        let s = &self.optimization.shift;
        LambdaSchedule::new(s.initial, s.decay, s.min)
    }

    /// Assemble the sampled-loop options from these settings.
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            iterations: self.optimization.iterations,
            start_iteration: 0,
            samples: self.sampling.samples,
            thermalization: self.sampling.thermalization,
            chains: self.sampling.chains,
            exchange_moves: self.sampling.exchange_moves,
            magnetization_up: self.sampling.magnetization_up,
            seed: self.sampling.seed,
            schedule: self.lambda_schedule(),
            cg_tol: self.optimization.cg_tol,
            cg_max_iter: self.optimization.cg_max_iter,
        }
    }

    /// Assemble the exact-loop options from these settings.
    pub fn exact_options(&self) -> ExactRunOptions {
        ExactRunOptions {
            iterations: self.optimization.iterations,
            start_iteration: 0,
            magnetization_up: self.sampling.magnetization_up,
            schedule: self.lambda_schedule(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let sites = self.model.sites();
        if !(2..32).contains(&sites) {
            bail!("sites must be between 2 and 31, got {}", sites);
        }
        if self.machine.hidden == 0 {
            bail!("the machine needs at least one hidden unit");
        }
        if self.machine.init_sigma <= 0.0 {
            bail!("init_sigma must be positive");
        }
        if self.sampling.samples == 0 && !self.optimization.exact {
            bail!("sampled runs need at least one sample per iteration");
        }
        if self.sampling.chains == 0 {
            bail!("at least one chain is required");
        }
        if let Some(n_up) = self.sampling.magnetization_up {
            if n_up > sites {
                bail!("magnetization_up {} exceeds the {} sites", n_up, sites);
            }
            if !self.optimization.exact && !self.sampling.exchange_moves {
                bail!("magnetization_up requires exchange_moves on sampled runs");
            }
        }
        if self.optimization.iterations == 0 {
            bail!("iterations must be positive");
        }
        if self.optimization.learning_rate <= 0.0 {
            bail!("learning_rate must be positive");
        }
        let shift = &self.optimization.shift;
        if shift.initial <= 0.0 || shift.min <= 0.0 || shift.decay <= 0.0 || shift.decay > 1.0 {
            bail!("shift schedule needs positive initial/min and decay in (0, 1]");
        }
        if self.optimization.cg_tol <= 0.0 || self.optimization.cg_max_iter == 0 {
            bail!("CG needs a positive tolerance and iteration budget");
        }
        Ok(())
    }
}

/// Read and validate a settings file.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<RunSettings> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("cannot open settings file {}", path.display()))?;
    let settings: RunSettings = serde_yaml::from_reader(BufReader::new(file))
        .with_context(|| format!("cannot parse settings file {}", path.display()))?;
    settings.validate()?;
    Ok(settings)
}

// example settings file
//
// model:
//   kind: xxz
//   sites: 10
//   coupling: 1.0
//   anisotropy: 1.0
//   sign_rule: true
// machine:
//   hidden: 20
//   complex: false
// sampling:
//   samples: 500
//   thermalization: 100
//   chains: 4
//   exchange_moves: true
//   magnetization_up: 5
//   seed: 7
// optimization:
//   iterations: 200
//   learning_rate: 0.01
//   shift: { initial: 1.0e-3, decay: 0.9, min: 1.0e-4 }
// output:
//   snapshot: machine.nqs
