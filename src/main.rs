use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::SeedableRng;

use nqs_rbm::io::{
    load_machine_from_path, load_settings, save_machine_to_path, OptimizerKind, RunSettings,
};
use nqs_rbm::optim::{Adam, Optimizer, Sgd};
use nqs_rbm::runner::{run_exact, run_sampled, IterationStats, RunSummary};
use nqs_rbm::wavefunction::{Rbm, Scalar};

#[derive(Parser, Debug)]
#[command(version, about = "RBM ground-state optimization for spin chains", long_about = None)]
struct Args {
    /// Settings file (YAML)
    #[arg(short, long, default_value = "settings.yml")]
    config: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let settings = load_settings(&args.config)?;
    if settings.machine.complex {
        run_with::<Complex64>(&settings)
    } else {
        run_with::<f64>(&settings)
    }
}

fn build_machine<T: Scalar>(settings: &RunSettings) -> Result<Rbm<T>> {
    let sites = settings.model.sites();
    if let Some(path) = &settings.machine.resume {
        let machine: Rbm<T> = load_machine_from_path(path)
            .with_context(|| format!("cannot load snapshot {}", path.display()))?;
        if machine.visible() != sites {
            bail!(
                "snapshot has {} sites but the model has {}",
                machine.visible(),
                sites
            );
        }
        info!("resumed machine from {}", path.display());
        Ok(machine)
    } else {
        let mut machine = Rbm::new(sites, settings.machine.hidden, settings.machine.bias);
        machine.init_random(
            &mut StdRng::seed_from_u64(settings.sampling.seed),
            settings.machine.init_sigma,
        );
        Ok(machine)
    }
}

fn report(st: &IterationStats) {
    match st.acceptance {
        Some(acc) => println!(
            "{:5}  {:+.10}  {:.4e}  {:.3e}  {:.2}",
            st.iteration, st.energy, st.energy_variance, st.natural_norm, acc
        ),
        None => println!(
            "{:5}  {:+.10}  {:.4e}  {:.3e}",
            st.iteration, st.energy, st.energy_variance, st.natural_norm
        ),
    }
}

fn run_with<T: Scalar>(settings: &RunSettings) -> Result<()> {
    let hamiltonian = settings.model.build();
    let mut machine = build_machine::<T>(settings)?;
    let mut optimizer: Box<dyn Optimizer<T>> = match settings.optimization.optimizer {
        OptimizerKind::Sgd => Box::new(Sgd::new(settings.optimization.learning_rate)),
        OptimizerKind::Adam => Box::new(Adam::new(settings.optimization.learning_rate)),
    };

    println!("# iter        energy       variance       |v|   acceptance");

    let total = settings.optimization.iterations;
    let chunk = match settings.output.snapshot_every {
        0 => total,
        every => every,
    };
    let mut done = 0;
    let mut summary: Option<RunSummary> = None;
    while done < total {
        let step = chunk.min(total - done);
        let last = if settings.optimization.exact {
            let mut options = settings.exact_options();
            options.start_iteration = done;
            options.iterations = step;
            run_exact(
                &mut machine,
                hamiltonian.as_ref(),
                optimizer.as_mut(),
                &options,
                report,
            )?
        } else {
            let mut options = settings.run_options();
            options.start_iteration = done;
            options.iterations = step;
            run_sampled(
                &mut machine,
                hamiltonian.as_ref(),
                optimizer.as_mut(),
                &options,
                report,
            )?
        };
        done += step;
        summary = Some(last);
        if done < total {
            if let Some(path) = &settings.output.snapshot {
                save_machine_to_path(path, &machine)
                    .with_context(|| format!("cannot write snapshot {}", path.display()))?;
                info!("checkpoint written to {}", path.display());
            }
        }
    }

    if let Some(path) = &settings.output.snapshot {
        save_machine_to_path(path, &machine)
            .with_context(|| format!("cannot write snapshot {}", path.display()))?;
        info!("final machine written to {}", path.display());
    }
    if let Some(summary) = summary {
        println!("Final energy: {:+.10}", summary.final_energy);
        println!("Energy variance: {:.4e}", summary.final_variance);
    }
    Ok(())
}
