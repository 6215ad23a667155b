//! IO module - run settings and machine snapshots.

mod config;
mod snapshot;

pub use config::{
    load_settings, MachineSettings, ModelSettings, OptimizationSettings, OptimizerKind,
    OutputSettings, RunSettings, SamplingSettings, ShiftSettings,
};
pub use snapshot::{
    dump_machine_yaml, load_machine, load_machine_from_path, save_machine, save_machine_to_path,
};
