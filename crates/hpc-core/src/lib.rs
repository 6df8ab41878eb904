#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions
)]

pub mod commands;
pub mod config;
pub mod constraint;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod strategy;
pub mod tooling;

#[cfg(test)]
mod testing;

pub use commands::{compile_environments, compile_with, CompileRequest};
pub use config::Signals;
pub use constraint::{constraints_file_for, resolve_constraint_environment};
pub use registry::{
    discover_project_root, supported_environments, EnvironmentRegistry, ManifestRegistry,
    StaticRegistry,
};
pub use runtime::{EnvironmentHost, RunOutput, SystemEffects};
pub use session::{requirements_satisfied, EnvironmentReport, LockSession};
pub use tooling::{error_details, CommandStatus, ExecutionOutcome};

pub use hpc_domain::{LockError, LockErrorKind, Staleness};
