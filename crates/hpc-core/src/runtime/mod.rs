pub mod effects;
pub mod process;
pub mod python_sys;

pub use effects::{EnvironmentHost, SystemEffects};
pub use process::{run_command, RunOutput};
