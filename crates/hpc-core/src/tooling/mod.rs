pub mod outcome;

pub use outcome::{error_details, CommandStatus, ExecutionOutcome};
