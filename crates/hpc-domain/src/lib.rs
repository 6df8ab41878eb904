#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod environment;
pub mod error;
pub mod lockfile;
pub mod staleness;

pub use environment::{
    EnvironmentSpec, InstallerKind, PipCompileOptions, ProjectManifest, ResolverKind,
    DEFAULT_ENVIRONMENT, PLUGIN_NAME,
};
pub use error::{LockError, LockErrorKind};
pub use lockfile::{
    content_hash, file_content_hash, parse_pinned_requirements, read_lockfile, reconcile_lock,
    remove_lockfile, write_lockfile_atomic, ConstraintRecord, LockFileContents, LockHeader,
    LockRequirement, PythonVersion, ReconcileRequest,
};
pub use staleness::{decide, nothing_to_lock, ConstraintState, LockfileState, Staleness, StalenessInputs};
