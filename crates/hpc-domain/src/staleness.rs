//! Pure lockfile staleness decision.
//!
//! Callers gather a snapshot of the environment (declared dependencies, the
//! lockfile on disk, the constraint state and the force-upgrade signal) and ask
//! [`decide`] for a verdict. Nothing here touches the filesystem or caches.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::LockError;
use crate::lockfile::header::{LockHeader, PythonVersion};
use crate::lockfile::io::LockFileContents;
use crate::lockfile::requirements::LockRequirement;

/// Parsed view of a lockfile for comparison purposes.
#[derive(Clone, Debug)]
pub enum LockfileState {
    Missing,
    Empty,
    Corrupt(LockError),
    Parsed {
        python_version: PythonVersion,
        dependencies: Vec<LockRequirement>,
        constraint_digest: Option<String>,
    },
}

impl LockfileState {
    pub fn from_contents(contents: &LockFileContents) -> Self {
        match contents {
            LockFileContents::Missing => Self::Missing,
            LockFileContents::Empty => Self::Empty,
            LockFileContents::Undecodable(reason) => Self::Corrupt(LockError::corrupt(reason)),
            LockFileContents::Text(text) => {
                match LockHeader::parse(text).and_then(|header| {
                    let dependencies = header.requirements()?;
                    Ok((header, dependencies))
                }) {
                    Ok((header, dependencies)) => Self::Parsed {
                        python_version: header.python_version,
                        dependencies,
                        constraint_digest: header.constraint.map(|record| record.digest),
                    },
                    Err(err) => Self::Corrupt(err),
                }
            }
        }
    }

    pub fn exists(&self) -> bool {
        !matches!(self, Self::Missing)
    }

    pub fn python_version(&self) -> Option<PythonVersion> {
        match self {
            Self::Parsed { python_version, .. } => Some(*python_version),
            _ => None,
        }
    }
}

/// Constraint environment facts for a constrained environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstraintState {
    /// Content hash of the constraint lockfile as it is on disk now.
    pub current_digest: String,
    /// Whether the constraint environment's own lockfile passed its check.
    pub constraint_lock_current: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct StalenessInputs<'a> {
    pub current: &'a [LockRequirement],
    pub lockfile: &'a LockfileState,
    pub constraint: Option<&'a ConstraintState>,
    pub force_upgrade: bool,
}

/// Verdict of [`decide`], naming the rule that fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, strum::IntoStaticStr, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Staleness {
    NothingToLock,
    ConstraintOutdated,
    LockWithoutDependencies,
    ForcedUpgrade,
    LockMissing,
    LockEmpty,
    LockCorrupt,
    ConstraintChanged,
    ConstraintRemoved,
    DependenciesChanged,
    UpToDate,
}

impl Staleness {
    pub fn is_up_to_date(self) -> bool {
        matches!(self, Self::NothingToLock | Self::UpToDate)
    }
}

/// True when there is nothing declared and nothing on disk; callers use this
/// to skip constraint validation, which [`decide`] would not consult anyway.
pub fn nothing_to_lock(current: &[LockRequirement], lockfile: &LockfileState) -> bool {
    current.is_empty() && !lockfile.exists()
}

/// First matching rule wins; later rules assume earlier ones did not apply.
pub fn decide(inputs: &StalenessInputs<'_>) -> Staleness {
    if nothing_to_lock(inputs.current, inputs.lockfile) {
        return Staleness::NothingToLock;
    }
    if inputs
        .constraint
        .is_some_and(|constraint| !constraint.constraint_lock_current)
    {
        return Staleness::ConstraintOutdated;
    }
    if inputs.current.is_empty() {
        return Staleness::LockWithoutDependencies;
    }
    if inputs.force_upgrade {
        return Staleness::ForcedUpgrade;
    }
    let (dependencies, constraint_digest) = match inputs.lockfile {
        LockfileState::Missing => return Staleness::LockMissing,
        LockfileState::Empty => return Staleness::LockEmpty,
        LockfileState::Corrupt(_) => return Staleness::LockCorrupt,
        LockfileState::Parsed {
            dependencies,
            constraint_digest,
            ..
        } => (dependencies, constraint_digest.as_deref()),
    };
    match (inputs.constraint, constraint_digest) {
        (Some(constraint), Some(recorded)) if recorded == constraint.current_digest => {}
        (Some(_), _) => return Staleness::ConstraintChanged,
        (None, Some(_)) => return Staleness::ConstraintRemoved,
        (None, None) => {}
    }
    let current: HashSet<&LockRequirement> = inputs.current.iter().collect();
    let locked: HashSet<&LockRequirement> = dependencies.iter().collect();
    if current != locked {
        return Staleness::DependenciesChanged;
    }
    Staleness::UpToDate
}
