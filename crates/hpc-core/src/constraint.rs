//! Constraint environment lookup.
//!
//! Validation of the upstream lockfile happens in the session; this module only
//! answers "which environment constrains this one", following the chain of
//! names being validated to reject loops.

use std::path::PathBuf;

use anyhow::Result;
use hpc_domain::{EnvironmentSpec, LockError};
use tracing::debug;

use crate::registry::EnvironmentRegistry;

/// The environment constraining `env`, or `None` when `env` is unconstrained.
///
/// `chain` holds the names whose checks are in progress, outermost first, and
/// is expected to end with `env.name`. A configured constraint that is not a
/// pip-compile environment, or that declares no dependencies, is vacuous.
pub fn resolve_constraint_environment(
    registry: &dyn EnvironmentRegistry,
    env: &EnvironmentSpec,
    chain: &[String],
) -> Result<Option<EnvironmentSpec>> {
    let Some(name) = env.constraint_name() else {
        return Ok(None);
    };
    if let Some(start) = chain.iter().position(|seen| seen == name) {
        let mut cycle: Vec<&str> = chain[start..].iter().map(String::as_str).collect();
        if cycle.last() != Some(&env.name.as_str()) {
            cycle.push(&env.name);
        }
        cycle.push(name);
        return Err(LockError::configuration(format!(
            "constraint environments form a cycle: {}",
            cycle.join(" -> ")
        ))
        .into());
    }
    let Some(upstream) = registry.environment(name)? else {
        let known = registry.names()?;
        return Err(LockError::configuration(format!(
            "environment `{}` is constrained by `{name}`, which does not exist",
            env.name
        ))
        .with_hint(format!("configured environments: {}", known.join(", ")))
        .into());
    };
    if !upstream.is_pip_compile() || upstream.dependencies.is_empty() {
        debug!(env = %env.name, constraint = name, "ignoring vacuous constraint environment");
        return Ok(None);
    }
    Ok(Some(upstream))
}

/// Lockfile of the environment constraining `env`, if any.
pub fn constraints_file_for(
    registry: &dyn EnvironmentRegistry,
    env: &EnvironmentSpec,
) -> Result<Option<PathBuf>> {
    let chain = vec![env.name.clone()];
    Ok(resolve_constraint_environment(registry, env, &chain)?
        .map(|upstream| upstream.lockfile_path()))
}
