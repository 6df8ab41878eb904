//! Lookup of environment descriptors by name.
//!
//! The session never builds environments itself; it asks a registry, which
//! hands back an immutable [`EnvironmentSpec`] per call.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use hpc_domain::{EnvironmentSpec, ProjectManifest};

pub trait EnvironmentRegistry: Send + Sync {
    fn names(&self) -> Result<Vec<String>>;
    fn environment(&self, name: &str) -> Result<Option<EnvironmentSpec>>;
}

/// Registry backed by the project's `pyproject.toml`.
///
/// The file is re-read on every lookup so configuration edits made during an
/// invocation are observed.
#[derive(Clone, Debug)]
pub struct ManifestRegistry {
    root: PathBuf,
}

impl ManifestRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn manifest(&self) -> Result<ProjectManifest> {
        ProjectManifest::load(&self.root)
    }
}

impl EnvironmentRegistry for ManifestRegistry {
    fn names(&self) -> Result<Vec<String>> {
        Ok(self.manifest()?.environment_names())
    }

    fn environment(&self, name: &str) -> Result<Option<EnvironmentSpec>> {
        Ok(self.manifest()?.environment(name)?)
    }
}

/// Fixed set of descriptors, for embedding and tests.
#[derive(Clone, Debug, Default)]
pub struct StaticRegistry {
    environments: BTreeMap<String, EnvironmentSpec>,
}

impl StaticRegistry {
    pub fn new<I>(environments: I) -> Self
    where
        I: IntoIterator<Item = EnvironmentSpec>,
    {
        Self {
            environments: environments
                .into_iter()
                .map(|env| (env.name.clone(), env))
                .collect(),
        }
    }

    pub fn insert(&mut self, env: EnvironmentSpec) {
        self.environments.insert(env.name.clone(), env);
    }
}

impl EnvironmentRegistry for StaticRegistry {
    fn names(&self) -> Result<Vec<String>> {
        Ok(self.environments.keys().cloned().collect())
    }

    fn environment(&self, name: &str) -> Result<Option<EnvironmentSpec>> {
        Ok(self.environments.get(name).cloned())
    }
}

/// Names of the environments managed by this tool, sorted.
pub fn supported_environments(registry: &dyn EnvironmentRegistry) -> Result<Vec<String>> {
    let mut supported = Vec::new();
    for name in registry.names()? {
        if registry
            .environment(&name)?
            .is_some_and(|env| env.is_pip_compile())
        {
            supported.push(name);
        }
    }
    supported.sort();
    Ok(supported)
}

/// Walk up from `start` to the nearest directory holding `pyproject.toml`.
pub fn discover_project_root(start: &Path) -> Result<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.join("pyproject.toml").is_file() {
            return Ok(dir.to_path_buf());
        }
        current = dir.parent();
    }
    bail!(
        "no pyproject.toml found in {} or any parent directory",
        start.display()
    )
}
