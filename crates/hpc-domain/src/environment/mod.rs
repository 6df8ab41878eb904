//! Environment descriptors and their construction from `pyproject.toml`.

pub mod manifest;
pub mod options;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::LockError;
use crate::lockfile::requirements::LockRequirement;

pub use manifest::ProjectManifest;
pub use options::{InstallerKind, PipCompileOptions, ResolverKind};

pub const PLUGIN_NAME: &str = "pip-compile";
pub const DEFAULT_ENVIRONMENT: &str = "default";
pub const ENV_NAME_PLACEHOLDER: &str = "{env_name}";

/// Immutable snapshot of one configured environment.
///
/// Built fresh on every lookup; editing the project configuration requires a
/// new lookup to take effect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EnvironmentSpec {
    pub name: String,
    pub root: PathBuf,
    pub project_name: Option<String>,
    pub env_type: String,
    /// Declared dependencies in configuration order.
    pub dependencies: Vec<String>,
    pub skip_install: bool,
    pub dev_mode: bool,
    pub python: Option<String>,
    pub path: Option<PathBuf>,
    pub options: PipCompileOptions,
}

impl EnvironmentSpec {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            project_name: None,
            env_type: PLUGIN_NAME.to_string(),
            dependencies: Vec::new(),
            skip_install: false,
            dev_mode: true,
            python: None,
            path: None,
            options: PipCompileOptions::default(),
        }
    }

    #[must_use]
    pub fn with_dependencies<S: AsRef<str>>(mut self, dependencies: &[S]) -> Self {
        self.dependencies = dependencies
            .iter()
            .map(|dep| dep.as_ref().to_string())
            .collect();
        self
    }

    pub fn is_pip_compile(&self) -> bool {
        self.env_type == PLUGIN_NAME
    }

    pub fn requirements(&self) -> Result<Vec<LockRequirement>, LockError> {
        self.dependencies
            .iter()
            .map(|dep| {
                LockRequirement::parse(dep).map_err(|err| {
                    LockError::configuration(format!("environment `{}`: {err}", self.name))
                })
            })
            .collect()
    }

    pub fn lockfile_path(&self) -> PathBuf {
        let relative = match &self.options.lock_filename {
            Some(template) => template.replace(ENV_NAME_PLACEHOLDER, &self.name),
            None if self.name == DEFAULT_ENVIRONMENT => "requirements.txt".to_string(),
            None => format!("requirements/requirements-{}.txt", self.name),
        };
        let path = Path::new(&relative);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Lockfile path relative to the project root with forward slashes, as
    /// recorded in dependent headers.
    pub fn portable_lockfile_path(&self) -> String {
        let lockfile = self.lockfile_path();
        let relative = lockfile.strip_prefix(&self.root).unwrap_or(&lockfile);
        relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn env_dir(&self) -> PathBuf {
        match &self.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.root.join(path),
            None => self.root.join(".venvs").join(&self.name),
        }
    }

    /// Configured constraint environment name, ignoring a self-reference.
    pub fn constraint_name(&self) -> Option<&str> {
        self.options
            .constraint
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty() && *name != self.name)
    }
}
