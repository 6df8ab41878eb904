use std::collections::HashMap;
use std::env;

use serde::Serialize;

pub const UPGRADE_ENV: &str = "PIP_COMPILE_UPGRADE";
pub const UPGRADE_PACKAGE_ENV: &str = "PIP_COMPILE_UPGRADE_PACKAGE";
pub const UPGRADE_PACKAGES_ENV: &str = "PIP_COMPILE_UPGRADE_PACKAGES";
pub const FORCE_ENV: &str = "__PIP_COMPILE_FORCE__";
pub const DISABLE_ENV: &str = "PIP_COMPILE_DISABLE";
pub const PYTHON_ENV: &str = "HATCH_PIP_COMPILE_PYTHON";

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    /// Set and not one of `0`, `false`, `no`, `off` or blank.
    pub(crate) fn flag_is_enabled(&self, key: &str) -> bool {
        match self.var(key) {
            Some(value) => {
                let lowered = value.trim().to_ascii_lowercase();
                !matches!(lowered.as_str(), "0" | "false" | "no" | "off" | "")
            }
            None => false,
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

/// Per-invocation switches that steer staleness checks and regeneration.
///
/// Captured once from the process environment; CLI flags are merged in with
/// the `with_*` builders rather than by mutating the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Signals {
    pub upgrade: bool,
    pub upgrade_packages: Vec<String>,
    pub force: bool,
    pub compile_disabled: bool,
}

impl Signals {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> Self {
        let upgrade_packages = snapshot
            .var(UPGRADE_PACKAGE_ENV)
            .or_else(|| snapshot.var(UPGRADE_PACKAGES_ENV))
            .map(split_packages)
            .unwrap_or_default();
        Self {
            upgrade: snapshot.flag_is_enabled(UPGRADE_ENV),
            upgrade_packages,
            force: snapshot.flag_is_enabled(FORCE_ENV),
            compile_disabled: snapshot.flag_is_enabled(DISABLE_ENV),
        }
    }

    #[must_use]
    pub fn with_upgrade(mut self, upgrade: bool) -> Self {
        self.upgrade |= upgrade;
        self
    }

    #[must_use]
    pub fn with_upgrade_packages<S: AsRef<str>>(mut self, packages: &[S]) -> Self {
        for package in packages.iter().flat_map(|raw| split_packages(raw.as_ref())) {
            if !self.upgrade_packages.contains(&package) {
                self.upgrade_packages.push(package);
            }
        }
        self
    }

    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force |= force;
        self
    }

    pub fn force_upgrade(&self) -> bool {
        self.upgrade || !self.upgrade_packages.is_empty() || self.force
    }

    /// Resolver flags derived from the upgrade signals.
    pub fn upgrade_args(&self) -> Vec<String> {
        if self.upgrade {
            return vec!["--upgrade".to_string()];
        }
        self.upgrade_packages
            .iter()
            .map(|package| format!("--upgrade-package={package}"))
            .collect()
    }
}

fn split_packages(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|package| !package.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
