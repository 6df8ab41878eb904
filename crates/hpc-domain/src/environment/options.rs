use std::str::FromStr;

use serde::Serialize;

use crate::error::LockError;

/// Which resolver builds the lockfile.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, strum::EnumString, strum::Display,
    strum::VariantNames,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ResolverKind {
    #[default]
    PipCompile,
    Uv,
}

/// Which installer materializes the lockfile into the environment.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, strum::EnumString, strum::Display,
    strum::VariantNames,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum InstallerKind {
    #[default]
    Pip,
    PipSync,
    Uv,
}

impl ResolverKind {
    pub fn parse_option(value: &str) -> Result<Self, LockError> {
        parse_kind(value, "pip-compile-resolver", <Self as strum::VariantNames>::VARIANTS)
    }
}

impl InstallerKind {
    pub fn parse_option(value: &str) -> Result<Self, LockError> {
        parse_kind(value, "pip-compile-installer", <Self as strum::VariantNames>::VARIANTS)
    }
}

fn parse_kind<T: FromStr>(value: &str, key: &str, variants: &[&str]) -> Result<T, LockError> {
    T::from_str(value.trim()).map_err(|_| {
        LockError::configuration(format!("invalid `{key}` value `{}`", value.trim()))
            .with_hint(format!("supported values: {}", variants.join(", ")))
    })
}

/// Plugin configuration for one environment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PipCompileOptions {
    /// Lockfile path template relative to the project root; `{env_name}` expands.
    pub lock_filename: Option<String>,
    pub hashes: bool,
    pub compile_args: Vec<String>,
    pub constraint: Option<String>,
    pub installer: InstallerKind,
    pub resolver: ResolverKind,
    pub install_args: Vec<String>,
    pub verbose: Option<bool>,
    pub strip_extras: bool,
}

impl Default for PipCompileOptions {
    fn default() -> Self {
        Self {
            lock_filename: None,
            hashes: true,
            compile_args: Vec::new(),
            constraint: None,
            installer: InstallerKind::default(),
            resolver: ResolverKind::default(),
            install_args: Vec::new(),
            verbose: None,
            strip_extras: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_strategies() {
        assert_eq!(
            ResolverKind::parse_option("pip-compile").unwrap(),
            ResolverKind::PipCompile
        );
        assert_eq!(ResolverKind::parse_option(" uv ").unwrap(), ResolverKind::Uv);
        assert_eq!(
            InstallerKind::parse_option("pip-sync").unwrap(),
            InstallerKind::PipSync
        );
        assert_eq!(InstallerKind::PipSync.to_string(), "pip-sync");
    }

    #[test]
    fn unknown_strategy_lists_alternatives() {
        let err = InstallerKind::parse_option("poetry").unwrap_err();
        assert_eq!(err.kind(), crate::error::LockErrorKind::Configuration);
        assert_eq!(err.hint(), Some("supported values: pip, pip-sync, uv"));
        assert!(ResolverKind::parse_option("pdm").is_err());
    }
}
