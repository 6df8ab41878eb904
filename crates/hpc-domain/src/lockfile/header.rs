use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use super::requirements::LockRequirement;
use crate::error::LockError;

pub const HEADER_TOOL: &str = "hatch-pip-compile";

const AUTOGENERATED_PREFIX: &str = "# This file is autogenerated by hatch-pip-compile with Python ";
const DEPENDENCY_PREFIX: &str = "# - ";
const CONSTRAINTS_PREFIX: &str = "# [constraints] ";
const DIGEST_OPEN: &str = " (SHA256: ";

/// Interpreter `major.minor` recorded in a lockfile header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PythonVersion {
    pub major: u64,
    pub minor: u64,
}

impl PythonVersion {
    pub fn new(major: u64, minor: u64) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for PythonVersion {
    type Err = LockError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || LockError::corrupt(format!("invalid python version `{}`", input.trim()));
        let mut parts = input.trim().split('.');
        let major = parts
            .next()
            .and_then(|part| part.parse::<u64>().ok())
            .ok_or_else(invalid)?;
        let minor = parts
            .next()
            .map(|part| {
                part.chars()
                    .take_while(char::is_ascii_digit)
                    .collect::<String>()
            })
            .and_then(|digits| digits.parse::<u64>().ok())
            .ok_or_else(invalid)?;
        Ok(Self { major, minor })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstraintRecord {
    /// Project-relative, forward-slash path of the constraint lockfile.
    pub path: String,
    pub digest: String,
}

impl ConstraintRecord {
    fn render(&self) -> String {
        format!("{CONSTRAINTS_PREFIX}{}{DIGEST_OPEN}{})", self.path, self.digest)
    }

    fn parse(line: &str) -> Option<Self> {
        let rest = line.strip_prefix(CONSTRAINTS_PREFIX)?;
        let (path, digest) = rest.split_once(DIGEST_OPEN)?;
        let digest = digest.trim_end().strip_suffix(')')?.trim();
        if path.trim().is_empty() || digest.is_empty() {
            return None;
        }
        Some(Self {
            path: path.trim().to_string(),
            digest: digest.to_string(),
        })
    }
}

/// The comment preamble written at the top of every lockfile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockHeader {
    pub python_version: PythonVersion,
    pub constraint: Option<ConstraintRecord>,
    /// Declared dependencies in configuration order.
    pub dependencies: Vec<String>,
}

impl LockHeader {
    pub fn render(&self) -> String {
        let mut lines = vec![
            "#".to_string(),
            format!("{AUTOGENERATED_PREFIX}{}", self.python_version),
            "#".to_string(),
        ];
        if let Some(constraint) = &self.constraint {
            lines.push(constraint.render());
            lines.push("#".to_string());
        }
        for dep in &self.dependencies {
            lines.push(format!("{DEPENDENCY_PREFIX}{dep}"));
        }
        lines.push("#".to_string());
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }

    pub fn parse(text: &str) -> Result<Self, LockError> {
        let python_version = read_python_version(text)?;
        let dependencies = header_lines(text)
            .filter_map(|line| line.strip_prefix(DEPENDENCY_PREFIX))
            .map(|dep| dep.trim().to_string())
            .collect();
        let constraint = header_lines(text).find_map(ConstraintRecord::parse);
        Ok(Self {
            python_version,
            constraint,
            dependencies,
        })
    }

    pub fn requirements(&self) -> Result<Vec<LockRequirement>, LockError> {
        self.dependencies
            .iter()
            .map(|dep| {
                LockRequirement::parse(dep).map_err(|err| {
                    LockError::corrupt(format!("lockfile header lists an invalid dependency: {err}"))
                })
            })
            .collect()
    }
}

/// The leading comment block; stops at the first line that is not a comment.
fn header_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .take_while(|line| line.starts_with('#'))
}

pub fn read_python_version(text: &str) -> Result<PythonVersion, LockError> {
    let line = header_lines(text)
        .find_map(|line| line.strip_prefix(AUTOGENERATED_PREFIX))
        .ok_or_else(|| LockError::corrupt("could not find lock file python version"))?;
    line.parse()
}

pub fn read_declared_dependencies(text: &str) -> Result<Vec<LockRequirement>, LockError> {
    header_lines(text)
        .filter_map(|line| line.strip_prefix(DEPENDENCY_PREFIX))
        .map(|dep| {
            LockRequirement::parse(dep).map_err(|err| {
                LockError::corrupt(format!("lockfile header lists an invalid dependency: {err}"))
            })
        })
        .collect()
}

pub fn read_constraint_digest(text: &str) -> Option<String> {
    header_lines(text)
        .find_map(ConstraintRecord::parse)
        .map(|record| record.digest)
}

/// SHA-256 of `bytes` with CRLF normalized to LF.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    let mut start = 0;
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'\r' && bytes.get(idx + 1) == Some(&b'\n') {
            hasher.update(&bytes[start..idx]);
            start = idx + 1;
        }
        idx += 1;
    }
    hasher.update(&bytes[start..]);
    hex::encode(hasher.finalize())
}
