use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use pep508_rs::{MarkerEnvironment, Requirement as PepRequirement};
use tracing::debug;

use crate::error::LockError;

/// A parsed PEP 508 dependency specifier.
///
/// Equality and hashing use the canonical rendering (normalized project name
/// followed by the parser's rendering of extras, version and marker), so
/// `Hatch>=1.0` and `hatch >= 1.0` compare equal while the original text is kept
/// for serialization.
#[derive(Clone, Debug)]
pub struct LockRequirement {
    raw: String,
    name: String,
    canonical: String,
    marker: Option<String>,
}

impl LockRequirement {
    pub fn parse(spec: &str) -> Result<Self, LockError> {
        let trimmed = spec.trim();
        let parsed = PepRequirement::from_str(trimmed).map_err(|err| {
            LockError::configuration(format!("invalid dependency specifier `{trimmed}`: {err}"))
        })?;
        let display_name = parsed.name.to_string();
        let name = canonicalize_package_name(&display_name);
        let rendered = parsed.to_string();
        let rest = rendered.get(display_name.len()..).unwrap_or_default();
        let canonical = format!("{name}{rest}");
        let marker = parsed
            .marker
            .map(|expr| expr.to_string())
            .filter(|marker| !marker.trim().is_empty());
        Ok(Self {
            raw: trimmed.to_string(),
            name,
            canonical,
            marker,
        })
    }

    /// The specifier exactly as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Normalized project name (`Foo_Bar` -> `foo-bar`).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn marker(&self) -> Option<&str> {
        self.marker.as_deref()
    }

    /// Whether the marker holds in `markers`; unmarked requirements always apply.
    pub fn applies_to(&self, markers: &MarkerEnvironment) -> bool {
        if self.marker.is_none() {
            return true;
        }
        match PepRequirement::from_str(&self.raw) {
            Ok(parsed) => parsed.evaluate_markers(markers, &[]),
            Err(_) => true,
        }
    }

    /// The version of an `==` pin, if this requirement is one.
    pub fn pinned_version(&self) -> Option<&str> {
        let without_marker = self
            .canonical
            .split_once(';')
            .map_or(self.canonical.as_str(), |(head, _)| head);
        let (_, version) = without_marker.split_once("==")?;
        let version = version.trim().trim_start_matches('=');
        if version.is_empty() || version.contains(',') {
            None
        } else {
            Some(version)
        }
    }
}

impl PartialEq for LockRequirement {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for LockRequirement {}

impl Hash for LockRequirement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for LockRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for LockRequirement {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

pub fn parse_requirements<S: AsRef<str>>(specs: &[S]) -> Result<Vec<LockRequirement>, LockError> {
    specs
        .iter()
        .map(|spec| LockRequirement::parse(spec.as_ref()))
        .collect()
}

pub fn canonicalize_package_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut last_was_separator = false;
    for ch in name.trim().chars() {
        if matches!(ch, '-' | '_' | '.') {
            if !last_was_separator {
                normalized.push('-');
            }
            last_was_separator = true;
        } else {
            normalized.push(ch.to_ascii_lowercase());
            last_was_separator = false;
        }
    }
    normalized
}

/// Parse the pinned body of a resolver-produced lockfile.
///
/// Comment lines, `via` annotations and `--hash` options are dropped; option
/// lines such as `--index-url` or `-c` are skipped. Lines continued with a
/// trailing backslash are joined first.
pub fn parse_pinned_requirements(text: &str) -> Result<Vec<LockRequirement>, LockError> {
    let mut requirements = Vec::new();
    for (line_no, line) in logical_lines(text) {
        let content = strip_inline_comment(&line);
        let content = content.trim();
        if content.is_empty() {
            continue;
        }
        if content.starts_with('-') {
            debug!(line = line_no, option = content, "skipping lockfile option line");
            continue;
        }
        let spec = content
            .split_whitespace()
            .take_while(|token| !token.starts_with("--"))
            .collect::<Vec<_>>()
            .join(" ");
        let requirement = LockRequirement::parse(&spec).map_err(|err| {
            LockError::corrupt(format!("lockfile line {line_no} is not a requirement: {err}"))
        })?;
        requirements.push(requirement);
    }
    Ok(requirements)
}

fn logical_lines(text: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let (start, mut buffer) = pending.take().unwrap_or((line_no, String::new()));
        let trimmed_end = raw.trim_end();
        if let Some(head) = trimmed_end.strip_suffix('\\') {
            buffer.push_str(head);
            buffer.push(' ');
            pending = Some((start, buffer));
        } else {
            buffer.push_str(trimmed_end);
            lines.push((start, buffer));
        }
    }
    if let Some(rest) = pending {
        lines.push(rest);
    }
    lines
}

fn strip_inline_comment(line: &str) -> &str {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return "";
    }
    match line.find(" #") {
        Some(idx) => &line[..idx],
        None => line,
    }
}
