use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use anyhow::{Context, Result};

use super::header::content_hash;

/// What is on disk at a lockfile path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockFileContents {
    Missing,
    /// The file exists but holds zero bytes; never equivalent to `Missing`.
    Empty,
    Text(String),
    /// The file exists but is not valid UTF-8; carries the decode error.
    Undecodable(String),
}

impl LockFileContents {
    pub fn exists(&self) -> bool {
        !matches!(self, Self::Missing)
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

pub fn read_lockfile(path: &Path) -> Result<LockFileContents> {
    match fs::read(path) {
        Ok(bytes) if bytes.is_empty() => Ok(LockFileContents::Empty),
        Ok(bytes) => Ok(match String::from_utf8(bytes) {
            Ok(text) => LockFileContents::Text(text),
            Err(err) => LockFileContents::Undecodable(format!(
                "{} is not valid UTF-8: {}",
                path.display(),
                err.utf8_error()
            )),
        }),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(LockFileContents::Missing),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Line-ending independent SHA-256 of the file at `path`.
pub fn file_content_hash(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(content_hash(&bytes))
}

/// Replace `path` with `contents` via a sibling temp file and rename, so a
/// concurrent reader sees either the old or the new lockfile.
pub fn write_lockfile_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".hpc-lock")
        .tempfile_in(parent)
        .with_context(|| format!("failed to create temp file under {}", parent.display()))?;
    tmp.write_all(contents.as_bytes())
        .context("failed to write lockfile contents")?;
    tmp.flush().context("failed to flush lockfile contents")?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to move lockfile into {}", path.display()))?;
    Ok(())
}

/// Delete the lockfile; returns whether anything was removed.
pub fn remove_lockfile(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
    }
}
