use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LockErrorKind {
    Configuration,
    LockCorrupt,
    LockMissing,
    ResolutionDisabled,
    SubprocessFailed,
}

/// Failures raised by the lockfile engine.
///
/// Every variant carries a human message and, where one exists, a remediation
/// hint that the CLI prints beneath the message.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("{message}")]
    Configuration {
        message: String,
        hint: Option<String>,
    },
    #[error("{message}")]
    LockCorrupt {
        message: String,
        hint: Option<String>,
    },
    #[error("{message}")]
    LockMissing {
        message: String,
        hint: Option<String>,
    },
    #[error("{message}")]
    ResolutionDisabled {
        message: String,
        hint: Option<String>,
    },
    #[error("{message} (exit code {code})")]
    SubprocessFailed {
        message: String,
        command: Vec<String>,
        code: i32,
        stdout: String,
        stderr: String,
    },
}

impl LockError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            hint: None,
        }
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::LockCorrupt {
            message: message.into(),
            hint: None,
        }
    }

    pub fn missing(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::LockMissing {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    pub fn resolution_disabled(environment: &str) -> Self {
        Self::ResolutionDisabled {
            message: format!(
                "lockfile for environment `{environment}` is out of date and PIP_COMPILE_DISABLE is set"
            ),
            hint: Some(format!(
                "run `hatch-pip-compile {environment}` locally and commit the updated lockfile"
            )),
        }
    }

    pub fn subprocess(
        message: impl Into<String>,
        command: &[String],
        code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::SubprocessFailed {
            message: message.into(),
            command: command.to_vec(),
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    #[must_use]
    pub fn with_hint(self, hint: impl Into<String>) -> Self {
        let hint = Some(hint.into());
        match self {
            Self::Configuration { message, .. } => Self::Configuration { message, hint },
            Self::LockCorrupt { message, .. } => Self::LockCorrupt { message, hint },
            Self::LockMissing { message, .. } => Self::LockMissing { message, hint },
            Self::ResolutionDisabled { message, .. } => Self::ResolutionDisabled { message, hint },
            other @ Self::SubprocessFailed { .. } => other,
        }
    }

    pub fn kind(&self) -> LockErrorKind {
        match self {
            Self::Configuration { .. } => LockErrorKind::Configuration,
            Self::LockCorrupt { .. } => LockErrorKind::LockCorrupt,
            Self::LockMissing { .. } => LockErrorKind::LockMissing,
            Self::ResolutionDisabled { .. } => LockErrorKind::ResolutionDisabled,
            Self::SubprocessFailed { .. } => LockErrorKind::SubprocessFailed,
        }
    }

    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Configuration { hint, .. }
            | Self::LockCorrupt { hint, .. }
            | Self::LockMissing { hint, .. }
            | Self::ResolutionDisabled { hint, .. } => hint.as_deref(),
            Self::SubprocessFailed { .. } => None,
        }
    }

    /// Captured output of a failed subprocess, stderr first.
    pub fn captured_output(&self) -> Option<String> {
        let Self::SubprocessFailed { stdout, stderr, .. } = self else {
            return None;
        };
        let mut parts = Vec::new();
        for stream in [stderr, stdout] {
            let trimmed = stream.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hints_survive_for_domain_variants() {
        let err = LockError::configuration("unknown installer `poetry`")
            .with_hint("use one of: pip, pip-sync, uv");
        assert_eq!(err.kind(), LockErrorKind::Configuration);
        assert_eq!(err.hint(), Some("use one of: pip, pip-sync, uv"));
        assert_eq!(err.to_string(), "unknown installer `poetry`");
    }

    #[test]
    fn subprocess_failure_reports_streams() {
        let cmd = vec!["python".to_string(), "-m".to_string(), "piptools".to_string()];
        let err = LockError::subprocess("pip-compile failed", &cmd, 2, "out", "boom\n");
        assert_eq!(err.kind(), LockErrorKind::SubprocessFailed);
        assert_eq!(err.to_string(), "pip-compile failed (exit code 2)");
        assert_eq!(err.captured_output().as_deref(), Some("boom\nout"));
        assert!(err.hint().is_none());
    }

    #[test]
    fn disabled_resolution_names_environment() {
        let err = LockError::resolution_disabled("test");
        assert!(err.to_string().contains("`test`"));
        assert!(err.hint().is_some_and(|hint| hint.contains("hatch-pip-compile test")));
    }
}
