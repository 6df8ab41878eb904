use hpc_domain::LockError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: CommandStatus,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

impl ExecutionOutcome {
    pub fn success(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
        }
    }

    pub fn failure(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Failure,
            message: message.into(),
            details,
        }
    }

    pub fn user_error(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::UserError,
            message: message.into(),
            details,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Ok
    }

    pub fn hint(&self) -> Option<&str> {
        self.details.get("hint").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

/// JSON description of an engine error: kind, hint and captured output when
/// the error carries a [`LockError`], otherwise just the reason chain.
pub fn error_details(err: &anyhow::Error) -> Value {
    match err.downcast_ref::<LockError>() {
        Some(lock) => {
            let mut details = json!({
                "kind": lock.kind(),
                "reason": lock.to_string(),
            });
            if let Some(hint) = lock.hint() {
                details["hint"] = json!(hint);
            }
            if let LockError::SubprocessFailed { command, .. } = lock {
                details["command"] = json!(command);
            }
            if let Some(output) = lock.captured_output() {
                details["output"] = json!(output);
            }
            details
        }
        None => json!({
            "reason": format!("{err:#}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_errors_expose_kind_and_hint() {
        let err = anyhow::Error::from(LockError::resolution_disabled("test"));
        let details = error_details(&err);
        assert_eq!(details["kind"], "resolution-disabled");
        assert!(details["hint"]
            .as_str()
            .is_some_and(|hint| hint.contains("hatch-pip-compile test")));
    }

    #[test]
    fn subprocess_errors_carry_output() {
        let command = vec!["python".to_string(), "-m".to_string(), "piptools".to_string()];
        let err = anyhow::Error::from(LockError::subprocess(
            "resolver failed",
            &command,
            1,
            "",
            "ResolutionImpossible",
        ));
        let details = error_details(&err);
        assert_eq!(details["kind"], "subprocess-failed");
        assert_eq!(details["output"], "ResolutionImpossible");
        assert_eq!(details["command"][2], "piptools");
        assert!(details.get("hint").is_none());
    }

    #[test]
    fn plain_errors_keep_context_chain() {
        let err = anyhow::anyhow!("disk full").context("failed to write lockfile");
        let details = error_details(&err);
        assert_eq!(details["reason"], "failed to write lockfile: disk full");
    }

    #[test]
    fn outcome_hint_reads_details() {
        let outcome = ExecutionOutcome::user_error("bad", json!({ "hint": "try again" }));
        assert_eq!(outcome.hint(), Some("try again"));
        assert!(!outcome.is_success());
    }
}
