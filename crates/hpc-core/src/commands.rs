use std::path::PathBuf;

use anyhow::{Context, Result};
use hpc_domain::{LockError, LockErrorKind, DEFAULT_ENVIRONMENT};
use serde_json::{json, Value};
use tracing::info;

use crate::config::Signals;
use crate::registry::{
    discover_project_root, supported_environments, EnvironmentRegistry, ManifestRegistry,
};
use crate::runtime::EnvironmentHost;
use crate::session::{EnvironmentReport, LockSession};
use crate::tooling::{error_details, ExecutionOutcome};

/// Arguments of one `hatch-pip-compile` invocation.
#[derive(Clone, Debug, Default)]
pub struct CompileRequest {
    /// Project directory; discovered from the working directory when unset.
    pub project_root: Option<PathBuf>,
    pub environments: Vec<String>,
    pub all: bool,
    pub upgrade: bool,
    pub upgrade_packages: Vec<String>,
}

/// Re-resolve and sync the requested environments of the project.
///
/// # Errors
///
/// Returns an error when the project root cannot be found; per-environment
/// failures are reported through the outcome instead.
pub fn compile_environments(
    request: &CompileRequest,
    host: &dyn EnvironmentHost,
) -> Result<ExecutionOutcome> {
    let root = match &request.project_root {
        Some(root) => root.clone(),
        None => {
            let cwd = std::env::current_dir().context("failed to read working directory")?;
            discover_project_root(&cwd)?
        }
    };
    let registry = ManifestRegistry::new(root);
    let signals = Signals::from_env();
    compile_with(&registry, host, signals, request)
}

/// [`compile_environments`] against an explicit registry and base signals.
///
/// Explicit invocations always re-resolve, so the force signal is set on top
/// of whatever `signals` carries.
pub fn compile_with(
    registry: &dyn EnvironmentRegistry,
    host: &dyn EnvironmentHost,
    signals: Signals,
    request: &CompileRequest,
) -> Result<ExecutionOutcome> {
    let supported = match supported_environments(registry) {
        Ok(supported) => supported,
        Err(err) => {
            let message = format!("failed to read project environments: {err}");
            let details = error_details(&err);
            return Ok(error_outcome(message, &err, details));
        }
    };
    let targets = match select_targets(&supported, request) {
        Ok(targets) => targets,
        Err(outcome) => return Ok(outcome),
    };
    let signals = signals
        .with_upgrade(request.upgrade)
        .with_upgrade_packages(&request.upgrade_packages)
        .with_force(true);
    if signals.upgrade {
        info!("upgrading all dependencies");
    } else if !signals.upgrade_packages.is_empty() {
        info!(packages = %signals.upgrade_packages.join(", "), "upgrading packages");
    }
    info!(environments = %targets.join(", "), "targeting environments");

    let mut session = LockSession::new(registry, host, signals);
    let mut reports: Vec<EnvironmentReport> = Vec::new();
    for name in &targets {
        let result = registry
            .environment(name)
            .and_then(|env| {
                env.with_context(|| format!("environment `{name}` disappeared from the project"))
            })
            .and_then(|env| session.ensure_environment(&env));
        match result {
            Ok(report) => reports.push(report),
            Err(err) => {
                let mut details = error_details(&err);
                details["environment"] = json!(name);
                details["completed"] = json!(reports);
                let message = format!("failed to sync environment `{name}`: {err}");
                return Ok(error_outcome(message, &err, details));
            }
        }
    }

    let message = match reports.len() {
        1 => format!("synced environment `{}`", reports[0].name),
        count => format!("synced {count} environments"),
    };
    Ok(ExecutionOutcome::success(
        message,
        json!({
            "environments": reports,
        }),
    ))
}

/// Lock errors other than subprocess failures are the user's to fix.
fn error_outcome(message: String, err: &anyhow::Error, details: Value) -> ExecutionOutcome {
    match err.downcast_ref::<LockError>().map(LockError::kind) {
        Some(LockErrorKind::SubprocessFailed) | None => ExecutionOutcome::failure(message, details),
        Some(_) => ExecutionOutcome::user_error(message, details),
    }
}

/// Sorted target list, or a bad-parameter outcome.
fn select_targets(
    supported: &[String],
    request: &CompileRequest,
) -> Result<Vec<String>, ExecutionOutcome> {
    let supported_list = supported.join(", ");
    let mut targets: Vec<String> = if request.all {
        if supported.is_empty() {
            return Err(ExecutionOutcome::user_error(
                "no pip-compile environments are configured",
                json!({
                    "reason": "no_supported_environments",
                    "hint": "set `type = \"pip-compile\"` on an environment in pyproject.toml",
                }),
            ));
        }
        supported.to_vec()
    } else if request.environments.is_empty() {
        if !supported.iter().any(|name| name == DEFAULT_ENVIRONMENT) {
            return Err(ExecutionOutcome::user_error(
                "either `--all` or an environment name must be specified",
                json!({
                    "reason": "missing_environment",
                    "supported": supported,
                    "hint": format!("supported environments: {supported_list}"),
                }),
            ));
        }
        vec![DEFAULT_ENVIRONMENT.to_string()]
    } else {
        request.environments.clone()
    };
    targets.sort();
    targets.dedup();

    let unsupported: Vec<&String> = targets
        .iter()
        .filter(|name| !supported.contains(*name))
        .collect();
    if !unsupported.is_empty() {
        let names = unsupported
            .iter()
            .map(|name| name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(ExecutionOutcome::user_error(
            format!("the following environments are not supported or unknown: {names}"),
            json!({
                "reason": "unsupported_environment",
                "environments": unsupported,
                "supported": supported,
                "hint": format!("supported environments: {supported_list}"),
            }),
        ));
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StaticRegistry;
    use crate::testing::FakeHost;
    use crate::tooling::CommandStatus;
    use hpc_domain::{EnvironmentSpec, PythonVersion};
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn registry(root: &Path) -> StaticRegistry {
        let default = EnvironmentSpec::new("default", root).with_dependencies(&["hatch"]);
        let mut test =
            EnvironmentSpec::new("test", root).with_dependencies(&["pytest", "pytest-cov"]);
        test.options.constraint = Some("default".into());
        let mut docs = EnvironmentSpec::new("docs", root).with_dependencies(&["mkdocs"]);
        docs.env_type = "virtual".into();
        StaticRegistry::new([default, test, docs])
    }

    fn request(envs: &[&str]) -> CompileRequest {
        CompileRequest {
            environments: envs.iter().map(ToString::to_string).collect(),
            ..CompileRequest::default()
        }
    }

    #[test]
    fn defaults_to_the_default_environment() -> Result<()> {
        let dir = tempdir()?;
        let registry = registry(dir.path());
        let host = FakeHost::new(PythonVersion::new(3, 11));
        let outcome = compile_with(&registry, &host, Signals::default(), &request(&[]))?;
        assert_eq!(outcome.status, CommandStatus::Ok, "{outcome:?}");
        assert_eq!(outcome.details["environments"][0]["name"], "default");
        assert!(dir.path().join("requirements.txt").is_file());
        assert!(!dir.path().join("requirements").exists());
        Ok(())
    }

    #[test]
    fn explicit_invocation_always_recompiles() -> Result<()> {
        let dir = tempdir()?;
        let registry = registry(dir.path());
        let host = FakeHost::new(PythonVersion::new(3, 11));
        compile_with(&registry, &host, Signals::default(), &request(&["default"]))?;
        compile_with(&registry, &host, Signals::default(), &request(&["default"]))?;
        assert_eq!(host.compile_count(), 2);
        Ok(())
    }

    #[test]
    fn all_targets_every_supported_environment() -> Result<()> {
        let dir = tempdir()?;
        let registry = registry(dir.path());
        let host = FakeHost::new(PythonVersion::new(3, 11));
        let request = CompileRequest {
            all: true,
            environments: vec!["docs".into()],
            ..CompileRequest::default()
        };
        let outcome = compile_with(&registry, &host, Signals::default(), &request)?;
        assert_eq!(outcome.status, CommandStatus::Ok, "{outcome:?}");
        assert_eq!(outcome.message, "synced 2 environments");
        let names: Vec<&str> = outcome.details["environments"]
            .as_array()
            .expect("reports")
            .iter()
            .filter_map(|report| report["name"].as_str())
            .collect();
        assert_eq!(names, vec!["default", "test"]);
        // `default` is forced once and then trusted by `test`.
        assert_eq!(host.compile_count(), 2);
        let test_lock = fs::read_to_string(
            dir.path().join("requirements").join("requirements-test.txt"),
        )?;
        assert!(test_lock.contains("# [constraints] requirements.txt"));
        Ok(())
    }

    #[test]
    fn unknown_environment_is_a_bad_parameter() -> Result<()> {
        let dir = tempdir()?;
        let registry = registry(dir.path());
        let host = FakeHost::new(PythonVersion::new(3, 11));
        let outcome = compile_with(
            &registry,
            &host,
            Signals::default(),
            &request(&["docs", "nope"]),
        )?;
        assert_eq!(outcome.status, CommandStatus::UserError);
        assert!(outcome.message.contains("docs, nope"), "{}", outcome.message);
        assert_eq!(outcome.hint(), Some("supported environments: default, test"));
        assert!(host.commands().is_empty());
        Ok(())
    }

    #[test]
    fn missing_default_requires_a_name() -> Result<()> {
        let dir = tempdir()?;
        let test = EnvironmentSpec::new("test", dir.path()).with_dependencies(&["pytest"]);
        let registry = StaticRegistry::new([test]);
        let host = FakeHost::new(PythonVersion::new(3, 11));
        let outcome = compile_with(&registry, &host, Signals::default(), &request(&[]))?;
        assert_eq!(outcome.status, CommandStatus::UserError);
        assert_eq!(outcome.details["reason"], "missing_environment");
        Ok(())
    }

    #[test]
    fn upgrade_flags_reach_the_resolver() -> Result<()> {
        let dir = tempdir()?;
        let registry = registry(dir.path());
        let host = FakeHost::new(PythonVersion::new(3, 11));
        let request = CompileRequest {
            environments: vec!["default".into()],
            upgrade_packages: vec!["hatch".into()],
            ..CompileRequest::default()
        };
        compile_with(&registry, &host, Signals::default(), &request)?;
        let compile = host.last_compile().expect("compile");
        assert!(compile.contains(&"--upgrade-package=hatch".to_string()));
        Ok(())
    }

    #[test]
    fn disabled_compile_fails_with_user_error() -> Result<()> {
        let dir = tempdir()?;
        let registry = registry(dir.path());
        let host = FakeHost::new(PythonVersion::new(3, 11));
        let signals = Signals {
            compile_disabled: true,
            ..Signals::default()
        };
        let outcome = compile_with(&registry, &host, signals, &request(&["default"]))?;
        assert_eq!(outcome.status, CommandStatus::UserError);
        assert_eq!(outcome.details["kind"], "resolution-disabled");
        assert_eq!(outcome.details["environment"], "default");
        Ok(())
    }

    #[test]
    fn resolver_failure_is_reported_as_failure() -> Result<()> {
        let dir = tempdir()?;
        let registry = registry(dir.path());
        let host = FakeHost::new(PythonVersion::new(3, 11)).failing_compile();
        let outcome =
            compile_with(&registry, &host, Signals::default(), &request(&["default"]))?;
        assert_eq!(outcome.status, CommandStatus::Failure);
        assert_eq!(outcome.details["kind"], "subprocess-failed");
        assert!(outcome.details["output"]
            .as_str()
            .is_some_and(|output| output.contains("ResolutionImpossible")));
        Ok(())
    }

    #[test]
    fn malformed_manifest_reports_the_parse_error() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("pyproject.toml"), "[project\nname = 'demo'\n")?;
        let host = FakeHost::new(PythonVersion::new(3, 11));
        let request = CompileRequest {
            project_root: Some(dir.path().to_path_buf()),
            ..CompileRequest::default()
        };
        let outcome = compile_environments(&request, &host)?;
        assert_eq!(outcome.status, CommandStatus::UserError);
        assert_eq!(outcome.details["kind"], "configuration");
        assert!(
            outcome.message.contains("failed to parse"),
            "{}",
            outcome.message
        );
        assert!(outcome.details.get("supported").is_none());
        assert!(host.commands().is_empty());
        Ok(())
    }

    #[test]
    fn compile_environments_reads_pyproject() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("pyproject.toml"),
            "[project]\nname = \"demo\"\n\n[tool.hatch.envs.test]\ntype = \"virtual\"\n",
        )?;
        let host = FakeHost::new(PythonVersion::new(3, 11));
        let request = CompileRequest {
            project_root: Some(dir.path().to_path_buf()),
            ..CompileRequest::default()
        };
        let outcome = compile_environments(&request, &host)?;
        assert_eq!(outcome.status, CommandStatus::UserError);
        Ok(())
    }
}
