use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hpc_domain::{EnvironmentSpec, LockError, PythonVersion};
use pep508_rs::MarkerEnvironment;
use tracing::{debug, info};

use super::process::{run_command, RunOutput};
use super::python_sys::{
    detect_interpreter, parse_distributions_probe, parse_marker_probe, parse_version_probe,
    DISTRIBUTIONS_SCRIPT, MARKER_SCRIPT, VERSION_SCRIPT,
};

/// The "run a command inside this environment" primitive.
///
/// `run` receives a full argv whose first element is the program; commands
/// built by the strategies start with [`EnvironmentHost::python_executable`].
pub trait EnvironmentHost: Send + Sync {
    fn exists(&self, env: &EnvironmentSpec) -> bool;
    fn create(&self, env: &EnvironmentSpec) -> Result<()>;
    fn python_version(&self, env: &EnvironmentSpec) -> Result<PythonVersion>;
    fn run(&self, env: &EnvironmentSpec, argv: &[String]) -> Result<RunOutput>;
    fn installed_distributions(&self, env: &EnvironmentSpec) -> Result<BTreeMap<String, String>>;
    /// PEP 508 marker values of the environment's interpreter.
    fn marker_environment(&self, env: &EnvironmentSpec) -> Result<MarkerEnvironment>;

    fn python_executable(&self, env: &EnvironmentSpec) -> PathBuf {
        env_python(&env.env_dir())
    }
}

fn scripts_dir(env_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        env_dir.join("Scripts")
    } else {
        env_dir.join("bin")
    }
}

fn env_python(env_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        scripts_dir(env_dir).join("python.exe")
    } else {
        scripts_dir(env_dir).join("python")
    }
}

/// Virtualenvs on the local machine driven through subprocesses.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEffects;

impl SystemEffects {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn activation(env: &EnvironmentSpec) -> Result<Vec<(String, String)>> {
        let env_dir = env.env_dir();
        let mut paths = vec![scripts_dir(&env_dir)];
        if let Some(existing) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        let joined: OsString =
            std::env::join_paths(paths).context("failed to build PATH for environment")?;
        Ok(vec![
            (
                "VIRTUAL_ENV".to_string(),
                env_dir.to_string_lossy().into_owned(),
            ),
            ("PATH".to_string(), joined.to_string_lossy().into_owned()),
        ])
    }

    fn probe(&self, env: &EnvironmentSpec, script: &str) -> Result<RunOutput> {
        let python = self.python_executable(env);
        let argv = vec![
            python.to_string_lossy().into_owned(),
            "-c".to_string(),
            script.to_string(),
        ];
        self.run(env, &argv)
    }
}

impl EnvironmentHost for SystemEffects {
    fn exists(&self, env: &EnvironmentSpec) -> bool {
        self.python_executable(env).is_file()
    }

    fn create(&self, env: &EnvironmentSpec) -> Result<()> {
        let python = detect_interpreter(env.python.as_deref())?;
        let env_dir = env.env_dir();
        info!(env = %env.name, path = %env_dir.display(), "creating environment");
        let args = vec![
            "-m".to_string(),
            "venv".to_string(),
            env_dir.to_string_lossy().into_owned(),
        ];
        let output = run_command(&python, &args, &[], &env.root)?;
        if !output.succeeded() {
            let mut command = vec![python];
            command.extend(args);
            return Err(LockError::subprocess(
                format!("failed to create environment `{}`", env.name),
                &command,
                output.code,
                output.stdout,
                output.stderr,
            )
            .into());
        }
        Ok(())
    }

    fn python_version(&self, env: &EnvironmentSpec) -> Result<PythonVersion> {
        let output = self.probe(env, VERSION_SCRIPT)?;
        parse_version_probe(&output)
            .with_context(|| format!("failed to read interpreter version of `{}`", env.name))
    }

    fn run(&self, env: &EnvironmentSpec, argv: &[String]) -> Result<RunOutput> {
        let Some((program, args)) = argv.split_first() else {
            anyhow::bail!("empty command for environment `{}`", env.name);
        };
        debug!(env = %env.name, command = %argv.join(" "), "running");
        let envs = Self::activation(env)?;
        run_command(program, args, &envs, &env.root)
    }

    fn installed_distributions(&self, env: &EnvironmentSpec) -> Result<BTreeMap<String, String>> {
        let output = self.probe(env, DISTRIBUTIONS_SCRIPT)?;
        parse_distributions_probe(&output)
            .with_context(|| format!("failed to list packages in `{}`", env.name))
    }

    fn marker_environment(&self, env: &EnvironmentSpec) -> Result<MarkerEnvironment> {
        let output = self.probe(env, MARKER_SCRIPT)?;
        parse_marker_probe(&output)
            .with_context(|| format!("failed to read marker environment of `{}`", env.name))
    }
}
