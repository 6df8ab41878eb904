//! Per-invocation lockfile engine.
//!
//! A [`LockSession`] answers "is this environment's lockfile current", and
//! regenerates and installs lockfiles when it is not. Constraint environments
//! are checked (and regenerated) before the environments that depend on them.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::str::FromStr;

use anyhow::{Context, Result};
use hpc_domain::{
    decide, file_content_hash, nothing_to_lock, parse_pinned_requirements, read_lockfile,
    reconcile_lock, remove_lockfile, write_lockfile_atomic, ConstraintRecord, ConstraintState,
    EnvironmentSpec, LockError, LockFileContents, LockRequirement, LockfileState,
    ReconcileRequest, Staleness, StalenessInputs,
};
use pep440_rs::Version;
use pep508_rs::MarkerEnvironment;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::Signals;
use crate::constraint::resolve_constraint_environment;
use crate::registry::EnvironmentRegistry;
use crate::runtime::{EnvironmentHost, RunOutput};
use crate::strategy::installer::PipInstaller;
use crate::strategy::{
    installer_for, project_install_args, resolver_for, InstallContext, InstallerStrategy,
    ResolverInvocation,
};

/// What [`LockSession::ensure_environment`] did to one environment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EnvironmentReport {
    pub name: String,
    pub staleness: Staleness,
    pub created: bool,
    pub regenerated: bool,
    pub synced: bool,
    pub lockfile: String,
    pub lockfile_exists: bool,
    pub dependency_hash: String,
}

pub struct LockSession<'a> {
    registry: &'a dyn EnvironmentRegistry,
    host: &'a dyn EnvironmentHost,
    signals: Signals,
    refreshed: BTreeSet<String>,
    tooling: BTreeSet<(String, &'static str)>,
}

impl<'a> LockSession<'a> {
    pub fn new(
        registry: &'a dyn EnvironmentRegistry,
        host: &'a dyn EnvironmentHost,
        signals: Signals,
    ) -> Self {
        Self {
            registry,
            host,
            signals,
            refreshed: BTreeSet::new(),
            tooling: BTreeSet::new(),
        }
    }

    pub fn signals(&self) -> &Signals {
        &self.signals
    }

    /// Whether `name` had its lockfile rewritten or removed in this session.
    pub fn was_refreshed(&self, name: &str) -> bool {
        self.refreshed.contains(name)
    }

    /// Staleness verdict for `env`.
    ///
    /// Checking a constrained environment first validates its constraint
    /// environment and regenerates that lockfile when it is stale.
    pub fn check(&mut self, env: &EnvironmentSpec) -> Result<Staleness> {
        let mut chain = Vec::new();
        self.check_in(env, &mut chain)
    }

    pub fn lockfile_up_to_date(&mut self, env: &EnvironmentSpec) -> Result<bool> {
        Ok(self.check(env)?.is_up_to_date())
    }

    fn check_in(&mut self, env: &EnvironmentSpec, chain: &mut Vec<String>) -> Result<Staleness> {
        let current = env.requirements()?;
        let contents = read_lockfile(&env.lockfile_path())?;
        let lockfile = LockfileState::from_contents(&contents);
        if nothing_to_lock(&current, &lockfile) {
            debug!(env = %env.name, "no dependencies and no lockfile");
            return Ok(Staleness::NothingToLock);
        }

        chain.push(env.name.clone());
        let constraint = match resolve_constraint_environment(self.registry, env, chain)? {
            Some(upstream) => Some(self.constraint_state(&upstream, chain)?),
            None => None,
        };
        chain.pop();

        let force_upgrade = self.signals.force_upgrade() && !self.refreshed.contains(&env.name);
        let verdict = decide(&StalenessInputs {
            current: &current,
            lockfile: &lockfile,
            constraint: constraint.as_ref(),
            force_upgrade,
        });
        if let LockfileState::Corrupt(err) = &lockfile {
            debug!(env = %env.name, error = %err, "lockfile is unreadable");
        }
        debug!(env = %env.name, verdict = %verdict, "lockfile check");
        Ok(verdict)
    }

    /// Validate `upstream`, regenerating its lockfile when stale, and report
    /// its digest as it is on disk afterwards.
    fn constraint_state(
        &mut self,
        upstream: &EnvironmentSpec,
        chain: &mut Vec<String>,
    ) -> Result<ConstraintState> {
        let verdict = self.check_in(upstream, chain)?;
        let lock_current = verdict.is_up_to_date();
        if !lock_current {
            if self.signals.compile_disabled {
                return Err(disabled_constraint_error(upstream, verdict).into());
            }
            info!(
                env = %upstream.name,
                reason = %verdict,
                "regenerating constraint environment lockfile"
            );
            self.run_resolver_in(upstream, chain)?;
        }
        let lockfile = upstream.lockfile_path();
        if !lockfile.is_file() {
            return Err(LockError::missing(
                format!(
                    "constraint environment `{}` has no lockfile at {}",
                    upstream.name,
                    upstream.portable_lockfile_path()
                ),
                format!("run `hatch-pip-compile {}` first", upstream.name),
            )
            .into());
        }
        Ok(ConstraintState {
            current_digest: file_content_hash(&lockfile)?,
            constraint_lock_current: lock_current,
        })
    }

    /// Regenerate the lockfile of `env` unconditionally.
    pub fn run_resolver(&mut self, env: &EnvironmentSpec) -> Result<()> {
        let mut chain = Vec::new();
        self.run_resolver_in(env, &mut chain)
    }

    fn run_resolver_in(&mut self, env: &EnvironmentSpec, chain: &mut Vec<String>) -> Result<()> {
        let lockfile = env.lockfile_path();
        if env.dependencies.is_empty() {
            if remove_lockfile(&lockfile)? {
                info!(env = %env.name, path = %lockfile.display(), "removed lockfile");
            }
            self.refreshed.insert(env.name.clone());
            return Ok(());
        }
        if self.signals.compile_disabled {
            return Err(LockError::resolution_disabled(&env.name).into());
        }

        self.ensure_created(env)?;
        let resolver = resolver_for(env.options.resolver);
        self.ensure_packages(env, resolver.packages())?;

        let python_version = self.host.python_version(env)?;
        let existing = read_lockfile(&lockfile)?;
        if let Some(recorded) = LockfileState::from_contents(&existing).python_version() {
            if recorded != python_version {
                warn!(
                    env = %env.name,
                    recorded = %recorded,
                    current = %python_version,
                    "lockfile was generated with a different python version"
                );
            }
        }

        chain.push(env.name.clone());
        let upstream = match resolve_constraint_environment(self.registry, env, chain)? {
            Some(upstream) => {
                let state = self.constraint_state(&upstream, chain)?;
                Some((upstream, state))
            }
            None => None,
        };
        chain.pop();

        let workdir = tempfile::Builder::new()
            .prefix("hatch-pip-compile")
            .tempdir()
            .context("failed to create resolver working directory")?;
        let input = workdir.path().join(format!("{}.in", env.name));
        let output = workdir.path().join(format!("{}.txt", env.name));
        let mut input_text = env.dependencies.join("\n");
        input_text.push('\n');
        fs::write(&input, input_text)
            .with_context(|| format!("failed to write {}", input.display()))?;
        if let Some(previous) = existing.text() {
            // Existing pins seed the resolver so unrelated packages stay put.
            fs::write(&output, previous)
                .with_context(|| format!("failed to write {}", output.display()))?;
        }

        let upgrade_args = if self.refreshed.contains(&env.name) {
            Vec::new()
        } else {
            self.signals.upgrade_args()
        };
        let invocation = ResolverInvocation {
            python: self.host.python_executable(env),
            input,
            output: output.clone(),
            constraint: upstream.as_ref().map(|(upstream, _)| upstream.lockfile_path()),
            hashes: env.options.hashes,
            verbose: env.options.verbose == Some(true),
            strip_extras: env.options.strip_extras,
            extra_args: env.options.compile_args.clone(),
            upgrade_args,
        };
        let command = resolver.build_command(&invocation);
        info!(env = %env.name, resolver = %resolver.kind(), "resolving dependencies");
        self.run_checked(env, &command, "dependency resolution")?;

        let raw = fs::read_to_string(&output)
            .with_context(|| format!("resolver did not produce {}", output.display()))?;
        let constraint = upstream.map(|(upstream, state)| ConstraintRecord {
            path: upstream.portable_lockfile_path(),
            digest: state.current_digest,
        });
        let reconciled = reconcile_lock(
            &raw,
            &ReconcileRequest {
                env_name: &env.name,
                python_version,
                dependencies: &env.dependencies,
                constraint,
            },
        );
        write_lockfile_atomic(&lockfile, &reconciled)?;
        self.refreshed.insert(env.name.clone());
        info!(env = %env.name, path = %lockfile.display(), "wrote lockfile");
        Ok(())
    }

    /// Pinned requirements recorded in the lockfile body.
    pub fn read_lock_requirements(&self, env: &EnvironmentSpec) -> Result<Vec<LockRequirement>> {
        if env.dependencies.is_empty() {
            return Ok(Vec::new());
        }
        match read_lockfile(&env.lockfile_path())? {
            LockFileContents::Text(text) => Ok(parse_pinned_requirements(&text)?),
            LockFileContents::Empty => Ok(Vec::new()),
            LockFileContents::Undecodable(reason) => Err(LockError::corrupt(reason)
                .with_hint(format!("run `hatch-pip-compile {}`", env.name))
                .into()),
            LockFileContents::Missing => Err(LockError::missing(
                format!(
                    "environment `{}` has no lockfile at {}",
                    env.name,
                    env.portable_lockfile_path()
                ),
                format!("run `hatch-pip-compile {}`", env.name),
            )
            .into()),
        }
    }

    /// Lockfile current and every pinned requirement installed.
    pub fn dependencies_in_sync(&mut self, env: &EnvironmentSpec) -> Result<bool> {
        if !self.check(env)?.is_up_to_date() {
            return Ok(false);
        }
        if !self.host.exists(env) {
            return Ok(false);
        }
        let pinned = self.read_lock_requirements(env)?;
        let installed = self.host.installed_distributions(env)?;
        let markers = self.host.marker_environment(env)?;
        Ok(requirements_satisfied(&pinned, &installed, &markers))
    }

    /// Bring the lockfile up to date and install it.
    pub fn sync_dependencies(&mut self, env: &EnvironmentSpec) -> Result<()> {
        let installer = installer_for(env.options.installer);
        if installer.replaces_environment() {
            return self.full_install(env, installer.as_ref());
        }
        self.ensure_lockfile(env)?;
        self.install_dependencies(env, installer.as_ref())
    }

    /// Install the project itself without its dependencies.
    pub fn install_project(&mut self, env: &EnvironmentSpec) -> Result<()> {
        if env.skip_install {
            return Ok(());
        }
        let installer = installer_for(env.options.installer);
        if installer.replaces_environment() {
            return self.full_install(env, installer.as_ref());
        }
        self.install_project_with(env, installer.as_ref())
    }

    /// Create the environment if needed and install whatever is out of sync.
    pub fn ensure_environment(&mut self, env: &EnvironmentSpec) -> Result<EnvironmentReport> {
        let created = self.ensure_created(env)?;
        let staleness = self.check(env)?;
        if created {
            self.install_project(env)?;
        }
        let synced = if self.dependencies_in_sync(env)? {
            false
        } else {
            self.sync_dependencies(env)?;
            true
        };
        let lockfile = env.lockfile_path();
        Ok(EnvironmentReport {
            name: env.name.clone(),
            staleness,
            created,
            regenerated: self.refreshed.contains(&env.name),
            synced: synced || created,
            lockfile: env.portable_lockfile_path(),
            lockfile_exists: lockfile.is_file(),
            dependency_hash: self.dependency_hash(env)?,
        })
    }

    /// SHA-256 over the sorted declared dependencies and the lockfile digest.
    pub fn dependency_hash(&self, env: &EnvironmentSpec) -> Result<String> {
        let mut dependencies: Vec<String> = env
            .requirements()?
            .iter()
            .map(|requirement| requirement.canonical().to_string())
            .collect();
        dependencies.sort();
        let mut hasher = Sha256::new();
        for dependency in &dependencies {
            hasher.update(dependency.as_bytes());
            hasher.update(b"\n");
        }
        let lockfile = env.lockfile_path();
        if lockfile.is_file() {
            hasher.update(file_content_hash(&lockfile)?.as_bytes());
        }
        Ok(hex::encode(hasher.finalize()))
    }

    fn ensure_lockfile(&mut self, env: &EnvironmentSpec) -> Result<()> {
        let verdict = self.check(env)?;
        if !verdict.is_up_to_date() {
            info!(env = %env.name, reason = %verdict, "lockfile is out of date");
            self.run_resolver(env)?;
        }
        Ok(())
    }

    // pip-sync removes the project along with everything else not locked, so
    // every entry point resolves, syncs and reinstalls the project.
    fn full_install(
        &mut self,
        env: &EnvironmentSpec,
        installer: &dyn InstallerStrategy,
    ) -> Result<()> {
        self.ensure_lockfile(env)?;
        self.install_dependencies(env, installer)?;
        if !env.skip_install {
            self.install_project_with(env, installer)?;
        }
        Ok(())
    }

    fn install_dependencies(
        &mut self,
        env: &EnvironmentSpec,
        installer: &dyn InstallerStrategy,
    ) -> Result<()> {
        self.ensure_created(env)?;
        self.ensure_packages(env, installer.packages())?;
        let lockfile = env.lockfile_path();
        let placeholder = env.dependencies.is_empty() && installer.materializes_empty_lock();
        if placeholder {
            write_lockfile_atomic(&lockfile, "")?;
        } else if !lockfile.is_file() {
            debug!(env = %env.name, "no lockfile to install");
            return Ok(());
        }
        let python = self.host.python_executable(env);
        let command = installer.dependencies_command(&InstallContext {
            python: &python,
            lockfile: &lockfile,
            install_args: &env.options.install_args,
            verbose: env.options.verbose == Some(true),
        });
        info!(env = %env.name, installer = %installer.kind(), "installing dependencies");
        let result = self.run_checked(env, &command, "dependency installation");
        if placeholder {
            remove_lockfile(&lockfile)?;
        }
        result.map(|_| ())
    }

    fn install_project_with(
        &mut self,
        env: &EnvironmentSpec,
        installer: &dyn InstallerStrategy,
    ) -> Result<()> {
        self.ensure_created(env)?;
        self.ensure_packages(env, installer.packages())?;
        let python = self.host.python_executable(env);
        let command = installer.install_command(
            &python,
            env.options.verbose == Some(true),
            &project_install_args(&env.root, env.dev_mode),
        );
        info!(env = %env.name, editable = env.dev_mode, "installing project");
        self.run_checked(env, &command, "project installation")
            .map(|_| ())
    }

    fn ensure_created(&self, env: &EnvironmentSpec) -> Result<bool> {
        if self.host.exists(env) {
            return Ok(false);
        }
        self.host.create(env)?;
        Ok(true)
    }

    /// Install the packages a strategy runs from inside the environment.
    fn ensure_packages(&mut self, env: &EnvironmentSpec, packages: &[&'static str]) -> Result<()> {
        let pending: Vec<&'static str> = packages
            .iter()
            .copied()
            .filter(|package| !self.tooling.contains(&(env.name.clone(), *package)))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        let installed = self.host.installed_distributions(env)?;
        let missing: Vec<String> = pending
            .iter()
            .filter(|package| !installed.contains_key(**package))
            .map(|package| (*package).to_string())
            .collect();
        if !missing.is_empty() {
            let python = self.host.python_executable(env);
            let command = PipInstaller.install_command(
                &python,
                env.options.verbose == Some(true),
                &missing,
            );
            info!(env = %env.name, packages = %missing.join(", "), "installing tooling");
            self.run_checked(env, &command, "tooling installation")?;
        }
        for package in pending {
            self.tooling.insert((env.name.clone(), package));
        }
        Ok(())
    }

    fn run_checked(
        &self,
        env: &EnvironmentSpec,
        command: &[String],
        what: &str,
    ) -> Result<RunOutput> {
        let output = self.host.run(env, command)?;
        if !output.succeeded() {
            return Err(LockError::subprocess(
                format!("{what} failed for environment `{}`", env.name),
                command,
                output.code,
                output.stdout,
                output.stderr,
            )
            .into());
        }
        Ok(output)
    }
}

fn disabled_constraint_error(upstream: &EnvironmentSpec, verdict: Staleness) -> LockError {
    let hint = format!("run `hatch-pip-compile {}` first", upstream.name);
    match verdict {
        Staleness::LockMissing => LockError::missing(
            format!(
                "constraint environment `{}` has no lockfile at {}",
                upstream.name,
                upstream.portable_lockfile_path()
            ),
            hint,
        ),
        Staleness::LockCorrupt | Staleness::LockEmpty => LockError::corrupt(format!(
            "lockfile of constraint environment `{}` is unreadable",
            upstream.name
        ))
        .with_hint(hint),
        _ => LockError::resolution_disabled(&upstream.name),
    }
}

/// Every pinned requirement whose marker holds in `markers` is installed at
/// its pinned version.
pub fn requirements_satisfied(
    pinned: &[LockRequirement],
    installed: &BTreeMap<String, String>,
    markers: &MarkerEnvironment,
) -> bool {
    pinned
        .iter()
        .filter(|requirement| requirement.applies_to(markers))
        .all(|requirement| {
            installed.get(requirement.name()).is_some_and(|version| {
                requirement
                    .pinned_version()
                    .is_none_or(|pin| versions_match(pin, version))
            })
        })
}

fn versions_match(pinned: &str, installed: &str) -> bool {
    match (Version::from_str(pinned), Version::from_str(installed)) {
        (Ok(pinned), Ok(installed)) => pinned == installed,
        _ => pinned.trim() == installed.trim(),
    }
}
