//! In-memory environment host for session and command tests.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use anyhow::{Context, Result};
use hpc_domain::{parse_pinned_requirements, EnvironmentSpec, PythonVersion};
use pep508_rs::{MarkerEnvironment, StringVersion};

use crate::runtime::{EnvironmentHost, RunOutput};

const TOOLING: [(&str, &str); 2] = [("pip-tools", "7.4.1"), ("uv", "0.1.0")];

#[derive(Default)]
struct FakeState {
    created: BTreeSet<String>,
    installed: BTreeMap<String, BTreeMap<String, String>>,
    commands: Vec<(String, Vec<String>)>,
}

/// Records every command and mimics pip-compile, pip and pip-sync closely
/// enough for the lockfile engine: compiles pin each input at `1.0.0`.
pub(crate) struct FakeHost {
    version: PythonVersion,
    fail_compile: bool,
    state: Mutex<FakeState>,
}

impl FakeHost {
    pub(crate) fn new(version: PythonVersion) -> Self {
        Self {
            version,
            fail_compile: false,
            state: Mutex::new(FakeState::default()),
        }
    }

    pub(crate) fn failing_compile(mut self) -> Self {
        self.fail_compile = true;
        self
    }

    pub(crate) fn commands(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().expect("fake host state").commands.clone()
    }

    pub(crate) fn compile_count(&self) -> usize {
        self.commands()
            .iter()
            .filter(|(_, argv)| is_compile(argv))
            .count()
    }

    pub(crate) fn last_compile(&self) -> Option<Vec<String>> {
        self.commands()
            .into_iter()
            .rev()
            .find(|(_, argv)| is_compile(argv))
            .map(|(_, argv)| argv)
    }

    pub(crate) fn installed(&self, env: &str) -> BTreeMap<String, String> {
        self.state
            .lock()
            .expect("fake host state")
            .installed
            .get(env)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn uninstall(&self, env: &str, package: &str) {
        if let Some(packages) = self
            .state
            .lock()
            .expect("fake host state")
            .installed
            .get_mut(env)
        {
            packages.remove(package);
        }
    }
}

/// Marker values of a CPython interpreter on `sys_platform`.
pub(crate) fn markers(version: PythonVersion, sys_platform: &str) -> MarkerEnvironment {
    let short = version.to_string();
    let full = format!("{short}.0");
    let windows = sys_platform == "win32";
    MarkerEnvironment {
        implementation_name: "cpython".into(),
        implementation_version: StringVersion::from_str(&full).expect("impl version"),
        os_name: if windows { "nt" } else { "posix" }.into(),
        platform_machine: "x86_64".into(),
        platform_python_implementation: "CPython".into(),
        platform_release: "6.0".into(),
        platform_system: if windows { "Windows" } else { "Linux" }.into(),
        platform_version: "6.0".into(),
        python_full_version: StringVersion::from_str(&full).expect("full version"),
        python_version: StringVersion::from_str(&short).expect("python version"),
        sys_platform: sys_platform.into(),
    }
}

fn is_compile(argv: &[String]) -> bool {
    argv.iter().any(|arg| arg == "compile")
}

fn flag_value<'a>(argv: &'a [String], flag: &str) -> Option<&'a str> {
    argv.iter()
        .position(|arg| arg == flag)
        .and_then(|idx| argv.get(idx + 1))
        .map(String::as_str)
}

fn package_name(spec: &str) -> String {
    spec.trim()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect::<String>()
        .to_ascii_lowercase()
}

fn compile(argv: &[String]) -> Result<()> {
    let output = flag_value(argv, "--output-file").context("compile without --output-file")?;
    let input = argv.last().context("compile without input")?;
    let constraint = flag_value(argv, "--constraint");
    let declared = fs::read_to_string(input)?;
    let names: BTreeSet<String> = declared
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(package_name)
        .collect();
    let mut body = String::new();
    for name in names {
        body.push_str(&format!("{name}==1.0.0\n    # via\n"));
        if let Some(constraint) = constraint {
            body.push_str(&format!("    #   -c {constraint}\n"));
        }
        body.push_str(&format!("    #   -r {input}\n"));
    }
    fs::write(output, body)?;
    Ok(())
}

fn locked_pins(path: &Path) -> Result<BTreeMap<String, String>> {
    let text = fs::read_to_string(path)?;
    Ok(parse_pinned_requirements(&text)?
        .iter()
        .map(|requirement| {
            (
                requirement.name().to_string(),
                requirement.pinned_version().unwrap_or("0").to_string(),
            )
        })
        .collect())
}

impl EnvironmentHost for FakeHost {
    fn exists(&self, env: &EnvironmentSpec) -> bool {
        self.state
            .lock()
            .expect("fake host state")
            .created
            .contains(&env.name)
    }

    fn create(&self, env: &EnvironmentSpec) -> Result<()> {
        self.state
            .lock()
            .expect("fake host state")
            .created
            .insert(env.name.clone());
        Ok(())
    }

    fn python_version(&self, _env: &EnvironmentSpec) -> Result<PythonVersion> {
        Ok(self.version)
    }

    fn run(&self, env: &EnvironmentSpec, argv: &[String]) -> Result<RunOutput> {
        self.state
            .lock()
            .expect("fake host state")
            .commands
            .push((env.name.clone(), argv.to_vec()));

        if is_compile(argv) {
            if self.fail_compile {
                return Ok(RunOutput {
                    code: 1,
                    stdout: String::new(),
                    stderr: "ResolutionImpossible: conflicting pins\n".into(),
                });
            }
            compile(argv)?;
            return Ok(RunOutput::success(""));
        }

        let mut state = self.state.lock().expect("fake host state");
        let installed = state.installed.entry(env.name.clone()).or_default();
        if argv.iter().any(|arg| arg == "sync") {
            let lockfile = argv.last().context("sync without lockfile")?;
            let pins = locked_pins(Path::new(lockfile))?;
            installed.retain(|name, _| TOOLING.iter().any(|(tool, _)| tool == name));
            installed.extend(pins);
        } else if let Some(lockfile) = flag_value(argv, "--requirement") {
            installed.extend(locked_pins(Path::new(lockfile))?);
        } else if argv.iter().any(|arg| arg == "--no-deps") {
            let project = env.project_name.clone().unwrap_or_else(|| "demo".into());
            installed.insert(project, "0.1.0".into());
        } else {
            for (tool, version) in TOOLING {
                if argv.iter().any(|arg| arg == tool) {
                    installed.insert(tool.to_string(), version.to_string());
                }
            }
        }
        Ok(RunOutput::success(""))
    }

    fn installed_distributions(&self, env: &EnvironmentSpec) -> Result<BTreeMap<String, String>> {
        Ok(self.installed(&env.name))
    }

    fn marker_environment(&self, _env: &EnvironmentSpec) -> Result<MarkerEnvironment> {
        Ok(markers(self.version, "linux"))
    }
}
