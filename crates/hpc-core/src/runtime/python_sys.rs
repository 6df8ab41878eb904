use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use hpc_domain::lockfile::canonicalize_package_name;
use hpc_domain::PythonVersion;
use pep508_rs::{MarkerEnvironment, StringVersion};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::from_str;
use which::which;

use crate::config::settings::PYTHON_ENV;
use crate::runtime::process::RunOutput;

pub(crate) const VERSION_SCRIPT: &str = r#"import json, sys
print(json.dumps({"major": sys.version_info[0], "minor": sys.version_info[1]}))
"#;

pub(crate) const DISTRIBUTIONS_SCRIPT: &str = r#"import json
from importlib import metadata
data = {}
for dist in metadata.distributions():
    name = dist.metadata["Name"]
    if name:
        data[name] = dist.version
print(json.dumps(data))
"#;

pub(crate) const MARKER_SCRIPT: &str = r#"import json, os, platform, sys
data = {
    "implementation_name": getattr(sys.implementation, "name", "cpython"),
    "implementation_version": platform.python_version(),
    "os_name": os.name,
    "platform_machine": platform.machine(),
    "platform_python_implementation": platform.python_implementation(),
    "platform_release": platform.release(),
    "platform_system": platform.system(),
    "platform_version": platform.version(),
    "python_full_version": platform.python_version(),
    "python_version": f"{sys.version_info[0]}.{sys.version_info[1]}",
    "sys_platform": sys.platform,
}
print(json.dumps(data))
"#;

/// Base interpreter used to create environments.
///
/// `HATCH_PIP_COMPILE_PYTHON` wins; otherwise the environment's `python`
/// option (a version such as `3.11` or an executable name/path); otherwise
/// `python3` or `python` from `PATH`.
///
/// # Errors
///
/// Returns an error when no interpreter can be found or the path is not UTF-8.
pub fn detect_interpreter(preferred: Option<&str>) -> Result<String> {
    if let Ok(explicit) = std::env::var(PYTHON_ENV) {
        if !explicit.trim().is_empty() {
            return Ok(explicit);
        }
    }

    let mut candidates = Vec::new();
    if let Some(preferred) = preferred.map(str::trim).filter(|value| !value.is_empty()) {
        if Path::new(preferred).is_absolute() {
            return Ok(preferred.to_string());
        }
        if preferred.starts_with(|c: char| c.is_ascii_digit()) {
            candidates.push(format!("python{preferred}"));
        } else {
            candidates.push(preferred.to_string());
        }
    }
    candidates.extend(["python3".to_string(), "python".to_string()]);

    for candidate in &candidates {
        if let Ok(path) = which(candidate) {
            return path
                .into_os_string()
                .into_string()
                .map_err(|_| anyhow!("non-utf8 path"));
        }
    }

    bail!("no python interpreter found; set {PYTHON_ENV}")
}

#[derive(Deserialize)]
struct VersionPayload {
    major: u64,
    minor: u64,
}

pub(crate) fn parse_version_probe(output: &RunOutput) -> Result<PythonVersion> {
    let payload: VersionPayload = parse_probe(output, "interpreter version")?;
    Ok(PythonVersion::new(payload.major, payload.minor))
}

#[derive(Deserialize)]
struct MarkerPayload {
    implementation_name: String,
    implementation_version: String,
    os_name: String,
    platform_machine: String,
    platform_python_implementation: String,
    platform_release: String,
    platform_system: String,
    platform_version: String,
    python_full_version: String,
    python_version: String,
    sys_platform: String,
}

pub(crate) fn parse_marker_probe(output: &RunOutput) -> Result<MarkerEnvironment> {
    let payload: MarkerPayload = parse_probe(output, "marker environment")?;
    Ok(MarkerEnvironment {
        implementation_name: payload.implementation_name,
        implementation_version: string_version(
            &payload.implementation_version,
            "implementation_version",
        )?,
        os_name: payload.os_name,
        platform_machine: payload.platform_machine,
        platform_python_implementation: payload.platform_python_implementation,
        platform_release: payload.platform_release,
        platform_system: payload.platform_system,
        platform_version: payload.platform_version,
        python_full_version: string_version(&payload.python_full_version, "python_full_version")?,
        python_version: string_version(&payload.python_version, "python_version")?,
        sys_platform: payload.sys_platform,
    })
}

fn string_version(value: &str, field: &str) -> Result<StringVersion> {
    StringVersion::from_str(value)
        .map_err(|err| anyhow!("`{value}` is not a valid PEP 440 version for `{field}`: {err}"))
}

/// Installed distributions keyed by normalized project name.
pub(crate) fn parse_distributions_probe(output: &RunOutput) -> Result<BTreeMap<String, String>> {
    let payload: BTreeMap<String, String> = parse_probe(output, "installed distributions")?;
    Ok(payload
        .into_iter()
        .map(|(name, version)| (canonicalize_package_name(&name), version))
        .collect())
}

fn parse_probe<T>(output: &RunOutput, guide: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    if !output.succeeded() {
        bail!("python {guide} probe failed: {}", output.stderr.trim());
    }
    let line = output
        .stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or_default();
    from_str(line).with_context(|| format!("invalid {guide} payload"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpc_domain::LockRequirement;
    use serial_test::serial;

    #[test]
    fn version_probe_reads_major_minor() {
        let output = RunOutput::success("{\"major\": 3, \"minor\": 12}\n");
        assert_eq!(parse_version_probe(&output).unwrap(), PythonVersion::new(3, 12));
    }

    #[test]
    fn failed_probe_surfaces_stderr() {
        let output = RunOutput {
            code: 1,
            stdout: String::new(),
            stderr: "No module named json\n".into(),
        };
        let err = parse_version_probe(&output).unwrap_err();
        assert!(err.to_string().contains("No module named json"));
    }

    #[test]
    fn distribution_names_are_normalized() {
        let output = RunOutput::success("{\"Pytest_Cov\": \"4.1.0\", \"hatch\": \"1.9.1\"}");
        let installed = parse_distributions_probe(&output).unwrap();
        assert_eq!(installed.get("pytest-cov").map(String::as_str), Some("4.1.0"));
        assert_eq!(installed.get("hatch").map(String::as_str), Some("1.9.1"));
    }

    #[test]
    fn marker_probe_builds_environment() {
        let output = RunOutput::success(concat!(
            "{\"implementation_name\": \"cpython\", \"implementation_version\": \"3.12.1\", ",
            "\"os_name\": \"nt\", \"platform_machine\": \"AMD64\", ",
            "\"platform_python_implementation\": \"CPython\", \"platform_release\": \"10\", ",
            "\"platform_system\": \"Windows\", \"platform_version\": \"10.0.19045\", ",
            "\"python_full_version\": \"3.12.1\", \"python_version\": \"3.12\", ",
            "\"sys_platform\": \"win32\"}\n",
        ));
        let markers = parse_marker_probe(&output).unwrap();
        assert_eq!(markers.sys_platform, "win32");
        assert_eq!(markers.os_name, "nt");
        let tomli = LockRequirement::parse("tomli ; python_version < \"3.11\"").unwrap();
        assert!(!tomli.applies_to(&markers));
    }

    #[test]
    fn marker_probe_rejects_bad_versions() {
        let output = RunOutput::success(concat!(
            "{\"implementation_name\": \"cpython\", \"implementation_version\": \"x\", ",
            "\"os_name\": \"posix\", \"platform_machine\": \"x86_64\", ",
            "\"platform_python_implementation\": \"CPython\", \"platform_release\": \"6\", ",
            "\"platform_system\": \"Linux\", \"platform_version\": \"6\", ",
            "\"python_full_version\": \"3.12.1\", \"python_version\": \"3.12\", ",
            "\"sys_platform\": \"linux\"}",
        ));
        let err = parse_marker_probe(&output).unwrap_err();
        assert!(err.to_string().contains("implementation_version"), "{err}");
    }

    #[test]
    #[serial]
    fn explicit_interpreter_variable_wins() {
        std::env::set_var(PYTHON_ENV, "/opt/python/bin/python3.11");
        let detected = detect_interpreter(Some("3.9"));
        std::env::remove_var(PYTHON_ENV);
        assert_eq!(detected.unwrap(), "/opt/python/bin/python3.11");
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn absolute_preference_is_used_verbatim() {
        std::env::remove_var(PYTHON_ENV);
        let detected = detect_interpreter(Some("/usr/local/bin/python3")).unwrap();
        assert_eq!(detected, "/usr/local/bin/python3");
    }
}
