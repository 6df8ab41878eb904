use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexSet;
use toml_edit::{DocumentMut, Item, TableLike};

use super::options::{InstallerKind, PipCompileOptions, ResolverKind};
use super::{EnvironmentSpec, DEFAULT_ENVIRONMENT};
use crate::error::LockError;

const DEFAULT_TYPE: &str = "virtual";

/// Parsed `pyproject.toml` able to construct environment descriptors.
#[derive(Clone, Debug)]
pub struct ProjectManifest {
    root: PathBuf,
    doc: DocumentMut,
}

impl ProjectManifest {
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join("pyproject.toml");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(root, &contents)
    }

    pub fn parse(root: &Path, contents: &str) -> Result<Self> {
        let doc: DocumentMut = contents.parse().map_err(|err| {
            LockError::configuration(format!(
                "failed to parse {}: {err}",
                root.join("pyproject.toml").display()
            ))
        })?;
        Ok(Self {
            root: root.to_path_buf(),
            doc,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_name(&self) -> Option<String> {
        self.project_table()
            .and_then(|project| project.get("name"))
            .and_then(Item::as_str)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
    }

    /// Every configured environment name; `default` is always present.
    pub fn environment_names(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        names.insert(DEFAULT_ENVIRONMENT.to_string());
        if let Some(envs) = self.envs_table() {
            for (name, _) in envs.iter() {
                names.insert(name.to_string());
            }
        }
        names.into_iter().collect()
    }

    /// Construct the environment called `name`, or `None` when it is not
    /// configured. Invalid plugin options fail here rather than on first use.
    pub fn environment(&self, name: &str) -> Result<Option<EnvironmentSpec>, LockError> {
        if name != DEFAULT_ENVIRONMENT && self.env_table(name).is_none() {
            return Ok(None);
        }
        let chain = self.template_chain(name)?;
        let config = MergedConfig { chain };

        let mut env = EnvironmentSpec::new(name, self.root.clone());
        env.project_name = self.project_name();
        env.env_type = config
            .string(name, "type")?
            .unwrap_or_else(|| DEFAULT_TYPE.to_string());
        let detached = config.bool(name, "detached")?.unwrap_or(false);
        env.skip_install = detached || config.bool(name, "skip-install")?.unwrap_or(false);
        env.dev_mode = config.bool(name, "dev-mode")?.unwrap_or(true);
        env.python = config.string(name, "python")?;
        env.path = config.string(name, "path")?.map(PathBuf::from);
        env.options = PipCompileOptions {
            lock_filename: config.string(name, "lock-filename")?,
            hashes: config.bool(name, "pip-compile-hashes")?.unwrap_or(true),
            compile_args: config.strings(name, "pip-compile-args")?,
            constraint: config.string(name, "pip-compile-constraint")?,
            installer: config
                .string(name, "pip-compile-installer")?
                .map(|value| InstallerKind::parse_option(&value))
                .transpose()
                .map_err(|err| scope_error(name, err))?
                .unwrap_or_default(),
            resolver: config
                .string(name, "pip-compile-resolver")?
                .map(|value| ResolverKind::parse_option(&value))
                .transpose()
                .map_err(|err| scope_error(name, err))?
                .unwrap_or_default(),
            install_args: config.strings(name, "pip-compile-install-args")?,
            verbose: config.bool(name, "pip-compile-verbose")?,
            strip_extras: config.bool(name, "pip-compile-strip-extras")?.unwrap_or(true),
        };

        let mut dependencies: IndexSet<String> = IndexSet::new();
        dependencies.extend(config.strings(name, "dependencies")?);
        dependencies.extend(config.strings(name, "extra-dependencies")?);
        if !env.skip_install {
            dependencies.extend(self.project_dependencies()?);
            for feature in config.strings(name, "features")? {
                dependencies.extend(self.feature_dependencies(name, &feature)?);
            }
        }
        env.dependencies = dependencies.into_iter().collect();
        Ok(Some(env))
    }

    fn project_table(&self) -> Option<&dyn TableLike> {
        self.doc.get("project").and_then(Item::as_table_like)
    }

    fn envs_table(&self) -> Option<&dyn TableLike> {
        self.doc
            .get("tool")
            .and_then(Item::as_table_like)
            .and_then(|tool| tool.get("hatch"))
            .and_then(Item::as_table_like)
            .and_then(|hatch| hatch.get("envs"))
            .and_then(Item::as_table_like)
    }

    fn env_table(&self, name: &str) -> Option<&dyn TableLike> {
        self.envs_table()
            .and_then(|envs| envs.get(name))
            .and_then(Item::as_table_like)
    }

    /// The environment's own table followed by its templates.
    fn template_chain(&self, name: &str) -> Result<Vec<&dyn TableLike>, LockError> {
        let mut chain = Vec::new();
        let mut seen = vec![name.to_string()];
        let mut current = name.to_string();
        loop {
            let table = self.env_table(&current);
            if let Some(table) = table {
                chain.push(table);
            }
            let detached = table
                .and_then(|table| table.get("detached"))
                .and_then(Item::as_bool)
                .unwrap_or(false);
            if detached {
                break;
            }
            let template = table
                .and_then(|table| table.get("template"))
                .and_then(Item::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());
            if template == current {
                break;
            }
            if seen.contains(&template) {
                seen.push(template);
                return Err(LockError::configuration(format!(
                    "environment templates form a cycle: {}",
                    seen.join(" -> ")
                )));
            }
            if template != DEFAULT_ENVIRONMENT && self.env_table(&template).is_none() {
                return Err(LockError::configuration(format!(
                    "environment `{current}` uses unknown template `{template}`"
                )));
            }
            seen.push(template.clone());
            current = template;
        }
        Ok(chain)
    }

    fn project_dependencies(&self) -> Result<Vec<String>, LockError> {
        let Some(project) = self.project_table() else {
            return Ok(Vec::new());
        };
        string_array(project.get("dependencies"), "project.dependencies")
    }

    fn feature_dependencies(&self, env: &str, feature: &str) -> Result<Vec<String>, LockError> {
        let optional = self
            .project_table()
            .and_then(|project| project.get("optional-dependencies"))
            .and_then(Item::as_table_like);
        let Some(deps) = optional.and_then(|table| table.get(feature)) else {
            return Err(LockError::configuration(format!(
                "environment `{env}` selects unknown feature `{feature}`"
            )));
        };
        string_array(Some(deps), &format!("project.optional-dependencies.{feature}"))
    }
}

struct MergedConfig<'a> {
    chain: Vec<&'a dyn TableLike>,
}

impl MergedConfig<'_> {
    fn get(&self, key: &str) -> Option<&Item> {
        self.chain.iter().find_map(|table| table.get(key))
    }

    fn string(&self, env: &str, key: &str) -> Result<Option<String>, LockError> {
        match self.get(key) {
            None => Ok(None),
            Some(item) => item
                .as_str()
                .map(|value| Some(value.trim().to_string()))
                .ok_or_else(|| type_error(env, key, "a string")),
        }
    }

    fn bool(&self, env: &str, key: &str) -> Result<Option<bool>, LockError> {
        match self.get(key) {
            None => Ok(None),
            Some(item) => item
                .as_bool()
                .map(Some)
                .ok_or_else(|| type_error(env, key, "a boolean")),
        }
    }

    fn strings(&self, env: &str, key: &str) -> Result<Vec<String>, LockError> {
        string_array(self.get(key), &format!("tool.hatch.envs.{env}.{key}"))
    }
}

fn string_array(item: Option<&Item>, key: &str) -> Result<Vec<String>, LockError> {
    let Some(item) = item else {
        return Ok(Vec::new());
    };
    let array = item.as_array().ok_or_else(|| {
        LockError::configuration(format!("`{key}` must be an array of strings"))
    })?;
    array
        .iter()
        .map(|value| {
            value
                .as_str()
                .map(|value| value.trim().to_string())
                .ok_or_else(|| {
                    LockError::configuration(format!("`{key}` must be an array of strings"))
                })
        })
        .filter(|value| !matches!(value, Ok(text) if text.is_empty()))
        .collect()
}

fn type_error(env: &str, key: &str, expected: &str) -> LockError {
    LockError::configuration(format!("`tool.hatch.envs.{env}.{key}` must be {expected}"))
}

fn scope_error(env: &str, err: LockError) -> LockError {
    let hint = err.hint().map(ToString::to_string);
    let scoped = LockError::configuration(format!("environment `{env}`: {err}"));
    match hint {
        Some(hint) => scoped.with_hint(hint),
        None => scoped,
    }
}
