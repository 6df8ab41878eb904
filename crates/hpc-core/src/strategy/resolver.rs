use std::path::{Path, PathBuf};

use hpc_domain::ResolverKind;

/// Everything a resolver needs to turn an `.in` file into a lockfile.
#[derive(Clone, Debug)]
pub struct ResolverInvocation {
    pub python: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub constraint: Option<PathBuf>,
    pub hashes: bool,
    pub verbose: bool,
    pub strip_extras: bool,
    pub extra_args: Vec<String>,
    pub upgrade_args: Vec<String>,
}

pub trait ResolverStrategy: Send + Sync {
    fn kind(&self) -> ResolverKind;

    /// Packages that must be importable in the environment before resolving.
    fn packages(&self) -> &'static [&'static str];

    fn executable(&self, python: &Path) -> Vec<String>;

    fn options(&self, invocation: &ResolverInvocation) -> Vec<String>;

    fn build_command(&self, invocation: &ResolverInvocation) -> Vec<String> {
        let mut command = self.executable(&invocation.python);
        command.push(if invocation.verbose { "--verbose" } else { "--quiet" }.to_string());
        command.push("--no-header".to_string());
        command.extend(self.options(invocation));
        if invocation.hashes {
            command.push("--generate-hashes".to_string());
        }
        if let Some(constraint) = &invocation.constraint {
            command.push("--constraint".to_string());
            command.push(path_arg(constraint));
        }
        command.extend(invocation.extra_args.iter().cloned());
        command.extend(invocation.upgrade_args.iter().cloned());
        command.push("--output-file".to_string());
        command.push(path_arg(&invocation.output));
        command.push(path_arg(&invocation.input));
        command
    }
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PipCompileResolver;

impl ResolverStrategy for PipCompileResolver {
    fn kind(&self) -> ResolverKind {
        ResolverKind::PipCompile
    }

    fn packages(&self) -> &'static [&'static str] {
        &["pip-tools"]
    }

    fn executable(&self, python: &Path) -> Vec<String> {
        vec![
            path_arg(python),
            "-m".to_string(),
            "piptools".to_string(),
            "compile".to_string(),
        ]
    }

    fn options(&self, invocation: &ResolverInvocation) -> Vec<String> {
        let mut options = vec!["--resolver=backtracking".to_string()];
        if invocation.strip_extras {
            options.push("--strip-extras".to_string());
        }
        options
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct UvResolver;

impl ResolverStrategy for UvResolver {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Uv
    }

    fn packages(&self) -> &'static [&'static str] {
        &["uv"]
    }

    fn executable(&self, python: &Path) -> Vec<String> {
        vec![
            path_arg(python),
            "-m".to_string(),
            "uv".to_string(),
            "pip".to_string(),
            "compile".to_string(),
        ]
    }

    // uv strips extras unless told otherwise.
    fn options(&self, invocation: &ResolverInvocation) -> Vec<String> {
        if invocation.strip_extras {
            Vec::new()
        } else {
            vec!["--no-strip-extras".to_string()]
        }
    }
}

pub fn resolver_for(kind: ResolverKind) -> Box<dyn ResolverStrategy> {
    match kind {
        ResolverKind::PipCompile => Box::new(PipCompileResolver),
        ResolverKind::Uv => Box::new(UvResolver),
    }
}
