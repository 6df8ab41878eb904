use std::path::Path;

use hpc_domain::InstallerKind;

use super::resolver::path_arg;

/// Inputs for materializing a lockfile into an environment.
#[derive(Clone, Copy, Debug)]
pub struct InstallContext<'a> {
    pub python: &'a Path,
    pub lockfile: &'a Path,
    pub install_args: &'a [String],
    pub verbose: bool,
}

pub trait InstallerStrategy: Send + Sync {
    fn kind(&self) -> InstallerKind;

    fn packages(&self) -> &'static [&'static str];

    /// `pip install`-style command with `args` appended; also used for the
    /// project itself and for the strategies' own packages.
    fn install_command(&self, python: &Path, verbose: bool, args: &[String]) -> Vec<String>;

    fn dependencies_command(&self, context: &InstallContext<'_>) -> Vec<String> {
        let mut args = context.install_args.to_vec();
        args.push("--requirement".to_string());
        args.push(path_arg(context.lockfile));
        self.install_command(context.python, context.verbose, &args)
    }

    /// Whether a zero-dependency environment still runs the installer against
    /// an empty lockfile.
    fn materializes_empty_lock(&self) -> bool {
        false
    }

    /// Whether installing dependencies removes everything not in the lockfile,
    /// the project's own install included.
    fn replaces_environment(&self) -> bool {
        false
    }
}

fn pip_install(python: &Path, verbose: bool, args: &[String]) -> Vec<String> {
    let mut command = vec![
        path_arg(python),
        "-u".to_string(),
        "-m".to_string(),
        "pip".to_string(),
        "install".to_string(),
        "--disable-pip-version-check".to_string(),
        "--no-python-version-warning".to_string(),
        if verbose { "-v" } else { "-q" }.to_string(),
    ];
    command.extend(args.iter().cloned());
    command
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PipInstaller;

impl InstallerStrategy for PipInstaller {
    fn kind(&self) -> InstallerKind {
        InstallerKind::Pip
    }

    fn packages(&self) -> &'static [&'static str] {
        &[]
    }

    fn install_command(&self, python: &Path, verbose: bool, args: &[String]) -> Vec<String> {
        pip_install(python, verbose, args)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct UvInstaller;

impl InstallerStrategy for UvInstaller {
    fn kind(&self) -> InstallerKind {
        InstallerKind::Uv
    }

    fn packages(&self) -> &'static [&'static str] {
        &["uv"]
    }

    fn install_command(&self, python: &Path, verbose: bool, args: &[String]) -> Vec<String> {
        let mut command = vec![
            path_arg(python),
            "-m".to_string(),
            "uv".to_string(),
            "pip".to_string(),
            "install".to_string(),
            if verbose { "-v" } else { "-q" }.to_string(),
        ];
        command.extend(args.iter().cloned());
        command
    }
}

/// `pip-sync`: makes the environment match the lockfile exactly.
#[derive(Clone, Copy, Debug, Default)]
pub struct PipSyncInstaller;

impl InstallerStrategy for PipSyncInstaller {
    fn kind(&self) -> InstallerKind {
        InstallerKind::PipSync
    }

    fn packages(&self) -> &'static [&'static str] {
        &["pip-tools"]
    }

    fn install_command(&self, python: &Path, verbose: bool, args: &[String]) -> Vec<String> {
        pip_install(python, verbose, args)
    }

    fn dependencies_command(&self, context: &InstallContext<'_>) -> Vec<String> {
        let python = path_arg(context.python);
        let mut command = vec![
            python.clone(),
            "-m".to_string(),
            "piptools".to_string(),
            "sync".to_string(),
            if context.verbose { "--verbose" } else { "--quiet" }.to_string(),
            "--python-executable".to_string(),
            python,
        ];
        command.extend(context.install_args.iter().cloned());
        command.push(path_arg(context.lockfile));
        command
    }

    fn materializes_empty_lock(&self) -> bool {
        true
    }

    fn replaces_environment(&self) -> bool {
        true
    }
}

pub fn installer_for(kind: InstallerKind) -> Box<dyn InstallerStrategy> {
    match kind {
        InstallerKind::Pip => Box::new(PipInstaller),
        InstallerKind::PipSync => Box::new(PipSyncInstaller),
        InstallerKind::Uv => Box::new(UvInstaller),
    }
}

/// `--no-deps [--editable] <root>` for installing the project itself.
pub fn project_install_args(root: &Path, editable: bool) -> Vec<String> {
    let mut args = vec!["--no-deps".to_string()];
    if editable {
        args.push("--editable".to_string());
    }
    args.push(path_arg(root));
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(args: &[String]) -> InstallContext<'_> {
        InstallContext {
            python: Path::new("/venv/bin/python"),
            lockfile: Path::new("/project/requirements.txt"),
            install_args: args,
            verbose: false,
        }
    }

    #[test]
    fn pip_installs_from_requirement_file() {
        let args = vec!["--no-cache-dir".to_string()];
        let command = installer_for(InstallerKind::Pip).dependencies_command(&context(&args));
        assert_eq!(
            command,
            vec![
                "/venv/bin/python",
                "-u",
                "-m",
                "pip",
                "install",
                "--disable-pip-version-check",
                "--no-python-version-warning",
                "-q",
                "--no-cache-dir",
                "--requirement",
                "/project/requirements.txt",
            ]
        );
    }

    #[test]
    fn uv_installs_through_uv_pip() {
        let strategy = installer_for(InstallerKind::Uv);
        let command = strategy.dependencies_command(&context(&[]));
        assert_eq!(&command[1..6], &["-m", "uv", "pip", "install", "-q"]);
        assert_eq!(command.last().map(String::as_str), Some("/project/requirements.txt"));
        assert_eq!(strategy.packages(), &["uv"]);
        assert!(!strategy.replaces_environment());
    }

    #[test]
    fn pip_sync_targets_the_environment_interpreter() {
        let strategy = installer_for(InstallerKind::PipSync);
        let command = strategy.dependencies_command(&context(&[]));
        assert_eq!(
            command,
            vec![
                "/venv/bin/python",
                "-m",
                "piptools",
                "sync",
                "--quiet",
                "--python-executable",
                "/venv/bin/python",
                "/project/requirements.txt",
            ]
        );
        assert!(strategy.materializes_empty_lock());
        assert!(strategy.replaces_environment());
    }

    #[test]
    fn project_install_is_editable_in_dev_mode() {
        assert_eq!(
            project_install_args(Path::new("/project"), true),
            vec!["--no-deps", "--editable", "/project"]
        );
        assert_eq!(
            project_install_args(Path::new("/project"), false),
            vec!["--no-deps", "/project"]
        );
    }
}
