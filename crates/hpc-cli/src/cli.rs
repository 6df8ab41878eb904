use std::path::PathBuf;

use clap::{ArgAction, Parser};

pub const HPC_ABOUT: &str = "Upgrade your `hatch-pip-compile` managed dependencies from the command line.";

pub const HPC_AFTER_HELP: &str = concat!(
    "Examples:\n",
    "  hatch-pip-compile                  Re-lock the `default` environment.\n",
    "  hatch-pip-compile test docs        Re-lock `docs` and `test`.\n",
    "  hatch-pip-compile --all -U         Upgrade every pip-compile environment.\n",
    "  hatch-pip-compile -P requests      Upgrade only `requests` in `default`.\n",
);

#[derive(Parser, Debug)]
#[command(
    name = "hatch-pip-compile",
    version,
    about = HPC_ABOUT,
    after_help = HPC_AFTER_HELP
)]
#[allow(clippy::struct_excessive_bools)]
pub struct HpcCli {
    #[arg(value_name = "ENVIRONMENT", help = "Environments to re-lock (default: `default`)")]
    pub environments: Vec<String>,
    #[arg(
        short = 'U',
        long,
        help = "Try to upgrade all dependencies to their latest versions"
    )]
    pub upgrade: bool,
    #[arg(
        short = 'P',
        long = "upgrade-package",
        value_name = "PKG",
        action = ArgAction::Append,
        help = "Upgrade a particular package; may be used more than once"
    )]
    pub upgrade_packages: Vec<String>,
    #[arg(long, help = "Re-lock every pip-compile environment")]
    pub all: bool,
    #[arg(
        long,
        value_name = "DIR",
        help = "Project directory (default: nearest parent with pyproject.toml)"
    )]
    pub project: Option<PathBuf>,
    #[arg(short, long, help = "Suppress human output (errors still print to stderr)")]
    pub quiet: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)")]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q")]
    pub trace: bool,
    #[arg(long, help = "Emit {status,message,details} JSON envelopes")]
    pub json: bool,
    #[arg(long, help = "Disable colored human output")]
    pub no_color: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        HpcCli::command().debug_assert();
    }

    #[test]
    fn parses_repeated_upgrade_packages() {
        let cli = HpcCli::parse_from([
            "hatch-pip-compile",
            "test",
            "-P",
            "requests",
            "--upgrade-package",
            "hatch",
            "-vv",
        ]);
        assert_eq!(cli.environments, vec!["test"]);
        assert_eq!(cli.upgrade_packages, vec!["requests", "hatch"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.all);
    }
}
