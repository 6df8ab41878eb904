use atty::Stream;
use clap::Parser;
use color_eyre::Result;
use hpc_core::{error_details, CommandStatus, CompileRequest, ExecutionOutcome, SystemEffects};
use serde_json::{json, Value};

mod cli;
mod style;

use cli::HpcCli;
use style::Style;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = HpcCli::parse();
    init_tracing(cli.trace, cli.quiet, cli.verbose);

    let request = CompileRequest {
        project_root: cli.project.clone(),
        environments: cli.environments.clone(),
        all: cli.all,
        upgrade: cli.upgrade,
        upgrade_packages: cli.upgrade_packages.clone(),
    };
    let host = SystemEffects::new();
    let outcome = match hpc_core::compile_environments(&request, &host) {
        Ok(outcome) => outcome,
        Err(err) => ExecutionOutcome::user_error(format!("{err}"), error_details(&err)),
    };
    let code = emit_output(&cli, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, quiet: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("hpc_cli={level},hpc_core={level},hpc_domain={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn exit_code(status: &CommandStatus) -> i32 {
    match status {
        CommandStatus::Ok => 0,
        CommandStatus::UserError | CommandStatus::Failure => 1,
    }
}

fn emit_output(cli: &HpcCli, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = exit_code(&outcome.status);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&to_json_response(outcome))?);
        return Ok(code);
    }

    if outcome.status == CommandStatus::Ok {
        if cli.quiet {
            return Ok(code);
        }
        let style = Style::new(cli.no_color, atty::is(Stream::Stdout));
        println!("{}", style.status(&outcome.status, &outcome.message));
        for line in environment_lines(&outcome.details) {
            println!("{}", style.dimmed(&line));
        }
        return Ok(code);
    }

    let style = Style::new(cli.no_color, atty::is(Stream::Stderr));
    eprintln!("{}", style.status(&outcome.status, &outcome.message));
    if let Some(output) = outcome.details.get("output").and_then(Value::as_str) {
        for line in output.lines() {
            eprintln!("  {}", style.dimmed(line));
        }
    }
    if let Some(hint) = outcome.hint() {
        eprintln!("{}", style.info(&format!("Hint: {hint}")));
    }
    Ok(code)
}

fn to_json_response(outcome: &ExecutionOutcome) -> Value {
    let status = match outcome.status {
        CommandStatus::Ok => "ok",
        CommandStatus::UserError => "user-error",
        CommandStatus::Failure => "error",
    };
    let details = match &outcome.details {
        Value::Object(_) => outcome.details.clone(),
        Value::Null => json!({}),
        other => json!({ "value": other }),
    };
    json!({
        "status": status,
        "message": outcome.message,
        "details": details,
    })
}

fn environment_lines(details: &Value) -> Vec<String> {
    let Some(reports) = details.get("environments").and_then(Value::as_array) else {
        return Vec::new();
    };
    reports
        .iter()
        .filter_map(|report| {
            let name = report.get("name")?.as_str()?;
            let lockfile = report.get("lockfile")?.as_str()?;
            let exists = report.get("lockfile_exists")?.as_bool()?;
            let regenerated = report.get("regenerated")?.as_bool()?;
            let state = match (exists, regenerated) {
                (false, _) => "no lockfile",
                (true, true) => "regenerated",
                (true, false) => "unchanged",
            };
            Some(format!("  {name}: {lockfile} ({state})"))
        })
        .collect()
}
