mod attack;
mod cli;
mod config;
mod error;
mod models;
mod network;
mod pool;
mod report;

use crate::attack::SshAttacker;
use crate::cli::{parse_cli, parse_duration};
use crate::config::{build_config, gather_targets, load_script, Credentials};
use crate::error::PreflightError;
use crate::network::SystemResolver;
use crate::pool::spray;
use crate::report::LiveReporter;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("[!] Error: {error:#}");
        let code = error
            .downcast_ref::<PreflightError>()
            .map(PreflightError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run() -> Result<()> {
    let cli = parse_cli();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if cli.targets.is_empty() && cli.targets_file.is_none() {
        return Err(PreflightError::NoTargets.into());
    }

    let script = load_script(&cli.script)?;
    info!(
        "Read {}-byte script from {}",
        script.len(),
        cli.script.display()
    );

    let timeout = parse_duration(&cli.timeout)
        .with_context(|| format!("Invalid --timeout '{}'", cli.timeout))?;
    let exec_timeout = cli
        .exec_timeout
        .as_deref()
        .map(parse_duration)
        .transpose()
        .context("Invalid --exec-timeout")?;

    let credentials = Credentials {
        user: &cli.user,
        key: cli.key.as_deref(),
        pass: &cli.pass,
        keyboard_interactive: cli.keyboard_interactive,
    };
    let config = Arc::new(build_config(
        &credentials,
        &cli.interpreter,
        script,
        timeout,
        exec_timeout,
    )?);

    let targets = gather_targets(&cli.targets, cli.targets_file.as_deref())?;

    info!(
        "Spraying {} target(s) as {} with {} worker(s), timeout {:?}",
        targets.len(),
        config.user,
        cli.parallel,
        config.timeout
    );

    let reporter = LiveReporter::new(cli.json);
    let summary = spray(
        cli.parallel,
        targets,
        Arc::new(SystemResolver),
        Arc::new(SshAttacker::new(Arc::clone(&config))),
        Arc::new(reporter),
    )
    .await;

    reporter.summary(&summary);
    Ok(())
}
