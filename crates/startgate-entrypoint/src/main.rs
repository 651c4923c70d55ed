use std::sync::Arc;

use clap::Parser;
use startgate_core::{CommandProbe, Probe, ReadinessGate, TcpProbe, TokioSleeper};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod config;
mod console;
mod runner;
mod startup;

use config::{CliOpts, ProbeConfig};
use console::Console;
use runner::ProcessRunner;
use startup::Startup;

// Exit status for configuration problems clap itself does not catch.
const CONFIG_ERROR: i32 = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let opts = CliOpts::parse();
    let config = match opts.into_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("startgate-entrypoint: {err:#}");
            std::process::exit(CONFIG_ERROR);
        }
    };
    init_tracing(config.log_json, !config.no_color);

    let console = Console::new(config.no_color);
    let probe: Arc<dyn Probe> = match &config.probe {
        ProbeConfig::Tcp { timeout } => Arc::new(TcpProbe::new(*timeout)),
        ProbeConfig::Command { command, timeout } => {
            match CommandProbe::from_command_line(command, *timeout) {
                Some(probe) => Arc::new(probe),
                None => Arc::new(TcpProbe::new(*timeout)),
            }
        }
    };
    let gate = ReadinessGate::new(probe, TokioSleeper, &console, config.policy);

    let startup = Startup::new(&config, ProcessRunner, &console);
    let err = match startup.run(&gate).await {
        Ok(never) => match never {},
        Err(err) => err,
    };
    error!(error = %err, "startup aborted");
    console.error(&err.to_string());
    std::process::exit(err.exit_code());
}

const DEFAULT_LOG_FILTER: &str = "info";

// Status lines go to stdout through `Console`; these logs are diagnostics on
// stderr, filtered by RUST_LOG.
fn init_tracing(json: bool, ansi: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
