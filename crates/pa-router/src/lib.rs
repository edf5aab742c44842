//! The `pa-router` daemon.
//!
//! The daemon reads the application table from a YAML file, starts every
//! application through [`pa_routing::Runner`] and moves JSON-line messages
//! between them with a [`pa_routing::Router`]. It stops on `SIGINT` or
//! `SIGTERM`, or once every application has gone away, and terminates the
//! processes it started before exiting.

mod cli;
mod daemon;
mod log_sink;
mod telemetry;

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use pa_config::RunnerConfig;
use tracing::error;

pub use daemon::{Daemon, DaemonError, DaemonOptions};
pub use log_sink::LogSink;
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};

use crate::cli::Cli;
use crate::daemon::DAEMON_TARGET;

/// Parses `args`, runs the daemon and maps the outcome to an exit code.
///
/// Argument errors and telemetry failures are written to `stderr`; once
/// telemetry is up, failures are logged instead.
pub fn run<I, E>(args: I, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    E: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(parse_error) => {
            drop(write!(stderr, "{parse_error}"));
            return if parse_error.use_stderr() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(telemetry_error) = telemetry::initialise(&cli.log_filter, cli.log_format) {
        drop(writeln!(stderr, "{telemetry_error}"));
        return ExitCode::FAILURE;
    }

    match serve(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(daemon_error) => {
            error!(target: DAEMON_TARGET, error = %daemon_error, "router stopped with an error");
            ExitCode::FAILURE
        }
    }
}

fn serve(cli: &Cli) -> Result<(), DaemonError> {
    let config = RunnerConfig::load(&cli.config)?;
    let daemon = Daemon::start(&config, cli.daemon_options())?;
    daemon.install_signal_handlers()?;
    daemon.run()
}
