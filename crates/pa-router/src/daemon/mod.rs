//! The polling loop tying the supervisor to the router.
//!
//! [`Daemon::start`] launches every configured application and registers its
//! faucet and sink under its alias. [`Daemon::run`] then repeatedly drains the
//! faucets until a stop signal arrives or no application is left. An endpoint
//! that fails is removed from the router and its process terminated; a later
//! message addressed to that alias restarts the application through the sink
//! factory. Losing the default application routes unclaimed messages to the
//! log until that application is restarted.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use pa_config::{ConfigError, RunnerConfig, default_tick_interval};
use pa_routing::{
    Route, Router, RouterError, Rule, Runner, RunnerError, SinkHandle, StartOverrides, TickReport,
};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::log_sink::LogSink;

/// Tracing target for the daemon loop.
pub(crate) const DAEMON_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::daemon");

/// Errors that stop the daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The configuration file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Starting or stopping an application failed.
    #[error(transparent)]
    Runner(#[from] RunnerError),
    /// The requested default sink is not a configured application.
    #[error("default sink '{alias}' is not a configured application")]
    UnknownDefaultSink {
        /// Alias passed as the default sink.
        alias: String,
    },
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Signals {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Settings for one daemon run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonOptions {
    /// Pause after a pass that moved no messages.
    pub tick_interval: Duration,
    /// Alias whose sink receives unroutable messages.
    pub default_sink: Option<String>,
    /// Rules to install, each paired with the faucet it applies to.
    pub routes: Vec<(String, Rule)>,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            default_sink: None,
            routes: Vec::new(),
        }
    }
}

/// A running router together with the processes it connects.
#[derive(Debug)]
pub struct Daemon {
    runner: Arc<Mutex<Runner>>,
    router: Router,
    default_alias: Option<String>,
    tick_interval: Duration,
    stop: Arc<AtomicBool>,
}

fn lock(runner: &Mutex<Runner>) -> MutexGuard<'_, Runner> {
    runner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Daemon {
    /// Starts every application in `config` and wires it into a router.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Runner`] when an application fails to start and
    /// [`DaemonError::UnknownDefaultSink`] when the default sink names no
    /// configured application. Processes started before the failure are
    /// terminated.
    pub fn start(config: &RunnerConfig, options: DaemonOptions) -> Result<Self, DaemonError> {
        let mut runner = Runner::new();
        runner.update_config(config)?;

        let names: Vec<String> = runner.app_names().into_iter().map(str::to_owned).collect();
        for name in &names {
            runner.ensure_running(name, None, &[], &StartOverrides::default())?;
        }

        let default_sink = match options.default_sink.as_deref() {
            Some(alias) => runner
                .get_sink(alias)
                .map_err(|_| DaemonError::UnknownDefaultSink {
                    alias: alias.to_owned(),
                })?,
            None => SinkHandle::new(LogSink::new()),
        };

        let mut router = Router::new(default_sink);
        for alias in runner.aliases() {
            router.add_faucet(alias, runner.get_faucet(alias)?);
            router.add_sink(alias, runner.get_sink(alias)?);
        }
        for (faucet, rule) in options.routes {
            router.add_rule(rule, faucet);
        }

        let shared = Arc::new(Mutex::new(runner));
        router.add_sink_factory(restarting_factory(
            Arc::clone(&shared),
            options.default_sink.clone(),
        ));
        info!(
            target: DAEMON_TARGET,
            applications = names.len(),
            "router started"
        );

        Ok(Self {
            runner: shared,
            router,
            default_alias: options.default_sink,
            tick_interval: options.tick_interval,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that ends [`Daemon::run`] once set.
    #[must_use]
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Sets the stop flag when `SIGINT` or `SIGTERM` arrives.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Signals`] when a handler cannot be installed.
    pub fn install_signal_handlers(&self) -> Result<(), DaemonError> {
        for signal in [SIGINT, SIGTERM] {
            signal_hook::flag::register(signal, Arc::clone(&self.stop))
                .map_err(|source| DaemonError::Signals { source })?;
        }
        Ok(())
    }

    /// The router being driven.
    #[must_use]
    pub const fn router(&self) -> &Router {
        &self.router
    }

    /// Aliases of the processes still running.
    #[must_use]
    pub fn aliases(&self) -> Vec<String> {
        lock(&self.runner)
            .aliases()
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    /// Runs dispatch passes until stopped, then terminates every process.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Runner`] when a process cannot be stopped.
    pub fn run(mut self) -> Result<(), DaemonError> {
        while !self.stop.load(Ordering::SeqCst) {
            if self.router.faucet_names().next().is_none() {
                info!(target: DAEMON_TARGET, "no applications left to read from");
                break;
            }
            let report = self.pass();
            if report.is_idle() {
                thread::sleep(self.tick_interval);
            }
        }
        self.shutdown()
    }

    /// Performs one dispatch pass, retiring an endpoint that failed.
    pub fn pass(&mut self) -> TickReport {
        match self.router.tick() {
            Ok(report) => {
                if report.malformed > 0 {
                    debug!(
                        target: DAEMON_TARGET,
                        malformed = report.malformed,
                        "skipped malformed lines"
                    );
                }
                report
            }
            Err(failure) => {
                self.retire(&failure);
                TickReport::default()
            }
        }
    }

    /// Terminates every process.
    ///
    /// # Errors
    ///
    /// Returns the first [`RunnerError`] met while stopping processes.
    pub fn shutdown(self) -> Result<(), DaemonError> {
        info!(target: DAEMON_TARGET, "stopping applications");
        lock(&self.runner).terminate_all()?;
        Ok(())
    }

    fn retire(&mut self, failure: &RouterError) {
        if failure.is_closed() {
            warn!(target: DAEMON_TARGET, error = %failure, "endpoint closed");
        } else {
            error!(target: DAEMON_TARGET, error = %failure, "endpoint failed");
        }

        let alias = match failure {
            RouterError::Faucet { name, .. } => name.as_str(),
            RouterError::Sink {
                route: Route::Named(name),
                ..
            } => name.as_str(),
            RouterError::Sink {
                route: Route::Default,
                ..
            } => {
                self.fall_back_to_log();
                return;
            }
        };

        if self.default_alias.as_deref() == Some(alias) {
            self.fall_back_to_log();
        }
        self.router.remove_faucet_by_name(alias);
        self.router.remove_sink_by_name(alias);

        let mut runner = lock(&self.runner);
        if runner.proc(alias).is_err() {
            return;
        }
        if let Err(stop_error) = runner.terminate(alias) {
            warn!(
                target: DAEMON_TARGET,
                alias,
                error = %stop_error,
                "failed to terminate application"
            );
        }
    }

    fn fall_back_to_log(&mut self) {
        warn!(
            target: DAEMON_TARGET,
            "default sink unavailable, logging unroutable messages"
        );
        self.router
            .replace_default_sink(SinkHandle::new(LogSink::new()));
    }
}

/// Restarts a configured application on demand and registers its endpoints.
///
/// Restarting `default_alias` also makes it the default sink again.
fn restarting_factory(
    runner: Arc<Mutex<Runner>>,
    default_alias: Option<String>,
) -> impl FnMut(&mut Router, &str) + Send {
    move |router, destination| {
        let mut guard = lock(&runner);
        if guard.app(destination).is_none() {
            return;
        }
        let started = guard
            .ensure_running(destination, None, &[], &StartOverrides::default())
            .and_then(|()| Ok((guard.get_faucet(destination)?, guard.get_sink(destination)?)));
        match started {
            Ok((faucet, sink)) => {
                info!(
                    target: DAEMON_TARGET,
                    alias = destination,
                    "application restarted on demand"
                );
                if default_alias.as_deref() == Some(destination) {
                    info!(
                        target: DAEMON_TARGET,
                        alias = destination,
                        "default sink restored"
                    );
                    router.replace_default_sink(sink.clone());
                }
                router.add_faucet(destination, faucet);
                router.add_sink(destination, sink);
            }
            Err(start_error) => warn!(
                target: DAEMON_TARGET,
                alias = destination,
                error = %start_error,
                "failed to restart application"
            ),
        }
    }
}
