//! Supervision of the applications that act as endpoints.
//!
//! The [`Runner`] holds [`App`] templates keyed by name and running
//! [`Proc`] instances keyed by alias. An alias defaults to the application
//! name, so the same template can be started several times under different
//! aliases. Callers fetch a process's faucet and sink by alias and register
//! them with a [`crate::Router`].

mod app;
mod socket;

use std::collections::HashMap;

use camino::Utf8Path;
use pa_config::RunnerConfig;
use tracing::{debug, info, warn};

use crate::endpoint::{FaucetHandle, SinkHandle};
use crate::error::RunnerError;

pub use self::app::{App, Proc, StartOverrides};

/// Tracing target for process supervision.
pub(crate) const RUNNER_TARGET: &str = "pa_routing::runner";

/// Registry of application templates and their running instances.
///
/// Dropping the runner terminates every process it still owns.
#[derive(Debug, Default)]
pub struct Runner {
    apps: HashMap<String, App>,
    procs: HashMap<String, Proc>,
}

impl Runner {
    /// Creates a runner with no templates.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads templates from the YAML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Config`] when the file cannot be read or
    /// parsed.
    pub fn load(&mut self, path: &Utf8Path) -> Result<(), RunnerError> {
        let config = RunnerConfig::load(path)?;
        self.update_config(&config)
    }

    /// Adds or replaces templates. Running processes are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Config`] when an entry is invalid; no template
    /// is changed in that case.
    pub fn update_config(&mut self, config: &RunnerConfig) -> Result<(), RunnerError> {
        for (name, app) in config.iter() {
            app.validate(name)?;
        }
        for (name, app) in config.iter() {
            debug!(target: RUNNER_TARGET, app = name, "application template registered");
            self.apps.insert(name.to_owned(), App::from_config(name, app));
        }
        Ok(())
    }

    /// Returns the template called `name`.
    #[must_use]
    pub fn app(&self, name: &str) -> Option<&App> {
        self.apps.get(name)
    }

    /// Template names in sorted order.
    #[must_use]
    pub fn app_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.apps.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Aliases of the processes owned by the runner, in sorted order.
    #[must_use]
    pub fn aliases(&self) -> Vec<&str> {
        let mut aliases: Vec<&str> = self.procs.keys().map(String::as_str).collect();
        aliases.sort_unstable();
        aliases
    }

    /// Starts `app` under `alias` (default: the application name) unless a
    /// live process of that application already holds the alias.
    ///
    /// A process under the alias that has exited, or that was started from
    /// another application, is terminated and replaced.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::UnknownApp`] for an unconfigured application,
    /// plus the errors of [`App::start`] and [`Proc::terminate`].
    pub fn ensure_running(
        &mut self,
        app: &str,
        alias: Option<&str>,
        extra_args: &[String],
        overrides: &StartOverrides,
    ) -> Result<(), RunnerError> {
        let alias_name = alias.unwrap_or(app);
        let template = self
            .apps
            .get(app)
            .ok_or_else(|| RunnerError::UnknownApp {
                name: app.to_owned(),
            })?;

        if let Some(existing) = self.procs.get_mut(alias_name) {
            if existing.app() == app {
                if existing.is_alive()? {
                    debug!(
                        target: RUNNER_TARGET,
                        app,
                        alias = alias_name,
                        "already running"
                    );
                    return Ok(());
                }
                info!(
                    target: RUNNER_TARGET,
                    app,
                    alias = alias_name,
                    "previous instance exited, restarting"
                );
            } else {
                info!(
                    target: RUNNER_TARGET,
                    app,
                    alias = alias_name,
                    previous = existing.app(),
                    "alias rebound to another application"
                );
            }
            if let Some(stale) = self.procs.remove(alias_name) {
                stale.terminate()?;
            }
        }

        let mut process = template.start(extra_args, overrides)?;
        process.set_alias(alias_name);
        self.procs.insert(alias_name.to_owned(), process);
        Ok(())
    }

    /// Returns the faucet of the process running as `alias`.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::UnknownAlias`] when no such process exists.
    pub fn get_faucet(&self, alias: &str) -> Result<FaucetHandle, RunnerError> {
        self.proc(alias).map(|process| process.faucet().clone())
    }

    /// Returns the sink of the process running as `alias`.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::UnknownAlias`] when no such process exists.
    pub fn get_sink(&self, alias: &str) -> Result<SinkHandle, RunnerError> {
        self.proc(alias).map(|process| process.sink().clone())
    }

    /// Returns the process running as `alias`.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::UnknownAlias`] when no such process exists.
    pub fn proc(&self, alias: &str) -> Result<&Proc, RunnerError> {
        self.procs.get(alias).ok_or_else(|| RunnerError::UnknownAlias {
            alias: alias.to_owned(),
        })
    }

    /// Returns `true` when a live process holds `alias`.
    pub fn is_running(&mut self, alias: &str) -> bool {
        self.procs
            .get_mut(alias)
            .is_some_and(|process| process.is_alive().unwrap_or(false))
    }

    /// Stops the process running as `alias` and forgets it.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::UnknownAlias`] when no such process exists,
    /// plus the errors of [`Proc::terminate`].
    pub fn terminate(&mut self, alias: &str) -> Result<(), RunnerError> {
        let process = self
            .procs
            .remove(alias)
            .ok_or_else(|| RunnerError::UnknownAlias {
                alias: alias.to_owned(),
            })?;
        process.terminate().map(|_| ())
    }

    /// Stops every process, continuing past failures.
    ///
    /// # Errors
    ///
    /// Returns the first failure after every process has been handled.
    pub fn terminate_all(&mut self) -> Result<(), RunnerError> {
        let mut processes: Vec<(String, Proc)> = self.procs.drain().collect();
        processes.sort_by(|left, right| left.0.cmp(&right.0));
        let mut first_error = None;
        for (alias, process) in processes {
            if let Err(error) = process.terminate() {
                warn!(target: RUNNER_TARGET, alias = %alias, %error, "failed to terminate process");
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        if self.procs.is_empty() {
            return;
        }
        if let Err(error) = self.terminate_all() {
            warn!(target: RUNNER_TARGET, %error, "failed to stop processes on drop");
        }
    }
}
