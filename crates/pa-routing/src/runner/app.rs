//! Application templates and the processes started from them.

use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use pa_config::{AppConfig, ConfigError, TransportKind};
use tracing::{debug, info, warn};

use super::RUNNER_TARGET;
use super::socket::{abandon, elapsed_ms, remove_stale_socket, wait_for_socket};
use crate::channel::{PipeChannel, SocketChannel};
use crate::endpoint::{FaucetHandle, SinkHandle};
use crate::error::RunnerError;
use crate::framing::{ChannelFaucet, ChannelSink};

/// How long a process may take to exit after `SIGTERM` before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Delay between exit checks while terminating.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Per-start adjustments to an application template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartOverrides {
    socket: Option<Utf8PathBuf>,
}

impl StartOverrides {
    /// Uses `socket` instead of the configured socket path.
    #[must_use]
    pub fn with_socket(mut self, socket: impl Into<Utf8PathBuf>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    /// Returns the socket path override.
    #[must_use]
    pub fn socket(&self) -> Option<&Utf8Path> {
        self.socket.as_deref()
    }
}

/// Reusable spawn template for one named application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct App {
    name: String,
    config: AppConfig,
}

impl App {
    /// Builds a template from its configuration entry.
    #[must_use]
    pub fn from_config(name: impl Into<String>, config: &AppConfig) -> Self {
        Self {
            name: name.into(),
            config: config.clone(),
        }
    }

    /// Application name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration entry the template was built from.
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Spawns the application with `extra_args` appended to its command line.
    ///
    /// The returned process is registered under the application name; the
    /// [`crate::Runner`] renames it when an alias is requested.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Config`] when the command line cannot be split,
    /// [`RunnerError::Spawn`] when the process cannot be started,
    /// [`RunnerError::MissingSocketPath`], [`RunnerError::StaleSocket`],
    /// [`RunnerError::StartupFailed`], [`RunnerError::SocketTimeout`] or
    /// [`RunnerError::Connect`] for socket applications, and
    /// [`RunnerError::Channel`] when the transport cannot be prepared.
    pub fn start(
        &self,
        extra_args: &[String],
        overrides: &StartOverrides,
    ) -> Result<Proc, RunnerError> {
        let argv = self.config.command().argv(&self.name)?;
        let (program, args) = argv.split_first().ok_or_else(|| {
            RunnerError::Config(ConfigError::EmptyCommand {
                app: self.name.clone(),
            })
        })?;

        let mut command = Command::new(program);
        command.args(args).args(extra_args);
        if let Some(cwd) = self.config.cwd() {
            command.current_dir(cwd);
        }

        debug!(
            target: RUNNER_TARGET,
            app = %self.name,
            program = %program,
            transport = %self.config.transport(),
            "starting application"
        );

        match self.config.transport() {
            TransportKind::Stdio => self.start_stdio(command),
            TransportKind::Socket => self.start_socket(command, overrides),
        }
    }

    fn start_stdio(&self, mut command: Command) -> Result<Proc, RunnerError> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            app: self.name.clone(),
            message: String::from("failed to spawn process"),
            source: Some(Arc::new(source)),
        })?;

        let (Some(stdout), Some(stdin)) = (child.stdout.take(), child.stdin.take()) else {
            abandon(&mut child);
            return Err(RunnerError::Spawn {
                app: self.name.clone(),
                message: String::from("failed to capture stdio pipes"),
                source: None,
            });
        };

        let channels = PipeChannel::reading(stdout)
            .and_then(|reader| PipeChannel::writing(stdin).map(|writer| (reader, writer)));
        let (reader, writer) = match channels {
            Ok(pair) => pair,
            Err(source) => {
                abandon(&mut child);
                return Err(RunnerError::Channel {
                    app: self.name.clone(),
                    source: Arc::new(source),
                });
            }
        };
        Ok(self.process(
            child,
            FaucetHandle::new(ChannelFaucet::new(reader)),
            SinkHandle::new(ChannelSink::new(writer)),
        ))
    }

    fn start_socket(
        &self,
        mut command: Command,
        overrides: &StartOverrides,
    ) -> Result<Proc, RunnerError> {
        let path = overrides
            .socket()
            .or_else(|| self.config.socket())
            .ok_or_else(|| RunnerError::MissingSocketPath {
                app: self.name.clone(),
            })?
            .to_path_buf();
        remove_stale_socket(&path)?;

        command.stdin(Stdio::null());
        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            app: self.name.clone(),
            message: String::from("failed to spawn process"),
            source: Some(Arc::new(source)),
        })?;

        let stream = wait_for_socket(&self.name, &mut child, &path, self.config.connect_timeout())?;
        let channels = SocketChannel::new(stream)
            .and_then(|reader| reader.try_clone().map(|writer| (reader, writer)));
        let (reader, writer) = match channels {
            Ok(pair) => pair,
            Err(source) => {
                abandon(&mut child);
                return Err(RunnerError::Channel {
                    app: self.name.clone(),
                    source: Arc::new(source),
                });
            }
        };
        Ok(self.process(
            child,
            FaucetHandle::new(ChannelFaucet::new(reader)),
            SinkHandle::new(ChannelSink::new(writer)),
        ))
    }

    fn process(&self, child: Child, faucet: FaucetHandle, sink: SinkHandle) -> Proc {
        info!(
            target: RUNNER_TARGET,
            app = %self.name,
            pid = child.id(),
            "application started"
        );
        Proc {
            app: self.name.clone(),
            alias: self.name.clone(),
            child,
            faucet,
            sink,
        }
    }
}

/// One running instance of an [`App`].
///
/// The process owns its faucet and sink; both are closed when it is
/// terminated.
#[derive(Debug)]
pub struct Proc {
    app: String,
    alias: String,
    child: Child,
    faucet: FaucetHandle,
    sink: SinkHandle,
}

impl Proc {
    /// Name of the template the process was started from.
    #[must_use]
    pub fn app(&self) -> &str {
        &self.app
    }

    /// Name the process is registered under.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub(crate) fn set_alias(&mut self, alias: impl Into<String>) {
        self.alias = alias.into();
    }

    /// OS process id.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Messages produced by the process.
    #[must_use]
    pub const fn faucet(&self) -> &FaucetHandle {
        &self.faucet
    }

    /// Messages consumed by the process.
    #[must_use]
    pub const fn sink(&self) -> &SinkHandle {
        &self.sink
    }

    /// Returns `true` while the process has not exited.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Wait`] when the process state cannot be read.
    pub fn is_alive(&mut self) -> Result<bool, RunnerError> {
        self.child
            .try_wait()
            .map(|status| status.is_none())
            .map_err(|source| self.wait_error(source))
    }

    /// Closes the endpoints, sends `SIGTERM` and waits for the process to
    /// exit, killing it if it outlives a short grace period.
    ///
    /// A process that has already exited is simply reaped.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Signal`] when the signal cannot be delivered
    /// and [`RunnerError::Wait`] when the exit status cannot be collected.
    pub fn terminate(mut self) -> Result<ExitStatus, RunnerError> {
        self.faucet.close();
        self.sink.close();

        if let Some(status) = self
            .child
            .try_wait()
            .map_err(|source| self.wait_error(source))?
        {
            debug!(
                target: RUNNER_TARGET,
                alias = %self.alias,
                ?status,
                "process had already exited"
            );
            return Ok(status);
        }

        self.signal_terminate()?;
        let status = self.wait_with_grace()?;
        info!(
            target: RUNNER_TARGET,
            alias = %self.alias,
            ?status,
            "process terminated"
        );
        Ok(status)
    }

    fn signal_terminate(&self) -> Result<(), RunnerError> {
        let pid = self.pid();
        let raw = i32::try_from(pid).map_err(|_| RunnerError::Signal {
            alias: self.alias.clone(),
            pid,
            source: Errno::EINVAL,
        })?;
        match kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(source) => Err(RunnerError::Signal {
                alias: self.alias.clone(),
                pid,
                source,
            }),
        }
    }

    fn wait_with_grace(&mut self) -> Result<ExitStatus, RunnerError> {
        let started = Instant::now();
        loop {
            if let Some(status) = self
                .child
                .try_wait()
                .map_err(|source| self.wait_error(source))?
            {
                return Ok(status);
            }
            if started.elapsed() >= TERMINATE_GRACE {
                warn!(
                    target: RUNNER_TARGET,
                    alias = %self.alias,
                    grace_ms = elapsed_ms(TERMINATE_GRACE),
                    "process ignored SIGTERM, killing"
                );
                drop(self.child.kill());
                return self.child.wait().map_err(|source| self.wait_error(source));
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }

    fn wait_error(&self, source: std::io::Error) -> RunnerError {
        RunnerError::Wait {
            alias: self.alias.clone(),
            source: Arc::new(source),
        }
    }
}
