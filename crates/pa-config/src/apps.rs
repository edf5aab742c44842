//! Application templates and the YAML document that declares them.

use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::defaults::default_connect_timeout;

/// Byte transport used to talk to a supervised application.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum TransportKind {
    /// The application's standard input and output are connected to pipes.
    #[default]
    #[serde(alias = "pipe")]
    #[strum(to_string = "stdio", serialize = "pipe")]
    Stdio,
    /// The application listens on a Unix domain socket that the router
    /// connects to once it appears.
    #[strum(to_string = "socket")]
    Socket,
}

/// Command line of an application.
///
/// The string form is split with POSIX shell quoting rules, so
/// `sh -c 'echo hi'` yields three words. The list form is used verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CommandLine {
    /// `command: socat SYSTEM:cat UNIX-LISTEN:/tmp/sock`
    Line(String),
    /// `command: [python3, -m, brain]`
    Argv(Vec<String>),
}

impl CommandLine {
    /// Returns the program followed by its arguments for the application
    /// called `app`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCommand`] when the string form has an
    /// unterminated quote or a trailing escape, and
    /// [`ConfigError::EmptyCommand`] when no program is named.
    pub fn argv(&self, app: &str) -> Result<Vec<String>, ConfigError> {
        let words = match self {
            Self::Line(line) => {
                shell_words::split(line).map_err(|error| ConfigError::InvalidCommand {
                    app: app.to_owned(),
                    message: error.to_string(),
                })?
            }
            Self::Argv(argv) => argv.clone(),
        };
        if words.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(ConfigError::EmptyCommand {
                app: app.to_owned(),
            });
        }
        Ok(words)
    }
}

impl From<&str> for CommandLine {
    fn from(line: &str) -> Self {
        Self::Line(line.to_owned())
    }
}

impl From<Vec<String>> for CommandLine {
    fn from(argv: Vec<String>) -> Self {
        Self::Argv(argv)
    }
}

/// Spawn template for one application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AppConfig {
    command: CommandLine,
    #[serde(rename = "type", default)]
    transport: TransportKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    socket: Option<Utf8PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cwd: Option<Utf8PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    connect_timeout_ms: Option<u64>,
}

impl AppConfig {
    /// Creates a template with no socket path, working directory or timeout
    /// override.
    #[must_use]
    pub fn new(command: impl Into<CommandLine>, transport: TransportKind) -> Self {
        Self {
            command: command.into(),
            transport,
            socket: None,
            cwd: None,
            connect_timeout_ms: None,
        }
    }

    /// Sets the Unix socket path the application listens on.
    #[must_use]
    pub fn with_socket(mut self, socket: impl Into<Utf8PathBuf>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    /// Sets the working directory the application is started in.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<Utf8PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Overrides how long the router waits for the application's socket.
    #[must_use]
    pub const fn with_connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = Some(timeout_ms);
        self
    }

    /// Returns the command line.
    #[must_use]
    pub const fn command(&self) -> &CommandLine {
        &self.command
    }

    /// Returns the transport kind.
    #[must_use]
    pub const fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Returns the configured socket path, if any.
    #[must_use]
    pub fn socket(&self) -> Option<&Utf8Path> {
        self.socket.as_deref()
    }

    /// Returns the configured working directory, if any.
    #[must_use]
    pub fn cwd(&self) -> Option<&Utf8Path> {
        self.cwd.as_deref()
    }

    /// Returns the socket connect deadline.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout_ms
            .map_or_else(default_connect_timeout, Duration::from_millis)
    }

    /// Checks the template for the application called `name`.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`CommandLine::argv`].
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        self.command.argv(name).map(|_| ())
    }
}

/// The full application table, keyed by application name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RunnerConfig {
    apps: BTreeMap<String, AppConfig>,
}

impl RunnerConfig {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a YAML document.
    ///
    /// An empty document yields an empty table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed YAML and
    /// [`ConfigError::EmptyCommand`] for entries without a program.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse(text, None)
    }

    /// Reads, parses and validates the YAML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, plus the
    /// errors of [`RunnerConfig::from_yaml_str`].
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, Some(path))
    }

    fn parse(text: &str, path: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_saphyr::from_str(text).map_err(|error| ConfigError::Parse {
            origin: path.map_or_else(|| String::from("inline document"), |p| format!("'{p}'")),
            message: error.to_string(),
        })?;
        for (name, app) in &config.apps {
            app.validate(name)?;
        }
        Ok(config)
    }

    /// Adds or replaces the template for `name`.
    pub fn insert(&mut self, name: impl Into<String>, app: AppConfig) {
        self.apps.insert(name.into(), app);
    }

    /// Looks up the template for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AppConfig> {
        self.apps.get(name)
    }

    /// Iterates over templates in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AppConfig)> {
        self.apps.iter().map(|(name, app)| (name.as_str(), app))
    }

    /// Returns the number of templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    /// Returns `true` when no templates are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

/// Errors raised while loading application configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration '{path}': {source}")]
    Read {
        /// File that was read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The YAML document did not match the schema.
    #[error("invalid configuration in {origin}: {message}")]
    Parse {
        /// File the document came from, or `inline document`.
        origin: String,
        /// Parser diagnostic.
        message: String,
    },
    /// An application entry names no program.
    #[error("application '{app}' has an empty command")]
    EmptyCommand {
        /// Application name.
        app: String,
    },
    /// An application's command string cannot be split into words.
    #[error("application '{app}' has an invalid command: {message}")]
    InvalidCommand {
        /// Application name.
        app: String,
        /// Splitter diagnostic.
        message: String,
    },
}
