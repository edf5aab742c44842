//! Bounded wait for a freshly spawned application to start listening.

use std::fs;
use std::io;
use std::os::unix::net::UnixStream;
use std::process::Child;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use tracing::{debug, warn};

use super::RUNNER_TARGET;
use crate::error::RunnerError;

/// Delay between connection attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Deletes a socket file left behind by an earlier run.
pub(super) fn remove_stale_socket(path: &Utf8Path) -> Result<(), RunnerError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(target: RUNNER_TARGET, socket = %path, "removed stale socket");
            Ok(())
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(RunnerError::StaleSocket {
            path: path.to_path_buf(),
            source: Arc::new(source),
        }),
    }
}

/// Connects to `path` once `child` starts listening on it.
///
/// Fails with [`RunnerError::StartupFailed`] as soon as the child exits and
/// with [`RunnerError::SocketTimeout`] once `timeout` has elapsed. In every
/// failure case the child has been reaped before returning.
pub(super) fn wait_for_socket(
    app: &str,
    child: &mut Child,
    path: &Utf8Path,
    timeout: Duration,
) -> Result<UnixStream, RunnerError> {
    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                warn!(
                    target: RUNNER_TARGET,
                    app,
                    ?status,
                    "application exited before its socket was ready"
                );
                return Err(RunnerError::StartupFailed {
                    app: app.to_owned(),
                    status: status.code(),
                });
            }
            Ok(None) => {}
            Err(source) => {
                abandon(child);
                return Err(RunnerError::Wait {
                    alias: app.to_owned(),
                    source: Arc::new(source),
                });
            }
        }

        match UnixStream::connect(path) {
            Ok(stream) => {
                debug!(
                    target: RUNNER_TARGET,
                    app,
                    socket = %path,
                    elapsed_ms = elapsed_ms(started.elapsed()),
                    "connected to application socket"
                );
                return Ok(stream);
            }
            Err(error) if is_not_listening_yet(&error) => {}
            Err(source) => {
                abandon(child);
                return Err(RunnerError::Connect {
                    app: app.to_owned(),
                    path: path.to_path_buf(),
                    source: Arc::new(source),
                });
            }
        }

        let elapsed = started.elapsed();
        if elapsed >= timeout {
            warn!(
                target: RUNNER_TARGET,
                app,
                socket = %path,
                timeout_ms = elapsed_ms(timeout),
                "application socket did not appear, killing process"
            );
            abandon(child);
            return Err(RunnerError::SocketTimeout {
                app: app.to_owned(),
                path: path.to_path_buf(),
                timeout_ms: elapsed_ms(timeout),
            });
        }
        thread::sleep(POLL_INTERVAL.min(timeout.saturating_sub(elapsed)));
    }
}

fn is_not_listening_yet(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
    )
}

/// Kills and reaps a child that will not be handed to the caller.
pub(super) fn abandon(child: &mut Child) {
    drop(child.kill());
    drop(child.wait());
}

pub(super) fn elapsed_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
