//! Entry point for the `pa-router` daemon; see [`pa_router::run`].

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stderr = io::stderr().lock();
    pa_router::run(std::env::args_os(), &mut stderr)
}
