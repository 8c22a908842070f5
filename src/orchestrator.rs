//! Turns a validated [`Command`] into running processes with wired streams.
//!
//! Redirection files are opened by the child itself, so the shell never blocks
//! on or holds them. Every pipe end is moved into exactly one child and the
//! parent's copy is closed as soon as that child is spawned. Pipes are created
//! close-on-exec, so a child never inherits a pipe end it was not explicitly
//! given. The shell waits for every child it started.

use crate::command::ExitCode;
use crate::external::{ExternalCommand, Launch};
use crate::parser::{Command, Redirect};
use anyhow::{Context, Result};
use log::{debug, error};
use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use std::os::fd::OwnedFd;
use std::path::Path;
use std::process::Stdio;

/// Runs `command` to completion and returns its exit code.
///
/// For a pipeline this is the code of the last stage.
pub fn execute(command: &Command, current_dir: &Path) -> Result<ExitCode> {
    match command {
        Command::Simple(argv) => run_simple(argv, current_dir),
        Command::Redirected { argv, redirects } => run_redirected(argv, redirects, current_dir),
        Command::Pipeline(stages) => {
            let codes = run_pipeline(stages, current_dir)?;
            Ok(codes.last().copied().unwrap_or_default())
        }
    }
}

/// Runs one program with the shell's own standard streams.
pub fn run_simple(argv: &[String], current_dir: &Path) -> Result<ExitCode> {
    let command = ExternalCommand::from_argv(argv).context("empty command")?;
    command
        .spawn(Stdio::inherit(), Stdio::inherit(), current_dir)?
        .wait()
}

/// Runs one program with its input and/or output redirected to files.
///
/// The child opens the files in the order of `redirects`, so `cmd > out < missing`
/// still creates `out`. A file that cannot be opened makes the child exit with
/// [`EXIT_FAILURE`](crate::command::EXIT_FAILURE) before the program runs.
pub fn run_redirected(
    argv: &[String],
    redirects: &[Redirect],
    current_dir: &Path,
) -> Result<ExitCode> {
    let mut command = ExternalCommand::from_argv(argv).context("empty command")?;
    for redirect in redirects {
        command.redirect(redirect, current_dir)?;
    }
    command
        .spawn(Stdio::inherit(), Stdio::inherit(), current_dir)?
        .wait()
}

/// Runs two or more programs, each one's output feeding the next one's input.
///
/// The first stage reads the shell's stdin and the last one writes to the shell's
/// stdout. Returns the exit code of every stage, in order. If a pipe or process
/// cannot be created, the stages already started are killed and reaped before
/// the error is returned.
pub fn run_pipeline(stages: &[Vec<String>], current_dir: &Path) -> Result<Vec<ExitCode>> {
    let mut launched = Vec::with_capacity(stages.len());
    if let Err(err) = launch_pipeline(stages, current_dir, &mut launched) {
        error!("pipeline aborted after {} stage(s): {err:#}", launched.len());
        for launch in launched {
            launch.kill_and_wait();
        }
        return Err(err);
    }

    // Reap every stage even when one wait fails, so nothing is left behind.
    let mut codes = Vec::with_capacity(launched.len());
    let mut first_error = None;
    for launch in launched {
        match launch.wait() {
            Ok(code) => codes.push(code),
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => {
            debug!("pipeline finished with {codes:?}");
            Ok(codes)
        }
    }
}

fn launch_pipeline(
    stages: &[Vec<String>],
    current_dir: &Path,
    launched: &mut Vec<Launch>,
) -> Result<()> {
    let last = stages.len().saturating_sub(1);
    // Read end of the previous stage's pipe; `None` is the shell's own stdin.
    let mut input: Option<OwnedFd> = None;

    for (index, argv) in stages.iter().enumerate() {
        let command = ExternalCommand::from_argv(argv)
            .with_context(|| format!("pipeline stage {} is empty", index + 1))?;

        let (next_input, stdout) = if index < last {
            let (reader, writer) = pipe2(OFlag::O_CLOEXEC).context("failed to create pipe")?;
            (Some(reader), Stdio::from(writer))
        } else {
            (None, Stdio::inherit())
        };
        let stdin = input.take().map_or_else(Stdio::inherit, Stdio::from);

        launched.push(command.spawn(stdin, stdout, current_dir)?);
        input = next_input;
    }
    Ok(())
}
