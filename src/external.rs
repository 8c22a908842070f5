//! Launching of external programs.

use crate::command::{EXIT_FAILURE, EXIT_NOT_EXECUTABLE, EXIT_NOT_FOUND, ExitCode, exit_code};
use crate::parser::Redirect;
use crate::signal;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use nix::fcntl::{OFlag, open};
use nix::sys::stat::Mode;
use nix::libc::_exit;
use nix::unistd::{close, dup2};
use std::ffi::{CString, OsStr, OsString};
use std::fs::File;
use std::io::{ErrorKind, Write};
use std::mem::ManuallyDrop;
use std::os::fd::{FromRawFd, RawFd};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Stdio};

/// Permission bits of files created by output redirection, before the umask.
pub const OUTPUT_FILE_MODE: u32 = 0o666;

const STDIN_FD: RawFd = 0;
const STDOUT_FD: RawFd = 1;
const STDERR_FD: RawFd = 2;

/// Command that is not a builtin.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    name: OsString,
    args: Vec<OsString>,
    redirects: Vec<ChildRedirect>,
}

/// A file the child opens onto one of its standard descriptors before `exec`.
#[derive(Debug, Clone)]
struct ChildRedirect {
    /// Absolute path handed to `open(2)`.
    path: CString,
    /// The path as the user wrote it, for diagnostics.
    shown: Vec<u8>,
    flags: OFlag,
    target: RawFd,
}

/// Outcome of trying to start an [`ExternalCommand`].
#[derive(Debug)]
pub enum Launch {
    /// The program is running in a child process.
    Running(Child),
    /// The program could not be started; the code is what the shell reports for it.
    Failed(ExitCode),
}

impl ExternalCommand {
    pub fn new(name: OsString, args: Vec<OsString>) -> Self {
        Self {
            name,
            args,
            redirects: Vec::new(),
        }
    }

    /// Builds a command from an argument vector whose first element is the program.
    ///
    /// Returns `None` for an empty vector.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (name, args) = argv.split_first()?;
        Some(Self::new(
            name.into(),
            args.iter().map(OsString::from).collect(),
        ))
    }

    pub fn name(&self) -> &OsStr {
        &self.name
    }

    /// Adds a redirection, resolved against `current_dir`.
    ///
    /// The file is opened by the child, after `fork` and before `exec`, in the
    /// order the redirections were added. Input files are opened read-only,
    /// output files write-only, created with [`OUTPUT_FILE_MODE`] and truncated.
    /// A file that cannot be opened makes the child print a message and exit
    /// with [`EXIT_FAILURE`].
    pub fn redirect(&mut self, redirect: &Redirect, current_dir: &Path) -> Result<()> {
        let (flags, target) = match redirect {
            Redirect::Input(_) => (OFlag::O_RDONLY, STDIN_FD),
            Redirect::Output(_) => (
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
                STDOUT_FD,
            ),
        };
        let shown = redirect.path().as_os_str().as_bytes().to_vec();
        let path = CString::new(current_dir.join(redirect.path()).into_os_string().into_vec())
            .with_context(|| format!("invalid file name {}", redirect.path().display()))?;
        self.redirects.push(ChildRedirect {
            path,
            shown,
            flags,
            target,
        });
        Ok(())
    }

    /// Starts the program with the given standard streams.
    ///
    /// An unqualified program name is searched in `PATH`. The environment of the
    /// shell is inherited. `stdin` and `stdout` are moved into the child; the
    /// parent's copies are closed before this function returns. Redirections
    /// added with [`ExternalCommand::redirect`] replace them inside the child.
    ///
    /// A program that cannot be found or executed is reported on stderr and yields
    /// [`Launch::Failed`]; any other failure (e.g. the process table is full) is an
    /// error.
    pub fn spawn(&self, stdin: Stdio, stdout: Stdio, current_dir: &Path) -> Result<Launch> {
        let mut command = std::process::Command::new(&self.name);
        command
            .args(&self.args)
            .stdin(stdin)
            .stdout(stdout)
            .current_dir(current_dir);
        if !self.redirects.is_empty() {
            let redirects = self.redirects.clone();
            // SAFETY: the hook only makes async-signal-safe calls and does not allocate.
            unsafe {
                command.pre_exec(move || apply_redirects(&redirects));
            }
        }
        debug!("spawning {:?} with args {:?}", self.name, self.args);

        match command.spawn() {
            Ok(child) => {
                info!("started {:?} as pid {}", self.name, child.id());
                Ok(Launch::Running(child))
            }
            Err(err) if err.kind() == ErrorKind::NotFound && !current_dir.is_dir() => {
                warn!("working directory {} is gone: {err}", current_dir.display());
                eprintln!(
                    "minish: {}: working directory no longer exists",
                    current_dir.display()
                );
                Ok(Launch::Failed(EXIT_FAILURE))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!("{:?}: {err}", self.name);
                eprintln!("minish: {}: command not found", self.name.to_string_lossy());
                Ok(Launch::Failed(EXIT_NOT_FOUND))
            }
            Err(err) if err.kind() == ErrorKind::PermissionDenied => {
                warn!("{:?}: {err}", self.name);
                eprintln!("minish: {}: {err}", self.name.to_string_lossy());
                Ok(Launch::Failed(EXIT_NOT_EXECUTABLE))
            }
            Err(err) => {
                Err(err).with_context(|| format!("failed to start {}", self.name.to_string_lossy()))
            }
        }
    }
}

/// Runs in the forked child: opens every redirection file and moves it onto its
/// standard descriptor, then closes the original.
fn apply_redirects(redirects: &[ChildRedirect]) -> std::io::Result<()> {
    signal::reset_caught_signals();
    let mode = Mode::from_bits_truncate(OUTPUT_FILE_MODE);
    for redirect in redirects {
        let fd = match open(redirect.path.as_c_str(), redirect.flags, mode) {
            Ok(fd) => fd,
            Err(errno) => {
                report_open_failure(&redirect.shown, errno.desc());
                // SAFETY: `_exit` is async-signal-safe and terminates the forked child.
                unsafe { _exit(EXIT_FAILURE) }
            }
        };
        if fd != redirect.target {
            dup2(fd, redirect.target)?;
            close(fd)?;
        }
    }
    Ok(())
}

fn report_open_failure(shown: &[u8], reason: &str) {
    // SAFETY: descriptor 2 is only borrowed; `ManuallyDrop` keeps it open.
    let mut stderr = ManuallyDrop::new(unsafe { File::from_raw_fd(STDERR_FD) });
    let parts: [&[u8]; 5] = [b"minish: ", shown, b": ", reason.as_bytes(), b"\n"];
    for part in parts {
        let _ = stderr.write_all(part);
    }
}

impl Launch {
    /// Blocks until the child terminates and returns its exit code.
    pub fn wait(self) -> Result<ExitCode> {
        match self {
            Launch::Running(mut child) => {
                let pid = child.id();
                let status = child
                    .wait()
                    .with_context(|| format!("failed to wait for pid {pid}"))?;
                let code = exit_code(status);
                info!("pid {pid} exited with {code}");
                Ok(code)
            }
            Launch::Failed(code) => Ok(code),
        }
    }

    /// Kills a running child and reaps it. Failures are only logged.
    pub fn kill_and_wait(self) {
        if let Launch::Running(mut child) = self {
            let pid = child.id();
            if let Err(err) = child.kill() {
                warn!("failed to kill pid {pid}: {err}");
            }
            if let Err(err) = child.wait() {
                warn!("failed to reap pid {pid}: {err}");
            }
        }
    }
}
