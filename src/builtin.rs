use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::interpreter::Factory;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use log::debug;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A command that runs inside the shell process instead of a child.
///
/// Arguments are parsed with [`argh`]. Built-ins are only looked up for lines
/// without operators; `exit > f` runs a program called `exit`.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// The word that invokes the command.
    fn name() -> &'static str;

    /// Runs the command against the shell state, printing to `stdout`.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        <T as BuiltinCommand>::execute(*self, stdout, env).or_else(|err| {
            eprintln!("minish: {err:#}");
            Ok(1)
        })
    }
}

/// What argh produced instead of a command: `--help` text or a usage error.
struct Usage(EarlyExit);

impl ExecutableCommand for Usage {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "{}", self.0.output)?;
        Ok(ExitCode::from(self.0.status.is_err()))
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name != T::name() {
            return None;
        }
        let cmd: Box<dyn ExecutableCommand> = match T::from_args(&[name], args) {
            Ok(cmd) => Box::new(cmd),
            Err(early) => Box::new(Usage(early)),
        };
        Some(cmd)
    }
}

#[derive(FromArgs)]
/// Print the shell's working directory.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.current_dir.display())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the shell's working directory, to $HOME when no directory is given.
pub struct Cd {
    #[argh(positional)]
    /// the new working directory, relative to the current one unless absolute
    pub dir: Option<PathBuf>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let dir = match self.dir {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => env.home.clone().context("cd: HOME is not set")?,
        };
        let resolved = resolve_dir(&env.current_dir, &dir)?;

        std::env::set_current_dir(&resolved)
            .with_context(|| format!("cd: {}", resolved.display()))?;
        debug!("working directory is now {}", resolved.display());
        env.current_dir = resolved;
        Ok(0)
    }
}

/// Absolute, symlink-free form of `dir` taken relative to `base`.
fn resolve_dir(base: &Path, dir: &Path) -> Result<PathBuf> {
    let joined = base.join(dir);
    let resolved = joined
        .canonicalize()
        .with_context(|| format!("cd: {}", dir.display()))?;
    anyhow::ensure!(resolved.is_dir(), "cd: {}: not a directory", dir.display());
    Ok(resolved)
}

#[derive(FromArgs)]
/// Exit the shell after this line.
pub struct Exit {
    #[argh(positional)]
    /// status the shell exits with; defaults to 0.
    pub code: Option<ExitCode>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "Exit requested")?;
        env.should_exit = true;
        Ok(self.code.unwrap_or(0))
    }
}

#[derive(FromArgs)]
/// Print the most recent input lines, oldest first.
pub struct History {}

impl BuiltinCommand for History {
    fn name() -> &'static str {
        "history"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        for line in env.history.iter() {
            writeln!(stdout, "{line}")?;
        }
        Ok(0)
    }
}
