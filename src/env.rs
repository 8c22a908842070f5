use crate::command::ExitCode;
use crate::history::History;
use std::env as stdenv;
use std::path::PathBuf;

/// Mutable, user-level view of the shell's state shared with built-ins.
///
/// The environment contains:
/// - `current_dir`: the working directory for command execution.
/// - `home`: the target of a bare `cd`.
/// - `history`: the most recent input lines.
/// - `should_exit`: a flag that the REPL loop checks to know when to terminate.
/// - `last_status`: exit code of the last command, used as the shell's own exit code.
///
/// Note: fields are public for simplicity. Child processes inherit the process
/// environment directly; there are no shell variables.
#[derive(Debug, Clone)]
pub struct Environment {
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// Directory `cd` switches to without an argument.
    pub home: Option<PathBuf>,
    /// Bounded record of input lines.
    pub history: History,
    /// When set to true, indicates that an interactive loop should exit.
    pub should_exit: bool,
    /// Exit code of the most recently executed command.
    pub last_status: ExitCode,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// `current_dir` comes from `std::env::current_dir()` and `home` from `$HOME`.
    pub fn new(history: History) -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            current_dir,
            home: stdenv::var_os("HOME").map(PathBuf::from),
            history,
            should_exit: false,
            last_status: 0,
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(History::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_reads_from_process_state() {
        let env = Environment::default();
        assert!(env.current_dir.is_absolute());
        assert!(!env.should_exit);
        assert_eq!(env.last_status, 0);
        assert_eq!(env.history.capacity(), crate::history::DEFAULT_HISTORY_SIZE);
    }
}
