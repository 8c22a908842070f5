//! A minimal interactive shell.
//!
//! Input lines are split on whitespace by the [`lexer`], classified by the
//! [`parser`] into a plain command, a command with redirections, or a pipeline,
//! and run by the [`orchestrator`], which wires files and pipes to child
//! processes. A handful of built-ins (`cd`, `pwd`, `history`, `exit`) run inside
//! the shell process itself.
//!
//! The main entry point is [`Interpreter`], which owns the shell state and drives
//! the read-classify-execute loop.

mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod external;
pub mod history;
mod interpreter;
pub mod lexer;
pub mod orchestrator;
pub mod parser;
pub mod signal;

/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
