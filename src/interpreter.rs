use crate::command::{CommandFactory, EXIT_INVALID_LINE, ExitCode};
use crate::config::Config;
use crate::env::Environment;
use crate::history::History;
use crate::lexer;
use crate::orchestrator;
use crate::parser::{Classifier, Command};
use crate::signal::TerminationFlag;
use anyhow::Context;
use log::{debug, error, warn};
use nix::unistd::{User, geteuid};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::Write;

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports the built-ins defined in this crate.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// A minimal interactive shell that runs built-ins, external programs,
/// redirections and pipelines.
///
/// The interpreter maintains an [`Environment`] and a list of [`CommandFactory`]
/// objects that are queried for built-ins by name. Every other line is classified
/// and handed to the [orchestrator](crate::orchestrator).
///
/// Example
/// ```
/// use minish::Interpreter;
/// let mut sh = Interpreter::default();
/// let code = sh.execute_line("true").unwrap();
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    env: Environment,
    commands: Vec<Box<dyn CommandFactory>>,
    classifier: Classifier,
    termination: TerminationFlag,
    prompt: String,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of built-in factories.
    pub fn new(
        commands: Vec<Box<dyn CommandFactory>>,
        env: Environment,
        classifier: Classifier,
        termination: TerminationFlag,
    ) -> Self {
        Self {
            env,
            commands,
            classifier,
            termination,
            prompt: format!("{}> ", username()),
        }
    }

    /// Create an interpreter with the default built-ins, tuned by `config`.
    pub fn from_config(config: &Config, termination: TerminationFlag) -> Self {
        let settings = &config.settings;
        let mut interpreter = Self::new(
            default_builtins(),
            Environment::new(History::new(settings.history_size)),
            Classifier::new(settings.max_pipeline_stages),
            termination,
        );
        if let Some(prompt) = &settings.prompt {
            interpreter.prompt = prompt.clone();
        }
        interpreter
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Whether the loop should stop before reading another line.
    pub fn should_exit(&self) -> bool {
        self.env.should_exit || self.termination.is_set()
    }

    /// Run a built-in by name, if there is one.
    ///
    /// Returns `None` when `name` is not a built-in.
    pub fn run_builtin(
        &mut self,
        name: &str,
        args: &[&str],
        stdout: &mut dyn Write,
    ) -> Option<anyhow::Result<ExitCode>> {
        let cmd = self
            .commands
            .iter()
            .find_map(|factory| factory.try_create(&self.env, name, args))?;
        Some(cmd.execute(stdout, &mut self.env))
    }

    /// Records, classifies and runs one input line, with built-in output and
    /// grammar diagnostics going to the shell's stdout.
    pub fn execute_line(&mut self, line: &str) -> anyhow::Result<ExitCode> {
        self.execute_line_with_redefined_output(line, &mut std::io::stdout())
    }

    /// Same as [`Interpreter::execute_line`], but writes built-in output and
    /// grammar diagnostics to `stdout`. External programs always inherit the
    /// shell's own standard streams.
    ///
    /// A blank line does nothing and keeps the previous status.
    pub fn execute_line_with_redefined_output(
        &mut self,
        line: &str,
        stdout: &mut dyn Write,
    ) -> anyhow::Result<ExitCode> {
        self.env.history.record(line);

        let tokens = lexer::split_into_tokens(line);
        if tokens.is_empty() {
            return Ok(self.env.last_status);
        }
        debug!("tokens = {tokens:?}");

        let classification = self.classifier.classify(&tokens);
        debug!(
            "shape = {:?}, segments start at {:?}",
            classification.shape, classification.segment_starts
        );

        let code = match classification.into_command(tokens) {
            Err(err) => {
                warn!("rejected {:?}: {err}", line.trim());
                writeln!(
                    stdout,
                    "{} is not a valid command, please try again. ({err})",
                    line.trim()
                )?;
                EXIT_INVALID_LINE
            }
            Ok(Command::Simple(argv)) => {
                let args: Vec<&str> = argv[1..].iter().map(String::as_str).collect();
                match self.run_builtin(&argv[0], &args, stdout) {
                    Some(result) => result?,
                    None => orchestrator::execute(&Command::Simple(argv), &self.env.current_dir)?,
                }
            }
            Ok(command) => orchestrator::execute(&command, &self.env.current_dir)?,
        };
        self.env.last_status = code;
        Ok(code)
    }

    /// Reads and executes lines until `exit`, end of input, or the termination flag.
    ///
    /// Returns the status the shell should exit with.
    pub fn repl(&mut self) -> anyhow::Result<ExitCode> {
        let config = rustyline::Config::builder()
            .max_history_size(self.env.history.capacity().max(1))?
            .auto_add_history(false)
            .build();
        let mut rl = DefaultEditor::with_config(config)?;

        loop {
            if self.termination.is_set() {
                println!("Exit requested");
                break;
            }
            match rl.readline(&self.prompt) {
                // The signal may have arrived while waiting for this line.
                Ok(_) if self.termination.is_set() => {
                    println!("Exit requested");
                    break;
                }
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    if let Err(err) = self.execute_line(&line) {
                        error!("{err:#}");
                        eprintln!("minish: {err:#}");
                        self.env.last_status = 1;
                    }
                    if self.env.should_exit {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err).context("failed to read input"),
            }
        }

        Ok(self.env.last_status)
    }
}

impl Default for Interpreter {
    /// Create an interpreter with the default built-ins and configuration.
    fn default() -> Self {
        Self::new(
            default_builtins(),
            Environment::default(),
            Classifier::default(),
            TerminationFlag::new(),
        )
    }
}

/// The built-ins: `cd`, `pwd`, `exit` and `history`.
fn default_builtins() -> Vec<Box<dyn CommandFactory>> {
    use crate::builtin::{Cd, Exit, History as HistoryBuiltin, Pwd};
    vec![
        Box::new(Factory::<Cd>::default()),
        Box::new(Factory::<Pwd>::default()),
        Box::new(Factory::<Exit>::default()),
        Box::new(Factory::<HistoryBuiltin>::default()),
    ]
}

/// Login name of the effective user, for the prompt.
fn username() -> String {
    match User::from_uid(geteuid()) {
        Ok(Some(user)) => return user.name,
        Ok(None) => warn!("no passwd entry for uid {}", geteuid()),
        Err(err) => warn!("cannot look up uid {}: {err}", geteuid()),
    }
    std::env::var("USER").unwrap_or_else(|_| "jdoe".to_string())
}
