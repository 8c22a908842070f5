use anyhow::Result;
use argh::FromArgs;
use env_logger::Env;
use log::info;
use minish::Interpreter;
use minish::config::Config;
use minish::signal::{self, TerminationFlag};
use nix::sys::signal::Signal;
use std::path::PathBuf;

#[derive(FromArgs)]
/// A minimal interactive shell with redirections and pipelines.
struct Args {
    /// configuration file to use instead of ~/.config/minish/config.toml
    #[argh(option)]
    config: Option<PathBuf>,

    /// run a single line and exit with its status
    #[argh(option, short = 'c')]
    command: Option<String>,

    /// log filter, e.g. `debug` or `minish=trace`; RUST_LOG takes precedence
    #[argh(option)]
    log_level: Option<String>,

    /// print the effective configuration and exit
    #[argh(switch)]
    dump_config: bool,
}

fn main() {
    let args: Args = argh::from_env();
    let code = match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("minish: {err:#}");
            1
        }
    };
    std::process::exit(code);
}

fn run(args: Args) -> Result<i32> {
    let config = Config::load(args.config.as_deref())?;

    let level = args
        .log_level
        .as_deref()
        .or(config.settings.log_level.as_deref())
        .unwrap_or("warn");
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    if args.dump_config {
        print!("{}", config.to_toml()?);
        return Ok(0);
    }

    let termination = TerminationFlag::new();
    termination.register(signal::parse_signal(&config.settings.termination_signal)?)?;
    signal::shield(Signal::SIGINT)?;

    let mut interpreter = Interpreter::from_config(&config, termination);
    let code = match args.command {
        Some(line) => interpreter.execute_line(&line)?,
        None => {
            info!("interactive session started");
            interpreter.repl()?
        }
    };
    info!("exiting with status {code}");
    Ok(code)
}
