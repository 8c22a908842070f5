//! Signal plumbing for the interactive loop.
//!
//! The shell never acts on a signal inside a handler. The termination signal only
//! raises a flag that the loop checks between commands; in-flight children are
//! left alone.

use anyhow::{Context, Result};
use log::debug;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Bit `n` is set once a handler for signal `n` was installed in this process.
static CAUGHT: AtomicU64 = AtomicU64::new(0);

fn install_flag(signal: Signal, flag: Arc<AtomicBool>) -> Result<()> {
    signal_hook::flag::register(signal as i32, flag)
        .with_context(|| format!("cannot install a handler for {signal}"))?;
    CAUGHT.fetch_or(1 << signal as i32, Ordering::SeqCst);
    Ok(())
}

/// Whether this process installed a handler for `signal`.
pub fn is_caught(signal: Signal) -> bool {
    CAUGHT.load(Ordering::SeqCst) & (1 << signal as i32) != 0
}

/// Puts every signal this process catches back to its default disposition.
///
/// Meant for a forked child before `exec`, so a child blocked before it runs its
/// program still dies from Ctrl-C. Only calls `sigaction` and does not allocate.
pub fn reset_caught_signals() {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for signal in Signal::iterator().filter(|&signal| is_caught(signal)) {
        // SAFETY: installs the default disposition, no handler code is involved.
        let _ = unsafe { sigaction(signal, &default) };
    }
}

/// Process-wide "please exit" flag, cheap to clone and share with a handler.
#[derive(Debug, Clone, Default)]
pub struct TerminationFlag(Arc<AtomicBool>);

impl TerminationFlag {
    /// A flag that starts cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag whenever `signal` is delivered to the shell.
    pub fn register(&self, signal: Signal) -> Result<()> {
        install_flag(signal, Arc::clone(&self.0))?;
        debug!("{signal} requests termination");
        Ok(())
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Keeps `signal` from killing the shell itself.
///
/// A handler is installed instead of ignoring the signal: ignored dispositions
/// survive `exec`, handlers are reset to the default, so children still react.
pub fn shield(signal: Signal) -> Result<()> {
    install_flag(signal, Arc::new(AtomicBool::new(false)))
}

/// Parses a signal name such as `SIGTERM` or `TERM`.
pub fn parse_signal(name: &str) -> Result<Signal> {
    let name = name.trim().to_ascii_uppercase();
    let full = if name.starts_with("SIG") {
        name
    } else {
        format!("SIG{name}")
    };
    Signal::from_str(&full).with_context(|| format!("unknown signal `{full}`"))
}
