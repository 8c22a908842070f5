use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

// ── Final (merged) config types ──

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Settings {
    /// Number of lines kept by the `history` built-in.
    pub history_size: usize,
    /// Upper bound on the number of stages in one pipeline.
    pub max_pipeline_stages: usize,
    /// Name of the signal that asks the shell to exit, e.g. `SIGTERM`.
    pub termination_signal: String,
    /// Prompt shown before each line; `<username>> ` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Log filter used when neither `--log-level` nor `RUST_LOG` is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            history_size: crate::history::DEFAULT_HISTORY_SIZE,
            max_pipeline_stages: crate::parser::DEFAULT_MAX_PIPELINE_STAGES,
            termination_signal: "SIGTERM".to_string(),
            prompt: None,
            log_level: None,
        }
    }
}

// ── Overlay types (user config that merges with defaults) ──

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigOverlay {
    #[serde(default)]
    settings: SettingsOverlay,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SettingsOverlay {
    history_size: Option<usize>,
    max_pipeline_stages: Option<usize>,
    termination_signal: Option<String>,
    prompt: Option<String>,
    log_level: Option<String>,
}

impl Config {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    /// Load configuration with resolution order:
    /// 1. Start with embedded defaults
    /// 2. Merge `path` if given, else ~/.config/minish/config.toml (if it exists)
    ///
    /// An explicitly named file must exist and parse. Problems with the implicit
    /// user file are reported and the defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read config {}", path.display()))?;
                config.apply_overlay(parse_overlay(&content).with_context(|| {
                    format!("invalid config {}", path.display())
                })?);
            }
            None => {
                if let Some(overlay) = Self::load_user_overlay() {
                    config.apply_overlay(overlay);
                }
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Defaults merged with the TOML document `content`.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config = Self::default_config();
        config.apply_overlay(parse_overlay(content)?);
        config.validate()?;
        Ok(config)
    }

    /// Location of the per-user configuration file.
    pub fn user_config_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(Path::new(&home).join(".config/minish/config.toml"))
    }

    fn load_user_overlay() -> Option<ConfigOverlay> {
        let path = Self::user_config_path()?;
        let content = std::fs::read_to_string(&path).ok()?;
        match parse_overlay(&content) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                eprintln!("minish: config parse error in {}: {e:#}", path.display());
                None
            }
        }
    }

    /// Apply an overlay on top of this config: every value present overrides.
    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        let s = overlay.settings;
        if let Some(v) = s.history_size {
            self.settings.history_size = v;
        }
        if let Some(v) = s.max_pipeline_stages {
            self.settings.max_pipeline_stages = v;
        }
        if let Some(v) = s.termination_signal {
            self.settings.termination_signal = v;
        }
        if s.prompt.is_some() {
            self.settings.prompt = s.prompt;
        }
        if s.log_level.is_some() {
            self.settings.log_level = s.log_level;
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.settings.max_pipeline_stages >= 2,
            "max_pipeline_stages must be at least 2, got {}",
            self.settings.max_pipeline_stages
        );
        crate::signal::parse_signal(&self.settings.termination_signal)?;
        Ok(())
    }

    /// The configuration as a TOML document.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("cannot serialize config")
    }
}

fn parse_overlay(content: &str) -> Result<ConfigOverlay> {
    Ok(toml::from_str(content)?)
}
