//! Configuration loading for vsplit.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, key by key):
//! 1. `/etc/vsplit/config.toml` (system)
//! 2. `~/.config/vsplit/config.toml` (user, honors `XDG_CONFIG_HOME`)
//! 3. `./vsplit.toml` (local override), or the file given with `--config`
//! 4. Environment variables (`VSPLIT_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [model]
//! beam_width = 25
//! new_voice_prior = 1e-9
//! pitch_history_length = 6
//! gap_std_micros = 127000.0
//! pitch_std = 4.0
//! min_gap_score = 8e-4
//!
//! [search]
//! expansion_budget_ms = 20000
//! beam_safety_cap = 1000
//!
//! [input]
//! gold_from = "channel"
//!
//! [logging]
//! level = "info"
//! ```

pub mod loader;

pub use loader::{discover_config_files_with_override, ConfigSources};

use midi_notes::LabelSource;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use voice_split::{ModelParameters, SearchLimits};

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] voice_split::Error),
}

/// Search safety limits as written in config files.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Default: 20000
    pub expansion_budget_ms: u64,
    /// Default: 1000
    pub beam_safety_cap: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let limits = SearchLimits::default();
        Self {
            expansion_budget_ms: limits.expansion_budget.as_millis() as u64,
            beam_safety_cap: limits.beam_safety_cap,
        }
    }
}

impl SearchConfig {
    pub fn limits(&self) -> SearchLimits {
        SearchLimits {
            expansion_budget: Duration::from_millis(self.expansion_budget_ms),
            beam_safety_cap: self.beam_safety_cap,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputConfig {
    /// Which MIDI attribute defines the true voices.
    pub gold_from: LabelSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive. Default: "info"
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Complete vsplit configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VsplitConfig {
    pub model: ModelParameters,
    pub search: SearchConfig,
    pub input: InputConfig,
    pub logging: LoggingConfig,
}

impl VsplitConfig {
    /// Load configuration from all standard sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration, with `config_path` replacing `./vsplit.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report where values came from.
    ///
    /// The result is validated; a model the splitter would reject is an
    /// error here rather than at the first decode.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let files = loader::discover_config_files_with_override(config_path);
        let (config, sources) = Self::load_layers(&files, |key| std::env::var(key).ok())?;
        config.model.validate()?;
        Ok((config, sources))
    }

    /// Layer the given files over the defaults, then the environment as
    /// seen through `env`.
    pub fn load_layers<F>(files: &[PathBuf], env: F) -> Result<(Self, ConfigSources), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut sources = ConfigSources::default();
        let mut config = VsplitConfig::default();

        for path in files {
            loader::load_into(&mut config, path)?;
            sources.files.push(path.clone());
        }

        loader::apply_env_overrides(&mut config, &mut sources, env);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Built by hand so every key appears with a stable layout
        let mut output = String::new();

        output.push_str("# vsplit configuration\n\n");

        output.push_str("[model]\n");
        output.push_str(&format!("beam_width = {}\n", self.model.beam_width));
        output.push_str(&format!("new_voice_prior = {:e}\n", self.model.new_voice_prior));
        output.push_str(&format!(
            "pitch_history_length = {}\n",
            self.model.pitch_history_length
        ));
        output.push_str(&format!(
            "gap_std_micros = {}\n",
            toml_float(self.model.gap_std_micros)
        ));
        output.push_str(&format!("pitch_std = {}\n", toml_float(self.model.pitch_std)));
        output.push_str(&format!("min_gap_score = {:e}\n", self.model.min_gap_score));

        output.push_str("\n[search]\n");
        output.push_str(&format!(
            "expansion_budget_ms = {}\n",
            self.search.expansion_budget_ms
        ));
        output.push_str(&format!("beam_safety_cap = {}\n", self.search.beam_safety_cap));

        output.push_str("\n[input]\n");
        let gold_from = match self.input.gold_from {
            LabelSource::Channel => "channel",
            LabelSource::Track => "track",
        };
        output.push_str(&format!("gold_from = \"{}\"\n", gold_from));

        output.push_str("\n[logging]\n");
        output.push_str(&format!("level = \"{}\"\n", self.logging.level));

        output
    }
}

/// TOML floats need a decimal point or exponent.
fn toml_float(value: f64) -> String {
    let text = value.to_string();
    if text.contains(['.', 'e', 'E']) || !value.is_finite() {
        text
    } else {
        format!("{text}.0")
    }
}
