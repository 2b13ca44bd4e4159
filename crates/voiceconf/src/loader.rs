//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, VsplitConfig};
use midi_notes::LabelSource;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// Returns paths in load order (system, user, local/cli). Standard
/// locations are only returned when they exist; `cli_path` is always
/// returned when given, so a missing explicit file fails to load.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let user_dir = directories::BaseDirs::new().map(|d| d.config_dir().join("vsplit"));
    discover_config_files_in(
        Path::new("/etc/vsplit/config.toml"),
        user_dir.as_deref(),
        Path::new("vsplit.toml"),
        cli_path,
    )
}

pub(crate) fn discover_config_files_in(
    system: &Path,
    user_dir: Option<&Path>,
    local: &Path,
    cli_path: Option<&Path>,
) -> Vec<PathBuf> {
    let mut files = Vec::new();

    if system.exists() {
        files.push(system.to_path_buf());
    }

    if let Some(dir) = user_dir {
        let user = dir.join("config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    // CLI override replaces the local file
    if let Some(path) = cli_path {
        files.push(path.to_path_buf());
        return files;
    }

    if local.exists() {
        files.push(local.to_path_buf());
    }

    files
}

/// Layer a TOML file over `config`.
pub fn load_into(config: &mut VsplitConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

/// Load config from a TOML file over the defaults.
pub fn load_from_file(path: &Path) -> Result<VsplitConfig, ConfigError> {
    let mut config = VsplitConfig::default();
    load_into(&mut config, path)?;
    Ok(config)
}

/// Apply the keys present in a TOML document; absent keys keep their
/// current values. Unknown sections and keys are errors.
pub fn apply_toml(
    config: &mut VsplitConfig,
    contents: &str,
    path: &Path,
) -> Result<(), ConfigError> {
    let layer: FileLayer = toml::from_str(contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    layer.apply_to(config);
    Ok(())
}

/// One config file as written: every key optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileLayer {
    model: Option<ModelLayer>,
    search: Option<SearchLayer>,
    input: Option<InputLayer>,
    logging: Option<LoggingLayer>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelLayer {
    beam_width: Option<usize>,
    new_voice_prior: Option<f64>,
    pitch_history_length: Option<usize>,
    gap_std_micros: Option<f64>,
    pitch_std: Option<f64>,
    min_gap_score: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchLayer {
    expansion_budget_ms: Option<u64>,
    beam_safety_cap: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct InputLayer {
    gold_from: Option<LabelSource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingLayer {
    level: Option<String>,
}

impl FileLayer {
    fn apply_to(self, config: &mut VsplitConfig) {
        if let Some(model) = self.model {
            let target = &mut config.model;
            set(&mut target.beam_width, model.beam_width);
            set(&mut target.new_voice_prior, model.new_voice_prior);
            set(&mut target.pitch_history_length, model.pitch_history_length);
            set(&mut target.gap_std_micros, model.gap_std_micros);
            set(&mut target.pitch_std, model.pitch_std);
            set(&mut target.min_gap_score, model.min_gap_score);
        }
        if let Some(search) = self.search {
            set(&mut config.search.expansion_budget_ms, search.expansion_budget_ms);
            set(&mut config.search.beam_safety_cap, search.beam_safety_cap);
        }
        if let Some(input) = self.input {
            set(&mut config.input.gold_from, input.gold_from);
        }
        if let Some(logging) = self.logging {
            set(&mut config.logging.level, logging.level);
        }
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn parse_label_source(value: &str) -> Option<LabelSource> {
    match value.to_ascii_lowercase().as_str() {
        "channel" => Some(LabelSource::Channel),
        "track" => Some(LabelSource::Track),
        _ => None,
    }
}

/// Apply environment variable overrides to config.
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides<F>(config: &mut VsplitConfig, sources: &mut ConfigSources, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut record = |key: &str| sources.env_overrides.push(key.to_string());

    if let Some(v) = env("VSPLIT_BEAM_WIDTH").and_then(|v| v.parse().ok()) {
        config.model.beam_width = v;
        record("VSPLIT_BEAM_WIDTH");
    }
    if let Some(v) = env("VSPLIT_NEW_VOICE_PRIOR").and_then(|v| v.parse().ok()) {
        config.model.new_voice_prior = v;
        record("VSPLIT_NEW_VOICE_PRIOR");
    }
    if let Some(v) = env("VSPLIT_PITCH_HISTORY").and_then(|v| v.parse().ok()) {
        config.model.pitch_history_length = v;
        record("VSPLIT_PITCH_HISTORY");
    }
    if let Some(v) = env("VSPLIT_GAP_STD_MICROS").and_then(|v| v.parse().ok()) {
        config.model.gap_std_micros = v;
        record("VSPLIT_GAP_STD_MICROS");
    }
    if let Some(v) = env("VSPLIT_PITCH_STD").and_then(|v| v.parse().ok()) {
        config.model.pitch_std = v;
        record("VSPLIT_PITCH_STD");
    }
    if let Some(v) = env("VSPLIT_MIN_GAP_SCORE").and_then(|v| v.parse().ok()) {
        config.model.min_gap_score = v;
        record("VSPLIT_MIN_GAP_SCORE");
    }

    if let Some(v) = env("VSPLIT_EXPANSION_BUDGET_MS").and_then(|v| v.parse().ok()) {
        config.search.expansion_budget_ms = v;
        record("VSPLIT_EXPANSION_BUDGET_MS");
    }
    if let Some(v) = env("VSPLIT_BEAM_SAFETY_CAP").and_then(|v| v.parse().ok()) {
        config.search.beam_safety_cap = v;
        record("VSPLIT_BEAM_SAFETY_CAP");
    }

    if let Some(v) = env("VSPLIT_GOLD_FROM").and_then(|v| parse_label_source(&v)) {
        config.input.gold_from = v;
        record("VSPLIT_GOLD_FROM");
    }

    if let Some(v) = env("VSPLIT_LOG_LEVEL") {
        config.logging.level = v;
        record("VSPLIT_LOG_LEVEL");
    }
    // Also support RUST_LOG
    if let Some(v) = env("RUST_LOG") {
        config.logging.level = v;
        record("RUST_LOG");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn parse(toml: &str) -> Result<VsplitConfig, ConfigError> {
        let mut config = VsplitConfig::default();
        apply_toml(&mut config, toml, Path::new("test.toml"))?;
        Ok(config)
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = parse("[model]\nbeam_width = 10\n").unwrap();
        assert_eq!(config.model.beam_width, 10);
        // Other values should be defaults
        assert_eq!(config.model.pitch_std, 4.0);
        assert_eq!(config.search.beam_safety_cap, 1000);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
[model]
beam_width = 11
new_voice_prior = 1e-7
pitch_history_length = 8
gap_std_micros = 30000
pitch_std = 5.5
min_gap_score = 1e-5

[search]
expansion_budget_ms = 500
beam_safety_cap = 64

[input]
gold_from = "track"

[logging]
level = "voice_split=debug"
"#;
        let config = parse(toml).unwrap();

        assert_eq!(config.model.beam_width, 11);
        assert_eq!(config.model.new_voice_prior, 1e-7);
        assert_eq!(config.model.pitch_history_length, 8);
        assert_eq!(config.model.gap_std_micros, 30000.0);
        assert_eq!(config.model.pitch_std, 5.5);
        assert_eq!(config.model.min_gap_score, 1e-5);
        assert_eq!(config.search.expansion_budget_ms, 500);
        assert_eq!(config.search.beam_safety_cap, 64);
        assert_eq!(config.input.gold_from, LabelSource::Track);
        assert_eq!(config.logging.level, "voice_split=debug");
    }

    #[test]
    fn test_layers_only_touch_present_keys() {
        let mut config = parse("[model]\nbeam_width = 10\npitch_std = 6.0\n").unwrap();
        apply_toml(&mut config, "[model]\npitch_std = 7.0\n", Path::new("b.toml")).unwrap();
        assert_eq!(config.model.beam_width, 10);
        assert_eq!(config.model.pitch_std, 7.0);
    }

    #[test]
    fn test_wrong_types_are_errors() {
        let err = parse("[model]\nbeam_width = \"wide\"\n").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("test.toml"));
        assert!(message.contains("beam_width"));

        assert!(parse("[model]\nbeam_width = -3\n").is_err());
        assert!(parse("model = 3\n").is_err());
        assert!(parse("[input]\ngold_from = \"velocity\"\n").is_err());
        assert!(parse("[model\n").is_err());
    }

    #[test]
    fn test_unknown_keys_are_errors() {
        let err = parse("[model]\nbeam_widht = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("beam_widht"));

        let err = parse("[modle]\nbeam_width = 3\n").unwrap_err();
        assert!(err.to_string().contains("modle"));

        let err = parse("[search]\nbudget_ms = 10\n").unwrap_err();
        assert!(err.to_string().contains("budget_ms"));

        // Nothing from a rejected file is applied
        let mut config = VsplitConfig::default();
        let rejected = "[model]\nbeam_width = 3\ncolour = 1\n";
        assert!(apply_toml(&mut config, rejected, Path::new("x.toml")).is_err());
        assert_eq!(config, VsplitConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("VSPLIT_BEAM_WIDTH", "7"),
            ("VSPLIT_PITCH_STD", "5.0"),
            ("VSPLIT_BEAM_SAFETY_CAP", "not a number"),
            ("VSPLIT_GOLD_FROM", "track"),
            ("RUST_LOG", "warn"),
        ]
        .into_iter()
        .collect();

        let mut config = VsplitConfig::default();
        let mut sources = ConfigSources::default();
        apply_env_overrides(&mut config, &mut sources, |key| {
            vars.get(key).map(|v| v.to_string())
        });

        assert_eq!(config.model.beam_width, 7);
        assert_eq!(config.model.pitch_std, 5.0);
        assert_eq!(config.search.beam_safety_cap, 1000);
        assert_eq!(config.input.gold_from, LabelSource::Track);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(
            sources.env_overrides,
            vec!["VSPLIT_BEAM_WIDTH", "VSPLIT_PITCH_STD", "VSPLIT_GOLD_FROM", "RUST_LOG"]
        );
    }

    #[test]
    fn test_discovery_order_and_cli_override() {
        let dir = tempfile::tempdir().unwrap();
        let system = dir.path().join("system.toml");
        let user_dir = dir.path().join("user");
        let local = dir.path().join("vsplit.toml");
        let cli = dir.path().join("elsewhere.toml");
        std::fs::create_dir_all(&user_dir).unwrap();
        for path in [&system, &user_dir.join("config.toml"), &local] {
            std::fs::write(path, "").unwrap();
        }

        let files = discover_config_files_in(&system, Some(&user_dir), &local, None);
        assert_eq!(files, vec![system.clone(), user_dir.join("config.toml"), local.clone()]);

        // The explicit file replaces the local one, even before it exists
        let files = discover_config_files_in(&system, Some(&user_dir), &local, Some(&cli));
        assert_eq!(files, vec![system.clone(), user_dir.join("config.toml"), cli]);

        let missing = dir.path().join("missing");
        let files = discover_config_files_in(&missing, None, &missing, None);
        assert!(files.is_empty());
    }

    #[test]
    fn test_discover_config_files() {
        // Just verify it doesn't panic
        let _files = discover_config_files();
    }
}
