//! Minimal configuration loading for Vision Coach.
//!
//! Configuration is split into two categories:
//!
//! - **Infrastructure** (`InfraConfig`): things fixed for the lifetime of the
//!   process - log level, audio device format, cue sample paths.
//!
//! - **Coaching** (`CoachingConfig`): tuning values for the rep counter and the
//!   audio sequencer. These are exercise/device specific; the compiled defaults
//!   are the values the counter was tuned with.
//!
//! # Usage
//!
//! ```rust,no_run
//! use coachconf::CoachConfig;
//!
//! let config = CoachConfig::load().expect("Failed to load config");
//!
//! println!("sample rate: {}", config.infra.audio.sample_rate);
//! println!("down threshold: {}", config.coaching.rep.down_threshold);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/visioncoach/config.toml` (system)
//! 2. `~/.config/visioncoach/config.toml` (user)
//! 3. `./visioncoach.toml` (local override, or the path given on the CLI)
//! 4. Environment variables (`VISIONCOACH_*`)
//!
//! # Example Config
//!
//! ```toml
//! [telemetry]
//! log_level = "debug"
//!
//! [audio]
//! sample_rate = 48000
//! latency_frames = 256
//!
//! [media]
//! beep_sample = "~/sounds/beep.wav"
//!
//! [coaching]
//! smoothing_window = 6
//! finale_rep = 70
//!
//! [coaching.rep]
//! down_threshold = 95.0
//! up_threshold = 155.0
//! cooldown_secs = 0.45
//! ```

pub mod coaching;
pub mod infra;
pub mod loader;

pub use coaching::{CoachingConfig, RepConfig};
pub use infra::{AudioConfig, InfraConfig, MediaConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

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
    Invalid(String),
}

/// Complete Vision Coach configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CoachConfig {
    /// Infrastructure - cannot change at runtime.
    #[serde(flatten)]
    pub infra: InfraConfig,

    /// Coaching tuning.
    #[serde(default)]
    pub coaching: CoachingConfig,
}

impl CoachConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/visioncoach/config.toml`
    /// 3. `~/.config/visioncoach/config.toml`
    /// 4. `./visioncoach.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./visioncoach.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let files = loader::discover_config_files_with_override(config_path);
        Self::load_files(&files, true)
    }

    /// Load exactly the given files (in order), optionally applying env overrides.
    ///
    /// Skips discovery; used by tests and by callers that manage their own paths.
    pub fn load_files(
        files: &[PathBuf],
        apply_env: bool,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in files {
            let table = loader::load_table(path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path.clone());
        }

        let path_hint = files.last().cloned().unwrap_or_default();
        let mut config = loader::from_table(merged, &path_hint)?;

        if apply_env {
            loader::apply_env_overrides(&mut config, &mut sources);
        }

        config.validate()?;
        Ok((config, sources))
    }

    /// Reject configurations the rep counter cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.coaching.validate()?;
        if self.infra.audio.sample_rate == 0 {
            return Err(ConfigError::Invalid("audio.sample_rate must be > 0".into()));
        }
        if self.infra.audio.channels == 0 {
            return Err(ConfigError::Invalid("audio.channels must be > 0".into()));
        }
        Ok(())
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::from("# Vision Coach Configuration\n\n");
        match toml::to_string_pretty(self) {
            Ok(body) => output.push_str(&body),
            Err(e) => output.push_str(&format!("# failed to render config: {}\n", e)),
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoachConfig::default();
        assert_eq!(config.infra.audio.sample_rate, 48000);
        assert_eq!(config.coaching.rep.down_threshold, 95.0);
        assert_eq!(config.coaching.finale_rep, 70);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_to_toml() {
        let config = CoachConfig::default();
        let toml = config.to_toml();
        assert!(toml.contains("[telemetry]"));
        assert!(toml.contains("[audio]"));
        assert!(toml.contains("[coaching.rep]"));
        assert!(toml.contains("up_threshold"));
    }

    #[test]
    fn test_to_toml_parses_back() {
        let mut config = CoachConfig::default();
        config.coaching.finale_rep = 42;
        let parsed: CoachConfig = toml::from_str(&config.to_toml()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_files_layers_later_wins() {
        let dir = tempfile::tempdir().unwrap();
        let system = dir.path().join("system.toml");
        let local = dir.path().join("local.toml");
        std::fs::write(
            &system,
            "[coaching]\nfinale_rep = 50\n[coaching.rep]\ndown_threshold = 90.0\n",
        )
        .unwrap();
        std::fs::write(&local, "[coaching.rep]\nup_threshold = 160.0\n").unwrap();

        let (config, sources) = CoachConfig::load_files(&[system, local], false).unwrap();

        assert_eq!(sources.files.len(), 2);
        assert_eq!(config.coaching.finale_rep, 50);
        assert_eq!(config.coaching.rep.down_threshold, 90.0);
        assert_eq!(config.coaching.rep.up_threshold, 160.0);
        assert_eq!(config.coaching.rep.cooldown_secs, 0.45);
    }

    #[test]
    fn test_load_files_rejects_inverted_thresholds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[coaching.rep]\ndown_threshold = 160.0\n").unwrap();

        let err = CoachConfig::load_files(&[path], false).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_files_missing_file() {
        let err = CoachConfig::load_files(&[PathBuf::from("/nonexistent/vc.toml")], false)
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }
}
