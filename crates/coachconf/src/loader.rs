//! Config file discovery, loading, and environment variable overlay.

use crate::{CoachConfig, ConfigError};
use std::env;
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
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    // System config
    let system = PathBuf::from("/etc/visioncoach/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("visioncoach/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    // CLI override takes precedence over local
    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    // Local override (current directory)
    let local = PathBuf::from("visioncoach.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file into a raw table.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Deep-merge `overlay` into `base`. Nested tables merge key by key;
/// any other value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(overlay_table)) => {
                merge_tables(base_table, overlay_table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Deserialize a merged table, filling anything missing from defaults.
pub fn from_table(table: toml::Table, path: &Path) -> Result<CoachConfig, ConfigError> {
    let mut config: CoachConfig =
        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

    config.infra.media.beep_sample = config
        .infra
        .media
        .beep_sample
        .map(|p| expand_path(&p.to_string_lossy()));
    config.infra.media.finale_sample = config
        .infra
        .media
        .finale_sample
        .map(|p| expand_path(&p.to_string_lossy()));

    Ok(config)
}

/// Parse config from TOML string.
#[cfg(test)]
fn parse_toml(contents: &str, path: &Path) -> Result<CoachConfig, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    from_table(table, path)
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut CoachConfig, sources: &mut ConfigSources) {
    // Telemetry
    if let Ok(v) = env::var("VISIONCOACH_LOG_LEVEL") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("VISIONCOACH_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Ok(v) = env::var("RUST_LOG") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }

    // Audio
    if let Ok(v) = env::var("VISIONCOACH_SAMPLE_RATE") {
        if let Ok(rate) = v.parse() {
            config.infra.audio.sample_rate = rate;
            sources.env_overrides.push("VISIONCOACH_SAMPLE_RATE".to_string());
        }
    }
    if let Ok(v) = env::var("VISIONCOACH_BEEP_SAMPLE") {
        config.infra.media.beep_sample = Some(expand_path(&v));
        sources.env_overrides.push("VISIONCOACH_BEEP_SAMPLE".to_string());
    }
    if let Ok(v) = env::var("VISIONCOACH_FINALE_SAMPLE") {
        config.infra.media.finale_sample = Some(expand_path(&v));
        sources.env_overrides.push("VISIONCOACH_FINALE_SAMPLE".to_string());
    }

    // Coaching
    if let Ok(v) = env::var("VISIONCOACH_FINALE_REP") {
        if let Ok(rep) = v.parse() {
            config.coaching.finale_rep = rep;
            sources.env_overrides.push("VISIONCOACH_FINALE_REP".to_string());
        }
    }
    if let Ok(v) = env::var("VISIONCOACH_CHALLENGE_ID") {
        config.coaching.challenge_id = v;
        sources.env_overrides.push("VISIONCOACH_CHALLENGE_ID".to_string());
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // Handle $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn test_expand_path_absolute() {
        let expanded = expand_path("/absolute/path");
        assert_eq!(expanded, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_discover_config_files() {
        // Just verify it doesn't panic
        let _files = discover_config_files();
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml = r#"
[coaching.rep]
cooldown_secs = 0.3
"#;
        let config = parse_toml(toml, Path::new("test.toml")).unwrap();
        assert_eq!(config.coaching.rep.cooldown_secs, 0.3);
        // Other values should be defaults
        assert_eq!(config.coaching.rep.up_threshold, 155.0);
        assert_eq!(config.infra.audio.sample_rate, 48000);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
[telemetry]
log_level = "debug"

[audio]
stream_name = "coach-test"
sample_rate = 44100
channels = 1
latency_frames = 128
gain = 0.5

[media]
beep_sample = "/data/beep.wav"
finale_sample = "/data/finale.wav"

[coaching]
smoothing_window = 4
min_joint_confidence = 0.4
finale_rep = 20
max_pitch_cents = 600.0
challenge_id = "pushups_30d"

[coaching.rep]
down_threshold = 90.0
up_threshold = 150.0
cooldown_secs = 0.5
"#;
        let config = parse_toml(toml, Path::new("test.toml")).unwrap();

        assert_eq!(config.infra.telemetry.log_level, "debug");
        assert_eq!(config.infra.audio.stream_name, "coach-test");
        assert_eq!(config.infra.audio.sample_rate, 44100);
        assert_eq!(config.infra.audio.channels, 1);
        assert_eq!(config.infra.audio.latency_frames, 128);
        assert_eq!(config.infra.media.beep_sample, Some(PathBuf::from("/data/beep.wav")));
        assert_eq!(config.infra.media.finale_sample, Some(PathBuf::from("/data/finale.wav")));
        assert_eq!(config.coaching.smoothing_window, 4);
        assert_eq!(config.coaching.min_joint_confidence, 0.4);
        assert_eq!(config.coaching.finale_rep, 20);
        assert_eq!(config.coaching.max_pitch_cents, 600.0);
        assert_eq!(config.coaching.challenge_id, "pushups_30d");
        assert_eq!(config.coaching.rep.down_threshold, 90.0);
        assert_eq!(config.coaching.rep.up_threshold, 150.0);
        assert_eq!(config.coaching.rep.cooldown_secs, 0.5);
    }

    #[test]
    fn test_parse_invalid_toml() {
        let err = parse_toml("[coaching\nfinale_rep = ", Path::new("broken.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_merge_tables_nested() {
        let mut base: toml::Table = "[coaching]\nfinale_rep = 10\n[coaching.rep]\ndown_threshold = 80.0\n"
            .parse()
            .unwrap();
        let overlay: toml::Table = "[coaching.rep]\nup_threshold = 170.0\n".parse().unwrap();

        merge_tables(&mut base, overlay);

        let rep = base["coaching"]["rep"].as_table().unwrap();
        assert_eq!(rep["down_threshold"].as_float(), Some(80.0));
        assert_eq!(rep["up_threshold"].as_float(), Some(170.0));
        assert_eq!(base["coaching"]["finale_rep"].as_integer(), Some(10));
    }
}
