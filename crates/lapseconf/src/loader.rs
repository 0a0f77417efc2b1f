//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, LapseConfig, APP_NAME};
use std::env;
use std::path::{Path, PathBuf};

/// Local override file, looked up in the working directory.
pub const LOCAL_CONFIG: &str = "timelapse.toml";

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in load order: system, user, then local.
///
/// If `cli_path` is provided and exists, it replaces `./timelapse.toml`.
/// Only existing files are returned.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc").join(APP_NAME).join("config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join(APP_NAME).join("config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from(LOCAL_CONFIG);
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a config file as a raw TOML table.
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

/// Deep-merge `overlay` into `base`. Tables merge key by key, everything else is replaced.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Turn a merged table into a typed config. Missing keys take their defaults.
pub fn from_table(table: toml::Table, origin: &Path) -> Result<LapseConfig, ConfigError> {
    let mut config: LapseConfig =
        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: origin.to_path_buf(),
                message: e.to_string(),
            })?;
    expand_config_paths(&mut config);
    Ok(config)
}

/// Parse config from a TOML string.
pub fn parse_toml(contents: &str, path: &Path) -> Result<LapseConfig, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    from_table(table, path)
}

fn expand_config_paths(config: &mut LapseConfig) {
    let paths = &mut config.infra.paths;
    paths.data_dir = expand_path(&paths.data_dir.to_string_lossy());
    for dir in [&mut paths.video_dir, &mut paths.log_dir, &mut paths.photo_dir] {
        if let Some(p) = dir.as_mut() {
            *p = expand_path(&p.to_string_lossy());
        }
    }
    config.infra.encoder.program = expand_path(&config.infra.encoder.program.to_string_lossy());
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut LapseConfig, sources: &mut ConfigSources) {
    let paths = &mut config.infra.paths;
    if let Ok(v) = env::var("TIMELAPSE_DATA_DIR") {
        paths.data_dir = expand_path(&v);
        sources.env_overrides.push("TIMELAPSE_DATA_DIR".to_string());
    }
    if let Ok(v) = env::var("TIMELAPSE_VIDEO_DIR") {
        paths.video_dir = Some(expand_path(&v));
        sources.env_overrides.push("TIMELAPSE_VIDEO_DIR".to_string());
    }
    if let Ok(v) = env::var("TIMELAPSE_LOG_DIR") {
        paths.log_dir = Some(expand_path(&v));
        sources.env_overrides.push("TIMELAPSE_LOG_DIR".to_string());
    }
    if let Ok(v) = env::var("TIMELAPSE_PHOTO_DIR") {
        paths.photo_dir = Some(expand_path(&v));
        sources.env_overrides.push("TIMELAPSE_PHOTO_DIR".to_string());
    }

    if let Ok(v) = env::var("TIMELAPSE_ENCODER") {
        config.infra.encoder.program = expand_path(&v);
        sources.env_overrides.push("TIMELAPSE_ENCODER".to_string());
    }

    if let Ok(v) = env::var("TIMELAPSE_NAMESPACE") {
        config.infra.bus.namespace = v;
        sources.env_overrides.push("TIMELAPSE_NAMESPACE".to_string());
    }

    if let Ok(v) = env::var("TIMELAPSE_LOG_LEVEL") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("TIMELAPSE_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Ok(v) = env::var("RUST_LOG") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }

    if let Ok(v) = env::var("TIMELAPSE_TIMEZONE") {
        config.bootstrap.schedule.timezone = v;
        sources.env_overrides.push("TIMELAPSE_TIMEZONE".to_string());
    }

    if let Ok(v) = env::var("TIMELAPSE_SNAPSHOT_URL") {
        config.bootstrap.camera.snapshot_url = v;
        sources.env_overrides.push("TIMELAPSE_SNAPSHOT_URL".to_string());
    }
}

/// Expand a leading `~/` or `$VAR` in a path. Unknown variables are left as written.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        return match directories::BaseDirs::new() {
            Some(dirs) => dirs.home_dir().join(rest),
            None => PathBuf::from(path),
        };
    }

    if let Some(var_and_rest) = path.strip_prefix('$') {
        let (var, rest) = match var_and_rest.split_once('/') {
            Some((var, rest)) => (var, Some(rest)),
            None => (var_and_rest, None),
        };
        if let Ok(value) = env::var(var) {
            let base = PathBuf::from(value);
            return match rest {
                Some(rest) => base.join(rest),
                None => base,
            };
        }
    }

    PathBuf::from(path)
}
