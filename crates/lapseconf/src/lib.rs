//! Minimal configuration loading for the daylight timelapse services.
//!
//! Configuration is split into two categories:
//!
//! - **Infrastructure** (`InfraConfig`): fixed for the life of the process -
//!   output paths, encoder invocation, bus namespace, log filter.
//!
//! - **Bootstrap** (`BootstrapConfig`): initial values for the scheduler and
//!   snapshot fetcher. Command line flags override them.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, tables merge key by key):
//! 1. `/etc/daylight-timelapse/config.toml` (system)
//! 2. `~/.config/daylight-timelapse/config.toml` (user)
//! 3. `./timelapse.toml` or the `--config` path (local override)
//! 4. Environment variables (`TIMELAPSE_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! data_dir = "~/timelapse"
//! video_dir = "/srv/dlna/videos"
//!
//! [encoder]
//! program = "/usr/bin/ffmpeg"
//! crf = 23
//!
//! [bus]
//! namespace = "daily-timelapse"
//!
//! [telemetry]
//! log_level = "info"
//!
//! [schedule]
//! every = 30
//! latitude = 52.52437
//! longitude = 13.41053
//! frame_margin = 120
//! timezone = "Europe/Berlin"
//!
//! [camera]
//! snapshot_url = "http://{camera}:8080/snapshot"
//! ```

pub mod bootstrap;
pub mod infra;
pub mod loader;

pub use bootstrap::{BootstrapConfig, CameraConfig, ScheduleConfig};
pub use infra::{BusConfig, EncoderConfig, InfraConfig, PathsConfig, TelemetryConfig, APP_NAME};
pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
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
}

/// Complete timelapse configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LapseConfig {
    #[serde(flatten)]
    pub infra: InfraConfig,

    #[serde(flatten)]
    pub bootstrap: BootstrapConfig,
}

impl LapseConfig {
    /// Load configuration with an explicit override file in place of `./timelapse.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();
        let mut origin = PathBuf::from("<defaults>");

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::load_table(&path)?;
            loader::merge_tables(&mut merged, table);
            origin = path.clone();
            sources.files.push(path);
        }

        let mut config = loader::from_table(merged, &origin)?;
        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Build TOML manually for nicer formatting
        let mut output = String::new();
        let paths = &self.infra.paths;
        let encoder = &self.infra.encoder;
        let schedule = &self.bootstrap.schedule;
        let camera = &self.bootstrap.camera;

        output.push_str("# Daylight Timelapse Configuration\n\n");

        output.push_str("[paths]\n");
        output.push_str(&format!("data_dir = \"{}\"\n", paths.data_dir.display()));
        output.push_str(&format!("video_dir = \"{}\"\n", paths.videos().display()));
        output.push_str(&format!("log_dir = \"{}\"\n", paths.logs().display()));
        output.push_str(&format!("photo_dir = \"{}\"\n", paths.photos().display()));

        output.push_str("\n[encoder]\n");
        output.push_str(&format!("program = \"{}\"\n", encoder.program.display()));
        output.push_str(&format!("width = {}\n", encoder.width));
        output.push_str(&format!("height = {}\n", encoder.height));
        output.push_str(&format!("video_bitrate = \"{}\"\n", encoder.video_bitrate));
        output.push_str(&format!("codec = \"{}\"\n", encoder.codec));
        output.push_str(&format!("preset = \"{}\"\n", encoder.preset));
        output.push_str(&format!("crf = {}\n", encoder.crf));
        output.push_str(&format!("pixel_format = \"{}\"\n", encoder.pixel_format));
        output.push_str(&format!("report_level = {}\n", encoder.report_level));

        output.push_str("\n[bus]\n");
        output.push_str(&format!("namespace = \"{}\"\n", self.infra.bus.namespace));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "log_level = \"{}\"\n",
            self.infra.telemetry.log_level
        ));

        output.push_str("\n[schedule]\n");
        output.push_str(&format!("every = {}\n", schedule.every));
        output.push_str(&format!("latitude = {}\n", schedule.latitude));
        output.push_str(&format!("longitude = {}\n", schedule.longitude));
        output.push_str(&format!("frame_margin = {}\n", schedule.frame_margin));
        output.push_str(&format!("timezone = \"{}\"\n", schedule.timezone));

        output.push_str("\n[camera]\n");
        output.push_str(&format!("snapshot_url = \"{}\"\n", camera.snapshot_url));
        output.push_str(&format!(
            "fetch_timeout_secs = {}\n",
            camera.fetch_timeout_secs
        ));
        output.push_str(&format!("image_type = \"{}\"\n", camera.image_type));

        output
    }
}
