//! Infrastructure configuration - things that cannot change at runtime.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application name used for platform data/config directories.
pub const APP_NAME: &str = "daylight-timelapse";

/// Filesystem locations for videos, encoder logs and photos.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    /// Base data directory. Video, log and photo trees live below it
    /// unless overridden individually.
    /// Default: platform user data dir, e.g. ~/.local/share/daylight-timelapse
    #[serde(default = "PathsConfig::default_data_dir")]
    pub data_dir: PathBuf,

    /// Video output root. Default: `<data_dir>/videos`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_dir: Option<PathBuf>,

    /// Encoder report root. Default: `<data_dir>/logs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Photo output root. Default: `<data_dir>/photos`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_dir: Option<PathBuf>,
}

impl PathsConfig {
    fn default_data_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", APP_NAME)
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".local/share").join(APP_NAME))
    }

    /// Effective video root.
    pub fn videos(&self) -> PathBuf {
        self.video_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("videos"))
    }

    /// Effective encoder log root.
    pub fn logs(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("logs"))
    }

    /// Effective photo root.
    pub fn photos(&self) -> PathBuf {
        self.photo_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("photos"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            video_dir: None,
            log_dir: None,
            photo_dir: None,
        }
    }
}

/// Video encoder invocation.
///
/// The defaults produce 720p H.264 in a fragmented MP4 that stays playable
/// when the encoder dies before finalizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderConfig {
    /// Encoder executable.
    /// Default: /usr/bin/ffmpeg
    #[serde(default = "EncoderConfig::default_program")]
    pub program: PathBuf,

    #[serde(default = "EncoderConfig::default_width")]
    pub width: u32,

    #[serde(default = "EncoderConfig::default_height")]
    pub height: u32,

    /// Target video bitrate (ffmpeg notation).
    /// Default: 2M
    #[serde(default = "EncoderConfig::default_video_bitrate")]
    pub video_bitrate: String,

    #[serde(default = "EncoderConfig::default_codec")]
    pub codec: String,

    #[serde(default = "EncoderConfig::default_preset")]
    pub preset: String,

    #[serde(default = "EncoderConfig::default_crf")]
    pub crf: u8,

    /// Output pixel format. yuv420p is required for DLNA playback on most TVs.
    #[serde(default = "EncoderConfig::default_pixel_format")]
    pub pixel_format: String,

    /// FFREPORT verbosity level.
    /// Default: 32 (info)
    #[serde(default = "EncoderConfig::default_report_level")]
    pub report_level: u8,
}

impl EncoderConfig {
    fn default_program() -> PathBuf {
        PathBuf::from("/usr/bin/ffmpeg")
    }

    fn default_width() -> u32 {
        1280
    }

    fn default_height() -> u32 {
        720
    }

    fn default_video_bitrate() -> String {
        "2M".to_string()
    }

    fn default_codec() -> String {
        "h264".to_string()
    }

    fn default_preset() -> String {
        "slow".to_string()
    }

    fn default_crf() -> u8 {
        25
    }

    fn default_pixel_format() -> String {
        "yuv420p".to_string()
    }

    fn default_report_level() -> u8 {
        32
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: Self::default_program(),
            width: Self::default_width(),
            height: Self::default_height(),
            video_bitrate: Self::default_video_bitrate(),
            codec: Self::default_codec(),
            preset: Self::default_preset(),
            crf: Self::default_crf(),
            pixel_format: Self::default_pixel_format(),
            report_level: Self::default_report_level(),
        }
    }
}

/// Command bus naming.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusConfig {
    /// Prefix for topics and keys: `<namespace>:<camera>:command`.
    /// Default: daily-timelapse
    #[serde(default = "BusConfig::default_namespace")]
    pub namespace: String,
}

impl BusConfig {
    fn default_namespace() -> String {
        "daily-timelapse".to_string()
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            namespace: Self::default_namespace(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    /// Log filter (trace, debug, info, warn, error or an EnvFilter directive).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// Infrastructure configuration - cannot change at runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InfraConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub encoder: EncoderConfig,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_defaults() {
        let paths = PathsConfig::default();
        assert!(paths.data_dir.to_string_lossy().contains(APP_NAME));
        assert_eq!(paths.videos(), paths.data_dir.join("videos"));
        assert_eq!(paths.logs(), paths.data_dir.join("logs"));
        assert_eq!(paths.photos(), paths.data_dir.join("photos"));
    }

    #[test]
    fn test_paths_override_single_root() {
        let paths = PathsConfig {
            video_dir: Some(PathBuf::from("/srv/videos")),
            ..PathsConfig::default()
        };
        assert_eq!(paths.videos(), PathBuf::from("/srv/videos"));
        assert_eq!(paths.logs(), paths.data_dir.join("logs"));
    }

    #[test]
    fn test_encoder_defaults() {
        let encoder = EncoderConfig::default();
        assert_eq!(encoder.program, PathBuf::from("/usr/bin/ffmpeg"));
        assert_eq!((encoder.width, encoder.height), (1280, 720));
        assert_eq!(encoder.crf, 25);
        assert_eq!(encoder.report_level, 32);
    }

    #[test]
    fn test_bus_defaults() {
        assert_eq!(BusConfig::default().namespace, "daily-timelapse");
    }
}
