//! Bootstrap configuration - seeds the scheduler and fetcher, CLI flags may override.

use serde::{Deserialize, Serialize};

/// Where and how often to shoot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleConfig {
    /// Fetch interval in seconds.
    /// Default: 30
    #[serde(default = "ScheduleConfig::default_every")]
    pub every: u64,

    /// Latitude for sunrise/sunset.
    /// Default: 52.52437 (Berlin)
    #[serde(default = "ScheduleConfig::default_latitude")]
    pub latitude: f64,

    /// Longitude for sunrise/sunset.
    /// Default: 13.41053 (Berlin)
    #[serde(default = "ScheduleConfig::default_longitude")]
    pub longitude: f64,

    /// Extra frames taken before sunrise and after sunset, in units of `every`.
    /// Default: 120 (one hour at the default interval)
    #[serde(default = "ScheduleConfig::default_frame_margin")]
    pub frame_margin: u32,

    /// IANA time zone that decides which calendar day "today" is.
    /// Default: Europe/Berlin
    #[serde(default = "ScheduleConfig::default_timezone")]
    pub timezone: String,
}

impl ScheduleConfig {
    fn default_every() -> u64 {
        30
    }

    fn default_latitude() -> f64 {
        52.52437
    }

    fn default_longitude() -> f64 {
        13.41053
    }

    fn default_frame_margin() -> u32 {
        120
    }

    fn default_timezone() -> String {
        "Europe/Berlin".to_string()
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            every: Self::default_every(),
            latitude: Self::default_latitude(),
            longitude: Self::default_longitude(),
            frame_margin: Self::default_frame_margin(),
            timezone: Self::default_timezone(),
        }
    }
}

/// Snapshot source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraConfig {
    /// Snapshot URL; `{camera}` is replaced with the camera name.
    /// Default: http://{camera}:8080/snapshot
    #[serde(default = "CameraConfig::default_snapshot_url")]
    pub snapshot_url: String,

    /// HTTP timeout per snapshot, in seconds.
    /// Default: 10
    #[serde(default = "CameraConfig::default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Image type tag attached to fetched frames.
    /// Default: jpg
    #[serde(default = "CameraConfig::default_image_type")]
    pub image_type: String,
}

impl CameraConfig {
    fn default_snapshot_url() -> String {
        "http://{camera}:8080/snapshot".to_string()
    }

    fn default_fetch_timeout_secs() -> u64 {
        10
    }

    fn default_image_type() -> String {
        "jpg".to_string()
    }

    /// Resolve the snapshot URL for a camera.
    pub fn snapshot_url_for(&self, camera: &str) -> String {
        self.snapshot_url.replace("{camera}", camera)
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            snapshot_url: Self::default_snapshot_url(),
            fetch_timeout_secs: Self::default_fetch_timeout_secs(),
            image_type: Self::default_image_type(),
        }
    }
}

/// Bootstrap configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub camera: CameraConfig,
}
