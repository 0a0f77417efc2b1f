//! Output path resolution.
//!
//! Everything is partitioned by year and calendar day:
//!
//! ```text
//! <videos>/<YYYY>/<YYYYMMDD>/<camera>-<YYYYMMDD-HHMMSS>.mp4
//! <logs>/<YYYY>/<YYYYMMDD>/%p-%t.log
//! <photos>/<YYYY>/<YYYYMMDD>/<camera>/<camera>-<YYYYMMDD-HHMMSS>.<ext>
//! ```
//!
//! Path derivation is pure; directory creation is a separate, idempotent step.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use lapseconf::PathsConfig;
use lapseproto::CameraId;
use tracing::debug;

use crate::error::SessionError;

/// Encoder report file name template (`%p` pid, `%t` start time).
pub const LOG_TEMPLATE: &str = "%p-%t.log";

/// Paths for one encoder session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub video_dir: PathBuf,
    pub log_dir: PathBuf,
    pub video_file: PathBuf,
    /// Full path template handed to the encoder's report facility.
    pub log_template: PathBuf,
}

/// Base directories for all outputs.
#[derive(Debug, Clone)]
pub struct OutputPathResolver {
    video_root: PathBuf,
    log_root: PathBuf,
    photo_root: PathBuf,
}

fn day_partition<Tz>(root: &Path, at: &DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    root.join(at.format("%Y").to_string())
        .join(at.format("%Y%m%d").to_string())
}

fn stamp<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    at.format("%Y%m%d-%H%M%S").to_string()
}

impl OutputPathResolver {
    pub fn new(
        video_root: impl Into<PathBuf>,
        log_root: impl Into<PathBuf>,
        photo_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            video_root: video_root.into(),
            log_root: log_root.into(),
            photo_root: photo_root.into(),
        }
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new(paths.videos(), paths.logs(), paths.photos())
    }

    pub fn video_root(&self) -> &Path {
        &self.video_root
    }

    pub fn log_root(&self) -> &Path {
        &self.log_root
    }

    pub fn photo_root(&self) -> &Path {
        &self.photo_root
    }

    /// Derive session paths without touching the filesystem.
    pub fn session_paths<Tz>(&self, camera: &CameraId, at: &DateTime<Tz>) -> SessionPaths
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let video_dir = day_partition(&self.video_root, at);
        let log_dir = day_partition(&self.log_root, at);
        let video_file = video_dir.join(format!("{}-{}.mp4", camera, stamp(at)));
        let log_template = log_dir.join(LOG_TEMPLATE);
        SessionPaths {
            video_dir,
            log_dir,
            video_file,
            log_template,
        }
    }

    /// Derive session paths and make sure both directories exist.
    pub async fn prepare_session<Tz>(
        &self,
        camera: &CameraId,
        at: &DateTime<Tz>,
    ) -> Result<SessionPaths, SessionError>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let paths = self.session_paths(camera, at);
        create_dir(&paths.video_dir).await?;
        create_dir(&paths.log_dir).await?;
        Ok(paths)
    }

    /// Derive the photo path for a frame.
    pub fn photo_path<Tz>(&self, camera: &CameraId, at: &DateTime<Tz>, ext: &str) -> PathBuf
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        day_partition(&self.photo_root, at)
            .join(camera.as_str())
            .join(format!("{}-{}.{}", camera, stamp(at), ext))
    }

    /// Create and probe the base directories needed for the given outputs.
    ///
    /// Called once at startup; an unwritable root is fatal there.
    pub fn prepare(&self, video: bool, photo: bool) -> Result<(), SessionError> {
        let mut roots = Vec::new();
        if video {
            roots.push(&self.video_root);
            roots.push(&self.log_root);
        }
        if photo {
            roots.push(&self.photo_root);
        }

        for root in roots {
            std::fs::create_dir_all(root).map_err(|e| SessionError::Paths {
                path: root.clone(),
                source: e,
            })?;
            let probe = root.join(".write-probe");
            std::fs::write(&probe, b"")
                .and_then(|_| std::fs::remove_file(&probe))
                .map_err(|e| SessionError::Paths {
                    path: root.clone(),
                    source: e,
                })?;
            debug!(root = %root.display(), "output directory ready");
        }
        Ok(())
    }
}

/// Idempotent `mkdir -p`.
pub async fn create_dir(path: &Path) -> Result<(), SessionError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| SessionError::Paths {
            path: path.to_path_buf(),
            source: e,
        })
}
