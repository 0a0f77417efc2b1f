//! Photo store - one file per received frame.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use lapseproto::{Command, CommandKind};
use tracing::{debug, error, warn};

use crate::listener::CommandSink;
use crate::paths::{create_dir, OutputPathResolver};

#[derive(Debug, Clone)]
pub struct PhotoStore {
    paths: OutputPathResolver,
}

impl PhotoStore {
    pub fn new(paths: OutputPathResolver) -> Self {
        Self { paths }
    }

    /// Write an `add_image` frame to disk. Other commands and empty payloads
    /// are ignored and yield `None`.
    pub async fn store(&self, command: &Command) -> Result<Option<PathBuf>> {
        let CommandKind::AddImage { image, image_type } = &command.kind else {
            return Ok(None);
        };
        let camera = &command.camera_id;
        if image.is_empty() {
            warn!(camera = %camera, "record contained no image data");
            return Ok(None);
        }

        let at = command.timestamp.with_timezone(&Local);
        let path = self.paths.photo_path(camera, &at, image_type);
        if let Some(dir) = path.parent() {
            create_dir(dir).await?;
        }
        tokio::fs::write(&path, image)
            .await
            .with_context(|| format!("failed to write photo {}", path.display()))?;

        debug!(camera = %camera, bytes = image.len(), path = %path.display(), "saved photo");
        Ok(Some(path))
    }
}

#[async_trait]
impl CommandSink for PhotoStore {
    fn name(&self) -> &'static str {
        "photo"
    }

    async fn handle(&self, command: &Command) {
        if let Err(e) = self.store(command).await {
            error!(camera = %command.camera_id, error = %e, "photo not saved");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use lapseproto::CameraId;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> PhotoStore {
        PhotoStore::new(OutputPathResolver::new(
            dir.path().join("v"),
            dir.path().join("l"),
            dir.path().join("p"),
        ))
    }

    #[tokio::test]
    async fn test_stores_frame_at_timestamp_path() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let at: DateTime<Utc> = DateTime::from_timestamp(1_718_944_205, 0).unwrap();
        let cam = CameraId::new("porch");

        let path = s
            .store(&Command::add_image(cam.clone(), at, vec![0xffu8, 0xd8, 0xff], "jpg"))
            .await
            .unwrap()
            .unwrap();

        let local = at.with_timezone(&Local);
        let expected = OutputPathResolver::new(
            dir.path().join("v"),
            dir.path().join("l"),
            dir.path().join("p"),
        )
        .photo_path(&cam, &local, "jpg");
        assert_eq!(path, expected);
        assert_eq!(std::fs::read(&path).unwrap(), vec![0xff, 0xd8, 0xff]);
    }

    #[tokio::test]
    async fn test_ignores_start_stop_and_empty() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let cam = CameraId::new("porch");

        assert!(s.store(&Command::start(cam.clone(), Utc::now())).await.unwrap().is_none());
        assert!(s.store(&Command::stop(cam.clone(), Utc::now())).await.unwrap().is_none());
        assert!(s
            .store(&Command::add_image(cam, Utc::now(), Vec::new(), "jpg"))
            .await
            .unwrap()
            .is_none());
        assert!(!dir.path().join("p").exists());
    }
}
