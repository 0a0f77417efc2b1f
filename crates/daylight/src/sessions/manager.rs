//! Session manager - turns commands into encoder lifecycle.
//!
//! Dispatch takes `&mut self`, so whoever owns a manager serializes every
//! command it runs. The lane router gives each camera its own manager.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Local, Utc};
use lapseproto::{CameraId, Command, CommandKind};
use tracing::{debug, info, warn};

use super::encoder::EncoderLauncher;
use super::registry::{Session, SessionRegistry};
use crate::error::SessionError;
use crate::paths::OutputPathResolver;

/// Whether a camera currently has a live encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
}

/// What a successfully dispatched command did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Started { video_file: PathBuf },
    AlreadyRunning,
    Stopped { frames: u64, bytes: u64 },
    NotRunning,
    FrameWritten { bytes: usize, auto_started: bool },
}

pub struct SessionManager {
    launcher: Arc<dyn EncoderLauncher>,
    paths: OutputPathResolver,
    registry: SessionRegistry,
}

impl SessionManager {
    pub fn new(launcher: Arc<dyn EncoderLauncher>, paths: OutputPathResolver) -> Self {
        Self {
            launcher,
            paths,
            registry: SessionRegistry::new(),
        }
    }

    pub async fn dispatch(&mut self, command: &Command) -> Result<Outcome, SessionError> {
        let camera = &command.camera_id;
        match &command.kind {
            CommandKind::Start => self.start(camera, command.timestamp).await,
            CommandKind::Stop => self.stop(camera).await,
            CommandKind::AddImage { image, .. } => {
                self.add_image(camera, command.timestamp, image).await
            }
        }
    }

    /// Current state, re-probing the process.
    pub fn state(&mut self, camera: &CameraId) -> SessionState {
        if self.live_session(camera).is_some() {
            SessionState::Recording
        } else {
            SessionState::Idle
        }
    }

    /// Video file of the live session, if any.
    pub fn current_video(&mut self, camera: &CameraId) -> Option<PathBuf> {
        self.live_session(camera).map(|s| s.video_file.clone())
    }

    /// Stop every live session.
    pub async fn shutdown(&mut self) {
        for camera in self.registry.occupied() {
            if let Err(e) = self.stop(&camera).await {
                warn!(camera = %camera, error = %e, "stop during shutdown failed");
            }
        }
    }

    /// The registered session, if its process is still alive.
    ///
    /// An entry whose process has died is cleared here.
    fn live_session(&mut self, camera: &CameraId) -> Option<&mut Session> {
        let alive = match self.registry.get_mut(camera) {
            None => return None,
            Some(session) => session.handle.is_alive(),
        };
        if !alive {
            if let Some(dead) = self.registry.take(camera) {
                warn!(
                    camera = %camera,
                    video = %dead.video_file.display(),
                    frames = dead.frames,
                    "encoder died on its own, clearing session"
                );
            }
            return None;
        }
        self.registry.get_mut(camera)
    }

    async fn start(
        &mut self,
        camera: &CameraId,
        at: DateTime<Utc>,
    ) -> Result<Outcome, SessionError> {
        if let Some(session) = self.live_session(camera) {
            info!(
                camera = %camera,
                video = %session.video_file.display(),
                "encoder already running, reusing it"
            );
            return Ok(Outcome::AlreadyRunning);
        }

        let video_file = self.spawn_session(camera, at).await?;
        Ok(Outcome::Started { video_file })
    }

    async fn spawn_session(
        &mut self,
        camera: &CameraId,
        at: DateTime<Utc>,
    ) -> Result<PathBuf, SessionError> {
        let local = at.with_timezone(&Local);
        let paths = self.paths.prepare_session(camera, &local).await?;
        let handle = self.launcher.launch(camera, &paths).await?;

        info!(
            camera = %camera,
            pid = ?handle.id(),
            video = %paths.video_file.display(),
            "recording started"
        );
        let video_file = paths.video_file.clone();
        self.registry
            .set(camera, Some(Session::new(handle, paths.video_file, at)));
        Ok(video_file)
    }

    async fn stop(&mut self, camera: &CameraId) -> Result<Outcome, SessionError> {
        if self.live_session(camera).is_none() {
            info!(camera = %camera, "stop requested but nothing is recording");
            return Ok(Outcome::NotRunning);
        }
        let Some(session) = self.registry.take(camera) else {
            return Ok(Outcome::NotRunning);
        };

        let Session {
            handle,
            video_file,
            started_at,
            frames,
            bytes,
        } = session;
        info!(camera = %camera, video = %video_file.display(), frames, "finishing video");

        // The entry is already cleared, so a failed wait still ends the session
        handle.close_input_and_wait().await?;
        info!(
            camera = %camera,
            video = %video_file.display(),
            started = %started_at.with_timezone(&Local),
            frames,
            bytes,
            "recording stopped"
        );
        Ok(Outcome::Stopped { frames, bytes })
    }

    async fn add_image(
        &mut self,
        camera: &CameraId,
        at: DateTime<Utc>,
        image: &Bytes,
    ) -> Result<Outcome, SessionError> {
        if image.is_empty() {
            return Err(SessionError::EmptyPayload);
        }

        let auto_started = if self.live_session(camera).is_none() {
            info!(camera = %camera, "frame arrived with no encoder, starting one");
            self.spawn_session(camera, at).await?;
            true
        } else {
            false
        };

        let Some(session) = self.registry.get_mut(camera) else {
            return Err(SessionError::Write(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "no session to write to",
            )));
        };
        session.handle.write(image).await?;
        session.frames += 1;
        session.bytes += image.len() as u64;
        debug!(
            camera = %camera,
            bytes = image.len(),
            frames = session.frames,
            "frame written"
        );

        Ok(Outcome::FrameWritten {
            bytes: image.len(),
            auto_started,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::testing::MockLauncher;
    use std::path::Path;
    use tempfile::TempDir;

    fn manager(dir: &Path, launcher: &MockLauncher) -> SessionManager {
        SessionManager::new(
            Arc::new(launcher.clone()),
            OutputPathResolver::new(dir.join("v"), dir.join("l"), dir.join("p")),
        )
    }

    fn cam() -> CameraId {
        CameraId::new("cam")
    }

    #[tokio::test]
    async fn test_start_twice_spawns_once() {
        let dir = TempDir::new().unwrap();
        let launcher = MockLauncher::new();
        let mut m = manager(dir.path(), &launcher);

        let first = m.dispatch(&Command::start(cam(), Utc::now())).await.unwrap();
        assert!(matches!(first, Outcome::Started { .. }));
        let second = m.dispatch(&Command::start(cam(), Utc::now())).await.unwrap();
        assert_eq!(second, Outcome::AlreadyRunning);

        assert_eq!(launcher.launches(), 1);
        assert_eq!(m.state(&cam()), SessionState::Recording);
    }

    #[tokio::test]
    async fn test_stop_without_session_is_noop() {
        let dir = TempDir::new().unwrap();
        let launcher = MockLauncher::new();
        let mut m = manager(dir.path(), &launcher);

        let outcome = m.dispatch(&Command::stop(cam(), Utc::now())).await.unwrap();
        assert_eq!(outcome, Outcome::NotRunning);
        assert_eq!(launcher.launches(), 0);
    }

    #[tokio::test]
    async fn test_add_image_auto_starts() {
        let dir = TempDir::new().unwrap();
        let launcher = MockLauncher::new();
        let mut m = manager(dir.path(), &launcher);

        let outcome = m
            .dispatch(&Command::add_image(cam(), Utc::now(), vec![9u8; 10], "jpg"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::FrameWritten {
                bytes: 10,
                auto_started: true
            }
        );
        assert_eq!(launcher.launches(), 1);
        assert_eq!(launcher.writes(0), vec![10]);

        let stopped = m.dispatch(&Command::stop(cam(), Utc::now())).await.unwrap();
        assert_eq!(stopped, Outcome::Stopped { frames: 1, bytes: 10 });
        assert!(launcher.closed(0));
        assert_eq!(m.state(&cam()), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_empty_payload_is_rejected_without_spawn() {
        let dir = TempDir::new().unwrap();
        let launcher = MockLauncher::new();
        let mut m = manager(dir.path(), &launcher);

        let err = m
            .dispatch(&Command::add_image(cam(), Utc::now(), Vec::new(), "jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::EmptyPayload));
        assert_eq!(launcher.launches(), 0);
    }

    #[tokio::test]
    async fn test_dead_process_is_replaced() {
        let dir = TempDir::new().unwrap();
        let launcher = MockLauncher::new();
        let mut m = manager(dir.path(), &launcher);

        m.dispatch(&Command::start(cam(), Utc::now())).await.unwrap();
        launcher.kill(0);

        // Stop finds nothing alive
        let stopped = m.dispatch(&Command::stop(cam(), Utc::now())).await.unwrap();
        assert_eq!(stopped, Outcome::NotRunning);
        assert!(!launcher.closed(0));

        // Next frame goes to a fresh process, never the dead one
        m.dispatch(&Command::add_image(cam(), Utc::now(), vec![1u8; 5], "jpg"))
            .await
            .unwrap();
        assert_eq!(launcher.launches(), 2);
        assert!(launcher.writes(0).is_empty());
        assert_eq!(launcher.writes(1), vec![5]);
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_camera_idle() {
        let dir = TempDir::new().unwrap();
        let launcher = MockLauncher::failing();
        let mut m = manager(dir.path(), &launcher);

        let err = m
            .dispatch(&Command::start(cam(), Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Spawn { .. }));
        assert_eq!(m.state(&cam()), SessionState::Idle);

        let err = m
            .dispatch(&Command::add_image(cam(), Utc::now(), vec![1u8], "jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_write_failure_drops_frame_only() {
        let dir = TempDir::new().unwrap();
        let launcher = MockLauncher::new();
        let mut m = manager(dir.path(), &launcher);

        m.dispatch(&Command::start(cam(), Utc::now())).await.unwrap();
        launcher.fail_writes(0);

        let err = m
            .dispatch(&Command::add_image(cam(), Utc::now(), vec![1u8; 3], "jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Write(_)));

        // Session is left in place for the next decision point
        assert_eq!(m.state(&cam()), SessionState::Recording);
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test]
    async fn test_wait_failure_still_clears_session() {
        let dir = TempDir::new().unwrap();
        let launcher = MockLauncher::new();
        let mut m = manager(dir.path(), &launcher);

        m.dispatch(&Command::start(cam(), Utc::now())).await.unwrap();
        launcher.fail_close(0);

        let err = m
            .dispatch(&Command::stop(cam(), Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Wait(_)));
        assert_eq!(m.state(&cam()), SessionState::Idle);

        m.dispatch(&Command::start(cam(), Utc::now())).await.unwrap();
        assert_eq!(launcher.launches(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_stops_live_sessions() {
        let dir = TempDir::new().unwrap();
        let launcher = MockLauncher::new();
        let mut m = manager(dir.path(), &launcher);

        m.dispatch(&Command::start(CameraId::new("a"), Utc::now()))
            .await
            .unwrap();
        m.dispatch(&Command::start(CameraId::new("b"), Utc::now()))
            .await
            .unwrap();
        m.shutdown().await;

        assert!(launcher.closed(0));
        assert!(launcher.closed(1));
        assert_eq!(m.state(&CameraId::new("a")), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_video_path_comes_from_start_timestamp() {
        let dir = TempDir::new().unwrap();
        let launcher = MockLauncher::new();
        let mut m = manager(dir.path(), &launcher);
        let t0 = DateTime::from_timestamp(1_718_944_205, 0).unwrap();

        let outcome = m.dispatch(&Command::start(cam(), t0)).await.unwrap();
        let expected = OutputPathResolver::new(
            dir.path().join("v"),
            dir.path().join("l"),
            dir.path().join("p"),
        )
        .session_paths(&cam(), &t0.with_timezone(&Local))
        .video_file;
        assert_eq!(outcome, Outcome::Started { video_file: expected.clone() });
        assert_eq!(m.current_video(&cam()), Some(expected.clone()));
        assert_eq!(launcher.video_file(0), expected);
    }
}
