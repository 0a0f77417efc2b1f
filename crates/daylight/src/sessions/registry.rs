//! Session registry - who is recording.
//!
//! A passive map from camera to at most one session. It does no locking and
//! no liveness checks; the manager that owns it does both.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use lapseproto::CameraId;

use super::encoder::EncoderHandle;

/// A running encoder and what it is writing.
pub struct Session {
    pub handle: Box<dyn EncoderHandle>,
    pub video_file: PathBuf,
    pub started_at: DateTime<Utc>,
    pub frames: u64,
    pub bytes: u64,
}

impl Session {
    pub fn new(
        handle: Box<dyn EncoderHandle>,
        video_file: PathBuf,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            handle,
            video_file,
            started_at,
            frames: 0,
            bytes: 0,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("pid", &self.handle.id())
            .field("video_file", &self.video_file)
            .field("started_at", &self.started_at)
            .field("frames", &self.frames)
            .field("bytes", &self.bytes)
            .finish()
    }
}

/// Camera to session map. Clearing an entry keeps its key.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: HashMap<CameraId, Option<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, camera: &CameraId) -> Option<&Session> {
        self.entries.get(camera).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, camera: &CameraId) -> Option<&mut Session> {
        self.entries.get_mut(camera).and_then(Option::as_mut)
    }

    /// Install or clear the session for a camera.
    pub fn set(&mut self, camera: &CameraId, session: Option<Session>) {
        self.entries.insert(camera.clone(), session);
    }

    /// Remove and return the session, leaving the entry cleared.
    pub fn take(&mut self, camera: &CameraId) -> Option<Session> {
        self.entries.get_mut(camera).and_then(Option::take)
    }

    /// Cameras that have ever had an entry.
    pub fn known_cameras(&self) -> impl Iterator<Item = &CameraId> {
        self.entries.keys()
    }

    /// Cameras that currently hold a session (alive or not).
    pub fn occupied(&self) -> Vec<CameraId> {
        self.entries
            .iter()
            .filter(|(_, s)| s.is_some())
            .map(|(c, _)| c.clone())
            .collect()
    }
}
