//! Recording launcher for session tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lapseproto::CameraId;
use tokio::sync::Notify;

use super::encoder::{EncoderHandle, EncoderLauncher};
use crate::error::SessionError;
use crate::paths::SessionPaths;

#[derive(Default)]
struct Record {
    camera: String,
    video_file: PathBuf,
    writes: Mutex<Vec<usize>>,
    alive: AtomicBool,
    closed: AtomicBool,
    fail_writes: AtomicBool,
    fail_close: AtomicBool,
}

#[derive(Default)]
struct Shared {
    records: Mutex<Vec<Arc<Record>>>,
    fail_spawn: bool,
    /// Launches for this camera park until `release` is called.
    block_camera: Option<String>,
    gate: Notify,
}

#[derive(Clone, Default)]
pub struct MockLauncher {
    shared: Arc<Shared>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            shared: Arc::new(Shared {
                fail_spawn: true,
                ..Shared::default()
            }),
        }
    }

    pub fn blocking(camera: &str) -> Self {
        Self {
            shared: Arc::new(Shared {
                block_camera: Some(camera.to_string()),
                ..Shared::default()
            }),
        }
    }

    pub fn release(&self) {
        self.shared.gate.notify_waiters();
        self.shared.gate.notify_one();
    }

    fn record(&self, index: usize) -> Arc<Record> {
        self.shared.records.lock().unwrap()[index].clone()
    }

    pub fn launches(&self) -> usize {
        self.shared.records.lock().unwrap().len()
    }

    pub fn launched_cameras(&self) -> Vec<String> {
        self.shared
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.camera.clone())
            .collect()
    }

    pub fn writes(&self, index: usize) -> Vec<usize> {
        self.record(index).writes.lock().unwrap().clone()
    }

    pub fn closed(&self, index: usize) -> bool {
        self.record(index).closed.load(Ordering::SeqCst)
    }

    pub fn video_file(&self, index: usize) -> PathBuf {
        self.record(index).video_file.clone()
    }

    /// Make the process look like it exited on its own.
    pub fn kill(&self, index: usize) {
        self.record(index).alive.store(false, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, index: usize) {
        self.record(index).fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn fail_close(&self, index: usize) {
        self.record(index).fail_close.store(true, Ordering::SeqCst);
    }
}

struct MockHandle {
    record: Arc<Record>,
}

#[async_trait]
impl EncoderHandle for MockHandle {
    fn id(&self) -> Option<u32> {
        None
    }

    fn is_alive(&mut self) -> bool {
        self.record.alive.load(Ordering::SeqCst)
    }

    async fn write(&mut self, frame: &[u8]) -> Result<(), SessionError> {
        if !self.record.alive.load(Ordering::SeqCst)
            || self.record.fail_writes.load(Ordering::SeqCst)
        {
            return Err(SessionError::Write(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock pipe closed",
            )));
        }
        self.record.writes.lock().unwrap().push(frame.len());
        Ok(())
    }

    async fn close_input_and_wait(self: Box<Self>) -> Result<(), SessionError> {
        self.record.closed.store(true, Ordering::SeqCst);
        self.record.alive.store(false, Ordering::SeqCst);
        if self.record.fail_close.load(Ordering::SeqCst) {
            return Err(SessionError::Wait("exit status: 1".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EncoderLauncher for MockLauncher {
    async fn launch(
        &self,
        camera: &CameraId,
        paths: &SessionPaths,
    ) -> Result<Box<dyn EncoderHandle>, SessionError> {
        if self.shared.block_camera.as_deref() == Some(camera.as_str()) {
            self.shared.gate.notified().await;
        }
        if self.shared.fail_spawn {
            return Err(SessionError::Spawn {
                program: PathBuf::from("/mock/encoder"),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock"),
            });
        }

        let record = Arc::new(Record {
            camera: camera.to_string(),
            video_file: paths.video_file.clone(),
            alive: AtomicBool::new(true),
            ..Record::default()
        });
        self.shared.records.lock().unwrap().push(record.clone());
        Ok(Box::new(MockHandle { record }))
    }
}
