//! Per-camera execution lanes.
//!
//! Each camera gets one tokio task that owns its own [`SessionManager`] and
//! drains an unbounded queue in arrival order. Lanes are created on a camera's
//! first command and live until [`LaneRouter::shutdown`].
//!
//! ```text
//! submit/execute ──▶ lane[cam-a] ──▶ SessionManager ──▶ encoder a
//!                └─▶ lane[cam-b] ──▶ SessionManager ──▶ encoder b
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use lapseproto::{CameraId, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::encoder::EncoderLauncher;
use super::manager::{Outcome, SessionManager, SessionState};
use crate::error::SessionError;
use crate::paths::OutputPathResolver;

type Reply = oneshot::Sender<Result<Outcome, SessionError>>;

struct Envelope {
    command: Command,
    reply: Option<Reply>,
}

struct Lane {
    tx: mpsc::UnboundedSender<Envelope>,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

/// Routes commands to per-camera lanes.
pub struct LaneRouter {
    launcher: Arc<dyn EncoderLauncher>,
    paths: OutputPathResolver,
    lanes: DashMap<CameraId, Lane>,
    closed: AtomicBool,
}

impl LaneRouter {
    pub fn new(launcher: Arc<dyn EncoderLauncher>, paths: OutputPathResolver) -> Self {
        Self {
            launcher,
            paths,
            lanes: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Queue a command without waiting for it. Failures are logged by the lane.
    pub fn submit(&self, command: Command) -> Result<(), SessionError> {
        self.enqueue(Envelope {
            command,
            reply: None,
        })
    }

    /// Queue a command and wait for its outcome.
    pub async fn execute(&self, command: Command) -> Result<Outcome, SessionError> {
        let camera = command.camera_id.clone();
        let (tx, rx) = oneshot::channel();
        self.enqueue(Envelope {
            command,
            reply: Some(tx),
        })?;
        rx.await.map_err(|_| SessionError::LaneClosed(camera))?
    }

    /// State updates for a camera's lane, if it exists.
    pub fn status(&self, camera: &CameraId) -> Option<watch::Receiver<SessionState>> {
        self.lanes.get(camera).map(|lane| lane.state.clone())
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Close every lane, let each finish its queue and stop its encoder, then join.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let cameras: Vec<CameraId> = self.lanes.iter().map(|e| e.key().clone()).collect();
        let mut tasks = Vec::with_capacity(cameras.len());
        for camera in cameras {
            if let Some((camera, lane)) = self.lanes.remove(&camera) {
                drop(lane.tx);
                tasks.push((camera, lane.task));
            }
        }

        let results = join_all(tasks.into_iter().map(|(camera, task)| async move {
            (camera, task.await)
        }))
        .await;
        for (camera, result) in results {
            if let Err(e) = result {
                error!(camera = %camera, error = %e, "lane task failed");
            }
        }
        info!("all lanes shut down");
    }

    fn enqueue(&self, envelope: Envelope) -> Result<(), SessionError> {
        let camera = envelope.command.camera_id.clone();

        // Checked while holding the shard lock: shutdown either sees the new
        // lane or this sees `closed`
        let entry = self.lanes.entry(camera.clone());
        if self.closed.load(Ordering::SeqCst) {
            drop(entry);
            warn!(
                camera = %camera,
                command = envelope.command.kind.tag(),
                "router is shut down, dropping command"
            );
            return Err(SessionError::LaneClosed(camera));
        }

        let lane = entry.or_insert_with(|| self.spawn_lane(&camera));
        lane.tx
            .send(envelope)
            .map_err(|_| SessionError::LaneClosed(camera))
    }

    fn spawn_lane(&self, camera: &CameraId) -> Lane {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let manager = SessionManager::new(self.launcher.clone(), self.paths.clone());
        let task = tokio::spawn(run_lane(camera.clone(), manager, rx, state_tx));
        debug!(camera = %camera, "lane created");
        Lane {
            tx,
            state: state_rx,
            task,
        }
    }
}

async fn run_lane(
    camera: CameraId,
    mut manager: SessionManager,
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    state: watch::Sender<SessionState>,
) {
    while let Some(Envelope { command, reply }) = rx.recv().await {
        let result = manager.dispatch(&command).await;
        if let Err(e) = &result {
            log_failure(&camera, command.kind.tag(), e);
        }
        state.send_replace(manager.state(&camera));
        if let Some(reply) = reply {
            // The caller may have given up waiting
            let _ = reply.send(result);
        }
    }

    manager.shutdown().await;
    state.send_replace(SessionState::Idle);
    debug!(camera = %camera, "lane finished");
}

fn log_failure(camera: &CameraId, command: &str, e: &SessionError) {
    match e {
        SessionError::Spawn { .. } | SessionError::Paths { .. } => {
            error!(camera = %camera, command, error = %e, "command failed, camera stays idle")
        }
        SessionError::Write(_) => {
            warn!(camera = %camera, command, error = %e, "frame dropped")
        }
        SessionError::Wait(_) => {
            warn!(camera = %camera, command, error = %e, "session torn down after unclean exit")
        }
        SessionError::EmptyPayload => {
            warn!(camera = %camera, command, "ignoring frame with empty payload")
        }
        SessionError::LaneClosed(_) => {
            warn!(camera = %camera, command, error = %e, "command dropped")
        }
    }
}
