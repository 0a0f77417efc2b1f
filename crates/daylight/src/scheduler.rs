//! Scheduler - publishes start and stop around the capture window.
//!
//! ```text
//! initialize: state = idle
//! start_at:   sleep until window.start, publish start, state = running
//! stop_at:    sleep until window.stop,  publish stop,  state = idle, cancel app
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use lapseproto::{CameraId, CameraState, Command, CommandBus};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::sun::CaptureWindow;

#[derive(Clone)]
pub struct Scheduler {
    bus: CommandBus,
    camera: CameraId,
    window: CaptureWindow,
    tz: Tz,
}

/// Time left until `at`, zero if it has passed.
fn until(at: DateTime<Utc>) -> Duration {
    (at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

/// Sleep until `at`. Returns false if cancelled first.
async fn sleep_until(at: DateTime<Utc>, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(until(at)) => true,
    }
}

impl Scheduler {
    pub fn new(bus: CommandBus, camera: CameraId, window: CaptureWindow) -> Self {
        Self {
            bus,
            camera,
            window,
            tz: Tz::UTC,
        }
    }

    /// Zone used when logging the schedule. Defaults to UTC.
    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.tz = tz;
        self
    }

    pub fn window(&self) -> &CaptureWindow {
        &self.window
    }

    pub async fn initialize(&self) -> Result<()> {
        info!(camera = %self.camera, "initializing capture state");
        self.bus
            .set_state(&self.camera, CameraState::Idle)
            .await
            .context("failed to set initial state")
    }

    /// Wait for the window to open, then start recording.
    ///
    /// Returns false if cancelled before the start was published.
    pub async fn start_at(&self, cancel: &CancellationToken) -> Result<bool> {
        let start = self.window.start;
        info!(
            camera = %self.camera,
            at = %start.with_timezone(&self.tz),
            wait_secs = until(start).as_secs(),
            "start scheduled"
        );
        if !sleep_until(start, cancel).await {
            return Ok(false);
        }

        info!(camera = %self.camera, "starting capture");
        self.bus
            .publish_command(&Command::start(self.camera.clone(), Utc::now()))
            .await
            .context("failed to publish start")?;
        self.bus
            .set_state(&self.camera, CameraState::Running)
            .await
            .context("failed to set running state")?;
        Ok(true)
    }

    /// Wait for the window to close, stop recording and request shutdown.
    ///
    /// Never publishes before `started` resolves, so a stop can not overtake
    /// its start when both deadlines have already passed.
    pub async fn stop_at(
        &self,
        started: oneshot::Receiver<()>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let stop = self.window.stop;
        info!(
            camera = %self.camera,
            at = %stop.with_timezone(&self.tz),
            wait_secs = until(stop).as_secs(),
            "stop scheduled"
        );
        if !sleep_until(stop, cancel).await {
            return Ok(false);
        }
        tokio::select! {
            _ = cancel.cancelled() => return Ok(false),
            _ = started => {}
        }

        info!(camera = %self.camera, "stopping capture");
        self.bus
            .publish_command(&Command::stop(self.camera.clone(), Utc::now()))
            .await
            .context("failed to publish stop")?;
        self.bus
            .set_state(&self.camera, CameraState::Idle)
            .await
            .context("failed to set idle state")?;

        info!(camera = %self.camera, "capture window closed, requesting shutdown");
        cancel.cancel();
        Ok(true)
    }

    /// Initialize, then run start and stop as independent tasks.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        self.initialize().await?;

        let (started_tx, started_rx) = oneshot::channel();

        let starter = {
            let this = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let result = this.start_at(&cancel).await;
                // Dropping the sender also releases stop_at, so a failed start
                // never pins the stop forever
                if matches!(result, Ok(true)) {
                    let _ = started_tx.send(());
                }
                result
            })
        };
        let stopper = {
            let this = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { this.stop_at(started_rx, &cancel).await })
        };

        let (start, stop) = tokio::join!(starter, stopper);
        let start = start.context("start task panicked")?;
        let stop = stop.context("stop task panicked")?;
        if let Err(e) = &start {
            warn!(camera = %self.camera, error = %e, "start failed");
        }
        start?;
        stop?;
        Ok(())
    }
}
