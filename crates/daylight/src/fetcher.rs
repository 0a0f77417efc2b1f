//! Snapshot fetcher - pulls a still from the camera every tick while running.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use lapseconf::CameraConfig;
use lapseproto::{CameraId, CameraState, Command, CommandBus};
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct SnapshotFetcher {
    bus: CommandBus,
    camera: CameraId,
    url: String,
    image_type: String,
    every: Duration,
    client: reqwest::Client,
}

impl SnapshotFetcher {
    pub fn new(
        bus: CommandBus,
        camera: CameraId,
        config: &CameraConfig,
        every: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            // Cameras live on the local network
            .no_proxy()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            url: config.snapshot_url_for(camera.as_str()),
            image_type: config.image_type.clone(),
            bus,
            camera,
            every,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One tick. Returns the published frame size, or `None` when not running.
    pub async fn fetch_once(&self) -> Result<Option<usize>> {
        let state = self
            .bus
            .get_state(&self.camera)
            .await
            .context("failed to read capture state")?;
        if state.map(|s| s.state) != Some(CameraState::Running) {
            debug!(camera = %self.camera, "not running, skipping fetch");
            return Ok(None);
        }

        debug!(camera = %self.camera, url = %self.url, "fetching snapshot");
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.url))?;
        let status = response.status();
        if status != StatusCode::OK {
            bail!("snapshot request returned {}", status);
        }
        let image = response
            .bytes()
            .await
            .context("failed to read snapshot body")?;
        let size = image.len();

        self.bus
            .publish_command(&Command::add_image(
                self.camera.clone(),
                Utc::now(),
                image,
                self.image_type.clone(),
            ))
            .await
            .context("failed to publish frame")?;
        debug!(camera = %self.camera, bytes = size, "frame published");
        Ok(Some(size))
    }

    /// Fetch every `every` until cancelled. Failed ticks are logged and skipped.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            camera = %self.camera,
            url = %self.url,
            every_secs = self.every.as_secs(),
            "fetcher started"
        );
        let mut ticker = tokio::time::interval(self.every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(camera = %self.camera, "fetcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.fetch_once().await {
                        warn!(camera = %self.camera, error = %e, "unable to fetch image");
                    }
                }
            }
        }
    }
}
