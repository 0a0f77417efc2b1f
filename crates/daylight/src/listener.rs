//! Command bus adapter.
//!
//! Decodes deliveries from a command subscription and hands valid commands to
//! one or more sinks. Anything that does not decode is logged and skipped.

use std::sync::Arc;

use async_trait::async_trait;
use lapseproto::{Command, Subscription};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::sessions::LaneRouter;

/// Something that consumes decoded commands.
#[async_trait]
pub trait CommandSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, command: &Command);
}

#[async_trait]
impl CommandSink for LaneRouter {
    fn name(&self) -> &'static str {
        "video"
    }

    async fn handle(&self, command: &Command) {
        // Lanes log their own failures
        if let Err(e) = self.submit(command.clone()) {
            warn!(camera = %command.camera_id, error = %e, "could not queue command");
        }
    }
}

/// Counts from one listener run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ListenerStats {
    pub dispatched: u64,
    pub rejected: u64,
}

pub struct CommandListener {
    sinks: Vec<Arc<dyn CommandSink>>,
}

impl CommandListener {
    pub fn new(sinks: Vec<Arc<dyn CommandSink>>) -> Self {
        Self { sinks }
    }

    /// Process deliveries until the subscription ends or `cancel` fires.
    ///
    /// On cancellation, deliveries already queued are still processed so a
    /// final `stop` is not lost.
    pub async fn run(
        &self,
        mut subscription: Subscription,
        cancel: CancellationToken,
    ) -> ListenerStats {
        let topic = subscription.topic().to_string();
        let sinks: Vec<_> = self.sinks.iter().map(|s| s.name()).collect();
        info!(topic = %topic, ?sinks, "listening for commands");

        let mut stats = ListenerStats::default();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    while let Some(raw) = subscription.try_recv() {
                        self.deliver(&topic, &raw, &mut stats).await;
                    }
                    debug!(topic = %topic, "listener cancelled");
                    break;
                }
                next = subscription.recv() => match next {
                    Some(raw) => self.deliver(&topic, &raw, &mut stats).await,
                    None => {
                        debug!(topic = %topic, "subscription closed");
                        break;
                    }
                }
            }
        }

        info!(
            topic = %topic,
            dispatched = stats.dispatched,
            rejected = stats.rejected,
            "listener stopped"
        );
        stats
    }

    async fn deliver(&self, topic: &str, raw: &[u8], stats: &mut ListenerStats) {
        let command = match Command::decode(raw) {
            Ok(command) => command,
            Err(e) => {
                warn!(topic, error = %e, bytes = raw.len(), "ignoring undecodable command");
                stats.rejected += 1;
                return;
            }
        };

        debug!(
            camera = %command.camera_id,
            command = command.kind.tag(),
            "command received"
        );
        for sink in &self.sinks {
            sink.handle(&command).await;
        }
        stats.dispatched += 1;
    }
}
