//! Typed helpers over any [`Messenger`].

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;

use crate::messenger::{Messenger, Subscription};
use crate::record::{CameraState, StateRecord};
use crate::topics::{command_topic, state_key};
use crate::{CameraId, Command, ProtoError};

/// Command and state access for one namespace.
#[derive(Clone)]
pub struct CommandBus {
    messenger: Arc<dyn Messenger>,
    namespace: String,
}

impl CommandBus {
    pub fn new(messenger: Arc<dyn Messenger>, namespace: impl Into<String>) -> Self {
        Self {
            messenger,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Publish a command on its camera's topic.
    pub async fn publish_command(&self, command: &Command) -> Result<(), ProtoError> {
        let topic = command_topic(&self.namespace, &command.camera_id);
        let payload = command.encode()?;
        self.messenger.publish(&topic, Bytes::from(payload)).await
    }

    /// Raw deliveries for a camera's command topic. Decode with [`Command::decode`].
    pub async fn subscribe_commands(&self, camera: &CameraId) -> Result<Subscription, ProtoError> {
        self.messenger
            .subscribe(&command_topic(&self.namespace, camera))
            .await
    }

    /// Record the capture state for a camera, stamped with the current time.
    pub async fn set_state(&self, camera: &CameraId, state: CameraState) -> Result<(), ProtoError> {
        let record = StateRecord::new(camera.as_str(), state, Utc::now());
        self.messenger
            .set(&state_key(&self.namespace, camera), Bytes::from(record.encode()?))
            .await
    }

    pub async fn get_state(&self, camera: &CameraId) -> Result<Option<StateRecord>, ProtoError> {
        match self.messenger.get(&state_key(&self.namespace, camera)).await? {
            Some(raw) => Ok(Some(StateRecord::decode(&raw)?)),
            None => Ok(None),
        }
    }
}
