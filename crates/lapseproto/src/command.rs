//! Typed commands.
//!
//! A [`CommandRecord`] is only trusted after conversion into a [`Command`]:
//! unknown tags and `add_image` records without image data are rejected as
//! [`ProtoError::MalformedCommand`]. An empty but present payload converts
//! fine; consumers decide what to do with it.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{from_unix_seconds, to_unix_seconds, CommandRecord};
use crate::ProtoError;

/// Image type assumed when an `add_image` record carries none.
pub const DEFAULT_IMAGE_TYPE: &str = "jpg";

/// Camera identifier. Also the serialization key for session commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CameraId(pub String);

impl CameraId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CameraId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CameraId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// What a command asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    Start,
    Stop,
    AddImage { image: Bytes, image_type: String },
}

impl CommandKind {
    /// Wire tag.
    pub fn tag(&self) -> &'static str {
        match self {
            CommandKind::Start => "start",
            CommandKind::Stop => "stop",
            CommandKind::AddImage { .. } => "add_image",
        }
    }
}

/// One dispatched unit of work for a camera.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub camera_id: CameraId,
    /// When the command was issued. Diagnostic only.
    pub timestamp: DateTime<Utc>,
    pub kind: CommandKind,
}

impl Command {
    pub fn start(camera_id: CameraId, timestamp: DateTime<Utc>) -> Self {
        Self {
            camera_id,
            timestamp,
            kind: CommandKind::Start,
        }
    }

    pub fn stop(camera_id: CameraId, timestamp: DateTime<Utc>) -> Self {
        Self {
            camera_id,
            timestamp,
            kind: CommandKind::Stop,
        }
    }

    pub fn add_image(
        camera_id: CameraId,
        timestamp: DateTime<Utc>,
        image: impl Into<Bytes>,
        image_type: impl Into<String>,
    ) -> Self {
        Self {
            camera_id,
            timestamp,
            kind: CommandKind::AddImage {
                image: image.into(),
                image_type: image_type.into(),
            },
        }
    }

    /// Decode and validate a MsgPack delivery.
    pub fn decode(data: &[u8]) -> Result<Self, ProtoError> {
        Self::try_from(CommandRecord::decode(data)?)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtoError> {
        self.to_record().encode()
    }

    pub fn to_record(&self) -> CommandRecord {
        let (image_data, image_type) = match &self.kind {
            CommandKind::AddImage { image, image_type } => {
                (Some(image.to_vec()), Some(image_type.clone()))
            }
            _ => (None, None),
        };
        CommandRecord {
            ts: to_unix_seconds(self.timestamp),
            camera_name: self.camera_id.0.clone(),
            command: self.kind.tag().to_string(),
            image_data,
            image_type,
        }
    }
}

impl TryFrom<CommandRecord> for Command {
    type Error = ProtoError;

    fn try_from(record: CommandRecord) -> Result<Self, Self::Error> {
        if record.camera_name.is_empty() {
            return Err(ProtoError::MalformedCommand(
                "empty camera_name".to_string(),
            ));
        }
        let timestamp = from_unix_seconds(record.ts).ok_or_else(|| {
            ProtoError::MalformedCommand(format!("invalid timestamp {}", record.ts))
        })?;

        let kind = match record.command.as_str() {
            "start" => CommandKind::Start,
            "stop" => CommandKind::Stop,
            "add_image" => {
                let data = record.image_data.ok_or_else(|| {
                    ProtoError::MalformedCommand("add_image without image_data".to_string())
                })?;
                CommandKind::AddImage {
                    image: Bytes::from(data),
                    image_type: record
                        .image_type
                        .unwrap_or_else(|| DEFAULT_IMAGE_TYPE.to_string()),
                }
            }
            other => {
                return Err(ProtoError::MalformedCommand(format!(
                    "unknown command {:?}",
                    other
                )))
            }
        };

        Ok(Self {
            camera_id: CameraId(record.camera_name),
            timestamp,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(command: &str) -> CommandRecord {
        CommandRecord {
            ts: 1_700_000_000.0,
            camera_name: "cam".to_string(),
            command: command.to_string(),
            image_data: None,
            image_type: None,
        }
    }

    #[test]
    fn test_start_stop_from_record() {
        let start = Command::try_from(record("start")).unwrap();
        assert_eq!(start.kind, CommandKind::Start);
        assert_eq!(start.camera_id.as_str(), "cam");
        assert_eq!(start.timestamp.timestamp(), 1_700_000_000);

        let stop = Command::try_from(record("stop")).unwrap();
        assert_eq!(stop.kind, CommandKind::Stop);
    }

    #[test]
    fn test_unknown_tag_is_malformed() {
        let err = Command::try_from(record("rewind")).unwrap_err();
        assert!(matches!(err, ProtoError::MalformedCommand(_)));
    }

    #[test]
    fn test_add_image_requires_data() {
        let err = Command::try_from(record("add_image")).unwrap_err();
        assert!(matches!(err, ProtoError::MalformedCommand(_)));
    }

    #[test]
    fn test_add_image_empty_payload_passes_decode() {
        let mut r = record("add_image");
        r.image_data = Some(Vec::new());
        let cmd = Command::try_from(r).unwrap();
        match cmd.kind {
            CommandKind::AddImage { image, image_type } => {
                assert!(image.is_empty());
                assert_eq!(image_type, DEFAULT_IMAGE_TYPE);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_bad_timestamp_is_malformed() {
        let mut r = record("start");
        r.ts = f64::NAN;
        assert!(matches!(
            Command::try_from(r),
            Err(ProtoError::MalformedCommand(_))
        ));
    }

    #[test]
    fn test_encode_decode_add_image() {
        let at = DateTime::from_timestamp(1_700_000_123, 0).unwrap();
        let cmd = Command::add_image(CameraId::new("porch"), at, vec![1u8, 2, 3], "png");
        let decoded = Command::decode(&cmd.encode().unwrap()).unwrap();
        assert_eq!(decoded, cmd);
    }
}
