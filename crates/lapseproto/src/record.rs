//! Wire records as they travel over the bus.
//!
//! Both records are MsgPack maps with named fields. Timestamps are unix
//! seconds as floats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ProtoError;

/// A command as published on `<namespace>:<camera>:command`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub ts: f64,
    pub camera_name: String,
    /// `start`, `stop` or `add_image`
    pub command: String,
    #[serde(default, with = "serde_bytes")]
    pub image_data: Option<Vec<u8>>,
    #[serde(default)]
    pub image_type: Option<String>,
}

impl CommandRecord {
    pub fn encode(&self) -> Result<Vec<u8>, ProtoError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtoError> {
        Ok(rmp_serde::from_slice(data)?)
    }
}

/// Capture state of a camera, as seen by the scheduler and fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraState {
    Idle,
    Running,
}

impl std::fmt::Display for CameraState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraState::Idle => write!(f, "idle"),
            CameraState::Running => write!(f, "running"),
        }
    }
}

/// Value stored under `<namespace>:<camera>:state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub ts: f64,
    pub camera_name: String,
    pub state: CameraState,
}

impl StateRecord {
    pub fn new(camera_name: impl Into<String>, state: CameraState, at: DateTime<Utc>) -> Self {
        Self {
            ts: to_unix_seconds(at),
            camera_name: camera_name.into(),
            state,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtoError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtoError> {
        Ok(rmp_serde::from_slice(data)?)
    }
}

/// Convert an instant to fractional unix seconds.
pub fn to_unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp() as f64 + f64::from(at.timestamp_subsec_nanos()) / 1e9
}

/// Convert fractional unix seconds back to an instant.
///
/// Returns `None` for NaN, infinities and values outside chrono's range.
pub fn from_unix_seconds(ts: f64) -> Option<DateTime<Utc>> {
    if !ts.is_finite() {
        return None;
    }
    let secs = ts.floor();
    let nanos = ((ts - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_command_record_field_names() {
        let record = CommandRecord {
            ts: 1_700_000_000.5,
            camera_name: "cam".to_string(),
            command: "start".to_string(),
            image_data: None,
            image_type: None,
        };
        let bytes = record.encode().unwrap();

        // Named encoding keeps field names on the wire
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("camera_name"));
        assert!(text.contains("command"));

        assert_eq!(CommandRecord::decode(&bytes).unwrap(), record);
    }

    #[test]
    fn test_command_record_missing_optionals() {
        #[derive(Serialize)]
        struct Minimal<'a> {
            ts: f64,
            camera_name: &'a str,
            command: &'a str,
        }
        let bytes = rmp_serde::to_vec_named(&Minimal {
            ts: 1.0,
            camera_name: "cam",
            command: "stop",
        })
        .unwrap();

        let record = CommandRecord::decode(&bytes).unwrap();
        assert_eq!(record.command, "stop");
        assert!(record.image_data.is_none());
        assert!(record.image_type.is_none());
    }

    #[test]
    fn test_decode_garbage() {
        let err = CommandRecord::decode(b"\xc1\xc1\xc1").unwrap_err();
        assert!(matches!(err, ProtoError::Decode(_)));
    }

    #[test]
    fn test_state_record_lowercase() {
        let record = StateRecord {
            ts: 2.0,
            camera_name: "cam".to_string(),
            state: CameraState::Running,
        };
        let bytes = record.encode().unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("running"));
        assert_eq!(StateRecord::decode(&bytes).unwrap().state, CameraState::Running);
    }

    #[test]
    fn test_unix_seconds() {
        let at = from_unix_seconds(1_700_000_000.25).unwrap();
        assert_eq!(at.timestamp(), 1_700_000_000);
        assert_eq!(at.timestamp_subsec_millis(), 250);
        assert!((to_unix_seconds(at) - 1_700_000_000.25).abs() < 1e-6);

        assert!(from_unix_seconds(f64::NAN).is_none());
        assert!(from_unix_seconds(f64::INFINITY).is_none());
    }
}
