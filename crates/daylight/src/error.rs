use std::path::PathBuf;

use lapseproto::CameraId;
use thiserror::Error;

/// Errors from session dispatch.
///
/// Every variant is recovered inside the dispatch of the command that caused
/// it; none of them stop a lane.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The encoder could not be launched. The camera stays idle.
    #[error("failed to spawn encoder {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A frame could not be delivered. The frame is dropped.
    #[error("failed to write frame: {0}")]
    Write(#[source] std::io::Error),

    /// The encoder did not exit cleanly. The session is torn down anyway.
    #[error("encoder did not exit cleanly: {0}")]
    Wait(String),

    #[error("empty image payload")]
    EmptyPayload,

    #[error("failed to prepare directory {path}: {source}")]
    Paths {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The lane for this camera is gone, usually after router shutdown.
    #[error("lane for camera {0} is closed")]
    LaneClosed(CameraId),
}
