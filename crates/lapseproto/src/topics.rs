//! Topic and key naming.

use crate::CameraId;

/// Topic carrying command records for one camera.
pub fn command_topic(namespace: &str, camera: &CameraId) -> String {
    format!("{}:{}:command", namespace, camera)
}

/// Key holding the capture state for one camera.
pub fn state_key(namespace: &str, camera: &CameraId) -> String {
    format!("{}:{}:state", namespace, camera)
}
