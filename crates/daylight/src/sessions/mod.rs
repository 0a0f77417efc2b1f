//! Encoder sessions - one encoder process per recording camera.
//!
//! ## Architecture
//!
//! - **EncoderHandle**: owns a running encoder's stdin and exit status
//! - **SessionRegistry**: camera to at most one session, passive
//! - **SessionManager**: dispatches start/stop/add_image against the registry
//! - **LaneRouter**: one task and queue per camera, so commands for a camera
//!   run strictly in order while cameras proceed independently
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ──start / add_image──▶ Recording ──stop / encoder died──▶ Idle
//! ```
//!
//! Every "is there a session" decision re-probes the process. A registry entry
//! alone is never trusted.

pub mod encoder;
pub mod lanes;
pub mod manager;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use encoder::{EncoderHandle, EncoderLauncher, EncoderProcess, FfmpegLauncher};
pub use lanes::LaneRouter;
pub use manager::{Outcome, SessionManager, SessionState};
pub use registry::{Session, SessionRegistry};
