//! Daylight timelapse capture.
//!
//! A scheduler publishes `start` and `stop` around the sunrise-to-sunset
//! window, a fetcher publishes camera stills while the window is open, and a
//! listener feeds those commands to encoder sessions, a photo store, or both.
//!
//! ```text
//! Scheduler ─┐
//!            ├─▶ CommandBus ─▶ CommandListener ─┬─▶ LaneRouter ─▶ encoder ─▶ .mp4
//! Fetcher ───┘                                  └─▶ PhotoStore ─▶ .jpg
//! ```

pub mod error;
pub mod fetcher;
pub mod listener;
pub mod paths;
pub mod photo;
pub mod scheduler;
pub mod sessions;
pub mod sun;
pub mod telemetry;

pub use error::SessionError;
pub use fetcher::SnapshotFetcher;
pub use listener::{CommandListener, CommandSink, ListenerStats};
pub use paths::{OutputPathResolver, SessionPaths};
pub use photo::PhotoStore;
pub use scheduler::Scheduler;
pub use sessions::{
    EncoderHandle, EncoderLauncher, EncoderProcess, FfmpegLauncher, LaneRouter, Outcome,
    SessionManager, SessionState,
};
pub use sun::{local_date, sun_times, CaptureWindow, Location, SunTimes};
