//! lapseproto - Protocol types for the daylight timelapse command bus
//!
//! Producers (the scheduler and snapshot fetcher) and consumers (the session
//! router and photo store) share one namespaced topic per camera:
//!
//! - `<namespace>:<camera>:command` carries MsgPack-encoded [`CommandRecord`]s
//! - `<namespace>:<camera>:state` is a key holding a [`StateRecord`]
//!
//! Field names on the wire are stable so that existing producers in other
//! languages keep working. Inside Rust, records are converted to the typed
//! [`Command`] before anything acts on them.
//!
//! The [`Messenger`] trait is the only bus surface the services depend on.
//! [`MemoryBus`] implements it in-process; [`CommandBus`] layers the typed
//! helpers on top of any implementation.

pub mod bus;
pub mod command;
pub mod messenger;
pub mod record;
pub mod topics;

pub use bus::CommandBus;
pub use command::{CameraId, Command, CommandKind};
pub use messenger::{MemoryBus, Messenger, Subscription};
pub use record::{CameraState, CommandRecord, StateRecord};
pub use topics::{command_topic, state_key};

use thiserror::Error;

/// Protocol and bus errors.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Unknown command tag or a record missing a required field.
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    #[error("MsgPack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("MsgPack decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}
