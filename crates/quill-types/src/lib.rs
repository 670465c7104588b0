// Quill - shared data types for the command bridge
// Everything that crosses the boundary is plain serializable data.

mod envelope;
mod error;
mod event;
mod ops;

pub use envelope::CallEnvelope;
pub use error::{bound_message, BridgeError, Result};
pub use event::{BridgeEvent, CrashReport, StreamEndReason, CHAT_STREAM_CHANNEL};
pub use ops::*;
