// Quill Bridge Error Types
use thiserror::Error;

/// Longest capability failure message surfaced to the untrusted side.
/// Anything beyond this is truncated before it crosses the boundary.
const MAX_SURFACED_MESSAGE: usize = 2048;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error("validation failed on {channel}: {reason}")]
    Validation { channel: String, reason: String },

    #[error("rate limit exceeded for {key} ({ceiling} calls per second)")]
    RateLimited { key: String, ceiling: u32 },

    #[error("{channel} failed: {message}")]
    Capability { channel: String, message: String },

    #[error("isolation precondition not met: {0}")]
    IsolationViolation(String),

    #[error("surface exposure failed: {0}")]
    Exposure(String),
}

/// Truncate a host-side message to the size allowed across the boundary.
pub fn bound_message(message: impl Into<String>) -> String {
    let mut message = message.into();
    if message.len() > MAX_SURFACED_MESSAGE {
        let cut = message
            .char_indices()
            .take_while(|(i, _)| *i < MAX_SURFACED_MESSAGE)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        message.truncate(cut);
        message.push_str("…");
    }
    message
}

impl BridgeError {
    pub fn validation(channel: &str, reason: impl Into<String>) -> Self {
        BridgeError::Validation {
            channel: channel.to_string(),
            reason: reason.into(),
        }
    }

    /// Wrap a host-capability failure, bounding the surfaced message size.
    pub fn capability(channel: &str, message: impl Into<String>) -> Self {
        BridgeError::Capability {
            channel: channel.to_string(),
            message: bound_message(message),
        }
    }

    /// The wire shape returned to the untrusted caller for any failed call.
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": self.to_string(),
        })
    }
}

// Implement serialization so errors can cross the boundary as plain strings
impl serde::Serialize for BridgeError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
