use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wire name of the chat streaming event channel.
pub const CHAT_STREAM_CHANNEL: &str = "chatStream";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEndReason {
    Complete,
    Stopped,
}

/// Push-style events flowing host → untrusted side.
///
/// Every variant is plain data; payloads are copied across the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    ChatToken {
        #[serde(rename = "streamId")]
        stream_id: String,
        delta: String,
    },
    ChatDone {
        #[serde(rename = "streamId")]
        stream_id: String,
        reason: StreamEndReason,
    },
    ChatError {
        #[serde(rename = "streamId")]
        stream_id: String,
        message: String,
    },
}

impl BridgeEvent {
    /// The event channel a subscriber must be listening on to receive this.
    pub fn channel(&self) -> &'static str {
        match self {
            BridgeEvent::ChatToken { .. }
            | BridgeEvent::ChatDone { .. }
            | BridgeEvent::ChatError { .. } => CHAT_STREAM_CHANNEL,
        }
    }
}

/// Out-of-band report used only when surface exposure itself fails.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashReport {
    pub stage: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl CrashReport {
    pub fn new(stage: &str, message: impl Into<String>) -> Self {
        Self {
            stage: stage.to_string(),
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_events_map_to_the_stream_channel() {
        let ev = BridgeEvent::ChatToken {
            stream_id: "s1".to_string(),
            delta: "hi".to_string(),
        };
        assert_eq!(ev.channel(), CHAT_STREAM_CHANNEL);
    }

    #[test]
    fn events_serialize_with_tagged_type() {
        let ev = BridgeEvent::ChatDone {
            stream_id: "s1".to_string(),
            reason: StreamEndReason::Stopped,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "chat_done");
        assert_eq!(json["streamId"], "s1");
        assert_eq!(json["reason"], "stopped");
    }
}
