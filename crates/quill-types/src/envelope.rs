use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One cross-boundary invocation, reified for structured logging.
///
/// Owned by the single round trip that created it; never cached or reused.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEnvelope {
    pub call_id: String,
    pub channel: String,
    pub received_at: DateTime<Utc>,
}

impl CallEnvelope {
    pub fn new(channel: &str) -> Self {
        Self {
            call_id: Uuid::new_v4().to_string(),
            channel: channel.to_string(),
            received_at: Utc::now(),
        }
    }
}
