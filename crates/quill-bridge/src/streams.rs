use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

/// Active streaming generations, keyed by the caller-supplied stream id.
///
/// Cancellation is cooperative: stopping a stream cancels its token; the
/// generation task observes it at the next suspend point and winds down.
#[derive(Clone, Default)]
pub(crate) struct StreamRegistry {
    active: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl StreamRegistry {
    /// Register a new stream id. Returns `None` if the id is already live.
    pub fn register(&self, stream_id: &str) -> Option<CancellationToken> {
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if active.contains_key(stream_id) {
            return None;
        }
        let token = CancellationToken::new();
        active.insert(stream_id.to_string(), token.clone());
        Some(token)
    }

    /// Cancel a live stream. Returns false if the id is unknown or already
    /// finished.
    pub fn cancel(&self, stream_id: &str) -> bool {
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match active.remove(stream_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop a finished stream's registration, if still present.
    pub fn remove(&self, stream_id: &str) {
        self.active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(stream_id);
    }

    pub fn active_count(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_rejects_duplicate_ids() {
        let registry = StreamRegistry::default();
        assert!(registry.register("s1").is_some());
        assert!(registry.register("s1").is_none());
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn cancel_fires_the_token_and_clears_the_entry() {
        let registry = StreamRegistry::default();
        let token = registry.register("s1").unwrap();
        assert!(registry.cancel("s1"));
        assert!(token.is_cancelled());
        assert!(!registry.cancel("s1"));
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn remove_is_safe_on_unknown_ids() {
        let registry = StreamRegistry::default();
        registry.remove("ghost");
        assert_eq!(registry.active_count(), 0);
    }
}
