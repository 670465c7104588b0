//! Subscription handles for push-style channels.
//!
//! Registering interest in an event channel spawns a filter task over the
//! broadcast bus and returns a handle whose disposer removes exactly one
//! listener. Disposal is idempotent and also runs on drop, so a view
//! unmounting without an explicit dispose cannot leak a listener.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use quill_types::BridgeEvent;

use crate::events::EventBus;

pub struct SubscriptionHandle {
    disposed: Arc<AtomicBool>,
    live: Arc<AtomicUsize>,
    task: tokio::task::JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Remove this listener. Calling it again is a no-op.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.task.abort();
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl EventBus {
    /// Register `callback` for every event on `event_channel`.
    pub fn listen<F>(&self, event_channel: &'static str, callback: F) -> SubscriptionHandle
    where
        F: Fn(BridgeEvent) + Send + Sync + 'static,
    {
        let mut rx = self.raw_receiver();
        let live = self.live_counter();
        live.fetch_add(1, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.channel() == event_channel => callback(event),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            channel = event_channel,
                            skipped,
                            "subscriber lagged; events dropped"
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        SubscriptionHandle {
            disposed: Arc::new(AtomicBool::new(false)),
            live,
            task,
        }
    }
}
