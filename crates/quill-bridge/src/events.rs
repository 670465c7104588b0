use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use quill_types::{BridgeEvent, CrashReport};

/// Broadcast bus carrying push-style events toward the untrusted side.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BridgeEvent>,
    live: Arc<AtomicUsize>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(2048);
        Self {
            tx,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn publish(&self, event: BridgeEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of live (undisposed) subscriptions.
    pub fn listener_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn raw_receiver(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn live_counter(&self) -> Arc<AtomicUsize> {
        self.live.clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Fire-and-forget reporter for exposure failures. Used exactly once per
/// process lifetime, when publishing the surface itself fails.
#[derive(Clone)]
pub struct CrashReporter {
    tx: mpsc::UnboundedSender<CrashReport>,
}

impl CrashReporter {
    pub fn report(&self, report: CrashReport) {
        if self.tx.send(report.clone()).is_err() {
            // Receiver gone; the log file is the last resort.
            tracing::error!(stage = %report.stage, message = %report.message, "crash report dropped");
        }
    }
}

pub fn crash_channel() -> (CrashReporter, mpsc::UnboundedReceiver<CrashReport>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CrashReporter { tx }, rx)
}
