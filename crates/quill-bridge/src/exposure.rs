//! Boundary exposure: the one-time act of publishing the capability surface
//! into the untrusted execution context.
//!
//! Fail-closed: if the context cannot guarantee isolation, the bridge halts
//! before any capability becomes reachable. Publishing is irreversible for
//! the process lifetime; a publish failure is reported out-of-band on the
//! crash channel and also halts the process.

use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::Value;

use quill_types::{BridgeError, BridgeEvent, CrashReport, Result};

use crate::dispatcher::Dispatcher;
use crate::events::CrashReporter;
use crate::subscription::SubscriptionHandle;
use crate::surface::EVENT_CHANNELS;

/// Well-known name the surface is published under in the untrusted context.
pub const SURFACE_GLOBAL: &str = "__quillBridge";

const ISOLATION_FATAL: &str = "Quill cannot start: the rendering surface is \
not isolated from the host process. Refusing to expose any capability.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureState {
    Checking,
    Exposed,
    Halted,
    Crashed,
}

/// The side of the untrusted context the bridge needs to see: an isolation
/// guarantee, a place to publish the surface, and a way to render a fatal
/// notice when startup must not continue.
pub trait UntrustedContext: Send + Sync {
    fn isolation_active(&self) -> bool;

    fn publish_surface(&self, global_name: &str, surface: ExposedSurface) -> anyhow::Result<()>;

    fn render_fatal(&self, message: &str);
}

/// The only handle the untrusted side ever receives. It exposes the two
/// uniform entry points and the channel vocabulary, never host internals.
#[derive(Clone)]
pub struct ExposedSurface {
    dispatcher: Arc<Dispatcher>,
}

impl std::fmt::Debug for ExposedSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExposedSurface").finish_non_exhaustive()
    }
}

impl ExposedSurface {
    pub async fn invoke(&self, channel: &str, payload: Value) -> Result<Value> {
        self.dispatcher.invoke(channel, payload).await
    }

    pub fn subscribe<F>(&self, event_channel: &'static str, callback: F) -> SubscriptionHandle
    where
        F: Fn(BridgeEvent) + Send + Sync + 'static,
    {
        self.dispatcher.events().listen(event_channel, callback)
    }

    pub fn channels(&self) -> Vec<&'static str> {
        self.dispatcher.surface().channel_names()
    }

    pub fn event_channels(&self) -> &'static [&'static str] {
        EVENT_CHANNELS
    }
}

pub struct ExposureController {
    state: RwLock<ExposureState>,
    crash: CrashReporter,
}

impl ExposureController {
    pub fn new(crash: CrashReporter) -> Self {
        Self {
            state: RwLock::new(ExposureState::Checking),
            crash,
        }
    }

    pub fn state(&self) -> ExposureState {
        *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Run the startup transition: `Checking → Exposed | Halted | Crashed`.
    ///
    /// Returns the published surface on success. Every failure path leaves
    /// the controller in a terminal state; `expose` cannot be retried.
    pub fn expose(
        &self,
        ctx: &dyn UntrustedContext,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<ExposedSurface> {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if *state != ExposureState::Checking {
            return Err(BridgeError::Exposure(format!(
                "surface already left the checking state ({:?})",
                *state
            )));
        }

        if !ctx.isolation_active() {
            *state = ExposureState::Halted;
            tracing::error!("isolation precondition not met; halting before exposure");
            ctx.render_fatal(ISOLATION_FATAL);
            return Err(BridgeError::IsolationViolation(
                "untrusted context reports isolation inactive".to_string(),
            ));
        }

        let surface = ExposedSurface { dispatcher };
        match ctx.publish_surface(SURFACE_GLOBAL, surface.clone()) {
            Ok(()) => {
                *state = ExposureState::Exposed;
                tracing::info!(
                    global = SURFACE_GLOBAL,
                    channels = surface.channels().len(),
                    "capability surface exposed"
                );
                Ok(surface)
            }
            Err(e) => {
                *state = ExposureState::Crashed;
                self.crash.report(CrashReport::new("publish", e.to_string()));
                ctx.render_fatal(&format!(
                    "Quill failed to initialize its command bridge: {e}"
                ));
                Err(BridgeError::Exposure(e.to_string()))
            }
        }
    }
}
